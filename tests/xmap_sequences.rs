use detector_pv::*;
use std::sync::Arc;
use std::time::Duration;

const PREFIX: &str = "13SDD1:";
const FILESAVER: &str = "netCDF1:";

fn simulated(nmca: usize) -> (Arc<SimulatedXmap>, MultiXmap) {
    let sim = Arc::new(SimulatedXmap::new(PREFIX, FILESAVER, nmca));
    let xmap = MultiXmap::new(PREFIX, FILESAVER, nmca, sim.clone())
        .with_timings(XmapTimings::default().scaled(0.01));
    (sim, xmap)
}

#[test]
fn mapping_coerces_single_pulse_to_two() {
    let (sim, mut xmap) = simulated(4);
    let report = xmap
        .mca_mapping(Some("map_fe"), Some(12), 1)
        .expect("mapping setup");

    assert_eq!(report.npulses, 2);
    assert_eq!(report.pixels_per_buffer, 124);
    assert_eq!(report.num_capture, 1);
    assert!(report.is_ready());
    assert_eq!(xmap.mode(), AcquisitionMode::McaMapping);

    let store = sim.store();
    assert!(store
        .puts_to("13SDD1:PixelsPerRun")
        .iter()
        .all(|v| *v == PvValue::Int(2)));
    assert_eq!(store.value("13SDD1:BufferSize_RBV"), Some(PvValue::Int(1_048_576)));
    assert_eq!(store.value("13SDD1:netCDF1:FileWriteMode"), Some(PvValue::Int(2)));
    assert_eq!(store.value("13SDD1:netCDF1:NumCapture"), Some(PvValue::Int(1)));
    assert_eq!(store.value("13SDD1:netCDF1:FileNumber"), Some(PvValue::Int(12)));
    assert_eq!(
        store.value("13SDD1:netCDF1:FileName_RBV"),
        Some(PvValue::from("map_fe"))
    );
    assert_eq!(
        xmap.file_plugin().file_name_by_index(12).unwrap(),
        "/data/xrf/map_fe.0012"
    );
}

#[test]
fn mapping_buffers_follow_pixel_count() {
    let (_sim, mut xmap) = simulated(1);
    let report = xmap.mca_mapping(None, None, 1000).unwrap();
    assert_eq!(report.npulses, 1000);
    assert_eq!(report.num_capture, 9);
}

#[test]
fn spectra_mode_after_mapping() {
    let (sim, mut xmap) = simulated(2);
    xmap.mca_mapping(None, None, 10).unwrap();

    let outcome = xmap.spectra_mode().unwrap();
    assert!(outcome.is_ready());
    assert_eq!(xmap.mode(), AcquisitionMode::Spectra);
    assert_eq!(sim.store().value("13SDD1:BufferSize_RBV"), Some(PvValue::Int(2048)));

    xmap.start().unwrap();
    let spectrum = xmap.readmca(2).unwrap();
    assert_eq!(spectrum.len(), 2048);
    assert!(spectrum.iter().sum::<f64>() > 0.0);
    assert_eq!(xmap.mcas()[1].spectrum().unwrap(), spectrum);

    xmap.stop().unwrap();
    assert_eq!(xmap.mode(), AcquisitionMode::Idle);
    assert_eq!(sim.store().value("13SDD1:Acquiring"), Some(PvValue::Int(0)));
}

#[test]
fn spectra_mode_times_out_without_erroring() {
    let client = Arc::new(MockPvClient::new());
    client.set("13SDD1:BufferSize_RBV", 1_048_576);
    let mut xmap = MultiXmap::new(PREFIX, FILESAVER, 1, client)
        .with_timings(XmapTimings::default().scaled(0.01));

    let outcome = xmap.spectra_mode().unwrap();
    assert!(!outcome.is_ready());
    assert!(outcome.elapsed() >= Duration::from_millis(50));
    assert_eq!(xmap.mode(), AcquisitionMode::Spectra);
}

#[test]
fn finish_pixels_forces_missing_pixels() {
    let (sim, mut xmap) = simulated(2);
    xmap.mca_mapping(None, None, 5).unwrap();
    sim.store().set("13SDD1:dxp1:CurrentPixel", 2);
    sim.store().set("13SDD1:dxp2:CurrentPixel", 2);
    sim.store().clear_log();

    let (finished, remaining) = xmap.finish_pixels(Duration::from_millis(20)).unwrap();
    assert!(!finished);
    assert_eq!(remaining, 3);
    assert_eq!(sim.store().puts_to("13SDD1:NextPixel").len(), 3);
    assert_eq!(
        sim.store().puts_to("13SDD1:netCDF1:Capture"),
        vec![PvValue::Int(0)]
    );
    assert_eq!(xmap.dxps()[0].current_pixel().unwrap(), 5);

    assert_eq!(
        xmap.finish_pixels(Duration::from_millis(20)).unwrap(),
        (true, 0)
    );
}

#[test]
fn finish_pixels_clamps_overshoot() {
    let (sim, mut xmap) = simulated(1);
    xmap.mca_mapping(None, None, 3).unwrap();
    sim.store().set("13SDD1:dxp1:CurrentPixel", 7);
    assert_eq!(
        xmap.finish_pixels(Duration::from_millis(20)).unwrap(),
        (true, 0)
    );
}

#[test]
fn sca_mode_sets_collect_mode() {
    let (sim, mut xmap) = simulated(1);
    xmap.sca_mode().unwrap();
    assert_eq!(xmap.mode(), AcquisitionMode::Sca);
    assert_eq!(sim.store().value("13SDD1:CollectMode"), Some(PvValue::Int(2)));
}

#[test]
fn add_roi_propagates_through_calibrations() {
    let (_sim, xmap) = simulated(2);
    xmap.add_roi("Fe Ka", 630, 650).unwrap();
    xmap.add_roi("Ar Ka", 290, 310).unwrap();
    xmap.add_roi("Cu Ka", -1, 810).unwrap();

    let rois = xmap.get_rois().unwrap();
    assert_eq!(rois[0].names().collect::<Vec<_>>(), vec!["Ar Ka", "Fe Ka"]);
    assert_eq!(rois[0].get("Fe Ka"), Some((630, 650)));
    assert_eq!(rois[1].get("Fe Ka"), Some((631, 651)));
    assert!(!rois[1].contains("Cu Ka"));
}

#[test]
fn limited_roi_slots_ignore_stale_hardware_slots() {
    let sim = Arc::new(SimulatedXmap::new(PREFIX, FILESAVER, 2));
    for mca in ["mca1", "mca2"] {
        sim.store().set(&format!("13SDD1:{mca}.R2NM"), "stale");
        sim.store().set(&format!("13SDD1:{mca}.R2LO"), 100);
        sim.store().set(&format!("13SDD1:{mca}.R2HI"), 120);
    }
    let xmap = MultiXmap::new(PREFIX, FILESAVER, 2, sim.clone())
        .with_roi_slots(2)
        .with_timings(XmapTimings::default().scaled(0.01));

    xmap.add_roi("Fe Ka", 630, 650).unwrap();
    xmap.add_roi("Ar Ka", 290, 310).unwrap();

    let rois = xmap.get_rois().unwrap();
    for table in &rois {
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["Ar Ka", "Fe Ka"]);
    }
    assert!(xmap.roi_calib_info().is_ok());
}

#[test]
fn saved_config_restores_rois() {
    let (_sim, xmap) = simulated(2);
    xmap.add_roi("Fe Ka", 630, 650).unwrap();
    xmap.add_roi("Zn Ka", 860, 885).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xmap_rois.ini");
    let written = xmap.write_current_config(Some(&path)).unwrap();
    assert!(written.contains("ROI00 = Fe Ka | 630 650 631 651"));
    assert!(written.contains("PresetMode = No_preset No_preset"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), written);

    let file = RoiFile::read(&path).unwrap();
    let general = file.general();
    assert_eq!(general.prefix.as_deref(), Some(PREFIX));
    assert_eq!(general.nmca, Some(2));
    assert_eq!(file.calibrations().unwrap().len(), 2);

    let (_sim, fresh) = simulated(2);
    let restored = fresh.restore_rois(&path).unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(fresh.get_rois().unwrap(), xmap.get_rois().unwrap());
}

#[test]
fn restore_from_missing_file() {
    let (_sim, xmap) = simulated(1);
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        xmap.restore_rois(&dir.path().join("nope.ini")),
        Err(DeviceError::RoiFile(RoiFileError::BadFilePath(_)))
    ));
}
