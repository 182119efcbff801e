use crate::{
    Calibration, DeviceError, PvClient, PvDevice, PvError, Roi, RoiTable, RoiTransform, MAX_ROIS,
};
use log::debug;
use std::sync::Arc;

const MCA_ATTRS: &[&str] = &[
    "CALO", "CALS", "CALQ", "TTH", "EGU", "VAL", "PRTM", "PLTM", "ACT", "RTIM", "STIM", "ACQG",
    "NUSE", "PCT", "PTCL", "DWEL", "CHAS", "PSCL", "SEQ", "ERTM", "ELTM", "IDTIM",
];

/// A single multi-channel analyzer record with its ROI slots.
///
/// ROI slot `i` lives in the `R{i}NM`, `R{i}LO` and `R{i}HI` fields. Bounds
/// are raw channel indices in this analyzer's own calibration.
#[derive(Debug, Clone)]
pub struct Mca {
    device: PvDevice,
    roi_slots: usize,
}

impl Mca {
    /// MCA record at exactly `prefix` (e.g. `13SDD1:mca1`).
    pub fn new(prefix: &str, client: Arc<dyn PvClient>) -> Self {
        Self::with_roi_slots(prefix, MAX_ROIS, client)
    }

    /// MCA record `{prefix}mca{channel}` of a multi-element detector.
    pub fn channel(prefix: &str, channel: usize, client: Arc<dyn PvClient>) -> Self {
        Self::new(&format!("{prefix}mca{channel}"), client)
    }

    pub fn with_roi_slots(prefix: &str, roi_slots: usize, client: Arc<dyn PvClient>) -> Self {
        let roi_slots = roi_slots.min(MAX_ROIS);
        let mut attrs: Vec<String> = MCA_ATTRS.iter().map(|a| a.to_string()).collect();
        for i in 0..roi_slots {
            attrs.push(format!("R{i}NM"));
            attrs.push(format!("R{i}LO"));
            attrs.push(format!("R{i}HI"));
        }
        let attrs: Vec<&str> = attrs.iter().map(String::as_str).collect();
        let device = PvDevice::new(prefix, ".", &attrs, client);
        device.poll();
        Self { device, roi_slots }
    }

    pub fn prefix(&self) -> &str {
        self.device.prefix()
    }

    pub fn roi_slots(&self) -> usize {
        self.roi_slots
    }

    pub fn device(&self) -> &PvDevice {
        &self.device
    }

    /// Read the ROI table from the first `max` slots. The first slot with an
    /// empty name ends the table.
    pub fn get_rois(&self, max: usize) -> Result<RoiTable, PvError> {
        let mut rois = RoiTable::new();
        for i in 0..max {
            let name = self.device.get_string(&format!("R{i}NM"))?;
            let name = name.trim();
            if name.is_empty() {
                break;
            }
            let lo = self.get_bound(&format!("R{i}LO"))?;
            let hi = self.get_bound(&format!("R{i}HI"))?;
            rois.insert(name, lo, hi);
        }
        Ok(rois)
    }

    fn get_bound(&self, attr: &str) -> Result<i32, PvError> {
        let value = self.device.get_i64(attr)?;
        i32::try_from(value).map_err(|_| PvError::TypeMismatch {
            pv: self.device.pv_name(attr),
            expected: "a 32-bit channel bound",
            found: "an out-of-range integer",
        })
    }

    pub fn rois(&self) -> Result<RoiTable, PvError> {
        self.get_rois(self.roi_slots)
    }

    pub fn sorted_rois(rois: &RoiTable) -> Vec<Roi> {
        rois.sorted()
    }

    /// Write `rois` to the ROI slots in ascending `lo` order and clear the
    /// slots above them.
    ///
    /// With `calib`, the bounds are taken to be channels under that
    /// calibration and are rescaled into this analyzer's own calibration.
    pub fn set_rois(&self, rois: &RoiTable, calib: Option<&Calibration>) -> Result<(), DeviceError> {
        if rois.len() > self.roi_slots {
            return Err(DeviceError::TooManyRois {
                given: rois.len(),
                slots: self.roi_slots,
            });
        }

        let transform = match calib {
            Some(source) => {
                let own = self.get_calib()?;
                source
                    .rescale_to(&own)
                    .ok_or(DeviceError::DegenerateCalibration(source.slope))?
            }
            None => RoiTransform::IDENTITY,
        };

        let sorted = Self::sorted_rois(rois);
        for (slot, roi) in sorted.iter().enumerate() {
            let roi = transform.apply_roi(roi);
            debug!(
                "{} ROI slot {}: {} [{}, {}]",
                self.prefix(),
                slot,
                roi.name,
                roi.lo,
                roi.hi
            );
            self.write_slot(slot, &roi.name, roi.lo, roi.hi)?;
        }
        for slot in sorted.len()..self.roi_slots {
            self.write_slot(slot, "", -1, -1)?;
        }
        Ok(())
    }

    /// Insert or replace one ROI. Negative bounds leave the table untouched.
    pub fn add_roi(
        &self,
        name: &str,
        lo: i32,
        hi: i32,
        calib: Option<&Calibration>,
    ) -> Result<(), DeviceError> {
        if lo < 0 || hi < 0 {
            debug!("{}: ignoring ROI {name:?} with bounds [{lo}, {hi}]", self.prefix());
            return Ok(());
        }
        let mut rois = self.rois()?;
        rois.insert(name.trim(), lo, hi);
        self.set_rois(&rois, calib)
    }

    pub fn del_roi(&self, name: &str) -> Result<(), DeviceError> {
        let mut rois = self.rois()?;
        if rois.remove(name).is_some() {
            self.set_rois(&rois, None)?;
        }
        Ok(())
    }

    pub fn clear_rois(&self, max: usize) -> Result<(), PvError> {
        for slot in 0..max {
            self.write_slot(slot, "", -1, -1)?;
        }
        Ok(())
    }

    fn write_slot(&self, slot: usize, name: &str, lo: i32, hi: i32) -> Result<(), PvError> {
        self.device.put(&format!("R{slot}NM"), name)?;
        self.device.put(&format!("R{slot}LO"), lo)?;
        self.device.put(&format!("R{slot}HI"), hi)
    }

    /// Copy ROIs defined under `source_calib` onto this analyzer, preserving
    /// the energy range each ROI covers.
    pub fn propagate_from(
        &self,
        rois: &RoiTable,
        source_calib: &Calibration,
    ) -> Result<(), DeviceError> {
        self.set_rois(rois, Some(source_calib))
    }

    pub fn get_calib(&self) -> Result<Calibration, PvError> {
        Ok(Calibration::new(
            self.device.get_f64("CALO")?,
            self.device.get_f64("CALS")?,
            self.device.get_f64("CALQ")?,
        ))
    }

    pub fn spectrum(&self) -> Result<Vec<f64>, PvError> {
        self.device.get_array("VAL")
    }

    /// Energy of every channel of the current spectrum.
    pub fn get_energy(&self) -> Result<Vec<f64>, PvError> {
        let npts = self.spectrum()?.len();
        Ok(self.get_calib()?.energy_axis(npts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockPvClient, PvValue};

    fn mca_with_empty_slots(calib: Calibration) -> (Arc<MockPvClient>, Mca) {
        let client = Arc::new(MockPvClient::new());
        client.set("XMAP:mca1.CALO", calib.offset);
        client.set("XMAP:mca1.CALS", calib.slope);
        client.set("XMAP:mca1.CALQ", calib.quad);
        for i in 0..MAX_ROIS {
            client.set(&format!("XMAP:mca1.R{i}NM"), "");
            client.set(&format!("XMAP:mca1.R{i}LO"), -1);
            client.set(&format!("XMAP:mca1.R{i}HI"), -1);
        }
        let mca = Mca::channel("XMAP:", 1, client.clone());
        (client, mca)
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let (_client, mca) = mca_with_empty_slots(Calibration::new(0.0, 10.0, 0.0));
        let rois: RoiTable = [
            ("Zn Ka", (860, 885)),
            ("Fe Ka", (630, 650)),
            ("Cu Ka", (800, 815)),
        ]
        .into_iter()
        .collect();
        mca.set_rois(&rois, None).unwrap();

        let read = mca.rois().unwrap();
        assert_eq!(read.len(), 3);
        for roi in &rois {
            assert_eq!(read.get(&roi.name), Some(roi.bounds()));
        }
        let order: Vec<&str> = read.names().collect();
        assert_eq!(order, vec!["Fe Ka", "Cu Ka", "Zn Ka"]);
    }

    #[test]
    fn test_set_rois_clears_higher_slots() {
        let (client, mca) = mca_with_empty_slots(Calibration::new(0.0, 10.0, 0.0));
        client.set("XMAP:mca1.R3NM", "stale");
        client.set("XMAP:mca1.R3LO", 7);
        client.set("XMAP:mca1.R3HI", 9);

        let rois: RoiTable = [("Fe Ka", (100, 150))].into_iter().collect();
        mca.set_rois(&rois, None).unwrap();

        assert_eq!(client.value("XMAP:mca1.R0NM"), Some(PvValue::from("Fe Ka")));
        assert_eq!(client.value("XMAP:mca1.R0LO"), Some(PvValue::Int(100)));
        assert_eq!(client.value("XMAP:mca1.R0HI"), Some(PvValue::Int(150)));
        for i in 1..MAX_ROIS {
            assert_eq!(client.value(&format!("XMAP:mca1.R{i}NM")), Some(PvValue::from("")));
            assert_eq!(client.value(&format!("XMAP:mca1.R{i}LO")), Some(PvValue::Int(-1)));
            assert_eq!(client.value(&format!("XMAP:mca1.R{i}HI")), Some(PvValue::Int(-1)));
        }
    }

    #[test]
    fn test_add_roi_with_negative_bounds_is_ignored() {
        let (client, mca) = mca_with_empty_slots(Calibration::new(0.0, 10.0, 0.0));
        mca.add_roi("Fe Ka", 100, 150, None).unwrap();
        client.clear_log();

        mca.add_roi("Cu Ka", -1, 815, None).unwrap();
        mca.add_roi("Cu Ka", 800, -1, None).unwrap();

        assert!(client.put_log().is_empty());
        let rois = mca.rois().unwrap();
        assert_eq!(rois.len(), 1);
        assert_eq!(rois.get("Fe Ka"), Some((100, 150)));
    }

    #[test]
    fn test_add_replace_and_delete() {
        let (_client, mca) = mca_with_empty_slots(Calibration::new(0.0, 10.0, 0.0));
        mca.add_roi("Cu Ka", 800, 815, None).unwrap();
        mca.add_roi(" Fe Ka ", 630, 650, None).unwrap();
        mca.add_roi("Cu Ka", 795, 820, None).unwrap();

        let rois = mca.rois().unwrap();
        assert_eq!(rois.names().collect::<Vec<_>>(), vec!["Fe Ka", "Cu Ka"]);
        assert_eq!(rois.get("Cu Ka"), Some((795, 820)));

        mca.del_roi("Fe Ka").unwrap();
        mca.del_roi("not there").unwrap();
        let rois = mca.rois().unwrap();
        assert_eq!(rois.names().collect::<Vec<_>>(), vec!["Cu Ka"]);
    }

    #[test]
    fn test_propagate_rescales_bounds() {
        let (_client, mca) = mca_with_empty_slots(Calibration::new(5.0, 20.0, 0.0));
        let rois: RoiTable = [("Fe Ka", (100, 150))].into_iter().collect();
        mca.propagate_from(&rois, &Calibration::new(0.0, 10.0, 0.0))
            .unwrap();
        assert_eq!(mca.rois().unwrap().get("Fe Ka"), Some((205, 305)));
    }

    #[test]
    fn test_propagate_same_calibration_is_identity() {
        let calib = Calibration::new(-3.2, 9.95, 2e-7);
        let (_client, mca) = mca_with_empty_slots(calib);
        let rois: RoiTable = [("Fe Ka", (630, 650)), ("Ar Ka", (290, 310))]
            .into_iter()
            .collect();
        mca.propagate_from(&rois, &calib).unwrap();
        let read = mca.rois().unwrap();
        assert_eq!(read.get("Fe Ka"), Some((630, 650)));
        assert_eq!(read.get("Ar Ka"), Some((290, 310)));
    }

    #[test]
    fn test_too_many_rois() {
        let (client, mca) = mca_with_empty_slots(Calibration::new(0.0, 10.0, 0.0));
        let rois: RoiTable = (0..=MAX_ROIS as i32)
            .map(|i| (format!("roi{i}"), (i * 10, i * 10 + 5)))
            .collect();
        client.clear_log();
        assert!(matches!(
            mca.set_rois(&rois, None),
            Err(DeviceError::TooManyRois { given: 33, slots: 32 })
        ));
        assert!(client.put_log().is_empty());
    }

    #[test]
    fn test_clear_and_energy() {
        let (client, mca) = mca_with_empty_slots(Calibration::new(1.0, 2.0, 0.0));
        mca.add_roi("Fe Ka", 100, 150, None).unwrap();
        mca.clear_rois(MAX_ROIS).unwrap();
        assert!(mca.rois().unwrap().is_empty());

        client.set("XMAP:mca1.VAL", vec![0.0; 4]);
        assert_eq!(mca.get_energy().unwrap(), vec![1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_blank_slot_ends_the_table() {
        let (client, mca) = mca_with_empty_slots(Calibration::new(0.0, 10.0, 0.0));
        client.set("XMAP:mca1.R0NM", "Fe Ka");
        client.set("XMAP:mca1.R0LO", 630);
        client.set("XMAP:mca1.R0HI", 650);
        client.set("XMAP:mca1.R1NM", "   ");
        client.set("XMAP:mca1.R2NM", "Cu Ka");
        client.set("XMAP:mca1.R2LO", 800);
        client.set("XMAP:mca1.R2HI", 815);

        let rois = mca.rois().unwrap();
        assert_eq!(rois.names().collect::<Vec<_>>(), vec!["Fe Ka"]);
        assert!(!rois.contains("Cu Ka"));
    }

    #[test]
    fn test_out_of_range_bound_is_an_error() {
        let (client, mca) = mca_with_empty_slots(Calibration::new(0.0, 10.0, 0.0));
        client.set("XMAP:mca1.R0NM", "Fe Ka");
        client.set("XMAP:mca1.R0LO", 1i64 << 40);
        client.set("XMAP:mca1.R0HI", 650);

        match mca.rois() {
            Err(PvError::TypeMismatch { pv, .. }) => assert_eq!(pv, "XMAP:mca1.R0LO"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_padded_names_share_a_slot() {
        let (client, mca) = mca_with_empty_slots(Calibration::new(0.0, 10.0, 0.0));
        mca.add_roi("Fe Ka", 630, 650, None).unwrap();
        mca.add_roi(" Fe Ka ", 632, 648, None).unwrap();

        let rois = mca.rois().unwrap();
        assert_eq!(rois.len(), 1);
        assert_eq!(rois.get("Fe Ka"), Some((632, 648)));
        assert_eq!(client.value("XMAP:mca1.R1NM"), Some(PvValue::from("")));
    }
}
