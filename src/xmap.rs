use crate::file_plugin::FileWriteMode;
use crate::roi_file::{calibration_lines, dxp_line, header_lines, roi_line, RoiFile};
use crate::{
    Calibration, DeviceError, Dxp, FilePlugin, Mca, PollOutcome, Poller, PvClient, PvDevice,
    PvError, PvValue, RoiTable, DXP_ATTRS,
};
use log::{debug, info, warn};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Buffer size (in words) separating spectra-mode buffers from mapping
/// buffers, for both the XMAP and the file plugin readbacks.
pub const BUFFER_READY_SIZE: i64 = 16384;

/// Used when `PixelsPerBuffer_RBV` cannot be read.
pub const DEFAULT_PIXELS_PER_BUFFER: i64 = 124;

const XMAP_ATTRS: &[&str] = &[
    "PresetReal",
    "Dwell",
    "Acquiring",
    "EraseStart",
    "StopAll",
    "PresetMode",
    "PixelsPerBuffer_RBV",
    "NextPixel",
    "PixelsPerRun",
    "Apply",
    "AutoApply",
    "CollectMode",
    "SyncCount",
    "BufferSize_RBV",
];

/// Values of the `CollectMode` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectMode {
    Spectra = 0,
    McaMapping = 1,
    ScaMapping = 2,
    ListMapping = 3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AcquisitionMode {
    #[default]
    Idle,
    Spectra,
    Sca,
    McaMapping,
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Spectra => "MCA spectra",
            Self::Sca => "SCA mapping",
            Self::McaMapping => "MCA mapping",
        };
        f.write_str(name)
    }
}

/// Poll intervals, deadlines and settle delays of the mode transitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XmapTimings {
    /// Wait for `BufferSize_RBV` to drop after switching to spectra.
    pub spectra: Poller,
    /// Pixel stepping until the file plugin sees mapping-sized arrays.
    pub array_size: Poller,
    /// Wait for `BufferSize_RBV` to grow after applying mapping settings.
    pub buffer_size: Poller,
    /// Wait for the file plugin array size to match the XMAP buffer.
    pub file_buffer: Poller,
    pub pixel_interval: Duration,
    pub apply_settle: Duration,
    pub buffer_settle: Duration,
    pub finish_settle: Duration,
}

impl Default for XmapTimings {
    fn default() -> Self {
        Self {
            spectra: Poller::from_millis(50, 5000),
            array_size: Poller::from_millis(100, 10000),
            buffer_size: Poller::from_millis(250, 10000),
            file_buffer: Poller::from_millis(100, 5000),
            pixel_interval: Duration::from_millis(100),
            apply_settle: Duration::from_millis(500),
            buffer_settle: Duration::from_millis(250),
            finish_settle: Duration::from_millis(500),
        }
    }
}

impl XmapTimings {
    /// Every interval, deadline and delay multiplied by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            spectra: self.spectra.scaled(factor),
            array_size: self.array_size.scaled(factor),
            buffer_size: self.buffer_size.scaled(factor),
            file_buffer: self.file_buffer.scaled(factor),
            pixel_interval: self.pixel_interval.mul_f64(factor),
            apply_settle: self.apply_settle.mul_f64(factor),
            buffer_settle: self.buffer_settle.mul_f64(factor),
            finish_settle: self.finish_settle.mul_f64(factor),
        }
    }
}

/// What [`MultiXmap::mca_mapping`] configured and which waits converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingReport {
    pub npulses: i64,
    pub pixels_per_buffer: i64,
    pub num_capture: i64,
    pub array_size: PollOutcome,
    pub buffer_size: PollOutcome,
    pub file_buffer: PollOutcome,
}

impl MappingReport {
    pub fn is_ready(&self) -> bool {
        self.array_size.is_ready() && self.buffer_size.is_ready() && self.file_buffer.is_ready()
    }
}

/// Number of file plugin captures needed to hold `npulses` pixels.
pub fn buffers_needed(npulses: i64, pixels_per_buffer: i64) -> i64 {
    let per_buffer = pixels_per_buffer.max(1);
    if npulses <= 0 {
        return 0;
    }
    1 + (npulses - 1) / per_buffer
}

/// Multi-element XMAP spectrometer: N DXP + N MCA channel pairs sharing
/// acquisition control and one file-saving plugin.
///
/// Channel `i` of [`MultiXmap::mcas`] and [`MultiXmap::dxps`] is hardware
/// element `i + 1`.
#[derive(Debug)]
pub struct MultiXmap {
    device: PvDevice,
    file_plugin: FilePlugin,
    filesaver: String,
    dxps: Vec<Dxp>,
    mcas: Vec<Mca>,
    timings: XmapTimings,
    mode: AcquisitionMode,
}

impl MultiXmap {
    pub fn new(prefix: &str, filesaver: &str, nmca: usize, client: Arc<dyn PvClient>) -> Self {
        let dxps = (1..=nmca)
            .map(|i| Dxp::new(prefix, i, Arc::clone(&client)))
            .collect();
        let mcas = (1..=nmca)
            .map(|i| Mca::channel(prefix, i, Arc::clone(&client)))
            .collect();
        let file_plugin = FilePlugin::new(prefix, filesaver, Arc::clone(&client));
        let device = PvDevice::new(prefix, "", XMAP_ATTRS, client);
        Self {
            device,
            file_plugin,
            filesaver: filesaver.to_string(),
            dxps,
            mcas,
            timings: XmapTimings::default(),
            mode: AcquisitionMode::Idle,
        }
    }

    pub fn with_timings(mut self, timings: XmapTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Rebuild the MCA channels with `roi_slots` ROI slots each.
    pub fn with_roi_slots(mut self, roi_slots: usize) -> Self {
        let client = self.device.client();
        let prefix = self.device.prefix().to_string();
        self.mcas = (1..=self.mcas.len())
            .map(|i| {
                Mca::with_roi_slots(&format!("{prefix}mca{i}"), roi_slots, Arc::clone(&client))
            })
            .collect();
        self
    }

    pub fn prefix(&self) -> &str {
        self.device.prefix()
    }

    pub fn filesaver(&self) -> &str {
        &self.filesaver
    }

    pub fn nmca(&self) -> usize {
        self.mcas.len()
    }

    pub fn mcas(&self) -> &[Mca] {
        &self.mcas
    }

    pub fn dxps(&self) -> &[Dxp] {
        &self.dxps
    }

    pub fn file_plugin(&self) -> &FilePlugin {
        &self.file_plugin
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn timings(&self) -> &XmapTimings {
        &self.timings
    }

    pub fn get(&self, attr: &str) -> Result<PvValue, PvError> {
        self.device.get(attr)
    }

    pub fn put(&self, attr: &str, value: impl Into<PvValue>) -> Result<(), PvError> {
        self.device.put(attr, value)
    }

    pub fn get_calib(&self) -> Result<Vec<Calibration>, PvError> {
        self.mcas.iter().map(Mca::get_calib).collect()
    }

    pub fn get_rois(&self) -> Result<Vec<RoiTable>, PvError> {
        self.mcas.iter().map(Mca::rois).collect()
    }

    /// Copy the ROIs of channel `source` onto every other channel, rescaled
    /// through each channel's calibration.
    pub fn propagate_rois(&self, source: usize) -> Result<(), DeviceError> {
        let src = self.mcas.get(source).ok_or(DeviceError::NoChannel(source))?;
        let rois = src.rois()?;
        let calib = src.get_calib()?;
        for (i, mca) in self.mcas.iter().enumerate() {
            if i != source {
                mca.propagate_from(&rois, &calib)?;
            }
        }
        info!(
            "Propagated {} ROIs from {} to {} channels",
            rois.len(),
            src.prefix(),
            self.mcas.len() - 1
        );
        Ok(())
    }

    /// Add (or replace) a ROI on the first channel and propagate the table to
    /// the rest. Negative bounds are ignored.
    pub fn add_roi(&self, name: &str, lo: i32, hi: i32) -> Result<(), DeviceError> {
        let first = self.mcas.first().ok_or(DeviceError::NoChannel(0))?;
        if lo < 0 || hi < 0 {
            debug!("Ignoring ROI {name:?} with bounds [{lo}, {hi}]");
            return Ok(());
        }
        first.add_roi(name, lo, hi, None)?;
        self.propagate_rois(0)
    }

    /// The `[rois]`, `[calibration]` and `[dxp]` sections of the ROI file.
    pub fn roi_calib_info(&self) -> Result<Vec<String>, DeviceError> {
        let mut buff = vec!["[rois]".to_string()];
        let roidat = self.get_rois()?;
        let first = roidat.first().ok_or(DeviceError::NoChannel(0))?;
        for (i, roi) in first.iter().enumerate() {
            let bounds = roidat
                .iter()
                .enumerate()
                .map(|(ch, table)| {
                    table.get(&roi.name).ok_or_else(|| DeviceError::MissingRoi {
                        channel: ch + 1,
                        name: roi.name.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            buff.push(roi_line(i, &roi.name, &bounds));
        }

        buff.extend(calibration_lines(&self.get_calib()?));

        buff.push("[dxp]".to_string());
        for &attr in DXP_ATTRS {
            let values = self
                .dxps
                .iter()
                .map(|dxp| dxp.get_string(attr))
                .collect::<Result<Vec<_>, _>>()?;
            buff.push(dxp_line(attr, &values));
        }
        Ok(buff)
    }

    /// Render the full settings file, writing it to `path` when given.
    pub fn write_current_config(&self, path: Option<&Path>) -> Result<String, DeviceError> {
        let mut buff = header_lines(self.prefix(), self.nmca(), &self.filesaver);
        debug!("Collecting ROI, calibration and DXP settings");
        buff.extend(self.roi_calib_info()?);
        debug!("Collected {} settings lines", buff.len());

        let mut contents = buff.join("\n");
        contents.push('\n');
        if let Some(path) = path {
            std::fs::write(path, &contents)?;
            info!("Wrote XMAP settings to {}", path.to_string_lossy());
        }
        Ok(contents)
    }

    /// Load ROIs from a ROI file: the first channel takes them as written,
    /// the others get them rescaled from the first channel's calibration.
    pub fn restore_rois(&self, path: &Path) -> Result<RoiTable, DeviceError> {
        let rois = RoiFile::read(path)?.rois()?;
        let (first, others) = self
            .mcas
            .split_first()
            .ok_or(DeviceError::NoChannel(0))?;
        first.set_rois(&rois, None)?;
        let cal0 = first.get_calib()?;
        for mca in others {
            mca.set_rois(&rois, Some(&cal0))?;
        }
        info!(
            "Restored {} ROIs from {} onto {} channels",
            rois.len(),
            path.to_string_lossy(),
            self.mcas.len()
        );
        Ok(rois)
    }

    /// Erase and start. Re-issued once if the XMAP does not report
    /// acquiring.
    pub fn start(&self) -> Result<i64, PvError> {
        self.device.put("EraseStart", 1)?;
        if self.device.get_i64("Acquiring")? == 0 {
            self.device.poll();
            self.device.put("EraseStart", 1)?;
        }
        self.device.get_i64("EraseStart")
    }

    pub fn stop(&mut self) -> Result<i64, PvError> {
        self.device.put("StopAll", 1)?;
        self.mode = AcquisitionMode::Idle;
        self.device.get_i64("StopAll")
    }

    pub fn next_pixel(&self) -> Result<i64, PvError> {
        self.device.put("NextPixel", 1)?;
        self.device.get_i64("NextPixel")
    }

    /// Spectrum of element `n` from the `{prefix}mca{n}` array record.
    pub fn readmca(&self, n: usize) -> Result<Vec<f64>, PvError> {
        self.device.get_array(&format!("mca{n}"))
    }

    pub fn sca_mode(&mut self) -> Result<(), PvError> {
        self.device.put("CollectMode", CollectMode::ScaMapping as i64)?;
        self.mode = AcquisitionMode::Sca;
        info!("XMAP in {} mode", self.mode);
        Ok(())
    }

    /// Switch to MCA spectra mode and wait for the buffer size to drop.
    ///
    /// A timeout is reported in the outcome, not as an error; the mode is
    /// considered switched either way.
    pub fn spectra_mode(&mut self) -> Result<PollOutcome, PvError> {
        self.stop()?;
        self.device.put("CollectMode", CollectMode::Spectra as i64)?;
        self.device.put("PresetMode", 0)?;

        let outcome = self.timings.spectra.until(|| {
            self.device.put("CollectMode", CollectMode::Spectra as i64)?;
            Ok(self.device.get_i64("BufferSize_RBV")? < BUFFER_READY_SIZE)
        })?;
        if !outcome.is_ready() {
            warn!(
                "XMAP buffer size did not drop below {} within {:?}",
                BUFFER_READY_SIZE,
                outcome.elapsed()
            );
        }
        self.mode = AcquisitionMode::Spectra;
        info!("XMAP in {} mode", self.mode);
        Ok(outcome)
    }

    /// Configure MCA mapping for `npulses` pixels (at least 2) and set up the
    /// file plugin to capture them.
    pub fn mca_mapping(
        &mut self,
        filename: Option<&str>,
        filenumber: Option<i64>,
        npulses: i64,
    ) -> Result<MappingReport, DeviceError> {
        let npulses = npulses.max(2);
        let mapping = CollectMode::McaMapping as i64;

        self.device.put("AutoApply", 1)?;
        self.stop()?;
        self.device.put("PresetMode", 0)?;
        self.file_plugin.set_write_mode(FileWriteMode::Stream)?;
        self.device.put("CollectMode", mapping)?;
        self.device.put("PixelsPerRun", npulses)?;

        // Step pixels until the file plugin sees the mapping frame geometry.
        self.file_plugin.capture_off()?;
        self.start()?;
        let array_size = self.timings.array_size.until(|| {
            self.device.put("NextPixel", 1)?;
            Ok(self.file_plugin.array_size()? > BUFFER_READY_SIZE)
        })?;
        if !array_size.is_ready() {
            warn!("File plugin array size did not reach mapping size");
        }

        self.device.put("PixelsPerRun", npulses)?;
        self.device.put("SyncCount", 1)?;
        self.file_plugin.set_file_number(filenumber)?;
        if let Some(name) = filename {
            self.file_plugin.set_name(name)?;
        }

        self.device.put("Apply", 1)?;
        self.device.put("CollectMode", mapping)?;
        self.device.put("PixelsPerRun", npulses)?;
        thread::sleep(self.timings.apply_settle);
        let buffer_size = self
            .timings
            .buffer_size
            .until(|| Ok(self.device.get_i64("BufferSize_RBV")? > BUFFER_READY_SIZE))?;
        if !buffer_size.is_ready() {
            warn!("XMAP buffer size did not reach mapping size");
        }

        let pixels_per_buffer = match self.device.get_i64("PixelsPerBuffer_RBV") {
            Ok(n) if n > 0 => n,
            _ => DEFAULT_PIXELS_PER_BUFFER,
        };
        thread::sleep(self.timings.buffer_settle);
        let num_capture = buffers_needed(npulses, pixels_per_buffer);
        self.file_plugin.set_num_capture(num_capture)?;

        let file_buffer = self.timings.file_buffer.until(|| {
            Ok(self.device.get_i64("BufferSize_RBV")? == self.file_plugin.array_size()?)
        })?;
        if !file_buffer.is_ready() {
            warn!("File plugin buffer size does not match the XMAP buffer size");
        }
        thread::sleep(self.timings.finish_settle);

        self.mode = AcquisitionMode::McaMapping;
        info!(
            "XMAP in {} mode: {} pixels, {} pixels/buffer, {} buffers per file",
            self.mode, npulses, pixels_per_buffer, num_capture
        );
        Ok(MappingReport {
            npulses,
            pixels_per_buffer,
            num_capture,
            array_size,
            buffer_size,
            file_buffer,
        })
    }

    /// Wait up to `timeout` for the pixel counter to reach `PixelsPerRun`.
    /// If it does not, advance the remaining pixels by hand and stop file
    /// capture. Returns whether the run finished on its own and how many
    /// pixels were missing.
    pub fn finish_pixels(&self, timeout: Duration) -> Result<(bool, i64), DeviceError> {
        let dxp = self.dxps.first().ok_or(DeviceError::NoChannel(0))?;
        let mut pprun = self.device.get_i64("PixelsPerRun")?;
        let mut cur = dxp.current_pixel()?;
        if cur < pprun {
            Poller::new(self.timings.pixel_interval, timeout).until(|| {
                pprun = self.device.get_i64("PixelsPerRun")?;
                cur = dxp.current_pixel()?;
                Ok(cur >= pprun)
            })?;
        }

        let ok = cur >= pprun;
        let remaining = (pprun - cur).max(0);
        if !ok {
            warn!("XMAP needs to finish pixels {} / {}", cur, pprun);
            for _ in 0..remaining {
                self.next_pixel()?;
                thread::sleep(self.timings.pixel_interval);
            }
            self.file_plugin.capture_off()?;
        }
        Ok((ok, remaining))
    }
}
