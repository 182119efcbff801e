//! Offline stand-in for an XMAP IOC.
//!
//! [`SimulatedXmap`] keeps every PV in a [`MockPvClient`] and updates the
//! readbacks the firmware would update in response to control puts: the
//! acquiring flag, buffer sizes, pixel counters and file plugin readbacks.
use crate::{Calibration, MockPvClient, PvClient, PvError, PvValue, DXP_ATTRS, MAX_ROIS};
use log::debug;

const SPECTRA_BUFFER_SIZE: i64 = 2048;
const MAPPING_BUFFER_SIZE: i64 = 1_048_576;
const PIXELS_PER_BUFFER: i64 = 124;
const SPECTRUM_CHANNELS: usize = 2048;

/// Emission lines (energy in eV, relative height) in the synthetic spectra.
const LINES: &[(f64, f64)] = &[(2957.7, 0.3), (6403.8, 1.0), (7058.0, 0.15), (8047.8, 0.6)];

/// File plugin controls whose value is mirrored into a `_RBV` record.
const MIRRORED: &[&str] = &["FileName", "FilePath", "FileNumber", "FileTemplate"];

#[derive(Debug)]
pub struct SimulatedXmap {
    store: MockPvClient,
    prefix: String,
    filesaver: String,
    nmca: usize,
}

impl SimulatedXmap {
    pub fn new(prefix: &str, filesaver: &str, nmca: usize) -> Self {
        let sim = Self {
            store: MockPvClient::new(),
            prefix: prefix.to_string(),
            filesaver: filesaver.to_string(),
            nmca,
        };
        sim.seed();
        sim
    }

    /// The underlying PV store, for inspecting puts and overriding values.
    pub fn store(&self) -> &MockPvClient {
        &self.store
    }

    /// Calibration seeded for element `channel` (1-based). Elements differ
    /// slightly so propagated ROIs move.
    pub fn element_calibration(channel: usize) -> Calibration {
        let k = channel.saturating_sub(1) as f64;
        Calibration::new(-0.5 * k, 10.0 + 0.02 * k, 0.0)
    }

    fn seed(&self) {
        let p = &self.prefix;
        let f = format!("{}{}", self.prefix, self.filesaver);
        let set = |pv: String, value: PvValue| self.store.set(&pv, value);

        for (attr, value) in [
            ("PresetReal", PvValue::Float(0.0)),
            ("Dwell", PvValue::Float(0.25)),
            ("Acquiring", PvValue::Int(0)),
            ("EraseStart", PvValue::Int(0)),
            ("StopAll", PvValue::Int(0)),
            ("PresetMode", PvValue::Int(0)),
            ("PixelsPerBuffer_RBV", PvValue::Int(PIXELS_PER_BUFFER)),
            ("NextPixel", PvValue::Int(0)),
            ("PixelsPerRun", PvValue::Int(2048)),
            ("Apply", PvValue::Int(0)),
            ("AutoApply", PvValue::Int(0)),
            ("CollectMode", PvValue::Int(0)),
            ("SyncCount", PvValue::Int(1)),
            ("BufferSize_RBV", PvValue::Int(SPECTRA_BUFFER_SIZE)),
        ] {
            set(format!("{p}{attr}"), value);
        }

        for (attr, value) in [
            ("FilePath", PvValue::from("/data/xrf/")),
            ("FileTemplate", PvValue::from("%s%s.%4.4d")),
            ("FileWriteMode", PvValue::Int(0)),
            ("FileName", PvValue::from("xmap")),
            ("FileNumber", PvValue::Int(1)),
            ("FullFileName_RBV", PvValue::from("")),
            ("Capture", PvValue::Int(0)),
            ("NumCapture", PvValue::Int(1)),
            ("WriteFile_RBV", PvValue::Int(0)),
            ("AutoSave", PvValue::Int(0)),
            ("EnableCallbacks", PvValue::Int(1)),
            ("ArraySize0_RBV", PvValue::Int(SPECTRA_BUFFER_SIZE)),
            ("AutoIncrement", PvValue::Int(1)),
        ] {
            if MIRRORED.contains(&attr) {
                set(format!("{f}{attr}_RBV"), value.clone());
            }
            set(format!("{f}{attr}"), value);
        }

        for ch in 1..=self.nmca {
            let calib = Self::element_calibration(ch);
            let mca = format!("{p}mca{ch}");
            set(format!("{mca}.CALO"), calib.offset.into());
            set(format!("{mca}.CALS"), calib.slope.into());
            set(format!("{mca}.CALQ"), calib.quad.into());
            set(format!("{mca}.VAL"), vec![0.0; SPECTRUM_CHANNELS].into());
            set(mca.clone(), vec![0.0; SPECTRUM_CHANNELS].into());
            for i in 0..MAX_ROIS {
                set(format!("{mca}.R{i}NM"), "".into());
                set(format!("{mca}.R{i}LO"), PvValue::Int(-1));
                set(format!("{mca}.R{i}HI"), PvValue::Int(-1));
            }

            let dxp = format!("{p}dxp{ch}");
            for &attr in DXP_ATTRS {
                set(format!("{dxp}:{attr}"), dxp_default(attr));
            }
            set(format!("{dxp}:CurrentPixel"), PvValue::Int(0));
        }
    }

    fn int(&self, pv: &str) -> i64 {
        self.store
            .value(pv)
            .and_then(|v| v.as_i64())
            .unwrap_or_default()
    }

    fn apply_collect_mode(&self) {
        let p = &self.prefix;
        let size = match self.int(&format!("{p}CollectMode")) {
            0 => SPECTRA_BUFFER_SIZE,
            _ => MAPPING_BUFFER_SIZE,
        };
        debug!("simulated XMAP buffer size -> {size}");
        self.store.set(&format!("{p}BufferSize_RBV"), size);
    }

    fn erase_start(&self) {
        let p = &self.prefix;
        self.store.set(&format!("{p}Acquiring"), 1);
        for ch in 1..=self.nmca {
            self.store.set(&format!("{p}dxp{ch}:CurrentPixel"), 0);
            if self.int(&format!("{p}CollectMode")) == 0 {
                let calib = Self::element_calibration(ch);
                let spectrum = synthetic_spectrum(&calib, SPECTRUM_CHANNELS);
                self.store.set(&format!("{p}mca{ch}.VAL"), spectrum.clone());
                self.store.set(&format!("{p}mca{ch}"), spectrum);
            }
        }
    }

    fn advance_pixel(&self) {
        let p = &self.prefix;
        if self.int(&format!("{p}Acquiring")) == 0 {
            return;
        }
        if self.int(&format!("{p}CollectMode")) != 0 {
            for ch in 1..=self.nmca {
                let pv = format!("{p}dxp{ch}:CurrentPixel");
                self.store.set(&pv, self.int(&pv) + 1);
            }
        }
        let buffer = self.int(&format!("{p}BufferSize_RBV"));
        self.store
            .set(&format!("{p}{}ArraySize0_RBV", self.filesaver), buffer);
    }

    fn react(&self, pvname: &str, value: &PvValue) {
        let Some(attr) = pvname.strip_prefix(self.prefix.as_str()) else {
            return;
        };
        if let Some(attr) = attr.strip_prefix(self.filesaver.as_str()) {
            if MIRRORED.contains(&attr) {
                self.store.set(&format!("{pvname}_RBV"), value.clone());
            }
            return;
        }
        let p = &self.prefix;
        match attr {
            "EraseStart" => self.erase_start(),
            "StopAll" => self.store.set(&format!("{p}Acquiring"), 0),
            "CollectMode" if self.int(&format!("{p}AutoApply")) == 1 => {
                self.apply_collect_mode()
            }
            "Apply" => self.apply_collect_mode(),
            "NextPixel" => self.advance_pixel(),
            _ => {}
        }
    }
}

impl PvClient for SimulatedXmap {
    fn get(&self, pvname: &str) -> Result<PvValue, PvError> {
        self.store.get(pvname)
    }

    fn put(&self, pvname: &str, value: PvValue, wait: bool) -> Result<(), PvError> {
        self.store.put(pvname, value.clone(), wait)?;
        self.react(pvname, &value);
        Ok(())
    }
}

fn dxp_default(attr: &str) -> PvValue {
    match attr {
        "PreampGain" => PvValue::Float(5.0),
        "MaxEnergy" => PvValue::Float(20.48),
        "ADCPercentRule" => PvValue::Float(5.0),
        "BaselineCutPercent" => PvValue::Float(5.0),
        "BaselineThreshold" => PvValue::Float(2.5),
        "BaselineFilterLength" => PvValue::Int(128),
        "BaselineCutEnable" => PvValue::from("Enable"),
        "InputCountRate" | "OutputCountRate" => PvValue::Float(0.0),
        "GapTime" => PvValue::Float(0.15),
        "PeakingTime" => PvValue::Float(0.25),
        "EnergyThreshold" => PvValue::Float(1.0),
        "MaxWidth" => PvValue::Float(0.8),
        "PresetMode" => PvValue::from("No preset"),
        "TriggerPeakingTime" => PvValue::Float(0.1),
        "TriggerGapTime" => PvValue::Float(0.0),
        "TriggerThreshold" => PvValue::Float(1.0),
        _ => PvValue::Int(0),
    }
}

/// Gaussian lines of 60 eV width on a flat background, sampled on the
/// channels of `calib`.
pub fn synthetic_spectrum(calib: &Calibration, npts: usize) -> Vec<f64> {
    let sigma = 60.0_f64;
    calib
        .energy_axis(npts)
        .into_iter()
        .map(|e| {
            let peaks: f64 = LINES
                .iter()
                .map(|(center, height)| height * (-(e - center).powi(2) / (2.0 * sigma * sigma)).exp())
                .sum();
            (2.0 + 1000.0 * peaks).round()
        })
        .collect()
}
