//! The flat key/value ROI file written by [`MultiXmap::write_current_config`]
//! and read back by [`MultiXmap::restore_rois`].
//!
//! ```text
//! #Multi-Element xMAP Settings saved: Mon Oct 19 10:44:00 2026
//! [general]
//! prefix= 13SDD1:
//! nmcas = 4
//! filesaver= netCDF1:
//! [rois]
//! ROI00 = Fe Ka | 630 650 632 652 629 649 631 651
//! [calibration]
//! OFFSET = 0 -0.5 0.25 0
//! SLOPE  = 10 10.02 9.98 10
//! QUAD   = 0 0 0 0
//! [dxp]
//! PeakingTime = 0.25 0.25 0.25 0.25
//! ```
//!
//! Each ROI line carries one lo/hi pair per channel; calibration and dxp
//! lines carry one value per channel.
//!
//! [`MultiXmap::write_current_config`]: crate::MultiXmap::write_current_config
//! [`MultiXmap::restore_rois`]: crate::MultiXmap::restore_rois
use crate::utils::format_g;
use crate::{Calibration, RoiFileError, RoiTable};
use std::path::Path;
use time::OffsetDateTime;

const CTIME_FORMAT: &str =
    "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]";

/// Current local time in C `ctime` layout.
pub fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    match time::format_description::parse(CTIME_FORMAT) {
        Ok(format) => now.format(&format).unwrap_or_else(|_| now.to_string()),
        Err(_) => now.to_string(),
    }
}

pub fn header_lines(prefix: &str, nmca: usize, filesaver: &str) -> Vec<String> {
    vec![
        format!("#Multi-Element xMAP Settings saved: {}", timestamp()),
        "[general]".to_string(),
        format!("prefix= {prefix}"),
        format!("nmcas = {nmca}"),
        format!("filesaver= {filesaver}"),
    ]
}

pub fn roi_line(index: usize, name: &str, bounds: &[(i32, i32)]) -> String {
    let values: Vec<String> = bounds
        .iter()
        .map(|(lo, hi)| format!("{lo} {hi}"))
        .collect();
    format!("ROI{:02} = {} | {}", index, name, values.join(" "))
}

pub fn calibration_lines(calibs: &[Calibration]) -> Vec<String> {
    let join = |f: fn(&Calibration) -> f64| -> String {
        calibs
            .iter()
            .map(|c| format_g(f(c), 7))
            .collect::<Vec<_>>()
            .join(" ")
    };
    vec![
        "[calibration]".to_string(),
        format!("OFFSET = {} ", join(|c| c.offset)),
        format!("SLOPE  = {} ", join(|c| c.slope)),
        format!("QUAD   = {} ", join(|c| c.quad)),
    ]
}

pub fn dxp_line(attr: &str, values: &[String]) -> String {
    let values: Vec<String> = values.iter().map(|v| v.replace(' ', "_")).collect();
    format!("{} = {}", attr, values.join(" "))
}

/// `[general]` section values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneralSettings {
    pub prefix: Option<String>,
    pub nmca: Option<usize>,
    pub filesaver: Option<String>,
}

/// One ROI line: the name and a lo/hi pair per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRoi {
    pub name: String,
    pub bounds: Vec<(i32, i32)>,
}

/// A parsed ROI file. Section names keep their case, keys are lowercased.
#[derive(Debug, Clone, Default)]
pub struct RoiFile {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl RoiFile {
    pub fn read(path: &Path) -> Result<Self, RoiFileError> {
        if !path.exists() {
            return Err(RoiFileError::BadFilePath(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, RoiFileError> {
        let mut file = RoiFile::default();
        for (n, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                file.sections.push((name.trim().to_string(), Vec::new()));
                continue;
            }
            let bad_line = || RoiFileError::BadLine {
                line: n + 1,
                content: raw.to_string(),
            };
            let split = line.find(['=', ':']).ok_or_else(bad_line)?;
            let (key, value) = (&line[..split], &line[split + 1..]);
            let (_, entries) = file.sections.last_mut().ok_or_else(bad_line)?;
            entries.push((key.trim().to_lowercase(), value.trim().to_string()));
        }
        Ok(file)
    }

    pub fn section(&self, name: &str) -> Option<&[(String, String)]> {
        self.sections
            .iter()
            .find(|(s, _)| s == name)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.section(section)?
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn general(&self) -> GeneralSettings {
        GeneralSettings {
            prefix: self.get("general", "prefix").map(str::to_string),
            nmca: self.get("general", "nmcas").and_then(|v| v.parse().ok()),
            filesaver: self.get("general", "filesaver").map(str::to_string),
        }
    }

    /// Every `ROInn` line of the `[rois]` section, in file order.
    pub fn saved_rois(&self) -> Result<Vec<SavedRoi>, RoiFileError> {
        let entries = self
            .section("rois")
            .ok_or(RoiFileError::MissingSection("rois"))?;
        let mut rois = Vec::new();
        for (key, value) in entries {
            if !key.starts_with("roi") {
                continue;
            }
            let (name, data) = value
                .split_once('|')
                .ok_or_else(|| RoiFileError::BadRoi(value.clone()))?;
            let lims = data
                .split_whitespace()
                .map(str::parse::<i32>)
                .collect::<Result<Vec<_>, _>>()?;
            if lims.len() < 2 {
                return Err(RoiFileError::BadRoi(value.clone()));
            }
            rois.push(SavedRoi {
                name: name.trim().to_string(),
                bounds: lims.chunks_exact(2).map(|p| (p[0], p[1])).collect(),
            });
        }
        Ok(rois)
    }

    /// ROI table of the first channel.
    pub fn rois(&self) -> Result<RoiTable, RoiFileError> {
        Ok(self
            .saved_rois()?
            .into_iter()
            .map(|roi| (roi.name, roi.bounds[0]))
            .collect())
    }

    pub fn calibrations(&self) -> Result<Vec<Calibration>, RoiFileError> {
        let values = |key: &'static str| -> Result<Vec<f64>, RoiFileError> {
            let line = self
                .get("calibration", key)
                .ok_or(RoiFileError::MissingSection("calibration"))?;
            Ok(line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()?)
        };
        let offsets = values("offset")?;
        let slopes = values("slope")?;
        let quads = values("quad")?;
        Ok(offsets
            .iter()
            .zip(&slopes)
            .zip(&quads)
            .map(|((&o, &s), &q)| Calibration::new(o, s, q))
            .collect())
    }

    /// `[dxp]` values per attribute, in file order. Keys are lowercased.
    pub fn dxp_settings(&self) -> Vec<(String, Vec<String>)> {
        self.section("dxp")
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| (k.clone(), v.split_whitespace().map(str::to_string).collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#Multi-Element xMAP Settings saved: Mon Oct 19 10:44:00 2026
[general]
prefix= 13SDD1:
nmcas = 2
filesaver= netCDF1:
[rois]
ROI00 = Ar Ka | 290 310 291 311
ROI01 = Fe Ka | 630 650 632 652
; disabled
[calibration]
OFFSET = 0 -0.5
SLOPE  = 10 10.02
QUAD   = 0 1e-07
[dxp]
PeakingTime = 0.25 0.25
PresetMode = No_preset No_preset
";

    #[test]
    fn test_parse_sample() {
        let file = RoiFile::parse(SAMPLE).unwrap();
        assert_eq!(
            file.general(),
            GeneralSettings {
                prefix: Some("13SDD1:".to_string()),
                nmca: Some(2),
                filesaver: Some("netCDF1:".to_string()),
            }
        );

        let saved = file.saved_rois().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].name, "Fe Ka");
        assert_eq!(saved[1].bounds, vec![(630, 650), (632, 652)]);

        let rois = file.rois().unwrap();
        assert_eq!(rois.get("Ar Ka"), Some((290, 310)));
        assert_eq!(rois.get("Fe Ka"), Some((630, 650)));

        let calibs = file.calibrations().unwrap();
        assert_eq!(
            calibs,
            vec![
                Calibration::new(0.0, 10.0, 0.0),
                Calibration::new(-0.5, 10.02, 1e-7)
            ]
        );

        let dxp = file.dxp_settings();
        assert_eq!(dxp[0].0, "peakingtime");
        assert_eq!(dxp[1].1, vec!["No_preset", "No_preset"]);
    }

    #[test]
    fn test_malformed_files() {
        assert!(matches!(
            RoiFile::parse("ROI00 = Fe | 1 2"),
            Err(RoiFileError::BadLine { line: 1, .. })
        ));
        assert!(matches!(
            RoiFile::parse("[rois]\nnot a pair"),
            Err(RoiFileError::BadLine { line: 2, .. })
        ));
        let no_rois = RoiFile::parse("[general]\nprefix = X:").unwrap();
        assert!(matches!(
            no_rois.rois(),
            Err(RoiFileError::MissingSection("rois"))
        ));
        let no_pipe = RoiFile::parse("[rois]\nROI00 = Fe 1 2").unwrap();
        assert!(matches!(no_pipe.rois(), Err(RoiFileError::BadRoi(_))));
        let one_bound = RoiFile::parse("[rois]\nROI00 = Fe | 1").unwrap();
        assert!(matches!(one_bound.rois(), Err(RoiFileError::BadRoi(_))));
        let bad_int = RoiFile::parse("[rois]\nROI00 = Fe | 1 x").unwrap();
        assert!(matches!(
            bad_int.rois(),
            Err(RoiFileError::ParseIntError(_))
        ));
    }

    #[test]
    fn test_writer_lines() {
        assert_eq!(
            roi_line(3, "Fe Ka", &[(630, 650), (632, 652)]),
            "ROI03 = Fe Ka | 630 650 632 652"
        );
        let lines = calibration_lines(&[
            Calibration::new(0.0, 10.0, 0.0),
            Calibration::new(-0.5, 10.02, 1e-7),
        ]);
        assert_eq!(lines[1], "OFFSET = 0 -0.5 ");
        assert_eq!(lines[2], "SLOPE  = 10 10.02 ");
        assert_eq!(lines[3], "QUAD   = 0 1e-07 ");
        assert_eq!(
            dxp_line("PresetMode", &["No preset".to_string(), "Real time".to_string()]),
            "PresetMode = No_preset Real_time"
        );
        let header = header_lines("13SDD1:", 4, "netCDF1:");
        assert!(header[0].starts_with("#Multi-Element xMAP Settings saved: "));
        assert_eq!(header[3], "nmcas = 4");
    }
}
