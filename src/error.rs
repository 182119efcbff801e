use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PvError {
    #[error("PV {0} is not connected")]
    NotConnected(String),
    #[error("PV {pv} holds {found}, expected {expected}")]
    TypeMismatch {
        pv: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Put to PV {pv} was rejected: {reason}")]
    PutRejected { pv: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RoiFileError {
    #[error("Failed to load ROI file as {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("ROI file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("ROI file has no [{0}] section")]
    MissingSection(&'static str),
    #[error("ROI file line {line} is malformed: {content}")]
    BadLine { line: usize, content: String },
    #[error("ROI definition {0:?} does not contain a lo/hi pair")]
    BadRoi(String),
    #[error("ROI file failed to parse an integer: {0}")]
    ParseIntError(#[from] std::num::ParseIntError),
    #[error("ROI file failed to parse a float: {0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("File template {0:?} ends inside a conversion")]
    Truncated(String),
    #[error("File template {template:?} uses unsupported conversion '%{conversion}'")]
    Unsupported { template: String, conversion: char },
    #[error("File template {template:?} expects {expected} arguments, got {given}")]
    ArgumentCount {
        template: String,
        expected: usize,
        given: usize,
    },
    #[error("File template {0:?} applies %d to a non-integer argument")]
    NotAnInteger(String),
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device failed due to PV error: {0}")]
    Pv(#[from] PvError),
    #[error("Device failed due to ROI file error: {0}")]
    RoiFile(#[from] RoiFileError),
    #[error("Device failed due to file template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Device failed due to IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{given} ROIs do not fit into {slots} ROI slots")]
    TooManyRois { given: usize, slots: usize },
    #[error("MCA channel {channel} has no ROI named {name:?}")]
    MissingRoi { channel: usize, name: String },
    #[error("Calibration with slope {0} cannot be used to rescale ROIs")]
    DegenerateCalibration(f64),
    #[error("Image data holds {available} values, geometry needs {needed}")]
    ImageShape { needed: usize, available: usize },
    #[error("Multi-element device has no MCA channel at index {0}")]
    NoChannel(usize),
}
