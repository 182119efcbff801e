use crate::utils::{format_template, TemplateArg};
use crate::{DeviceError, PvClient, PvDevice, PvError, PvValue};
use std::sync::Arc;

pub const FILE_PLUGIN_ATTRS: &[&str] = &[
    "FilePath",
    "FileTemplate",
    "FileWriteMode",
    "FileName",
    "FileNumber",
    "FullFileName_RBV",
    "Capture",
    "NumCapture",
    "WriteFile_RBV",
    "AutoSave",
    "EnableCallbacks",
    "ArraySize0_RBV",
    "FileTemplate_RBV",
    "FileName_RBV",
    "AutoIncrement",
];

/// areaDetector file write modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileWriteMode {
    Single = 0,
    Capture = 1,
    Stream = 2,
}

/// A file-saving plugin (netCDF, HDF5, TIFF, ...) at `{prefix}{plugin}`.
#[derive(Debug, Clone)]
pub struct FilePlugin {
    device: PvDevice,
}

impl FilePlugin {
    /// `plugin` is appended to `prefix` as is, so it carries its own
    /// trailing delimiter (e.g. `netCDF1:`).
    pub fn new(prefix: &str, plugin: &str, client: Arc<dyn PvClient>) -> Self {
        let device = PvDevice::new(&format!("{prefix}{plugin}"), "", FILE_PLUGIN_ATTRS, client);
        Self { device }
    }

    pub fn prefix(&self) -> &str {
        self.device.prefix()
    }

    pub fn get(&self, attr: &str) -> Result<PvValue, PvError> {
        self.device.get(attr)
    }

    pub fn put(&self, attr: &str, value: impl Into<PvValue>) -> Result<(), PvError> {
        self.device.put(attr, value)
    }

    pub fn set_path(&self, path: &str) -> Result<(), PvError> {
        self.put("FilePath", path)
    }

    pub fn set_template(&self, template: &str) -> Result<(), PvError> {
        self.put("FileTemplate", template)
    }

    pub fn set_write_mode(&self, mode: FileWriteMode) -> Result<(), PvError> {
        self.put("FileWriteMode", mode as i64)
    }

    pub fn set_name(&self, name: &str) -> Result<(), PvError> {
        self.put("FileName", name)
    }

    /// `None` lets the plugin auto-increment; `Some(n)` pins the number.
    pub fn set_file_number(&self, number: Option<i64>) -> Result<(), PvError> {
        match number {
            None => self.put("AutoIncrement", 1),
            Some(n) => {
                self.put("AutoIncrement", 0)?;
                self.put("FileNumber", n)
            }
        }
    }

    pub fn next_file_number(&self) -> Result<i64, PvError> {
        let next = self.device.get_i64("FileNumber")? + 1;
        self.set_file_number(Some(next))?;
        Ok(next)
    }

    pub fn last_file_name(&self) -> Result<String, PvError> {
        self.device.get_string("FullFileName_RBV")
    }

    pub fn capture_on(&self) -> Result<(), PvError> {
        self.put("Capture", 1)
    }

    pub fn capture_off(&self) -> Result<(), PvError> {
        self.put("Capture", 0)
    }

    pub fn set_num_capture(&self, n: i64) -> Result<(), PvError> {
        self.put("NumCapture", n)
    }

    pub fn write_complete(&self) -> Result<bool, PvError> {
        Ok(self.device.get_i64("WriteFile_RBV")? == 0)
    }

    pub fn array_size(&self) -> Result<i64, PvError> {
        self.device.get_i64("ArraySize0_RBV")
    }

    pub fn template(&self) -> Result<String, PvError> {
        self.device.get_string("FileTemplate_RBV")
    }

    pub fn name(&self) -> Result<String, PvError> {
        self.device.get_string("FileName_RBV")
    }

    pub fn number(&self) -> Result<i64, PvError> {
        self.device.get_i64("FileNumber_RBV")
    }

    pub fn path(&self) -> Result<String, PvError> {
        self.device.get_string("FilePath_RBV")
    }

    /// Full file name the plugin would write for file number `index`.
    pub fn file_name_by_index(&self, index: i64) -> Result<String, DeviceError> {
        let template = self.template()?;
        let path = self.path()?;
        let name = self.name()?;
        Ok(format_template(
            &template,
            &[
                TemplateArg::Str(&path),
                TemplateArg::Str(&name),
                TemplateArg::Int(index),
            ],
        )?)
    }
}
