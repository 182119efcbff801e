use crate::{DeviceError, FilePlugin, PvClient, PvDevice, PvError, PvValue};
use log::info;
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;

const CAMERA_ATTRS: &[&str] = &[
    "ColorMode",
    "DataType_RBV",
    "SizeX_RBV",
    "SizeY_RBV",
    "Acquire",
    "ImageMode",
    "NumImages",
    "AcquireTime",
    "ArrayCounter_RBV",
];

const IMAGE_ATTRS: &[&str] = &[
    "ArrayData",
    "UniqueId_RBV",
    "NDimensions_RBV",
    "ArraySize0_RBV",
    "ArraySize1_RBV",
    "ArraySize2_RBV",
    "ColorMode_RBV",
];

/// areaDetector camera driver (`cam1:`).
#[derive(Debug, Clone)]
pub struct AdCamera {
    device: PvDevice,
}

impl AdCamera {
    pub fn new(prefix: &str, client: Arc<dyn PvClient>) -> Self {
        Self {
            device: PvDevice::new(prefix, "", CAMERA_ATTRS, client),
        }
    }

    pub fn prefix(&self) -> &str {
        self.device.prefix()
    }

    pub fn get(&self, attr: &str) -> Result<PvValue, PvError> {
        self.device.get(attr)
    }

    pub fn get_string(&self, attr: &str) -> Result<String, PvError> {
        self.device.get_string(attr)
    }

    pub fn put(&self, attr: &str, value: impl Into<PvValue>) -> Result<(), PvError> {
        self.device.put(attr, value)
    }

    pub fn start(&self) -> Result<(), PvError> {
        self.device.put("Acquire", 1)
    }

    pub fn stop(&self) -> Result<(), PvError> {
        self.device.put("Acquire", 0)
    }
}

/// areaDetector image plugin (`image1:`).
#[derive(Debug, Clone)]
pub struct AdImagePlugin {
    device: PvDevice,
}

impl AdImagePlugin {
    pub fn new(prefix: &str, client: Arc<dyn PvClient>) -> Self {
        Self {
            device: PvDevice::new(prefix, "", IMAGE_ATTRS, client),
        }
    }

    pub fn prefix(&self) -> &str {
        self.device.prefix()
    }

    pub fn get(&self, attr: &str) -> Result<PvValue, PvError> {
        self.device.get(attr)
    }

    pub fn get_string(&self, attr: &str) -> Result<String, PvError> {
        self.device.get_string(attr)
    }

    /// Put `value` to `attr` unless its `_RBV` readback already shows it.
    /// Attributes without a registered readback are always written. Returns
    /// whether a put was issued.
    pub fn ensure_value(
        &self,
        attr: &str,
        value: impl Into<PvValue>,
        wait: bool,
    ) -> Result<bool, PvError> {
        let value = value.into();
        let rbv_attr = format!("{attr}_RBV");
        if self.device.has_attr(&rbv_attr)
            && self.device.get_string(&rbv_attr)? == value.to_string()
        {
            return Ok(false);
        }
        self.device.put_with(attr, value, wait)?;
        Ok(true)
    }

    fn size(&self, attr: &str) -> Result<usize, PvError> {
        Ok(self.device.get_i64(attr)?.max(0) as usize)
    }

    /// Image shape, slowest axis first.
    pub fn shape(&self) -> Result<Vec<usize>, PvError> {
        let ndim = self.device.get_i64("NDimensions_RBV")?;
        let size0 = self.size("ArraySize0_RBV")?;
        Ok(match ndim {
            ..=1 => vec![size0],
            2 => vec![self.size("ArraySize1_RBV")?, size0],
            _ => vec![
                self.size("ArraySize2_RBV")?,
                self.size("ArraySize1_RBV")?,
                size0,
            ],
        })
    }
}

/// Camera plus image plugin of one areaDetector IOC, with an optional file
/// plugin.
#[derive(Debug, Clone)]
pub struct AdImage {
    pub camera: AdCamera,
    pub image: AdImagePlugin,
    pub file_plugin: Option<FilePlugin>,
}

impl AdImage {
    /// Parts may be given with or without their trailing `:`.
    pub fn new(
        prefix: &str,
        cam: &str,
        image: &str,
        fileplugin: Option<&str>,
        client: Arc<dyn PvClient>,
    ) -> Self {
        let strip = |s: &str| s.strip_suffix(':').unwrap_or(s).to_string();
        let prefix = strip(prefix);
        let camera = AdCamera::new(&format!("{prefix}:{}:", strip(cam)), Arc::clone(&client));
        let image = AdImagePlugin::new(&format!("{prefix}:{}:", strip(image)), Arc::clone(&client));
        let file_plugin = fileplugin
            .map(|plugin| FilePlugin::new(&format!("{prefix}:"), &format!("{}:", strip(plugin)), client));
        Self {
            camera,
            image,
            file_plugin,
        }
    }

    /// Current image as an array of shape `[size1, size0]` or
    /// `[size2, size1, size0]`. Extra trailing data is dropped.
    pub fn get_image(&self) -> Result<ArrayD<f64>, DeviceError> {
        let mut geometry = String::new();
        for attr in ["ColorMode", "DataType_RBV", "SizeX_RBV", "SizeY_RBV"] {
            if let Ok(value) = self.camera.get_string(attr) {
                geometry.push_str(&format!("\n   {attr}: {value}"));
            }
        }
        for attr in [
            "NDimensions_RBV",
            "ArraySize0_RBV",
            "ArraySize1_RBV",
            "ArraySize2_RBV",
            "ColorMode_RBV",
        ] {
            if let Ok(value) = self.image.get_string(attr) {
                geometry.push_str(&format!("\n   {attr}: {value}"));
            }
        }
        info!("Get image from {}{}", self.image.prefix(), geometry);

        let shape = self.image.shape()?;
        let needed: usize = shape.iter().product();
        let mut data = self.image.device.get_array("ArrayData")?;
        if data.len() < needed {
            return Err(DeviceError::ImageShape {
                needed,
                available: data.len(),
            });
        }
        data.truncate(needed);
        ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|_| DeviceError::ImageShape {
            needed,
            available: needed,
        })
    }
}
