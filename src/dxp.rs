use crate::{PvClient, PvDevice, PvError, PvValue};
use log::info;
use std::sync::Arc;

/// Amplifier and filter settings of one DXP channel, saved to and listed in
/// the `[dxp]` section of the ROI file.
pub const DXP_ATTRS: &[&str] = &[
    "PreampGain",
    "MaxEnergy",
    "ADCPercentRule",
    "BaselineCutPercent",
    "BaselineThreshold",
    "BaselineFilterLength",
    "BaselineCutEnable",
    "InputCountRate",
    "OutputCountRate",
    "GapTime",
    "PeakingTime",
    "EnergyThreshold",
    "MaxWidth",
    "PresetMode",
    "TriggerPeakingTime",
    "TriggerGapTime",
    "TriggerThreshold",
];

/// Digital signal processor settings for one analyzer channel, at
/// `{prefix}dxp{channel}:`.
#[derive(Debug, Clone)]
pub struct Dxp {
    device: PvDevice,
    channel: usize,
}

impl Dxp {
    pub fn new(prefix: &str, channel: usize, client: Arc<dyn PvClient>) -> Self {
        let device = PvDevice::new(&format!("{prefix}dxp{channel}"), ":", DXP_ATTRS, client);
        device.poll();
        Self { device, channel }
    }

    pub fn channel(&self) -> usize {
        self.channel
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

    pub fn current_pixel(&self) -> Result<i64, PvError> {
        self.device.get_i64("CurrentPixel")
    }

    /// String readbacks of every setting in [`DXP_ATTRS`] order.
    pub fn settings(&self) -> Result<Vec<(&'static str, String)>, PvError> {
        DXP_ATTRS
            .iter()
            .map(|&attr| Ok((attr, self.get_string(attr)?)))
            .collect()
    }

    /// Log every readable setting; unreadable ones are skipped.
    pub fn log_settings(&self) {
        let mut param_log = String::new();
        for &attr in DXP_ATTRS {
            if let Ok(value) = self.get_string(attr) {
                param_log.push_str(&format!("{}: {}\n", attr, value));
            }
        }
        if param_log.ends_with('\n') {
            param_log.pop();
        }
        info!("DXP channel {} settings:\n{}", self.channel, param_log);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockPvClient;

    #[test]
    fn test_settings_order() {
        let client = Arc::new(MockPvClient::new());
        for (i, attr) in DXP_ATTRS.iter().enumerate() {
            client.set(&format!("XMAP:dxp2:{attr}"), i as i64);
        }
        let dxp = Dxp::new("XMAP:", 2, client.clone());
        assert_eq!(dxp.prefix(), "XMAP:dxp2");

        let settings = dxp.settings().unwrap();
        assert_eq!(settings.len(), DXP_ATTRS.len());
        assert_eq!(settings[0], ("PreampGain", "0".to_string()));
        assert_eq!(settings[16], ("TriggerThreshold", "16".to_string()));

        dxp.put("PeakingTime", 0.5).unwrap();
        assert_eq!(client.value("XMAP:dxp2:PeakingTime"), Some(PvValue::Float(0.5)));
    }

    #[test]
    fn test_missing_setting_is_an_error() {
        let client = Arc::new(MockPvClient::new());
        let dxp = Dxp::new("XMAP:", 1, client);
        assert!(dxp.settings().is_err());
        assert!(dxp.current_pixel().is_err());
    }
}
