use crate::{Poller, XmapTimings};
use confique::Config;
use log::LevelFilter;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub xmap: XmapSettings,
    #[config(nested)]
    pub timings: TimingSettings,
    #[config(nested)]
    pub log_settings: LogSettings,
}

#[derive(Config, Debug, Clone)]
pub struct XmapSettings {
    /// PV prefix of the XMAP IOC.
    #[config(default = "13SDD1:")]
    pub prefix: String,
    /// File-saving plugin, relative to the prefix.
    #[config(default = "netCDF1:")]
    pub filesaver: String,
    /// Number of detector elements.
    #[config(default = 4)]
    pub nmca: usize,
    #[config(default = 32)]
    pub roi_slots: usize,
}

/// Poll intervals and deadlines of the mode transitions, in milliseconds.
#[derive(Config, Debug, Clone)]
pub struct TimingSettings {
    #[config(default = 50)]
    pub spectra_interval_ms: u64,
    #[config(default = 5000)]
    pub spectra_timeout_ms: u64,
    #[config(default = 100)]
    pub array_size_interval_ms: u64,
    #[config(default = 10000)]
    pub array_size_timeout_ms: u64,
    #[config(default = 250)]
    pub buffer_size_interval_ms: u64,
    #[config(default = 10000)]
    pub buffer_size_timeout_ms: u64,
    #[config(default = 100)]
    pub file_buffer_interval_ms: u64,
    #[config(default = 5000)]
    pub file_buffer_timeout_ms: u64,
    #[config(default = 100)]
    pub pixel_interval_ms: u64,
    #[config(default = 500)]
    pub apply_settle_ms: u64,
    #[config(default = 250)]
    pub buffer_settle_ms: u64,
    #[config(default = 500)]
    pub finish_settle_ms: u64,
    /// Multiplies every value above. Values below 1 speed up simulated runs.
    #[config(default = 1.0)]
    pub time_scale: f64,
}

#[derive(Config, Debug, Clone)]
pub struct LogSettings {
    /// One of off, error, warn, info, debug, trace.
    #[config(default = "info")]
    pub level: LogLevel,
    /// Also append log records to this file.
    pub log_file: Option<PathBuf>,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl From<&TimingSettings> for XmapTimings {
    fn from(t: &TimingSettings) -> Self {
        XmapTimings {
            spectra: Poller::from_millis(t.spectra_interval_ms, t.spectra_timeout_ms),
            array_size: Poller::from_millis(t.array_size_interval_ms, t.array_size_timeout_ms),
            buffer_size: Poller::from_millis(t.buffer_size_interval_ms, t.buffer_size_timeout_ms),
            file_buffer: Poller::from_millis(t.file_buffer_interval_ms, t.file_buffer_timeout_ms),
            pixel_interval: Duration::from_millis(t.pixel_interval_ms),
            apply_settle: Duration::from_millis(t.apply_settle_ms),
            buffer_settle: Duration::from_millis(t.buffer_settle_ms),
            finish_settle: Duration::from_millis(t.finish_settle_ms),
        }
        .scaled(t.time_scale.max(0.0))
    }
}
