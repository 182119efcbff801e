//! Device wrappers for an XIA XMAP multi-element X-ray spectrometer and
//! areaDetector image IOCs, driven through a pluggable process-variable
//! client.
//!
//! [`MultiXmap`] groups the per-element [`Dxp`] and [`Mca`] records with the
//! shared acquisition controls and a [`FilePlugin`]. ROI tables can be
//! propagated between elements through their energy calibrations and saved
//! to or restored from a [`RoiFile`].

mod ad_image;
mod config;
mod dxp;
mod error;
mod file_plugin;
mod mca;
mod mock;
mod poll;
mod pv;
mod roi;
pub mod roi_file;
mod sim;
pub mod utils;
mod xmap;

pub use ad_image::*;
pub use config::*;
pub use dxp::*;
pub use error::*;
pub use file_plugin::*;
pub use mca::*;
pub use mock::*;
pub use poll::*;
pub use pv::*;
pub use roi::*;
pub use roi_file::{GeneralSettings, RoiFile, SavedRoi};
pub use sim::*;
pub use xmap::*;
