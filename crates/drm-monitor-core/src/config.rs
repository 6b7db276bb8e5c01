//! Runtime configuration for the monitor.
//!
//! There is no config file; the binary builds this from flags and
//! environment variables.

use std::path::PathBuf;

use crate::rearm::DisabledPolicy;

/// First DRM card node.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/dri/card0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// DRM device node to open.
    pub device: PathBuf,
    /// Handling of CRTCs found disabled while rearming after a completion.
    pub on_disabled: DisabledPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE_PATH),
            on_disabled: DisabledPolicy::default(),
        }
    }
}
