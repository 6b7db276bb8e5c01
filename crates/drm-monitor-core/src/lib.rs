//! Vertical-blank sequence monitor for DRM CRTCs.

pub mod config;
pub mod error;
pub mod monitor;
pub mod rearm;
pub mod renderer;
pub mod source;
pub mod state;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use monitor::Monitor;
