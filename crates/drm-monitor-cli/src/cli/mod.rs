//! CLI entry and wiring.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use drm_monitor_core::config::DEFAULT_DEVICE_PATH;
use drm_monitor_core::rearm::DisabledPolicy;
use drm_monitor_core::source::DrmDevice;
use drm_monitor_core::{Monitor, MonitorConfig};
use tracing::info;

use crate::logging;

#[derive(Parser, Debug)]
#[command(name = "drm_monitor")]
#[command(version)]
#[command(about = "Show live vblank sequence counters for every DRM CRTC")]
struct Cli {
    /// DRM device to monitor
    #[arg(short, long, value_name = "PATH", env = "DRM_MONITOR_DEVICE", default_value = DEFAULT_DEVICE_PATH)]
    device: PathBuf,

    /// What to do when a CRTC is found disabled while rearming
    #[arg(long, value_enum, env = "DRM_MONITOR_ON_DISABLED", default_value_t = OnDisabled::Tolerate)]
    on_disabled: OnDisabled,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, value_name = "PATH", env = "DRM_MONITOR_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnDisabled {
    /// Leave the CRTC unarmed and keep running
    Tolerate,
    /// Exit with an error
    Fatal,
}

impl From<OnDisabled> for DisabledPolicy {
    fn from(value: OnDisabled) -> Self {
        match value {
            OnDisabled::Tolerate => DisabledPolicy::Tolerate,
            OnDisabled::Fatal => DisabledPolicy::Fatal,
        }
    }
}

impl From<&Cli> for MonitorConfig {
    fn from(cli: &Cli) -> Self {
        MonitorConfig {
            device: cli.device.clone(),
            on_disabled: cli.on_disabled.into(),
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_file.as_deref())?;

    let config = MonitorConfig::from(&cli);
    let device = DrmDevice::open(&config.device)
        .with_context(|| format!("open {}", config.device.display()))?;
    info!(device = %config.device.display(), "opened DRM device");

    let mut monitor = Monitor::start(device, &config, io::stdout().lock())
        .with_context(|| format!("start monitoring {}", config.device.display()))?;

    let Err(err) = monitor.run();
    Err(err).context("monitor loop")
}
