/// Output sinks: where the synthesized effects go each tick.
///
/// Two transports implement [`OutputSink`]:
/// - [`crate::hid::HidSink`]: raw output reports straight to a DualSense
/// - [`crate::text_sink::TextFileSink`]: a small text file polled by an external trigger tool
///
/// Nothing on this surface returns an error. Transport failures are logged and
/// turn into "not connected"; the tick loop retries on its own schedule.

use crate::config::{OutputConfig, SinkKind};
use crate::hid::HidSink;
use crate::rumble::RumbleEffect;
use crate::text_sink::TextFileSink;
use crate::trigger::TriggerEffect;
use std::time::Duration;

pub trait OutputSink {
    /// Try to reach the transport. Returns true if connected afterwards.
    /// Calling it while already connected is a no-op.
    fn connect(&mut self) -> bool;

    /// Deliver one tick's effects. Best effort.
    fn send(&mut self, left: &TriggerEffect, right: &TriggerEffect, rumble: RumbleEffect);

    /// Release both triggers and stop the motors.
    fn send_safe_state(&mut self);

    fn is_connected(&self) -> bool;
}

/// Transport-level failures. Only ever logged; see module docs.
#[derive(Debug)]
pub enum SinkError {
    HidInit(hidapi::HidError),
    NoController,
    Open(hidapi::HidError),
    Write(hidapi::HidError),
    Io(std::io::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::HidInit(e) => write!(f, "HID API unavailable: {e}"),
            SinkError::NoController => f.write_str("no DualSense controller found"),
            SinkError::Open(e) => write!(f, "failed to open controller: {e}"),
            SinkError::Write(e) => write!(f, "HID write failed: {e}"),
            SinkError::Io(e) => write!(f, "file I/O failed: {e}"),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

/// Build the sink selected in the config. Only HID API initialisation can fail here.
pub fn open(cfg: &OutputConfig) -> Result<Box<dyn OutputSink>, SinkError> {
    match cfg.sink {
        SinkKind::Hid => {
            let sink = HidSink::new(Duration::from_millis(cfg.hotplug_poll_ms))?;
            log::info!("Output: DualSense HID (hot-plug scan every {}ms)", cfg.hotplug_poll_ms);
            Ok(Box::new(sink))
        }
        SinkKind::TextFile => {
            log::info!("Output: text file {}", cfg.text_file_path);
            Ok(Box::new(TextFileSink::new(&cfg.text_file_path)))
        }
    }
}
