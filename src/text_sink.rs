/// Text-file sink for external trigger tools that poll a plain-text command file.
///
/// Format (two modes only, vibration is sent as resistance):
///   LeftTrigger=<Normal|Resistance>
///   ForceLeftTrigger=(<start zone>)(<force>)     ← only when not Normal
///   RightTrigger=<Normal|Resistance>
///   ForceRightTrigger=(<start zone>)(<force>)    ← only when not Normal
///
/// Every write goes to `<path>.tmp` first and is then renamed over the target,
/// so a reader never sees a half-written file.

use crate::rumble::RumbleEffect;
use crate::sink::{OutputSink, SinkError};
use crate::trigger::TriggerEffect;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub struct TextFileSink {
    path: PathBuf,
    temp_path: PathBuf,
    path_valid: bool,
}

impl TextFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut temp = path.clone().into_os_string();
        temp.push(".tmp");
        let mut sink = Self {
            path,
            temp_path: PathBuf::from(temp),
            path_valid: false,
        };
        sink.validate_path();
        sink
    }

    /// Make sure the parent directory exists.
    fn validate_path(&mut self) -> bool {
        let result = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
            _ => Ok(()),
        };
        self.path_valid = match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Trigger file path {} unusable: {e}", self.path.display());
                false
            }
        };
        self.path_valid
    }

    fn write_atomic(&self, content: &str) -> Result<(), SinkError> {
        std::fs::write(&self.temp_path, content)?;
        std::fs::rename(&self.temp_path, &self.path)?;
        Ok(())
    }

    fn write(&mut self, content: &str) {
        if !self.path_valid {
            return;
        }
        if let Err(e) = self.write_atomic(content) {
            log::warn!("Trigger file write to {} failed: {e}", self.path.display());
            let _ = std::fs::remove_file(&self.temp_path);
            self.path_valid = false;
        }
    }
}

fn mode_name(effect: &TriggerEffect) -> &'static str {
    match effect {
        TriggerEffect::Off => "Normal",
        TriggerEffect::Feedback { .. } | TriggerEffect::Vibration { .. } => "Resistance",
    }
}

/// Render both triggers in the text command format.
pub fn render(left: &TriggerEffect, right: &TriggerEffect) -> String {
    let mut out = String::with_capacity(128);
    for (side, effect) in [("Left", left), ("Right", right)] {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(out, "{side}Trigger={}", mode_name(effect));
        if let Some((zone, force)) = effect.zone_and_force() {
            let _ = write!(out, "\nForce{side}Trigger=({zone})({force})");
        }
    }
    out
}

impl OutputSink for TextFileSink {
    fn connect(&mut self) -> bool {
        self.path_valid || self.validate_path()
    }

    fn send(&mut self, left: &TriggerEffect, right: &TriggerEffect, _rumble: RumbleEffect) {
        let content = render(left, right);
        self.write(&content);
    }

    fn send_safe_state(&mut self) {
        let content = render(&TriggerEffect::Off, &TriggerEffect::Off);
        self.write(&content);
    }

    fn is_connected(&self) -> bool {
        self.path_valid
    }
}
