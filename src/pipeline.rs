/// Per-tick effect pipeline: one telemetry frame in, one set of effects out.

use crate::config::EffectsConfig;
use crate::rumble::{RumbleEffect, RumbleSynth};
use crate::telemetry::TelemetryFrame;
use crate::trigger::{TriggerEffect, TriggerSynth};

/// Everything a sink needs for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effects {
    pub left: TriggerEffect,
    pub right: TriggerEffect,
    pub rumble: RumbleEffect,
}

pub struct HapticPipeline {
    rumble: RumbleSynth,
    triggers: TriggerSynth,
}

impl HapticPipeline {
    pub fn new(config: EffectsConfig) -> Self {
        Self {
            rumble: RumbleSynth::new(config.clone()),
            triggers: TriggerSynth::new(config),
        }
    }

    pub fn tick(&mut self, frame: &TelemetryFrame) -> Effects {
        let rumble = self.rumble.update(frame);
        let (left, right) = self.triggers.update(frame);
        Effects { left, right, rumble }
    }

    /// Drop all decay/phase state, e.g. after telemetry went away.
    pub fn reset(&mut self) {
        self.rumble.reset();
        self.triggers.reset();
    }
}
