/// Adaptive-trigger synthesizer: one effect per trigger per tick, picked by priority.
///
/// The hardware can't blend resistance and vibration, so each trigger takes the
/// first matching branch:
///
///   Brake (L2)                     Throttle (R2)
///   1. below deadzone → Off        1. below deadzone → Off
///   2. impact         → 60 Hz      2. impact         → 50 Hz
///   3. ABS            → ABS freq   3. TC             → TC freq
///                                  4. oversteer      → 25 Hz
///   4. resistance ∝ pedal          5. resistance ∝ pedal

use crate::assist;
use crate::config::EffectsConfig;
use crate::telemetry::TelemetryFrame;

/// Number of positional zones along the trigger pull.
pub const ZONE_COUNT: u8 = 10;
/// Highest force level the firmware accepts.
pub const MAX_FORCE: u8 = 8;

/// What one trigger should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerEffect {
    #[default]
    Off,
    /// Static resistance from `start_zone` through full pull.
    Feedback { start_zone: u8, strength: u8 },
    /// Oscillating force from `start_zone` through full pull.
    Vibration {
        start_zone: u8,
        amplitude: u8,
        frequency_hz: u8,
    },
}

impl TriggerEffect {
    /// Feedback with start zone and strength clamped to hardware range.
    pub fn feedback(start_zone: u8, strength: u8) -> Self {
        TriggerEffect::Feedback {
            start_zone: start_zone.min(ZONE_COUNT - 1),
            strength: strength.min(MAX_FORCE),
        }
    }

    /// Vibration with start zone and amplitude clamped to hardware range.
    pub fn vibration(start_zone: u8, amplitude: u8, frequency_hz: u8) -> Self {
        TriggerEffect::Vibration {
            start_zone: start_zone.min(ZONE_COUNT - 1),
            amplitude: amplitude.min(MAX_FORCE),
            frequency_hz,
        }
    }

    /// `(start_zone, force)` for active effects; force is strength or amplitude.
    pub fn zone_and_force(&self) -> Option<(u8, u8)> {
        match *self {
            TriggerEffect::Off => None,
            TriggerEffect::Feedback { start_zone, strength } => Some((start_zone, strength)),
            TriggerEffect::Vibration { start_zone, amplitude, .. } => Some((start_zone, amplitude)),
        }
    }
}

const IMPACT_DECAY_PER_S: f64 = 5.0;
const IMPACT_VIBRATION_THRESHOLD: f64 = 0.2;
const BRAKE_IMPACT_FREQ_HZ: u8 = 60;
const THROTTLE_IMPACT_FREQ_HZ: u8 = 50;
const OVERSTEER_FREQ_HZ: u8 = 25;
/// Degrees over threshold at which the throttle oversteer buzz saturates.
const OVERSTEER_FULL_SCALE_DEG: f64 = 20.0;
const MIN_ASSIST_FREQ_HZ: u8 = 10;
const MAX_ASSIST_FREQ_HZ: u8 = 120;

/// Round and clamp to the [1, 8] force range used once past the deadzone.
fn force_level(v: f64) -> u8 {
    v.round().clamp(1.0, MAX_FORCE as f64) as u8
}

fn assist_freq(hz: u8) -> u8 {
    hz.clamp(MIN_ASSIST_FREQ_HZ, MAX_ASSIST_FREQ_HZ)
}

pub struct TriggerSynth {
    config: EffectsConfig,
    impact_decay: f64,
    left: TriggerEffect,
    right: TriggerEffect,
}

impl TriggerSynth {
    pub fn new(config: EffectsConfig) -> Self {
        Self {
            config,
            impact_decay: 0.0,
            left: TriggerEffect::Off,
            right: TriggerEffect::Off,
        }
    }

    /// Returns `(left, right)` = `(brake, throttle)`.
    pub fn update(&mut self, frame: &TelemetryFrame) -> (TriggerEffect, TriggerEffect) {
        self.impact_decay = if frame.impact_this_tick {
            let c = &self.config;
            (frame.last_impact_magnitude * c.impact_trigger_gain / c.impact_full_scale)
                .max(c.impact_min).min(c.impact_max)
        } else {
            (self.impact_decay - frame.delta_time * IMPACT_DECAY_PER_S).max(0.0)
        };

        self.left = self.brake(frame);
        self.right = self.throttle(frame);
        (self.left, self.right)
    }

    /// Most recent `(left, right)` pair.
    #[cfg(test)]
    pub fn output(&self) -> (TriggerEffect, TriggerEffect) {
        (self.left, self.right)
    }

    pub fn reset(&mut self) {
        self.impact_decay = 0.0;
        self.left = TriggerEffect::Off;
        self.right = TriggerEffect::Off;
    }

    fn brake(&self, frame: &TelemetryFrame) -> TriggerEffect {
        let c = &self.config;
        if frame.brake_pedal < c.brake_deadzone {
            return TriggerEffect::Off;
        }
        let zone = c.brake_start_zone;

        if self.impact_decay > IMPACT_VIBRATION_THRESHOLD {
            let amp = force_level(8.0 * self.impact_decay);
            return TriggerEffect::vibration(zone, amp, BRAKE_IMPACT_FREQ_HZ);
        }

        if let Some(severity) = assist::abs_severity(frame, c.abs_grip_threshold) {
            let amp = force_level(8.0 * severity * c.abs_trigger_gain);
            return TriggerEffect::vibration(zone, amp, assist_freq(c.abs_trigger_freq_hz));
        }

        TriggerEffect::feedback(zone, force_level(frame.brake_pedal * c.max_brake_strength))
    }

    fn throttle(&self, frame: &TelemetryFrame) -> TriggerEffect {
        let c = &self.config;
        if frame.throttle_pedal < c.throttle_deadzone {
            return TriggerEffect::Off;
        }
        let zone = c.throttle_start_zone;

        if self.impact_decay > IMPACT_VIBRATION_THRESHOLD {
            let amp = force_level(6.0 * self.impact_decay);
            return TriggerEffect::vibration(zone, amp, THROTTLE_IMPACT_FREQ_HZ);
        }

        if let Some(severity) = assist::tc_severity(frame, c.tc_grip_threshold) {
            let amp = force_level(8.0 * severity * c.tc_trigger_gain);
            return TriggerEffect::vibration(zone, amp, assist_freq(c.tc_trigger_freq_hz));
        }

        if !frame.is_stationary && frame.oversteer_angle > c.oversteer_threshold_deg {
            let severity = ((frame.oversteer_angle - c.oversteer_threshold_deg)
                / OVERSTEER_FULL_SCALE_DEG)
                .clamp(0.0, 1.0);
            let amp = force_level(6.0 * severity * c.oversteer_trigger_gain);
            return TriggerEffect::vibration(zone, amp, OVERSTEER_FREQ_HZ);
        }

        TriggerEffect::feedback(zone, force_level(frame.throttle_pedal * c.max_throttle_strength))
    }
}
