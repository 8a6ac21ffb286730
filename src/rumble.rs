/// Rumble synthesizer: seven independent cues mixed into one two-motor effect.
///
///   Road     → fine texture from average suspension velocity, ramps in with speed
///   Curb     → sharp kick when suspension velocity spikes above its rolling baseline
///   ABS      → 2-on/1-off pulse while braking past the front grip limit
///   TC       → 2-on/2-off pulse while accelerating past the rear grip limit
///   Engine   → low drone, square of normalized RPM
///   Impact   → heavy hit that fades out linearly
///   Oversteer→ steady shake proportional to slide angle
///
/// Cues are summed with per-cue gains, scaled by the master gain, soft-clipped
/// and clamped to [0, 1] per motor.
///
/// The strong motor is the left (low-frequency) one, the weak motor the right.

use crate::assist;
use crate::config::EffectsConfig;
use crate::telemetry::TelemetryFrame;
use std::ops::{Add, Mul};

/// Two normalized motor intensities. Values may exceed [0, 1] while cues are
/// being mixed; [`RumbleEffect::clamped`] brings them back into hardware range.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RumbleEffect {
    pub strong: f32,
    pub weak: f32,
}

impl RumbleEffect {
    pub const NONE: Self = Self { strong: 0.0, weak: 0.0 };

    pub fn new(strong: f32, weak: f32) -> Self {
        Self { strong, weak }
    }

    pub fn clamped(self) -> Self {
        Self {
            strong: self.strong.clamp(0.0, 1.0),
            weak: self.weak.clamp(0.0, 1.0),
        }
    }

    /// Motor bytes as the report expects them: `(strong, weak)`, 0-255.
    pub fn to_bytes(self) -> (u8, u8) {
        (motor_byte(self.strong), motor_byte(self.weak))
    }
}

fn motor_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl Add for RumbleEffect {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            strong: self.strong + rhs.strong,
            weak: self.weak + rhs.weak,
        }
    }
}

impl Mul<f32> for RumbleEffect {
    type Output = Self;
    fn mul(self, scale: f32) -> Self {
        Self {
            strong: self.strong * scale,
            weak: self.weak * scale,
        }
    }
}

/// Identity up to the knee, then a tanh shoulder that approaches 1.0.
pub fn soft_clip(x: f32) -> f32 {
    const KNEE: f32 = 0.7;
    const HEADROOM: f32 = 1.0 - KNEE;
    if x <= 0.0 {
        0.0
    } else if x <= KNEE {
        x
    } else {
        KNEE + HEADROOM * ((x - KNEE) / HEADROOM).tanh()
    }
}

/// Per-tick decay rates, in units per second.
const IMPACT_DECAY_PER_S: f64 = 4.0;
const CURB_DECAY_PER_S: f64 = 6.5;

/// EMA weight for the slow suspension-velocity baseline.
const CURB_BASELINE_ALPHA: f64 = 0.005;
/// A curb strike is a spike this many times above the baseline.
const CURB_SPIKE_RATIO: f64 = 2.5;
const CURB_MIN_BASELINE: f64 = 0.01;
/// Curb decay below this reports nothing.
const CURB_EPSILON: f64 = 0.02;
/// Curb decay above this suppresses road texture.
const CURB_ACTIVE: f64 = 0.05;

const ROAD_RAMP_START_KPH: f64 = 20.0;
const ROAD_RAMP_FULL_KPH: f64 = 80.0;
const ENGINE_MIN_RPM: f64 = 500.0;
/// Degrees over threshold at which the oversteer cue saturates.
const OVERSTEER_FULL_SCALE_DEG: f64 = 30.0;

pub struct RumbleSynth {
    config: EffectsConfig,
    impact_decay: f64,
    abs_phase: u32,
    tc_phase: u32,
    susp_baseline: Option<f64>,
    curb_decay: f64,
    /// Share of the curb hit sent to the strong (left) motor.
    curb_left_bias: f32,
    output: RumbleEffect,
}

impl RumbleSynth {
    pub fn new(config: EffectsConfig) -> Self {
        Self {
            config,
            impact_decay: 0.0,
            abs_phase: 0,
            tc_phase: 0,
            susp_baseline: None,
            curb_decay: 0.0,
            curb_left_bias: 0.0,
            output: RumbleEffect::NONE,
        }
    }

    /// Most recent mixed output.
    #[cfg(test)]
    pub fn output(&self) -> RumbleEffect {
        self.output
    }

    pub fn update(&mut self, frame: &TelemetryFrame) -> RumbleEffect {
        self.update_curb_baseline(frame);

        let curb = self.curb(frame);
        let curb_active = self.curb_decay > CURB_ACTIVE;
        let road = road_surface(frame, curb_active);
        let abs = self.abs(frame);
        let tc = self.tc(frame);
        let engine = engine(frame);
        let impact = self.impact(frame);
        let oversteer = oversteer(frame, self.config.oversteer_threshold_deg);

        let c = &self.config;
        let mixed = (road * c.road_rumble_gain
            + curb * c.curb_rumble_gain
            + abs * c.abs_rumble_gain
            + tc * c.tc_rumble_gain
            + engine * c.engine_rumble_gain
            + impact * c.impact_rumble_gain
            + oversteer * c.oversteer_rumble_gain)
            * c.master_rumble_gain;

        self.output = RumbleEffect::new(soft_clip(mixed.strong), soft_clip(mixed.weak)).clamped();
        self.output
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    fn update_curb_baseline(&mut self, frame: &TelemetryFrame) {
        let avg = frame.avg_abs_susp_velocity();
        self.susp_baseline = Some(match self.susp_baseline {
            None => avg,
            Some(prev) => prev * (1.0 - CURB_BASELINE_ALPHA) + avg * CURB_BASELINE_ALPHA,
        });
    }

    fn curb(&mut self, frame: &TelemetryFrame) -> RumbleEffect {
        if frame.is_stationary {
            self.curb_decay = 0.0;
            return RumbleEffect::NONE;
        }

        let threshold = self.config.curb_susp_velocity_threshold;
        let peak = frame.max_susp_velocity;
        let baseline = self.susp_baseline.unwrap_or(0.0).max(CURB_MIN_BASELINE);

        if peak / baseline > CURB_SPIKE_RATIO && peak > threshold {
            let hit = ((peak - threshold) * self.config.curb_rumble_scale).clamp(0.4, 1.0);
            self.curb_decay = self.curb_decay.max(hit);
            self.curb_left_bias = if frame.max_left_susp_velocity > frame.max_right_susp_velocity {
                1.0
            } else {
                0.3
            };
        }

        self.curb_decay = (self.curb_decay - frame.delta_time * CURB_DECAY_PER_S).max(0.0);
        if self.curb_decay <= CURB_EPSILON {
            return RumbleEffect::NONE;
        }

        let intensity = self.curb_decay as f32;
        let right_bias = if self.curb_left_bias < 0.5 { 1.0 } else { 0.3 };
        RumbleEffect::new(intensity * self.curb_left_bias, intensity * 0.3 * right_bias)
    }

    fn abs(&mut self, frame: &TelemetryFrame) -> RumbleEffect {
        let Some(severity) = assist::abs_severity(frame, self.config.abs_grip_threshold) else {
            self.abs_phase = 0;
            return RumbleEffect::NONE;
        };
        self.abs_phase = self.abs_phase.wrapping_add(1);
        if self.abs_phase % 3 == 2 {
            return RumbleEffect::NONE;
        }
        let amp = (severity * 0.8).clamp(0.15, 0.8) as f32;
        RumbleEffect::new(amp * 0.3, amp)
    }

    fn tc(&mut self, frame: &TelemetryFrame) -> RumbleEffect {
        let Some(severity) = assist::tc_severity(frame, self.config.tc_grip_threshold) else {
            self.tc_phase = 0;
            return RumbleEffect::NONE;
        };
        self.tc_phase = self.tc_phase.wrapping_add(1);
        if self.tc_phase % 4 >= 2 {
            return RumbleEffect::NONE;
        }
        let amp = (severity * 0.7).clamp(0.15, 0.7) as f32;
        RumbleEffect::new(amp * 0.4, amp * 0.5)
    }

    fn impact(&mut self, frame: &TelemetryFrame) -> RumbleEffect {
        self.impact_decay = if frame.impact_this_tick {
            let c = &self.config;
            (frame.last_impact_magnitude / c.impact_full_scale)
                .max(c.impact_min)
                .min(c.impact_max)
        } else {
            (self.impact_decay - frame.delta_time * IMPACT_DECAY_PER_S).max(0.0)
        };
        if self.impact_decay <= 0.0 {
            return RumbleEffect::NONE;
        }
        let d = self.impact_decay as f32;
        RumbleEffect::new(d, d * 0.5)
    }
}

fn road_surface(frame: &TelemetryFrame, curb_active: bool) -> RumbleEffect {
    if frame.is_stationary {
        return RumbleEffect::NONE;
    }
    let ramp = ((frame.speed_kph - ROAD_RAMP_START_KPH) / (ROAD_RAMP_FULL_KPH - ROAD_RAMP_START_KPH))
        .clamp(0.0, 1.0);
    let mut intensity = (frame.avg_abs_susp_velocity() * 0.15).clamp(0.0, 0.3) * ramp;
    if curb_active {
        // Keep the curb kick readable.
        intensity *= 0.2;
    }
    let intensity = intensity as f32;
    RumbleEffect::new(intensity * 0.1, intensity)
}

fn engine(frame: &TelemetryFrame) -> RumbleEffect {
    if frame.engine_rpm < ENGINE_MIN_RPM {
        return RumbleEffect::NONE;
    }
    let n = frame.engine_rpm_normalized as f32;
    let intensity = n * n;
    RumbleEffect::new(intensity * 0.2, intensity * 0.08)
}

fn oversteer(frame: &TelemetryFrame, threshold_deg: f64) -> RumbleEffect {
    if frame.is_stationary || frame.oversteer_angle < threshold_deg {
        return RumbleEffect::NONE;
    }
    let severity =
        ((frame.oversteer_angle - threshold_deg) / OVERSTEER_FULL_SCALE_DEG).clamp(0.0, 1.0) as f32;
    RumbleEffect::new(severity * 0.7, severity * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::tests::{cruising, frame};
    use crate::telemetry::TelemetrySample;

    fn synth() -> RumbleSynth {
        RumbleSynth::new(EffectsConfig::default())
    }

    /// Default config minus the engine drone, so single cues can be observed.
    fn quiet_synth() -> RumbleSynth {
        RumbleSynth::new(EffectsConfig { engine_rumble_gain: 0.0, ..Default::default() })
    }

    fn in_range(r: RumbleEffect) -> bool {
        (0.0..=1.0).contains(&r.strong) && (0.0..=1.0).contains(&r.weak)
    }

    fn with_susp(mut s: TelemetrySample, fl: f64, fr: f64, rl: f64, rr: f64) -> TelemetrySample {
        s.wheel_fl.suspension_velocity = fl;
        s.wheel_fr.suspension_velocity = fr;
        s.wheel_rl.suspension_velocity = rl;
        s.wheel_rr.suspension_velocity = rr;
        s
    }

    #[test]
    fn soft_clip_shape() {
        assert_eq!(soft_clip(-0.5), 0.0);
        assert_eq!(soft_clip(0.0), 0.0);
        assert_eq!(soft_clip(0.35), 0.35);
        assert_eq!(soft_clip(0.7), 0.7);

        let expected = 0.7 + 0.3 * ((0.9f32 - 0.7) / 0.3).tanh();
        assert!((soft_clip(0.9) - expected).abs() < 1e-6);
        assert!((soft_clip(0.9) - 0.874_835).abs() < 1e-5);

        assert!(soft_clip(1.5) < 1.0);
        assert!((soft_clip(1.5) - 0.9971).abs() < 1e-4);
        assert!(soft_clip(5.0) <= 1.0);
        assert!(soft_clip(1.2) > soft_clip(1.0));
    }

    #[test]
    fn motor_bytes_round_and_clamp() {
        assert_eq!(RumbleEffect::new(1.0, 0.0).to_bytes(), (255, 0));
        assert_eq!(RumbleEffect::new(0.5, 0.2).to_bytes(), (128, 51));
        assert_eq!(RumbleEffect::new(3.0, -1.0).to_bytes(), (255, 0));
    }

    #[test]
    fn effect_arithmetic() {
        let a = RumbleEffect::new(0.2, 0.4);
        let b = RumbleEffect::new(0.1, 0.1);
        let sum = (a + b) * 2.0;
        assert!((sum.strong - 0.6).abs() < 1e-6);
        assert!((sum.weak - 1.0).abs() < 1e-6);
        assert_eq!(RumbleEffect::new(1.5, -0.2).clamped(), RumbleEffect::new(1.0, 0.0));
    }

    #[test]
    fn stationary_frame_is_silent() {
        let mut rs = synth();
        for _ in 0..10 {
            assert_eq!(rs.update(&frame(&cruising(0.0))), RumbleEffect::NONE);
        }
    }

    #[test]
    fn road_texture_ramps_with_speed() {
        let bumpy = |kph: f64| with_susp(cruising(kph / 3.6), 1.0, -1.0, 1.0, -1.0);

        let slow = quiet_synth().update(&frame(&bumpy(15.0)));
        assert_eq!(slow, RumbleEffect::NONE);

        let mid = quiet_synth().update(&frame(&bumpy(50.0)));
        let fast = quiet_synth().update(&frame(&bumpy(120.0)));
        assert!(mid.weak > 0.0);
        assert!(fast.weak > mid.weak);
        // avg 1.0 * 0.15 at full ramp
        assert!((fast.weak - 0.15).abs() < 1e-6);
        assert!(fast.weak > fast.strong);
    }

    #[test]
    fn curb_strike_kicks_then_decays_to_zero() {
        let mut rs = quiet_synth();
        let smooth = frame(&with_susp(cruising(20.0), 0.02, 0.02, 0.02, 0.02));
        for _ in 0..50 {
            rs.update(&smooth);
        }
        let base = rs.output();

        // Left-side spike well above baseline and threshold
        let strike = frame(&with_susp(cruising(20.0), 0.8, 0.05, 0.6, 0.05));
        let hit = rs.update(&strike);
        assert!(hit.strong > base.strong + 0.3);
        assert!(rs.curb_left_bias > 0.5);

        let mut prev = rs.curb_decay;
        let mut ticks = 0;
        while rs.curb_decay > 0.0 {
            rs.update(&smooth);
            assert!(rs.curb_decay <= prev);
            prev = rs.curb_decay;
            ticks += 1;
            assert!(ticks < 100, "curb decay never reached zero");
        }
        assert_eq!(rs.curb_decay, 0.0);
    }

    #[test]
    fn curb_ignores_spikes_below_absolute_threshold() {
        let mut rs = quiet_synth();
        let calm = frame(&with_susp(cruising(20.0), 0.001, 0.001, 0.001, 0.001));
        rs.update(&calm);
        // 20x baseline but still under the 0.25 m/s threshold
        let twitch = frame(&with_susp(cruising(20.0), 0.2, 0.0, 0.0, 0.0));
        rs.update(&twitch);
        assert_eq!(rs.curb_decay, 0.0);
    }

    #[test]
    fn curb_cleared_when_stationary() {
        let mut rs = quiet_synth();
        rs.update(&frame(&with_susp(cruising(20.0), 0.01, 0.01, 0.01, 0.01)));
        rs.update(&frame(&with_susp(cruising(20.0), 0.9, 0.9, 0.9, 0.9)));
        assert!(rs.curb_decay > 0.0);
        rs.update(&frame(&cruising(0.0)));
        assert_eq!(rs.curb_decay, 0.0);
    }

    #[test]
    fn abs_pulses_two_on_one_off() {
        let mut rs = quiet_synth();
        let mut s = cruising(30.0);
        s.brake = 0.5;
        s.wheel_fl.grip_fraction = 0.7;
        s.wheel_fr.grip_fraction = 0.7;
        let f = frame(&s);

        let pattern: Vec<bool> = (0..6).map(|_| rs.update(&f).weak > 0.0).collect();
        assert_eq!(pattern, vec![true, false, true, true, false, true]);

        // Releasing the brake resets the phase
        rs.update(&frame(&cruising(30.0)));
        assert_eq!(rs.abs_phase, 0);
    }

    #[test]
    fn abs_amplitude_between_floor_and_ceiling() {
        let mut rs = quiet_synth();
        let mut s = cruising(30.0);
        s.brake = 0.5;
        s.wheel_fl.grip_fraction = 0.7;
        s.wheel_fr.grip_fraction = 0.7;
        let r = rs.update(&frame(&s));
        assert!(r.weak > 0.15 && r.weak < 0.8);
    }

    #[test]
    fn tc_pulses_two_on_two_off() {
        let mut rs = quiet_synth();
        let mut s = cruising(30.0);
        s.throttle = 0.9;
        s.wheel_rl.grip_fraction = 0.3;
        s.wheel_rr.grip_fraction = 0.3;
        let f = frame(&s);

        let pattern: Vec<bool> = (0..8).map(|_| rs.update(&f).weak > 0.0).collect();
        assert_eq!(pattern, vec![true, false, false, true, true, false, false, true]);
    }

    #[test]
    fn engine_drone_favors_high_rpm() {
        let rpm = |rpm: f64| {
            let mut s = cruising(0.0);
            s.engine_rpm = rpm;
            s.engine_max_rpm = 8000.0;
            synth().update(&frame(&s))
        };
        assert_eq!(rpm(400.0), RumbleEffect::NONE);
        let half = rpm(4000.0);
        let full = rpm(8000.0);
        assert!((full.strong / half.strong - 4.0).abs() < 1e-4);
        assert!(full.strong > full.weak);
    }

    #[test]
    fn impact_decays_linearly_to_zero() {
        let mut rs = quiet_synth();
        let mut s = cruising(0.0);
        s.impact_this_tick = true;
        s.impact_magnitude = 50.0;
        let hit = rs.update(&frame(&s));
        assert_eq!(rs.impact_decay, 1.0);
        assert!((hit.strong - soft_clip(1.0)).abs() < 1e-6);
        assert!((hit.weak - 0.5).abs() < 1e-6);

        // dt 0.01 at 4/s → 0.04 per tick → 25 ticks
        let calm = frame(&cruising(0.0));
        let mut prev = rs.impact_decay;
        for _ in 0..25 {
            rs.update(&calm);
            assert!(rs.impact_decay <= prev);
            prev = rs.impact_decay;
        }
        rs.update(&calm);
        assert_eq!(rs.impact_decay, 0.0);
        assert_eq!(rs.update(&calm), RumbleEffect::NONE);
    }

    #[test]
    fn small_impacts_hit_with_floor_intensity() {
        let mut rs = quiet_synth();
        let mut s = cruising(0.0);
        s.impact_this_tick = true;
        s.impact_magnitude = 1.0;
        rs.update(&frame(&s));
        assert_eq!(rs.impact_decay, 0.3);
    }

    #[test]
    fn oversteer_scales_over_threshold() {
        let slide = |deg: f64| {
            let mut s = cruising(30.0);
            s.oversteer_angle_deg = Some(deg);
            quiet_synth().update(&frame(&s))
        };
        assert_eq!(slide(4.0), RumbleEffect::NONE);
        let small = slide(10.0);
        let big = slide(20.0);
        assert!(small.strong > 0.0);
        assert!(big.strong > small.strong);
        assert!((small.strong - 0.7 * 5.0 / 30.0).abs() < 1e-6);
    }

    #[test]
    fn everything_at_once_stays_in_range() {
        let mut rs = synth();
        let mut s = with_susp(cruising(60.0), 3.0, -3.0, 3.0, -3.0);
        s.brake = 1.0;
        s.throttle = 1.0;
        s.engine_rpm = 9000.0;
        s.engine_max_rpm = 8000.0;
        s.impact_this_tick = true;
        s.impact_magnitude = 500.0;
        s.oversteer_angle_deg = Some(90.0);
        for g in [0.0, 0.1, 0.3] {
            s.wheel_fl.grip_fraction = g;
            s.wheel_fr.grip_fraction = g;
            s.wheel_rl.grip_fraction = g;
            s.wheel_rr.grip_fraction = g;
            let r = rs.update(&frame(&s));
            assert!(in_range(r), "{r:?}");
            assert!(r.strong > 0.7);
        }
    }

    #[test]
    fn reset_clears_state() {
        let mut rs = synth();
        let mut s = cruising(30.0);
        s.impact_this_tick = true;
        s.impact_magnitude = 40.0;
        rs.update(&frame(&s));
        rs.reset();
        assert_eq!(rs.impact_decay, 0.0);
        assert!(rs.susp_baseline.is_none());
        assert_eq!(rs.output(), RumbleEffect::NONE);
    }
}
