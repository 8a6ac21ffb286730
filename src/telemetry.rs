/// Normalized telemetry: the per-tick vehicle snapshot consumed by the synthesizers.
///
/// An external adapter decodes each simulator's own shared-memory layout and
/// hands us a [`TelemetrySample`] with values already normalized (pedals 0..1,
/// grip 0..1, steering -1..1). [`TelemetryFrame::from_sample`] computes the
/// derived aggregates once; the frame is read-only after that.

use serde::Deserialize;

/// Below this speed the car counts as stationary and most cues go silent.
pub const STATIONARY_SPEED_MPS: f64 = 0.5;

/// The kinematic oversteer estimate is meaningless at walking pace.
const OVERSTEER_MIN_SPEED_MPS: f64 = 3.0;

/// Floor for delta-time so decay math never stalls on a zero/negative dt.
const MIN_DELTA_TIME_S: f64 = 0.001;

/// Per-wheel values as delivered by the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WheelFrame {
    pub suspension_deflection: f64,
    /// m/s, signed (compression positive).
    pub suspension_velocity: f64,
    pub tire_load: f64,
    /// 0 = no grip, 1 = full grip.
    pub grip_fraction: f64,
    pub slip_ratio: f64,
    pub surface_type: u8,
}

/// One tick of normalized telemetry as the adapter sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetrySample {
    pub delta_time: f64,
    pub elapsed_time: f64,
    pub brake: f64,
    pub throttle: f64,
    pub steering: f64,
    pub speed_mps: f64,
    pub lateral_accel: f64,
    pub longitudinal_accel: f64,
    /// rad/s
    pub yaw_rate: f64,
    pub engine_rpm: f64,
    pub engine_max_rpm: f64,
    pub gear: i32,
    pub impact_magnitude: f64,
    pub impact_this_tick: bool,
    /// Degrees. When absent it is estimated from steering, speed and yaw rate.
    pub oversteer_angle_deg: Option<f64>,
    pub wheel_fl: WheelFrame,
    pub wheel_fr: WheelFrame,
    pub wheel_rl: WheelFrame,
    pub wheel_rr: WheelFrame,
}

/// Vehicle geometry for the kinematic oversteer estimate.
#[derive(Debug, Clone, Copy)]
pub struct VehicleGeometry {
    pub wheelbase_m: f64,
    pub max_steer_angle_deg: f64,
}

impl Default for VehicleGeometry {
    fn default() -> Self {
        Self {
            wheelbase_m: 2.6,
            max_steer_angle_deg: 20.0,
        }
    }
}

/// Immutable per-tick snapshot with derived aggregates.
#[derive(Debug, Clone)]
pub struct TelemetryFrame {
    pub delta_time: f64,
    pub elapsed_time: f64,

    pub brake_pedal: f64,
    pub throttle_pedal: f64,
    pub steering: f64,

    pub speed_mps: f64,
    pub speed_kph: f64,

    pub lateral_accel: f64,
    pub longitudinal_accel: f64,
    pub yaw_rate: f64,

    pub engine_rpm: f64,
    pub engine_rpm_normalized: f64,
    pub gear: i32,

    pub last_impact_magnitude: f64,
    pub impact_this_tick: bool,
    pub oversteer_angle: f64,

    pub wheel_fl: WheelFrame,
    pub wheel_fr: WheelFrame,
    pub wheel_rl: WheelFrame,
    pub wheel_rr: WheelFrame,

    pub avg_front_grip: f64,
    pub avg_rear_grip: f64,
    pub avg_front_slip: f64,
    pub avg_rear_slip: f64,
    pub max_susp_velocity: f64,
    pub max_left_susp_velocity: f64,
    pub max_right_susp_velocity: f64,
    pub is_stationary: bool,
}

impl TelemetryFrame {
    pub fn from_sample(s: &TelemetrySample, geometry: VehicleGeometry) -> Self {
        let (fl, fr, rl, rr) = (s.wheel_fl, s.wheel_fr, s.wheel_rl, s.wheel_rr);
        let speed_mps = s.speed_mps.max(0.0);

        let oversteer_angle = match s.oversteer_angle_deg {
            Some(angle) => angle.max(0.0),
            None => estimate_oversteer_deg(s.steering, speed_mps, s.yaw_rate, geometry),
        };

        let engine_rpm_normalized = if s.engine_max_rpm > 0.0 {
            (s.engine_rpm / s.engine_max_rpm).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let sv = |w: &WheelFrame| w.suspension_velocity.abs();

        Self {
            delta_time: s.delta_time.max(MIN_DELTA_TIME_S),
            elapsed_time: s.elapsed_time,
            brake_pedal: s.brake,
            throttle_pedal: s.throttle,
            steering: s.steering,
            speed_mps,
            speed_kph: speed_mps * 3.6,
            lateral_accel: s.lateral_accel,
            longitudinal_accel: s.longitudinal_accel,
            yaw_rate: s.yaw_rate,
            engine_rpm: s.engine_rpm,
            engine_rpm_normalized,
            gear: s.gear,
            last_impact_magnitude: s.impact_magnitude,
            impact_this_tick: s.impact_this_tick,
            oversteer_angle,
            wheel_fl: fl,
            wheel_fr: fr,
            wheel_rl: rl,
            wheel_rr: rr,
            avg_front_grip: (fl.grip_fraction + fr.grip_fraction) * 0.5,
            avg_rear_grip: (rl.grip_fraction + rr.grip_fraction) * 0.5,
            avg_front_slip: (fl.slip_ratio.abs() + fr.slip_ratio.abs()) * 0.5,
            avg_rear_slip: (rl.slip_ratio.abs() + rr.slip_ratio.abs()) * 0.5,
            max_susp_velocity: sv(&fl).max(sv(&fr)).max(sv(&rl)).max(sv(&rr)),
            max_left_susp_velocity: sv(&fl).max(sv(&rl)),
            max_right_susp_velocity: sv(&fr).max(sv(&rr)),
            is_stationary: speed_mps < STATIONARY_SPEED_MPS,
        }
    }

    /// Mean absolute suspension velocity over the four wheels.
    pub fn avg_abs_susp_velocity(&self) -> f64 {
        (self.wheel_fl.suspension_velocity.abs()
            + self.wheel_fr.suspension_velocity.abs()
            + self.wheel_rl.suspension_velocity.abs()
            + self.wheel_rr.suspension_velocity.abs())
            / 4.0
    }
}

/// Yaw rate in excess of what a bicycle model predicts for the current steering
/// input, in degrees. Zero when the car rotates less than expected (understeer).
pub fn estimate_oversteer_deg(
    steering: f64,
    speed_mps: f64,
    yaw_rate: f64,
    geometry: VehicleGeometry,
) -> f64 {
    if speed_mps <= OVERSTEER_MIN_SPEED_MPS || geometry.wheelbase_m <= 0.0 {
        return 0.0;
    }
    let steer_rad = steering * geometry.max_steer_angle_deg.to_radians();
    let expected_yaw = steer_rad * speed_mps / geometry.wheelbase_m;
    let excess = yaw_rate.abs() - expected_yaw.abs();
    if excess > 0.0 { excess.to_degrees() } else { 0.0 }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A car rolling straight at `speed_mps` with full grip on all four wheels.
    pub(crate) fn cruising(speed_mps: f64) -> TelemetrySample {
        let wheel = WheelFrame { grip_fraction: 1.0, ..Default::default() };
        TelemetrySample {
            delta_time: 0.01,
            speed_mps,
            oversteer_angle_deg: Some(0.0),
            wheel_fl: wheel,
            wheel_fr: wheel,
            wheel_rl: wheel,
            wheel_rr: wheel,
            ..Default::default()
        }
    }

    pub(crate) fn frame(sample: &TelemetrySample) -> TelemetryFrame {
        TelemetryFrame::from_sample(sample, VehicleGeometry::default())
    }

    #[test]
    fn derived_aggregates() {
        let mut s = cruising(20.0);
        s.wheel_fl.grip_fraction = 0.6;
        s.wheel_fr.grip_fraction = 0.8;
        s.wheel_rl.slip_ratio = -0.2;
        s.wheel_rr.slip_ratio = 0.1;
        s.wheel_fl.suspension_velocity = -0.4;
        s.wheel_rr.suspension_velocity = 0.9;
        let f = frame(&s);

        assert!((f.avg_front_grip - 0.7).abs() < 1e-12);
        assert_eq!(f.avg_rear_grip, 1.0);
        assert!((f.avg_rear_slip - 0.15).abs() < 1e-12);
        assert_eq!(f.max_susp_velocity, 0.9);
        assert_eq!(f.max_left_susp_velocity, 0.4);
        assert_eq!(f.max_right_susp_velocity, 0.9);
        assert!((f.speed_kph - 72.0).abs() < 1e-9);
        assert!(!f.is_stationary);
    }

    #[test]
    fn stationary_below_threshold() {
        assert!(frame(&cruising(0.0)).is_stationary);
        assert!(frame(&cruising(0.49)).is_stationary);
        assert!(!frame(&cruising(0.5)).is_stationary);
    }

    #[test]
    fn rpm_normalization() {
        let mut s = cruising(10.0);
        s.engine_rpm = 6000.0;
        s.engine_max_rpm = 8000.0;
        assert_eq!(frame(&s).engine_rpm_normalized, 0.75);

        s.engine_rpm = 9000.0;
        assert_eq!(frame(&s).engine_rpm_normalized, 1.0);

        s.engine_max_rpm = 0.0;
        assert_eq!(frame(&s).engine_rpm_normalized, 0.0);
    }

    #[test]
    fn delta_time_is_floored() {
        let mut s = cruising(10.0);
        s.delta_time = 0.0;
        assert_eq!(frame(&s).delta_time, MIN_DELTA_TIME_S);
    }

    #[test]
    fn oversteer_estimate_only_counts_excess_yaw() {
        let geo = VehicleGeometry::default();
        // Slow: always zero.
        assert_eq!(estimate_oversteer_deg(0.0, 2.0, 1.0, geo), 0.0);
        // Straight-line steering with 0.5 rad/s yaw: all of it is excess.
        let deg = estimate_oversteer_deg(0.0, 30.0, 0.5, geo);
        assert!((deg - 0.5f64.to_degrees()).abs() < 1e-9);
        // Car turning less than the steering asks for: understeer, not oversteer.
        assert_eq!(estimate_oversteer_deg(0.5, 30.0, 0.1, geo), 0.0);
    }

    #[test]
    fn explicit_oversteer_angle_wins() {
        let mut s = cruising(30.0);
        s.yaw_rate = 1.0;
        s.oversteer_angle_deg = Some(12.0);
        assert_eq!(frame(&s).oversteer_angle, 12.0);

        s.oversteer_angle_deg = None;
        assert!(frame(&s).oversteer_angle > 50.0);
    }

    #[test]
    fn deserialize_sparse_json_sample() {
        let json = r#"{"delta_time":0.01,"brake":0.4,"speed_mps":12.0,
                       "wheel_fl":{"grip_fraction":0.9}}"#;
        let s: TelemetrySample = serde_json::from_str(json).unwrap();
        assert_eq!(s.brake, 0.4);
        assert_eq!(s.wheel_fl.grip_fraction, 0.9);
        assert_eq!(s.wheel_rr.grip_fraction, 0.0);
        assert!(s.oversteer_angle_deg.is_none());
    }
}
