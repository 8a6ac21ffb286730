/// Driver-assist detection shared by the rumble and trigger synthesizers.
///
/// ABS: brake applied while the front axle has lost grip.
/// TC:  throttle applied while the rear axle has lost grip.
///
/// Both return the grip-deficit severity in [0, 1] when active, `None` otherwise.
/// Severity is 0 right at the threshold and reaches 1 once grip has fallen to
/// half of it.

use crate::telemetry::TelemetryFrame;

const ABS_MIN_BRAKE: f64 = 0.15;
const TC_MIN_THROTTLE: f64 = 0.2;

pub fn abs_severity(frame: &TelemetryFrame, grip_threshold: f64) -> Option<f64> {
    if frame.is_stationary
        || frame.brake_pedal <= ABS_MIN_BRAKE
        || frame.avg_front_grip >= grip_threshold
    {
        return None;
    }
    Some(grip_deficit(frame.avg_front_grip, grip_threshold))
}

pub fn tc_severity(frame: &TelemetryFrame, grip_threshold: f64) -> Option<f64> {
    if frame.is_stationary
        || frame.throttle_pedal <= TC_MIN_THROTTLE
        || frame.avg_rear_grip >= grip_threshold
    {
        return None;
    }
    Some(grip_deficit(frame.avg_rear_grip, grip_threshold))
}

fn grip_deficit(grip: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 1.0;
    }
    ((threshold - grip) / (threshold * 0.5)).clamp(0.0, 1.0)
}
