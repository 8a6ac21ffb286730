/// TOML configuration with sensible defaults.
/// No config file is required to run; defaults work out of the box.
///
/// Every tuning value used by the effect synthesizers lives in [`EffectsConfig`].
/// Values are not validated on load; each consumer clamps at the point of use.

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub telemetry: TelemetryConfig,
    pub effects: EffectsConfig,
}

/// Which transport receives the synthesized effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Raw HID output reports written straight to the controller.
    Hid,
    /// Plain-text trigger file polled by an external tool.
    TextFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sink: SinkKind,
    /// Target path for the text-file sink (ignored for `hid`).
    pub text_file_path: String,
    /// Minimum spacing between reconnect attempts from the tick loop.
    pub reconnect_interval_ms: u64,
    /// How often the hot-plug watcher rescans the HID device list.
    pub hotplug_poll_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// No frame for this long → safe state + synthesizer reset.
    pub stale_timeout_ms: u64,
    /// Used by the kinematic oversteer estimate when the adapter omits the angle.
    pub wheelbase_m: f64,
    pub max_steer_angle_deg: f64,
}

/// Gains, thresholds and trigger placement for both synthesizers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    // Trigger placement and static resistance
    pub brake_deadzone: f64,
    pub throttle_deadzone: f64,
    pub brake_start_zone: u8,
    pub throttle_start_zone: u8,
    pub max_brake_strength: f64,
    pub max_throttle_strength: f64,

    // Driver-assist detection (shared by rumble and triggers)
    pub abs_grip_threshold: f64,
    pub tc_grip_threshold: f64,

    // Trigger vibration
    pub abs_trigger_gain: f64,
    pub abs_trigger_freq_hz: u8,
    pub tc_trigger_gain: f64,
    pub tc_trigger_freq_hz: u8,
    pub oversteer_trigger_gain: f64,
    pub impact_trigger_gain: f64,

    // Impact accumulator, shared by rumble and triggers
    /// Impact magnitude that maps to a full-strength hit.
    pub impact_full_scale: f64,
    pub impact_min: f64,
    pub impact_max: f64,

    /// Degrees of oversteer before the rumble/trigger cues engage.
    pub oversteer_threshold_deg: f64,

    // Curb detection
    /// Absolute suspension velocity (m/s) a spike must exceed to count as a curb.
    pub curb_susp_velocity_threshold: f64,
    pub curb_rumble_scale: f64,

    // Rumble mix
    pub road_rumble_gain: f32,
    pub curb_rumble_gain: f32,
    pub abs_rumble_gain: f32,
    pub tc_rumble_gain: f32,
    pub engine_rumble_gain: f32,
    pub impact_rumble_gain: f32,
    pub oversteer_rumble_gain: f32,
    pub master_rumble_gain: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Hid,
            text_file_path: default_text_file_path(),
            reconnect_interval_ms: 2000,
            hotplug_poll_ms: 1000,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            stale_timeout_ms: 500,
            wheelbase_m: 2.6,
            max_steer_angle_deg: 20.0,
        }
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            brake_deadzone: 0.05,
            throttle_deadzone: 0.05,
            brake_start_zone: 2,
            throttle_start_zone: 3,
            max_brake_strength: 8.0,
            max_throttle_strength: 5.0,

            abs_grip_threshold: 0.85,
            tc_grip_threshold: 0.60,

            abs_trigger_gain: 1.0,
            abs_trigger_freq_hz: 40,
            tc_trigger_gain: 1.0,
            tc_trigger_freq_hz: 30,
            oversteer_trigger_gain: 1.0,
            impact_trigger_gain: 1.0,

            impact_full_scale: 50.0,
            impact_min: 0.3,
            impact_max: 1.0,

            oversteer_threshold_deg: 5.0,

            curb_susp_velocity_threshold: 0.25,
            curb_rumble_scale: 2.0,

            road_rumble_gain: 1.0,
            curb_rumble_gain: 1.0,
            abs_rumble_gain: 1.0,
            tc_rumble_gain: 1.0,
            engine_rumble_gain: 0.5,
            impact_rumble_gain: 1.0,
            oversteer_rumble_gain: 1.0,
            master_rumble_gain: 1.0,
        }
    }
}

fn default_text_file_path() -> String {
    std::env::temp_dir()
        .join("racehaptics_triggers.txt")
        .to_string_lossy()
        .into_owned()
}

impl Config {
    /// Load config from the default config file path, or return defaults if not found.
    pub fn load() -> Self {
        let config_path = config_file_path();
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::parse(&contents, &config_path),
            Err(_) => {
                log::info!("No config file found at {config_path}. Using defaults.");
                Self::default()
            }
        }
    }

    fn parse(contents: &str, source: &str) -> Self {
        match toml::from_str(contents) {
            Ok(config) => {
                log::info!("Loaded config from {source}");
                config
            }
            Err(e) => {
                log::warn!("Failed to parse config file {source}: {e}. Using defaults.");
                Self::default()
            }
        }
    }
}

fn config_file_path() -> String {
    if let Ok(explicit) = std::env::var("RACEHAPTICS_CONFIG") {
        explicit
    } else if let Ok(appdata) = std::env::var("APPDATA") {
        format!("{appdata}\\racehaptics\\config.toml")
    } else {
        "racehaptics.toml".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.output.sink, SinkKind::Hid);
        assert_eq!(config.telemetry.stale_timeout_ms, 500);
        assert_eq!(config.effects.abs_grip_threshold, 0.85);
        assert_eq!(config.effects.tc_grip_threshold, 0.60);
        assert!(config.effects.brake_start_zone <= 9);
        assert!(config.effects.throttle_start_zone <= 9);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            [output]
            sink = "text_file"
            text_file_path = "triggers.txt"

            [effects]
            brake_start_zone = 4
            master_rumble_gain = 0.5
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.output.sink, SinkKind::TextFile);
        assert_eq!(config.output.text_file_path, "triggers.txt");
        assert_eq!(config.effects.brake_start_zone, 4);
        assert_eq!(config.effects.master_rumble_gain, 0.5);
        // Other fields should be defaults
        assert_eq!(config.output.hotplug_poll_ms, 1000);
        assert_eq!(config.effects.throttle_start_zone, 3);
        assert_eq!(config.telemetry.wheelbase_m, 2.6);
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let config = Config::parse("[effects\nbrake_deadzone = ", "test");
        assert_eq!(config.effects.brake_deadzone, 0.05);
    }

    #[test]
    fn unknown_sink_kind_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[output]\nsink = \"serial\"");
        assert!(result.is_err());
    }
}
