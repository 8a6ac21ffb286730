mod assist;
mod config;
mod crc32;
mod hid;
mod pipeline;
mod report;
mod rumble;
mod sink;
mod source;
mod telemetry;
mod text_sink;
mod trigger;

use crate::pipeline::HapticPipeline;
use crate::sink::OutputSink;
use crate::telemetry::{TelemetryFrame, VehicleGeometry};

use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Frames buffered between the reader task and the tick loop.
const FRAME_QUEUE: usize = 64;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("racehaptics v{} starting...", env!("CARGO_PKG_VERSION"));

    let cfg = config::Config::load();

    let mut sink = match sink::open(&cfg.output) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("Failed to open output: {e}");
            std::process::exit(1);
        }
    };

    let geometry = VehicleGeometry {
        wheelbase_m: cfg.telemetry.wheelbase_m,
        max_steer_angle_deg: cfg.telemetry.max_steer_angle_deg,
    };
    let (frame_tx, frame_rx) = mpsc::channel::<TelemetryFrame>(FRAME_QUEUE);
    source::spawn_stdin_reader(geometry, frame_tx);

    run_tick_loop(sink.as_mut(), &cfg, frame_rx).await;

    // Never leave the triggers stiff or the motors running.
    sink.send_safe_state();
    log::info!("Stopped");
}

/// One tick per telemetry frame. Returns on Ctrl-C or when the input closes.
async fn run_tick_loop(
    sink: &mut dyn OutputSink,
    cfg: &config::Config,
    mut frames: mpsc::Receiver<TelemetryFrame>,
) {
    let mut pipeline = HapticPipeline::new(cfg.effects.clone());
    let stale_after = Duration::from_millis(cfg.telemetry.stale_timeout_ms);
    let mut reconnect = Reconnect::new(Duration::from_millis(cfg.output.reconnect_interval_ms));
    // True while the device holds the safe state and the synthesizers are fresh.
    let mut idle = true;

    reconnect.ensure(sink);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Shutdown requested");
                return;
            }
            next = tokio::time::timeout(stale_after, frames.recv()) => {
                match next {
                    Ok(Some(frame)) => {
                        let fx = pipeline.tick(&frame);
                        if reconnect.ensure(sink) {
                            sink.send(&fx.left, &fx.right, fx.rumble);
                        }
                        idle = false;
                    }
                    Ok(None) => return,
                    Err(_) => {
                        if !idle {
                            log::info!("No telemetry for {}ms, releasing effects", stale_after.as_millis());
                            sink.send_safe_state();
                            pipeline.reset();
                            idle = true;
                        }
                        reconnect.ensure(sink);
                    }
                }
            }
        }
    }
}

/// Rate-limits connect attempts from the tick loop.
struct Reconnect {
    interval: Duration,
    last_attempt: Option<Instant>,
    was_connected: bool,
}

impl Reconnect {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: None,
            was_connected: false,
        }
    }

    /// True if the sink is connected, trying to connect if the interval allows.
    fn ensure(&mut self, sink: &mut dyn OutputSink) -> bool {
        let connected = if sink.is_connected() {
            true
        } else if self.last_attempt.is_some_and(|t| t.elapsed() < self.interval) {
            false
        } else {
            self.last_attempt = Some(Instant::now());
            sink.connect()
        };
        if connected != self.was_connected {
            if connected {
                log::info!("Output ready");
            } else {
                log::info!("Output lost. Retrying every {}ms...", self.interval.as_millis());
            }
            self.was_connected = connected;
        }
        connected
    }
}
