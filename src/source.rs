/// Telemetry input: newline-delimited JSON samples on stdin.
///
/// The game-specific adapter (shared memory, UDP, ...) runs as a separate process
/// and pipes one [`TelemetrySample`] per line. Blank lines are ignored; malformed
/// lines are skipped with a rate-limited warning. EOF closes the channel.

use crate::telemetry::{TelemetryFrame, TelemetrySample, VehicleGeometry};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Parse one line. `Ok(None)` for blank lines.
pub fn parse_line(
    line: &str,
    geometry: VehicleGeometry,
) -> Result<Option<TelemetryFrame>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let sample: TelemetrySample = serde_json::from_str(line)?;
    Ok(Some(TelemetryFrame::from_sample(&sample, geometry)))
}

/// Forward every frame from `reader` until EOF or until the receiver goes away.
pub async fn read_frames<R>(reader: R, geometry: VehicleGeometry, tx: mpsc::Sender<TelemetryFrame>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut bad_lines = 0u64;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::info!("Telemetry input closed");
                return;
            }
            Err(e) => {
                log::warn!("Telemetry read error: {e}");
                return;
            }
        };
        match parse_line(&line, geometry) {
            Ok(Some(frame)) => {
                if tx.send(frame).await.is_err() {
                    return; // tick loop is gone
                }
            }
            Ok(None) => {}
            Err(e) => {
                bad_lines += 1;
                if bad_lines % 100 == 1 {
                    log::warn!("Malformed telemetry line ({bad_lines}): {e}");
                }
            }
        }
    }
}

pub fn spawn_stdin_reader(
    geometry: VehicleGeometry,
    tx: mpsc::Sender<TelemetryFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        read_frames(BufReader::new(tokio::io::stdin()), geometry, tx).await;
    })
}
