//! Fixture replay: stream a recorded cache file to a peer at a fixed pace.
//!
//! The file is whatever [`crate::sink::FileSink`] produced: one title per
//! line.  Replay ignores timestamps and the watermark entirely; it just sends
//! each line, sleeps, and moves on, starting over at the end of the file when
//! `repeat` is set.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::listener::ConnectionListener;

#[derive(Debug, Clone)]
pub struct ReplaySettings {
    /// Pause after each line.
    pub interval: Duration,
    /// Start over after the last line instead of finishing.
    pub repeat: bool,
}

/// How a replay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayEnd {
    /// Every line was sent (only without `repeat`, or for an empty fixture).
    Finished,
    /// Writing to the peer failed.
    Disconnected,
    Cancelled,
}

/// Read a cache file into its lines, without the trailing newlines.
pub async fn read_fixture(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(text.lines().map(str::to_owned).collect())
}

/// Send `lines` to `conn`, one `\n`-terminated line per `interval`.
pub async fn replay<W>(
    lines: &[String],
    conn: &mut W,
    settings: &ReplaySettings,
    cancel: &CancellationToken,
) -> ReplayEnd
where
    W: AsyncWrite + Unpin,
{
    if lines.is_empty() {
        warn!("fixture is empty, nothing to replay");
        return ReplayEnd::Finished;
    }

    loop {
        for line in lines {
            info!(title = %line, "sending");
            let sent = tokio::select! {
                _ = cancel.cancelled() => return ReplayEnd::Cancelled,
                sent = write_line(conn, line) => sent,
            };
            if let Err(err) = sent {
                warn!(error = %err, "peer went away");
                return ReplayEnd::Disconnected;
            }

            tokio::select! {
                _ = cancel.cancelled() => return ReplayEnd::Cancelled,
                _ = tokio::time::sleep(settings.interval) => {}
            }
        }

        if !settings.repeat {
            return ReplayEnd::Finished;
        }
    }
}

async fn write_line<W>(conn: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    conn.write_all(line.as_bytes()).await?;
    conn.write_all(b"\n").await?;
    conn.flush().await
}

/// Load `path`, wait for one peer, and replay the file into it.
pub async fn replay_to_peer(
    listener: ConnectionListener,
    path: &Path,
    settings: &ReplaySettings,
    cancel: &CancellationToken,
) -> io::Result<ReplayEnd> {
    let lines = read_fixture(path).await?;
    info!(path = %path.display(), lines = lines.len(), "fixture loaded");

    let Some((mut stream, peer)) = listener.accept_one(cancel).await? else {
        return Ok(ReplayEnd::Cancelled);
    };

    let end = replay(&lines, &mut stream, settings, cancel).await;
    if let Err(err) = stream.shutdown().await {
        warn!(%peer, error = %err, "shutdown failed");
    }
    info!(%peer, ?end, "closed connection");
    Ok(end)
}
