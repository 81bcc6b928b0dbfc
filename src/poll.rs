//! The fetch → filter → emit → sleep cycle.
//!
//! A [`PollLoop`] owns one feed source, one sink and the watermark for that
//! pairing.  It runs on a single task: there is no fetch-ahead and no
//! concurrent emit.  Every suspension point (fetch, emit, sleep, and the
//! initial accept in [`stream_to_peer`]) is raced against a
//! [`CancellationToken`], so Ctrl-C always ends in
//! [`StopReason::UserCancelled`] with the sink closed.
//!
//! ## States
//!
//! ```text
//! AwaitingConnection ──► Polling ──► Sleeping ──► Polling ──► …
//!   (stream mode)           │
//!                           └──► Stopped(TtlExpired | FatalFetchError | UserCancelled)
//! ```
//!
//! ## Error policy
//!
//! * `FetchError::BadStatus` stops the loop.
//! * `FetchError::Transport` / `FetchError::Parse` skip the cycle.
//! * A `SinkError` ends emission for the current cycle only.  What happens to
//!   the watermark is decided by [`CommitPolicy`].

use std::fmt;
use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::listener::ConnectionListener;
use crate::sink::{EntrySink, NetworkSink};
use crate::source::FeedSource;
use crate::watermark::WatermarkTracker;

/// Why a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The watermark moved past the configured TTL boundary.
    TtlExpired,
    /// The feed answered with a status that will not fix itself.
    FatalFetchError,
    /// The cancellation token fired.
    UserCancelled,
}

impl StopReason {
    /// Whether the process should exit non-zero.
    pub fn is_failure(self) -> bool {
        matches!(self, StopReason::FatalFetchError)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::TtlExpired => "time to live passed",
            StopReason::FatalFetchError => "fatal fetch error",
            StopReason::UserCancelled => "cancelled",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    AwaitingConnection,
    Polling,
    Sleeping,
    Stopped(StopReason),
}

/// How the watermark moves when a sink error cuts a cycle short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Advance to the newest entry that was actually emitted.  Entries after
    /// the failure are never retried (at-most-once).
    #[default]
    Partial,
    /// Advance only when the whole batch went out.  A short batch is
    /// re-emitted from the start next cycle, duplicates included.
    FullBatch,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Optional upper bound on the watermark; unset disables the check.
    pub ttl: Option<DateTime<Utc>>,
    pub commit_policy: CommitPolicy,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The fetch succeeded.  `fresh` entries were new, `emitted` of them
    /// reached the sink.
    Completed { fresh: usize, emitted: usize },
    /// Retryable fetch failure; nothing emitted, watermark untouched.
    Skipped,
    Stopped(StopReason),
}

pub struct PollLoop {
    source: Box<dyn FeedSource>,
    sink: Box<dyn EntrySink>,
    tracker: WatermarkTracker,
    settings: PollSettings,
    cancel: CancellationToken,
    state: PollState,
    /// Start of the most recent cycle, attached to state-change logs.
    cycle_at: Option<DateTime<Utc>>,
}

impl PollLoop {
    pub fn new(
        source: Box<dyn FeedSource>,
        sink: Box<dyn EntrySink>,
        settings: PollSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            sink,
            tracker: WatermarkTracker::new(),
            settings,
            cancel,
            state: PollState::Polling,
            cycle_at: None,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.tracker.current()
    }

    fn transition(&mut self, next: PollState) {
        if self.state != next {
            debug!(cycle_at = ?self.cycle_at, from = ?self.state, to = ?next, "state change");
            self.state = next;
        }
    }

    /// Run cycles until a terminal state, then release the sink.
    pub async fn run(mut self) -> StopReason {
        info!(
            source = self.source.name(),
            sink = %self.sink.describe(),
            interval = ?self.settings.interval,
            "poll loop started"
        );

        let reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::UserCancelled;
            }

            match self.run_cycle().await {
                CycleOutcome::Stopped(reason) => break reason,
                CycleOutcome::Completed { fresh, emitted } if emitted < fresh => {
                    debug!(fresh, emitted, "cycle ended with undelivered entries");
                }
                _ => {}
            }

            self.transition(PollState::Sleeping);
            tokio::select! {
                _ = self.cancel.cancelled() => break StopReason::UserCancelled,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        };

        self.stop(reason).await
    }

    async fn stop(&mut self, reason: StopReason) -> StopReason {
        self.transition(PollState::Stopped(reason));
        self.sink.close().await;

        if reason.is_failure() {
            error!(
                %reason,
                cycle_at = ?self.cycle_at,
                watermark = ?self.watermark(),
                "poll loop stopped"
            );
        } else {
            info!(
                %reason,
                cycle_at = ?self.cycle_at,
                watermark = ?self.watermark(),
                "poll loop stopped"
            );
        }
        reason
    }

    /// One fetch → filter → emit pass.  Does not sleep and does not close the
    /// sink.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let cycle_at = Utc::now();
        self.cycle_at = Some(cycle_at);
        self.transition(PollState::Polling);
        info!(%cycle_at, "iteration");

        if self.tracker.has_passed(self.settings.ttl) {
            info!(%cycle_at, "time to live passed");
            return CycleOutcome::Stopped(StopReason::TtlExpired);
        }

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.source.fetch() => Some(result),
        };
        let entries = match fetched {
            None => return CycleOutcome::Stopped(StopReason::UserCancelled),
            Some(Ok(entries)) => entries,
            Some(Err(err)) if err.is_fatal() => {
                error!(%cycle_at, error = %err, "fetch failed, giving up");
                return CycleOutcome::Stopped(StopReason::FatalFetchError);
            }
            Some(Err(err)) => {
                warn!(%cycle_at, error = %err, "fetch failed, skipping cycle");
                return CycleOutcome::Skipped;
            }
        };

        let (fresh, candidate) = self.tracker.filter(&entries);
        debug!(%cycle_at, fetched = entries.len(), fresh = fresh.len(), "filtered batch");

        let mut emitted = 0;
        let mut cancelled = false;
        for entry in &fresh {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = self.sink.emit(entry) => Some(result),
            };
            match result {
                None => {
                    cancelled = true;
                    break;
                }
                Some(Ok(())) => {
                    info!(title = %entry.title, "retrieved");
                    emitted += 1;
                }
                Some(Err(err)) => {
                    warn!(
                        %cycle_at,
                        error = %err,
                        remaining = fresh.len() - emitted,
                        "emit failed, skipping rest of cycle"
                    );
                    break;
                }
            }
        }

        let commit_to = match self.settings.commit_policy {
            CommitPolicy::Partial => fresh[..emitted].first().map(|e| e.published_at),
            CommitPolicy::FullBatch if emitted == fresh.len() => candidate,
            CommitPolicy::FullBatch => None,
        };
        if self.tracker.commit(commit_to) {
            debug!(%cycle_at, watermark = ?self.tracker.current(), "watermark advanced");
        }

        if cancelled {
            return CycleOutcome::Stopped(StopReason::UserCancelled);
        }
        CycleOutcome::Completed {
            fresh: fresh.len(),
            emitted,
        }
    }
}

/// Wait for one consumer on `listener`, then poll `source` into it until a
/// terminal state.
///
/// Cancelling while still waiting for the peer returns
/// [`StopReason::UserCancelled`] without ever fetching.
pub async fn stream_to_peer(
    listener: ConnectionListener,
    source: Box<dyn FeedSource>,
    settings: PollSettings,
    cancel: CancellationToken,
) -> io::Result<StopReason> {
    debug!(at = %Utc::now(), state = ?PollState::AwaitingConnection, "state change");
    let Some((stream, peer)) = listener.accept_one(&cancel).await? else {
        info!(reason = %StopReason::UserCancelled, "stopped before a peer connected");
        return Ok(StopReason::UserCancelled);
    };

    let sink = NetworkSink::new(stream, peer.to_string());
    let poll = PollLoop::new(source, Box::new(sink), settings, cancel);
    Ok(poll.run().await)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
