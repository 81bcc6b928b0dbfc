//! Feed source abstraction layer.
//!
//! This module defines the [`FeedSource`] trait, the [`Entry`] type and the
//! [`FetchError`] taxonomy.  Concrete source implementations live in
//! sub-modules (currently only [`rss`]).
//!
//! ## For contributors: adding a new source
//!
//! 1. Create a new file in this directory (e.g. `atom.rs`).
//! 2. Define a struct (e.g. `AtomSource`) and implement [`FeedSource`] for it.
//! 3. Map every failure onto a [`FetchError`] variant.  The variant decides
//!    whether the poll loop stops or retries, so pick it carefully.
//! 4. Add `mod atom;` below and re-export your struct in the `pub use` block.

mod entry;
mod rss;

pub use entry::Entry;
pub use self::rss::{RssSource, RssSourceSettings};

use async_trait::async_trait;
use thiserror::Error;

/// Why a fetch failed.
///
/// The poll loop branches on the variant: [`FetchError::BadStatus`] stops it,
/// everything else skips the current cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure (connect, timeout, truncated body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status code.
    #[error("bad response status {0}")]
    BadStatus(u16),

    /// The payload arrived but is not a valid feed.
    #[error("malformed feed: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether this error must terminate the poll loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::BadStatus(_))
    }
}

/// Trait that every feed source must implement.
///
/// The poll loop calls [`fetch()`](FeedSource::fetch) once per cycle and
/// races it against cancellation, so implementations must be [`Send`] + [`Sync`] and
/// must not assume the future runs to completion.
///
/// ## Ordering contract
///
/// Entries are returned in the feed's native order, newest first.  The
/// watermark filter stops at the first entry that is not newer than the
/// watermark, so a source that reorders entries changes what gets emitted.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable label used in log lines.
    fn name(&self) -> &str;

    /// Fetch the latest batch of entries.
    async fn fetch(&self) -> Result<Vec<Entry>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bad_status_is_fatal() {
        assert!(FetchError::BadStatus(503).is_fatal());
        assert!(!FetchError::Transport("reset".into()).is_fatal());
        assert!(!FetchError::Parse("eof".into()).is_fatal());
    }

    #[test]
    fn error_messages_carry_detail() {
        assert_eq!(FetchError::BadStatus(404).to_string(), "bad response status 404");
        assert_eq!(
            FetchError::Parse("unexpected eof".into()).to_string(),
            "malformed feed: unexpected eof"
        );
    }
}
