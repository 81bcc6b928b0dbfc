//! The core data type shared by every feed source and sink.
//!
//! `Entry` is one feed item reduced to what the relay actually needs: a title
//! to emit and a publication timestamp to order it against the watermark.
//!
//! ## For contributors
//!
//! A new source only has to produce `Entry` values in the feed's native
//! (newest-first) order.  Nothing downstream knows which source made them.

use chrono::{DateTime, Utc};

/// A single feed entry, normalised from any data source.
///
/// Entries are immutable once fetched.  There is no identity beyond the
/// `(title, published_at)` pair; the feed is the source of truth.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Entry {
    /// Human-readable headline, guaranteed to be a single line.
    pub title: String,

    /// Publication timestamp, compared against the watermark.
    pub published_at: DateTime<Utc>,
}

impl Entry {
    /// Build an entry, folding any line breaks in `title` into spaces.
    ///
    /// Sinks write one entry per `\n`-terminated line, so a title must never
    /// contain a newline of its own.
    pub fn new(title: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        let title: String = title.into();
        let title = if title.contains(['\n', '\r']) {
            title.replace("\r\n", " ").replace(['\n', '\r'], " ")
        } else {
            title
        };

        Self {
            title,
            published_at,
        }
    }

    /// The record written to a sink: the title plus a trailing newline.
    pub fn to_line(&self) -> String {
        format!("{}\n", self.title)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
