//! Destinations for emitted entries.
//!
//! Every sink implements [`EntrySink`].  Sinks are append-only: an entry, once
//! emitted, is never rewritten or removed.  A failed emit is reported as a
//! [`SinkError`] and never panics or aborts the poll loop.

mod file;
mod network;

pub use file::FileSink;
pub use network::NetworkSink;

use std::io;

use async_trait::async_trait;
use thiserror::Error;

use crate::source::Entry;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The downstream peer is gone.  The connection is not coming back.
    #[error("peer disconnected: {0}")]
    Disconnected(#[source] io::Error),

    /// Writing or flushing the backing file failed.
    #[error("sink I/O error: {0}")]
    Io(#[source] io::Error),
}

#[async_trait]
pub trait EntrySink: Send {
    /// Short description for log lines (peer address, file path).
    fn describe(&self) -> String;

    /// Write one entry as a newline-terminated line.
    async fn emit(&mut self, entry: &Entry) -> Result<(), SinkError>;

    /// Release the underlying connection or file.  Idempotent.
    async fn close(&mut self);
}
