//! Streams entries to a single connected peer.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{EntrySink, SinkError};
use crate::source::Entry;

/// Sink that owns at most one live connection.
///
/// The connection is handed over once, after the listener accepts it.  A
/// failed write empties the slot for good: every later emit reports
/// [`SinkError::Disconnected`] without touching the network.
pub struct NetworkSink<W> {
    conn: Option<W>,
    peer: String,
}

impl<W> NetworkSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(conn: W, peer: impl Into<String>) -> Self {
        Self {
            conn: Some(conn),
            peer: peer.into(),
        }
    }
}

#[async_trait]
impl<W> EntrySink for NetworkSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn describe(&self) -> String {
        format!("peer {}", self.peer)
    }

    async fn emit(&mut self, entry: &Entry) -> Result<(), SinkError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SinkError::Disconnected(io::ErrorKind::NotConnected.into()));
        };

        let line = entry.to_line();
        let written = match conn.write_all(line.as_bytes()).await {
            Ok(()) => conn.flush().await,
            Err(err) => Err(err),
        };

        if let Err(err) = written {
            warn!(peer = %self.peer, error = %err, "write to peer failed, dropping connection");
            self.conn = None;
            return Err(SinkError::Disconnected(err));
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(err) = conn.shutdown().await {
                debug!(peer = %self.peer, error = %err, "shutdown after close failed");
            }
            debug!(peer = %self.peer, "connection closed");
        }
    }
}
