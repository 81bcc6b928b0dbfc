//! One-shot TCP listener for the single downstream consumer.
//!
//! The relay serves exactly one peer.  [`ConnectionListener::accept_one`]
//! consumes the listener, so the port is released as soon as that peer is
//! connected and no second consumer can attach.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct ConnectionListener {
    listener: TcpListener,
}

impl ConnectionListener {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for one peer.  There is no timeout; returns `Ok(None)` if
    /// `cancel` fires first.
    pub async fn accept_one(
        self,
        cancel: &CancellationToken,
    ) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let local = self.listener.local_addr()?;
        info!(%local, "awaiting connection");

        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            accepted = self.listener.accept() => {
                let (stream, peer) = accepted?;
                info!(%peer, "connected");
                Ok(Some((stream, peer)))
            }
        }
    }
}
