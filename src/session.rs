//! Thin wrapper around the `yamux` stream multiplexer, isolating the mux
//! library's exact API from the rest of C2 so the accept loop and the
//! keep-alive watchdog read as ordinary tokio code.
//!
//! `accept` races inbound-stream polling against the keep-alive watchdog
//! inside a single method, touching `self.connection` and (via
//! `probe_keepalive`) `self.control`/`self.ticker` as direct field
//! projections rather than through two separate `&mut self` method calls —
//! the latter would each borrow the whole `Session` and the borrow checker
//! has no way to see the two calls only touch disjoint fields.

use std::future::poll_fn;
use std::io;
use std::time::Duration;

use tokio::time::{interval, Interval};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::warn;
use yamux::{Config, Connection, ConnectionError, Mode};

use crate::error::SessionError;

/// Keep-alive ping interval. Missed keep-alives tear the session down.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// A multiplexed session over one authenticated gateway connection. The
/// agent is always the multiplexer *server* side: it accepts streams the
/// gateway opens.
pub struct Session<T> {
    connection: Connection<Compat<T>>,
    control: yamux::Control,
    ticker: Interval,
}

impl<T> Session<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an authenticated transport in a server-mode yamux session.
    pub fn new(transport: T) -> Self {
        let mut connection = Connection::new(transport.compat(), Config::default(), Mode::Server);
        let control = connection.control();
        Self {
            connection,
            control,
            ticker: interval(KEEPALIVE_INTERVAL),
        }
    }

    /// Accept the next inbound stream, racing it against the keep-alive
    /// watchdog. Resolves to `Ok(None)` once the session is cleanly closed;
    /// any other error — including a missed keep-alive — is session-fatal
    /// and must trigger a supervisor reconnect.
    pub async fn accept(&mut self) -> Result<Option<yamux::Stream>, SessionError> {
        loop {
            tokio::select! {
                biased;
                _ = self.ticker.tick() => {
                    probe_keepalive(&mut self.control).await?;
                }
                next = poll_fn(|cx| self.connection.poll_next_inbound(cx)) => {
                    return next.transpose().map_err(SessionError::Accept);
                }
            }
        }
    }
}

/// Opens and immediately closes a zero-byte control stream as a keep-alive
/// probe. Either side opening and finishing a stream is answered at the
/// yamux layer regardless of which peer initiated the underlying
/// connection, so this stands in for a raw transport-level ping.
async fn probe_keepalive(control: &mut yamux::Control) -> Result<(), SessionError> {
    match tokio::time::timeout(KEEPALIVE_INTERVAL, control.open_stream()).await {
        Ok(Ok(mut probe)) => {
            use futures::AsyncWriteExt;
            let _ = probe.close().await;
            Ok(())
        }
        Ok(Err(ConnectionError::Closed)) => Err(SessionError::Accept(io::Error::new(
            io::ErrorKind::NotConnected,
            "session closed",
        ))),
        Ok(Err(e)) => {
            warn!(error = %e, "keep-alive probe failed");
            Err(SessionError::Accept(io::Error::new(
                io::ErrorKind::Other,
                e.to_string(),
            )))
        }
        Err(_) => {
            warn!("missed keep-alive within {:?}", KEEPALIVE_INTERVAL);
            Err(SessionError::Accept(io::Error::new(
                io::ErrorKind::TimedOut,
                "missed keep-alive",
            )))
        }
    }
}
