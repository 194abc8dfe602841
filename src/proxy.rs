//! C2 — stream proxy. Given an authenticated transport, runs a multiplexed
//! *server* endpoint over it and forwards each inbound stream to the
//! internal TCP destination the gateway names in its framed header.

use std::time::Duration;

use tokio::io::{copy_bidirectional, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::{error, info, warn};

use crate::error::{SessionError, StreamError};
use crate::session::Session;

/// Connect timeout for the per-stream destination dial — same bound as the
/// gateway handshake's dial leg.
const DESTINATION_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Absolute cap on one stream's total life, set at accept time. Caps total
/// stream life, not idle time; when it fires both sides are closed with no
/// extension.
const STREAM_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Runs the stream proxy over one authenticated session until the session
/// dies or `cancel` fires. Ensures the session is torn down on exit;
/// in-flight streams are left to their own deadlines or to the transport
/// close that follows.
pub async fn serve<T>(transport: T, cancel: tokio_util::sync::CancellationToken) -> Result<(), SessionError>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let mut session = Session::new(transport);

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(()),
        r = accept_loop(&mut session) => r,
    };

    info!("stream proxy session ending");
    result
}

async fn accept_loop<T>(session: &mut Session<T>) -> Result<(), SessionError>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    loop {
        match session.accept().await? {
            Some(stream) => {
                tokio::spawn(async move {
                    if let Err(e) = service_stream(stream).await {
                        warn!(error = %e, "stream proxy error");
                    }
                });
            }
            None => return Ok(()),
        }
    }
}

/// Service one accepted stream end-to-end: read the framed destination
/// header, dial it, then splice bytes until either side closes, errors, or
/// the per-stream deadline elapses. Errors are confined to this stream and
/// never escalate to the session.
async fn service_stream(stream: yamux::Stream) -> Result<(), StreamError> {
    let mut compat = stream.compat();

    let mut len_buf = [0u8; 2];
    compat
        .read_exact(&mut len_buf)
        .await
        .map_err(StreamError::Framing)?;
    let dst_len = u16::from_le_bytes(len_buf) as usize;

    let mut dst_buf = vec![0u8; dst_len];
    compat
        .read_exact(&mut dst_buf)
        .await
        .map_err(StreamError::Framing)?;
    let destination = String::from_utf8(dst_buf)
        .map_err(|e| StreamError::InvalidDestination(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;

    let dial = TcpStream::connect(&destination);
    let mut dest_conn = timeout(DESTINATION_DIAL_TIMEOUT, dial)
        .await
        .map_err(|_| StreamError::DeadlineExceeded {
            destination: destination.clone(),
        })?
        .map_err(|source| StreamError::Dial {
            destination: destination.clone(),
            source,
        })?;

    match timeout(STREAM_DEADLINE, copy_bidirectional(&mut compat, &mut dest_conn)).await {
        Ok(Ok((from_gateway, from_dest))) => {
            info!(destination, from_gateway, from_dest, "stream closed");
            Ok(())
        }
        Ok(Err(source)) => Err(StreamError::Splice { destination, source }),
        Err(_) => {
            error!(destination, "stream exceeded its deadline, closing both sides");
            Err(StreamError::DeadlineExceeded { destination })
        }
    }
}
