//! C1 — handshake codec. Wire framing for the request/response headers, and
//! the end-to-end connect + authenticate exchange that produces a usable
//! TLS connection to one gateway.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::HandshakeError;
use crate::model::{AuthToken, ConfigBlob, VersionTag, TOKEN_LEN, VERSION_LEN};

/// Whole-handshake deadline: dial + TLS + write + read.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed 56-byte request header, little-endian, followed by exactly
/// `config_size` bytes of config blob.
const REQUEST_HEADER_LEN: usize = TOKEN_LEN + VERSION_LEN + 4;

/// Fixed 4-byte response header, little-endian, followed by exactly
/// `message_size` bytes of UTF-8 diagnostic text.
const RESPONSE_HEADER_LEN: usize = 2 + 2;

const STATUS_OK: u16 = 200;

fn encode_request(token: &AuthToken, version: &VersionTag, blob: &ConfigBlob) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REQUEST_HEADER_LEN + blob.as_bytes().len());
    buf.extend_from_slice(token.as_bytes());
    buf.extend_from_slice(version.as_bytes());
    buf.extend_from_slice(&blob.len_u32().to_le_bytes());
    buf.extend_from_slice(blob.as_bytes());
    buf
}

struct ResponseHeader {
    status: u16,
    message_size: u16,
}

fn decode_response_header(buf: &[u8; RESPONSE_HEADER_LEN]) -> ResponseHeader {
    ResponseHeader {
        status: u16::from_le_bytes([buf[0], buf[1]]),
        message_size: u16::from_le_bytes([buf[2], buf[3]]),
    }
}

/// Dial `endpoint`, perform the TLS handshake (SNI = the resolver's
/// hostname, per the resolver-URL contract), then run the authenticate /
/// upload exchange. Returns the live connection on `status == 200`.
///
/// The entire sequence runs under one [`HANDSHAKE_TIMEOUT`] deadline; any
/// I/O error, TLS error, deadline expiry, or non-200 status closes the
/// connection and returns a [`HandshakeError`]. Never partially retried —
/// the caller (the tunnel supervisor) retries the whole attempt.
pub async fn connect(
    endpoint: &str,
    cfg: &AgentConfig,
    tls_config: Arc<rustls::ClientConfig>,
) -> Result<TlsStream<TcpStream>, HandshakeError> {
    timeout(HANDSHAKE_TIMEOUT, connect_inner(endpoint, cfg, tls_config))
        .await
        .unwrap_or_else(|_| {
            Err(HandshakeError::Timeout {
                endpoint: endpoint.to_string(),
                secs: HANDSHAKE_TIMEOUT.as_secs(),
            })
        })
}

async fn connect_inner(
    endpoint: &str,
    cfg: &AgentConfig,
    tls_config: Arc<rustls::ClientConfig>,
) -> Result<TlsStream<TcpStream>, HandshakeError> {
    let tcp = TcpStream::connect(endpoint)
        .await
        .map_err(|source| HandshakeError::Io {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let server_name = ServerName::try_from(cfg.tls_server_name().to_string()).map_err(|_| {
        HandshakeError::Tls {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "resolver host is not a valid TLS server name",
            ),
        }
    })?;

    let connector = TlsConnector::from(tls_config);
    let mut stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|source| HandshakeError::Tls {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let request = encode_request(&cfg.token, &cfg.version, &cfg.config_blob);
    stream
        .write_all(&request)
        .await
        .map_err(|source| HandshakeError::Io {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let mut header_buf = [0u8; RESPONSE_HEADER_LEN];
    stream
        .read_exact(&mut header_buf)
        .await
        .map_err(|_| HandshakeError::MalformedResponse {
            endpoint: endpoint.to_string(),
        })?;
    let header = decode_response_header(&header_buf);

    // Full-read of the diagnostic message, not a single `read` call —
    // a short read must not silently truncate the message.
    let mut message_buf = vec![0u8; header.message_size as usize];
    stream
        .read_exact(&mut message_buf)
        .await
        .map_err(|_| HandshakeError::MalformedResponse {
            endpoint: endpoint.to_string(),
        })?;
    let message = String::from_utf8_lossy(&message_buf).into_owned();

    if header.status != STATUS_OK {
        return Err(HandshakeError::Rejected {
            endpoint: endpoint.to_string(),
            status: header.status,
            message,
        });
    }

    debug!(endpoint, "handshake accepted");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_token_version_and_size() {
        let token = AuthToken::new("a".repeat(TOKEN_LEN)).unwrap();
        let version = VersionTag::new("v1.2.3").unwrap();
        let blob = ConfigBlob::new(b"hello world".to_vec()).unwrap();

        let encoded = encode_request(&token, &version, &blob);
        assert_eq!(encoded.len(), REQUEST_HEADER_LEN + blob.as_bytes().len());
        assert_eq!(&encoded[..TOKEN_LEN], token.as_bytes());
        assert_eq!(&encoded[TOKEN_LEN..TOKEN_LEN + VERSION_LEN], version.as_bytes());
        let size = u32::from_le_bytes(
            encoded[TOKEN_LEN + VERSION_LEN..REQUEST_HEADER_LEN]
                .try_into()
                .unwrap(),
        );
        assert_eq!(size, blob.len_u32());
        assert_eq!(&encoded[REQUEST_HEADER_LEN..], blob.as_bytes());
    }

    #[test]
    fn response_header_decodes_status_and_message_size() {
        let buf: [u8; RESPONSE_HEADER_LEN] = [200, 0, 5, 0];
        let header = decode_response_header(&buf);
        assert_eq!(header.status, 200);
        assert_eq!(header.message_size, 5);
    }

    #[test]
    fn response_header_rejects_non_200_with_message() {
        // status = 403, message_size = 9 ("bad token" minus 0 length check here)
        let buf: [u8; RESPONSE_HEADER_LEN] = [403u16.to_le_bytes()[0], 403u16.to_le_bytes()[1], 9, 0];
        let header = decode_response_header(&buf);
        assert_ne!(header.status, STATUS_OK);
        assert_eq!(header.message_size, 9);
    }
}
