//! S4 (non-200 handshake) and the happy-path handshake accept, exercised
//! against a loopback TLS "gateway" built from a throwaway rcgen cert.

use std::sync::Arc;

use rcgen::{generate_simple_self_signed, CertifiedKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use tunnel_agent::config::AgentConfig;
use tunnel_agent::error::HandshakeError;
use tunnel_agent::model::{AuthToken, ConfigBlob};
use tunnel_agent::{handshake, tls};

fn test_config() -> AgentConfig {
    AgentConfig {
        token: AuthToken::new("a".repeat(36)).unwrap(),
        config_blob: ConfigBlob::new(b"cfg".to_vec()).unwrap(),
        resolver_url: url::Url::parse("https://resolver.invalid/v1/endpoints").unwrap(),
        version: Default::default(),
        insecure_skip_verify: true,
    }
}

fn server_tls_config() -> Arc<rustls::ServerConfig> {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec!["resolver.invalid".to_string()]).unwrap();
    let cert_der = cert.der().clone();
    let key_der = rustls::pki_types::PrivateKeyDer::Pkcs8(key_pair.serialize_der().into());

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .unwrap();
    Arc::new(config)
}

/// Reads exactly the 56-byte request header + `config_size` bytes of blob,
/// then writes back a fixed response. Returns the bytes it read so the
/// caller can assert on them.
async fn serve_one_handshake(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    status: u16,
    message: &'static str,
) -> Vec<u8> {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut tls = acceptor.accept(tcp).await.unwrap();

    let mut header = [0u8; 56];
    tls.read_exact(&mut header).await.unwrap();
    let config_size = u32::from_le_bytes(header[52..56].try_into().unwrap());
    let mut blob = vec![0u8; config_size as usize];
    tls.read_exact(&mut blob).await.unwrap();

    let mut response = Vec::new();
    response.extend_from_slice(&status.to_le_bytes());
    response.extend_from_slice(&(message.len() as u16).to_le_bytes());
    response.extend_from_slice(message.as_bytes());
    tls.write_all(&response).await.unwrap();
    tls.shutdown().await.unwrap();

    let mut out = header.to_vec();
    out.extend_from_slice(&blob);
    out
}

#[tokio::test]
async fn happy_path_handshake_succeeds_on_status_200() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(server_tls_config());

    let server = tokio::spawn(serve_one_handshake(listener, acceptor, 200, ""));

    let cfg = test_config();
    let tls_config = tls::build_client_config(cfg.insecure_skip_verify);
    let result = handshake::connect(&addr.to_string(), &cfg, tls_config).await;
    assert!(result.is_ok(), "expected handshake to succeed: {:?}", result.err());

    let sent = server.await.unwrap();
    assert_eq!(&sent[..36], cfg.token.as_bytes());
}

#[tokio::test]
async fn non_200_status_is_reported_with_message() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let acceptor = TlsAcceptor::from(server_tls_config());

    let server = tokio::spawn(serve_one_handshake(listener, acceptor, 403, "bad token"));

    let cfg = test_config();
    let tls_config = tls::build_client_config(cfg.insecure_skip_verify);
    let err = handshake::connect(&addr.to_string(), &cfg, tls_config)
        .await
        .unwrap_err();

    match err {
        HandshakeError::Rejected { status, message, .. } => {
            assert_eq!(status, 403);
            assert_eq!(message, "bad token");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    server.await.unwrap();
}
