//! Error taxonomy. Each kind maps to a §7 category: fatal at startup
//! (`ConfigError`), recovered locally with backoff (`ResolverError`,
//! `HandshakeError`, `SessionError`), or confined to one stream
//! (`StreamError`).

use thiserror::Error;

/// Invalid token length, missing env var, unreadable file, malformed URL.
/// Fatal: the process exits non-zero before any network I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(&'static str),

    #[error("PROJECT_TOKEN must be exactly {} ASCII bytes, got {len}", crate::model::TOKEN_LEN)]
    InvalidToken { len: usize },

    #[error("version tag {value:?} exceeds {} ASCII bytes", crate::model::VERSION_LEN)]
    InvalidVersion { value: String },

    #[error("config blob of {len} bytes does not fit in a u32 length field")]
    ConfigTooLarge { len: usize },

    #[error("failed to read CONFIG_PATH file {path}: {source}")]
    UnreadableConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("RESOLVER_URL {value:?} is not a valid URL: {source}")]
    InvalidResolverUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("RESOLVER_URL {0:?} has no host component")]
    ResolverUrlMissingHost(String),
}

/// Transport failure or non-200 from the resolver. Recovered locally by the
/// reconciler with backoff; never propagates.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("resolver request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("resolver returned status {status}: {body}")]
    BadStatus { status: u16, body: String },
}

/// TLS failure, I/O error, deadline, or non-200 status from the gateway.
/// Recovered locally by the supervisor with backoff.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("dial {endpoint} failed: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {endpoint} failed: {source}")]
    Tls {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake with {endpoint} timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    #[error("gateway {endpoint} rejected handshake: status={status} message={message:?}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("malformed response header from {endpoint}")]
    MalformedResponse { endpoint: String },
}

/// Multiplexer start failure or session-fatal accept error. Triggers
/// supervisor reconnect.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start multiplexed session: {0}")]
    Start(#[source] std::io::Error),

    #[error("stream accept failed: {0}")]
    Accept(#[source] std::io::Error),
}

/// Per-stream framing, dial, or I/O failure. Logged and confined to the
/// stream; the session continues.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to read destination header: {0}")]
    Framing(#[source] std::io::Error),

    #[error("destination address {0:?} is not valid UTF-8/ASCII")]
    InvalidDestination(String),

    #[error("failed to dial destination {destination}: {source}")]
    Dial {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stream to {destination} exceeded its deadline")]
    DeadlineExceeded { destination: String },

    #[error("splice error on stream to {destination}: {source}")]
    Splice {
        destination: String,
        #[source]
        source: std::io::Error,
    },
}
