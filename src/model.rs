//! Core value types shared across the handshake, proxy, supervisor and
//! reconciler: endpoints, the auth token, the config blob and the version
//! tag sent on the wire.

use std::fmt;

use bytes::Bytes;

use crate::error::ConfigError;

/// Fixed wire width of [`AuthToken`].
pub const TOKEN_LEN: usize = 36;

/// Maximum wire width of [`VersionTag`]; shorter values are zero-padded.
pub const VERSION_LEN: usize = 16;

/// A gateway network address of the form `host:port`.
///
/// Identity is the exact string; two endpoints are equal iff their strings
/// are equal. Stored in unordered sets/maps, never sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque 36-byte ASCII credential, transmitted both as a resolver HTTP
/// header and as a fixed-width handshake field.
#[derive(Clone)]
pub struct AuthToken(String);

impl AuthToken {
    /// Validate the token length. The agent must refuse to start with any
    /// other length.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        if raw.len() != TOKEN_LEN || !raw.is_ascii() {
            return Err(ConfigError::InvalidToken { len: raw.len() });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

// Deliberately no Debug/Display that prints the raw token.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Opaque project configuration uploaded verbatim to every gateway at
/// handshake time, after environment-placeholder expansion.
#[derive(Clone)]
pub struct ConfigBlob(Bytes);

impl ConfigBlob {
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, ConfigError> {
        let bytes = bytes.into();
        if u32::try_from(bytes.len()).is_err() {
            return Err(ConfigError::ConfigTooLarge { len: bytes.len() });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Safe: length was validated to fit `u32` at construction.
    pub fn len_u32(&self) -> u32 {
        self.0.len() as u32
    }
}

/// ASCII build identifier, at most 16 bytes, right-padded with zero bytes
/// when shorter, sent in the handshake request header.
#[derive(Debug, Clone)]
pub struct VersionTag([u8; VERSION_LEN]);

impl VersionTag {
    pub fn new(raw: &str) -> Result<Self, ConfigError> {
        if raw.len() > VERSION_LEN || !raw.is_ascii() {
            return Err(ConfigError::InvalidVersion {
                value: raw.to_string(),
            });
        }
        let mut buf = [0u8; VERSION_LEN];
        buf[..raw.len()].copy_from_slice(raw.as_bytes());
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; VERSION_LEN] {
        &self.0
    }
}

impl Default for VersionTag {
    /// Falls back to the crate's own build version, truncated if necessary.
    fn default() -> Self {
        let v = env!("CARGO_PKG_VERSION");
        let truncated = &v[..v.len().min(VERSION_LEN)];
        VersionTag::new(truncated).expect("CARGO_PKG_VERSION fits in 16 ASCII bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_equality_is_exact_string_match() {
        assert_eq!(Endpoint::new("gw1:443"), Endpoint::new("gw1:443"));
        assert_ne!(Endpoint::new("gw1:443"), Endpoint::new("gw1:4430"));
    }

    #[test]
    fn auth_token_rejects_wrong_length() {
        assert!(AuthToken::new("a".repeat(35)).is_err());
        assert!(AuthToken::new("a".repeat(37)).is_err());
        assert!(AuthToken::new("a".repeat(36)).is_ok());
    }

    #[test]
    fn auth_token_rejects_non_ascii() {
        let mut s = "a".repeat(35);
        s.push('é');
        assert!(AuthToken::new(s).is_err());
    }

    #[test]
    fn auth_token_debug_never_prints_raw_value() {
        let token = AuthToken::new("secret-value-0123456789abcdef012345").unwrap();
        assert!(!format!("{token:?}").contains("secret-value"));
    }

    #[test]
    fn config_blob_reports_len_as_u32() {
        let blob = ConfigBlob::new(b"host=db.local".to_vec()).unwrap();
        assert_eq!(blob.len_u32(), 13);
    }

    #[test]
    fn version_tag_zero_pads_short_values() {
        let tag = VersionTag::new("v1").unwrap();
        assert_eq!(&tag.as_bytes()[..2], b"v1");
        assert!(tag.as_bytes()[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn version_tag_rejects_values_over_16_bytes() {
        assert!(VersionTag::new("this-version-string-is-too-long").is_err());
    }
}
