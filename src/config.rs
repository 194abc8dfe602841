//! Startup configuration: reads `PROJECT_TOKEN`, `CONFIG_PATH` and
//! `RESOLVER_URL` once, validates them, and produces an immutable
//! [`AgentConfig`]. No argument parsing lives here — bootstrap mechanics are
//! an external collaborator; this module only consumes environment
//! variables already present in the process.

use std::env;
use std::fs;

use url::Url;

use crate::error::ConfigError;
use crate::model::{AuthToken, ConfigBlob, VersionTag};

/// Resolver URL used when `RESOLVER_URL` is not set. A placeholder: the
/// real deployment address is an external collaborator's concern.
pub const DEFAULT_RESOLVER_URL: &str = "https://resolver.internal.example/v1/endpoints";

/// Immutable, process-lifetime configuration. Passed by `Arc` to every
/// component; never mutated after [`AgentConfig::from_env`] returns.
#[derive(Clone)]
pub struct AgentConfig {
    pub token: AuthToken,
    pub config_blob: ConfigBlob,
    pub resolver_url: Url,
    pub version: VersionTag,
    /// Disables gateway certificate verification. Dev-only; never set by
    /// default.
    pub insecure_skip_verify: bool,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token_raw =
            env::var("PROJECT_TOKEN").map_err(|_| ConfigError::MissingEnvVar("PROJECT_TOKEN"))?;
        let token = AuthToken::new(token_raw)?;

        let config_path =
            env::var("CONFIG_PATH").map_err(|_| ConfigError::MissingEnvVar("CONFIG_PATH"))?;
        let raw = fs::read_to_string(&config_path).map_err(|source| ConfigError::UnreadableConfig {
            path: config_path.clone(),
            source,
        })?;
        let expanded = shellexpand::env_with_context_no_errors(&raw, |var| env::var(var).ok());
        let config_blob = ConfigBlob::new(expanded.into_owned().into_bytes())?;

        let resolver_raw =
            env::var("RESOLVER_URL").unwrap_or_else(|_| DEFAULT_RESOLVER_URL.to_string());
        let resolver_url =
            Url::parse(&resolver_raw).map_err(|source| ConfigError::InvalidResolverUrl {
                value: resolver_raw.clone(),
                source,
            })?;
        if resolver_url.host_str().is_none() {
            return Err(ConfigError::ResolverUrlMissingHost(resolver_raw));
        }

        Ok(Self {
            token,
            config_blob,
            resolver_url,
            version: VersionTag::default(),
            insecure_skip_verify: env::var("TUNNEL_AGENT_INSECURE_SKIP_VERIFY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    /// Hostname every gateway TLS connection presents as SNI / verifies its
    /// certificate against — the resolver's host, not the gateway's own,
    /// per the resolver-URL contract.
    pub fn tls_server_name(&self) -> &str {
        self.resolver_url
            .host_str()
            .expect("validated in from_env")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // env::set_var mutates global process state; serialize the env-reading
    // tests so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_common_env(token: &str, config_path: &str) {
        env::set_var("PROJECT_TOKEN", token);
        env::set_var("CONFIG_PATH", config_path);
        env::remove_var("RESOLVER_URL");
        env::remove_var("TUNNEL_AGENT_INSECURE_SKIP_VERIFY");
    }

    #[test]
    fn rejects_wrong_length_token() {
        let _guard = ENV_LOCK.lock().unwrap();
        let file = tempfile_with("hello");
        set_common_env("short-token", file.to_str().unwrap());
        let err = AgentConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidToken { .. }));
    }

    #[test]
    fn expands_env_placeholders_in_config_blob() {
        let _guard = ENV_LOCK.lock().unwrap();
        let file = tempfile_with("host=${MY_HOST}");
        set_common_env(&"a".repeat(36), file.to_str().unwrap());
        env::set_var("MY_HOST", "db.local");
        let cfg = AgentConfig::from_env().unwrap();
        assert_eq!(cfg.config_blob.as_bytes(), b"host=db.local");
        assert_eq!(cfg.config_blob.len_u32(), 13);
        env::remove_var("MY_HOST");
    }

    #[test]
    fn defaults_resolver_url_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        let file = tempfile_with("x");
        set_common_env(&"a".repeat(36), file.to_str().unwrap());
        let cfg = AgentConfig::from_env().unwrap();
        assert_eq!(cfg.resolver_url.as_str(), DEFAULT_RESOLVER_URL);
    }

    fn tempfile_with(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "tunnel-agent-config-test-{}-{}",
            std::process::id(),
            contents.len()
        ));
        fs::write(&path, contents).unwrap();
        path
    }
}
