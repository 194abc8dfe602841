//! Binary entry-point for the reverse-tunnel agent.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

use tunnel_agent::{config, reconciler, tls};

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    let cfg = match config::AgentConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "startup configuration invalid");
            return ExitCode::FAILURE;
        }
    };

    info!(
        resolver = %cfg.resolver_url,
        insecure_skip_verify = cfg.insecure_skip_verify,
        "agent starting"
    );

    let tls_config = tls::build_client_config(cfg.insecure_skip_verify);
    let reconciler = reconciler::FleetReconciler::new(Arc::new(cfg), tls_config);

    // The reconciler runs forever by design (§5: "not cancellable in this
    // spec; exits on process termination"); process-level signal handling
    // that would request a graceful stop is an external bootstrap concern.
    reconciler.run().await
}
