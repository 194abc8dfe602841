//! C3 — tunnel supervisor. Keeps one endpoint connected "as long as
//! wanted" with exponential backoff; stoppable via cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::{ReconnectBackoff, MAX_BACKOFF};
use crate::config::AgentConfig;
use crate::{handshake, proxy};

/// One supervisor per endpoint, owned exclusively by the fleet reconciler.
pub struct TunnelSupervisor {
    endpoint: String,
    cancel: CancellationToken,
}

/// Handle the reconciler keeps for a running supervisor: the cancellation
/// token used by `close()`, and the task running `run_loop`.
pub struct SupervisorHandle {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn spawn(endpoint: String, cfg: Arc<AgentConfig>, tls_config: Arc<rustls::ClientConfig>) -> Self {
        let cancel = CancellationToken::new();
        let supervisor = TunnelSupervisor {
            endpoint,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(async move { supervisor.run_loop(cfg, tls_config).await });
        Self { cancel, task }
    }

    /// Sets the cancellation flag and (via the supervisor's own select)
    /// unblocks any in-progress network call. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl TunnelSupervisor {
    async fn run_loop(&self, cfg: Arc<AgentConfig>, tls_config: Arc<rustls::ClientConfig>) {
        let mut backoff = ReconnectBackoff::new();

        loop {
            if self.cancel.is_cancelled() {
                info!(endpoint = %self.endpoint, "supervisor cancelled, exiting");
                return;
            }

            let connect = handshake::connect(&self.endpoint, &cfg, tls_config.clone());
            let connection = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(endpoint = %self.endpoint, "cancelled during connect");
                    return;
                }
                result = connect => result,
            };

            let stream = match connection {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "handshake failed");
                    self.sleep_backoff(&mut backoff).await;
                    continue;
                }
            };

            let start = Instant::now();
            let result = proxy::serve(stream, self.cancel.clone()).await;
            let ran_for = start.elapsed();

            if ran_for >= MAX_BACKOFF {
                // The session was healthy long enough to count as a
                // successful attempt, even though it eventually ended.
                backoff.reset();
            }

            match result {
                Ok(()) => {
                    if self.cancel.is_cancelled() {
                        // Clean exit due to cancellation inside the
                        // proxy; loop back to step 1, which exits.
                        continue;
                    }
                    // Peer closed the session with no error: still worth
                    // a backoff sleep before reconnecting.
                    info!(endpoint = %self.endpoint, "session ended, reconnecting");
                    self.sleep_backoff(&mut backoff).await;
                }
                Err(e) => {
                    error!(endpoint = %self.endpoint, error = %e, "session failed");
                    self.sleep_backoff(&mut backoff).await;
                }
            }
        }
    }

    async fn sleep_backoff(&self, backoff: &mut ReconnectBackoff) {
        let dur = backoff.next();
        info!(endpoint = %self.endpoint, sleep_secs = dur.as_secs_f64(), "backing off before reconnect");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(dur) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_matches_spec() {
        let mut b = ReconnectBackoff::new();
        let observed: Vec<Duration> = (0..6).map(|_| b.next()).collect();
        assert_eq!(
            observed,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(40),
                Duration::from_secs(60),
                Duration::from_secs(60),
            ]
        );
    }
}
