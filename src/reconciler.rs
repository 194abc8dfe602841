//! C4 — fleet reconciler. Periodically fetches the desired gateway address
//! set from the resolver and converges the running set of supervisors to
//! match it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use crate::backoff::ReconnectBackoff;
use crate::config::AgentConfig;
use crate::error::ResolverError;
use crate::model::Endpoint;
use crate::supervisor::SupervisorHandle;

/// Sleep between reconcile ticks once a fetch has completed (successfully
/// or not — §4.4 step 4 runs regardless).
const RECONCILE_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub struct FleetReconciler {
    http: Client,
    cfg: Arc<AgentConfig>,
    tls_config: Arc<rustls::ClientConfig>,
    tracked: HashMap<Endpoint, SupervisorHandle>,
}

impl FleetReconciler {
    pub fn new(cfg: Arc<AgentConfig>, tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            http: Client::new(),
            cfg,
            tls_config,
            tracked: HashMap::new(),
        }
    }

    /// Runs forever: fetch, reconcile, sleep 10 minutes, repeat. Not
    /// cancellable in this spec — it exits only on process termination.
    pub async fn run(mut self) -> ! {
        let mut backoff = ReconnectBackoff::new();
        loop {
            let desired = loop {
                match self.fetch_desired_set().await {
                    Ok(set) => {
                        backoff.reset();
                        break set;
                    }
                    Err(e) => {
                        warn!(error = %e, "resolver fetch failed");
                        let dur = backoff.next();
                        info!(sleep_secs = dur.as_secs_f64(), "retrying resolver fetch");
                        tokio::time::sleep(dur).await;
                    }
                }
            };

            self.reconcile(desired).await;
            tokio::time::sleep(RECONCILE_INTERVAL).await;
        }
    }

    async fn fetch_desired_set(&self) -> Result<HashSet<Endpoint>, ResolverError> {
        let response = self
            .http
            .get(self.cfg.resolver_url.clone())
            .header("X-Token", self.cfg.token.as_str())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() != 200 {
            return Err(ResolverError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(trimmed
            .split(';')
            .map(|s| Endpoint::new(s.trim()))
            .collect())
    }

    /// Current set of tracked endpoints. Exposed for tests asserting the
    /// convergence invariant (§8 Testable Property 1).
    pub fn tracked_endpoints(&self) -> HashSet<Endpoint> {
        self.tracked.keys().cloned().collect()
    }

    /// Stops every tracked supervisor. Used by tests and by a clean
    /// shutdown path to avoid leaking tasks.
    pub async fn close_all(&mut self) {
        for (_, handle) in self.tracked.drain() {
            handle.close();
            handle.join().await;
        }
    }

    /// Converges `tracked` to exactly `desired`. Additions for an endpoint
    /// are started before removals for a different endpoint are closed, so
    /// the add-then-remove ordering within one tick is observable.
    pub async fn reconcile(&mut self, desired: HashSet<Endpoint>) {
        for endpoint in desired.iter() {
            if !self.tracked.contains_key(endpoint) {
                info!(%endpoint, "starting tunnel supervisor");
                let handle = SupervisorHandle::spawn(
                    endpoint.as_str().to_string(),
                    self.cfg.clone(),
                    self.tls_config.clone(),
                );
                self.tracked.insert(endpoint.clone(), handle);
            }
        }

        let removed: Vec<Endpoint> = self
            .tracked
            .keys()
            .filter(|ep| !desired.contains(ep))
            .cloned()
            .collect();

        for endpoint in removed {
            if let Some(handle) = self.tracked.remove(&endpoint) {
                info!(%endpoint, "stopping tunnel supervisor");
                handle.close();
                handle.join().await;
            }
        }

        debug_assert_eq!(
            self.tracked.keys().cloned().collect::<HashSet<_>>(),
            desired,
            "tracked supervisors must equal the desired set after reconcile"
        );
    }
}
