//! Background health probe.
//!
//! Periodically calls [`Carrier::test_authentication`] on every registered
//! carrier, demotes the ones that fail and re-promotes the ones that recover.
//! The probe is opt-in: nothing runs unless [`HealthProbe::spawn`] is called.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::carrier::{AuthCheck, Carrier};
use crate::registry::ProviderRegistry;
use crate::ProviderId;

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    pub interval: Duration,
    /// Relative jitter applied to each interval, `0.2` meaning +/- 20%.
    pub jitter: f64,
    pub auth_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            jitter: 0.2,
            auth_timeout: Duration::from_secs(5),
        }
    }
}

impl ProbeConfig {
    /// Delay before the next round, randomized so probes of several
    /// processes do not hit the carriers in lockstep.
    pub fn next_delay(&self) -> Duration {
        let base_ms = self.interval.as_millis().min(u128::from(u64::MAX)) as u64;
        let jitter_ms = (base_ms as f64 * self.jitter.clamp(0.0, 1.0)) as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        let random_offset = fastrand::u64(0..=(jitter_ms * 2));
        let total_ms = base_ms as i64 + (random_offset as i64 - jitter_ms as i64);
        Duration::from_millis(total_ms.max(1) as u64)
    }
}

/// Outcome of probing one carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub provider: ProviderId,
    pub authenticated: bool,
    pub message: String,
    /// `true` when this probe flipped the provider's health.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct HealthProbe {
    registry: Arc<ProviderRegistry>,
    config: ProbeConfig,
}

impl HealthProbe {
    pub fn new(registry: Arc<ProviderRegistry>, config: ProbeConfig) -> Self {
        Self { registry, config }
    }

    /// Probes every carrier concurrently and applies the results.
    /// Reports come back in registration order.
    pub async fn probe_once(&self) -> Vec<ProbeReport> {
        let mut tasks = JoinSet::new();
        for (index, carrier) in self.registry.all_carriers().into_iter().enumerate() {
            let auth_timeout = self.config.auth_timeout;
            tasks.spawn(async move { (index, check(carrier, auth_timeout).await) });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => warn!(error = %err, "health probe task failed"),
            }
        }
        results.sort_by_key(|(index, _)| *index);

        results
            .into_iter()
            .map(|(_, (provider, check))| {
                let changed = if check.authenticated {
                    self.registry.mark_provider_as_working(&provider)
                } else {
                    self.registry.mark_provider_as_not_working(&provider)
                };
                debug!(
                    provider = %provider,
                    authenticated = check.authenticated,
                    changed,
                    "health probe result"
                );
                ProbeReport {
                    provider,
                    authenticated: check.authenticated,
                    message: check.message,
                    changed,
                }
            })
            .collect()
    }

    /// Runs the probe on a background task until the handle is stopped.
    pub fn spawn(self) -> ProbeHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(interval_secs = self.config.interval.as_secs(), "health probe started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.next_delay()) => {
                        self.probe_once().await;
                    }
                    // Also fires when the handle is dropped.
                    _ = stop_rx.changed() => break,
                }
            }
            info!("health probe stopped");
        });
        ProbeHandle { stop_tx, task }
    }
}

async fn check(carrier: Arc<dyn Carrier>, auth_timeout: Duration) -> (ProviderId, AuthCheck) {
    let provider = carrier.provider_name();
    let check = match tokio::time::timeout(auth_timeout, carrier.test_authentication()).await {
        Ok(check) => check,
        Err(_) => AuthCheck::failed(format!(
            "authentication check timed out after {} ms",
            auth_timeout.as_millis()
        )),
    };
    (provider, check)
}

/// Control handle of a spawned [`HealthProbe`].
#[derive(Debug)]
pub struct ProbeHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Signals the probe to stop and waits for the current round to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "health probe task ended abnormally");
        }
    }

    /// Cancels the probe without waiting.
    pub fn abort(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
