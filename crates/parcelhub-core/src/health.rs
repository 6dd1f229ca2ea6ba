//! Per-provider health bookkeeping owned by the registry.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use crate::ProviderId;

/// Demotion thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// Consecutive non-authentication failures before a provider is demoted.
    pub failure_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
        }
    }
}

/// Point-in-time view of one provider, used by operator tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub provider: ProviderId,
    pub working: bool,
    pub consecutive_failures: u32,
    pub is_default: bool,
    /// Seconds since the working flag last flipped, `None` if it never did.
    pub secs_since_change: Option<u64>,
}

#[derive(Debug)]
struct HealthEntry {
    working: bool,
    consecutive_failures: u32,
    changed_at: Option<Instant>,
}

impl Default for HealthEntry {
    fn default() -> Self {
        Self {
            working: true,
            consecutive_failures: 0,
            changed_at: None,
        }
    }
}

/// Working / not-working flag plus failure counter per provider.
///
/// Not synchronized; the registry keeps it behind its state mutex.
#[derive(Debug)]
pub(crate) struct HealthTable {
    config: HealthConfig,
    entries: HashMap<ProviderId, HealthEntry>,
}

impl HealthTable {
    /// Every provider starts out working.
    pub(crate) fn new<'a>(
        config: HealthConfig,
        providers: impl IntoIterator<Item = &'a ProviderId>,
    ) -> Self {
        let entries = providers
            .into_iter()
            .map(|provider| (provider.clone(), HealthEntry::default()))
            .collect();
        Self { config, entries }
    }

    pub(crate) fn is_working(&self, provider: &ProviderId) -> bool {
        self.entries
            .get(provider)
            .map(|entry| entry.working)
            .unwrap_or(false)
    }

    /// Returns `true` when this call flipped the provider to not working.
    pub(crate) fn mark_not_working(&mut self, provider: &ProviderId) -> bool {
        let Some(entry) = self.entries.get_mut(provider) else {
            return false;
        };
        let was_working = entry.working;
        entry.working = false;
        if was_working {
            entry.changed_at = Some(Instant::now());
        }
        was_working
    }

    /// Returns `true` when this call flipped the provider back to working.
    pub(crate) fn mark_working(&mut self, provider: &ProviderId) -> bool {
        let Some(entry) = self.entries.get_mut(provider) else {
            return false;
        };
        let was_working = entry.working;
        entry.working = true;
        entry.consecutive_failures = 0;
        if !was_working {
            entry.changed_at = Some(Instant::now());
        }
        !was_working
    }

    /// Counts a failure; returns `true` when the threshold demoted the provider.
    pub(crate) fn record_failure(&mut self, provider: &ProviderId) -> bool {
        let threshold = self.config.failure_threshold.max(1);
        let Some(entry) = self.entries.get_mut(provider) else {
            return false;
        };
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        if entry.working && entry.consecutive_failures >= threshold {
            entry.working = false;
            entry.changed_at = Some(Instant::now());
            return true;
        }
        false
    }

    /// Resets the failure counter. Does not re-promote a demoted provider;
    /// recovery goes through [`mark_working`](Self::mark_working).
    pub(crate) fn record_success(&mut self, provider: &ProviderId) {
        if let Some(entry) = self.entries.get_mut(provider) {
            entry.consecutive_failures = 0;
        }
    }

    pub(crate) fn consecutive_failures(&self, provider: &ProviderId) -> u32 {
        self.entries
            .get(provider)
            .map(|entry| entry.consecutive_failures)
            .unwrap_or(0)
    }

    pub(crate) fn secs_since_change(&self, provider: &ProviderId) -> Option<u64> {
        self.entries
            .get(provider)
            .and_then(|entry| entry.changed_at)
            .map(|changed_at| changed_at.elapsed().as_secs())
    }

    pub(crate) fn first_working<'a>(
        &self,
        order: impl IntoIterator<Item = &'a ProviderId>,
    ) -> Option<ProviderId> {
        order
            .into_iter()
            .find(|provider| self.is_working(provider))
            .cloned()
    }
}
