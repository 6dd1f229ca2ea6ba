//! Provider registry: the set of configured carriers, their health, and the
//! default-provider pointer.
//!
//! The registry is an explicit object shared behind `Arc` by the shipping
//! service and the health probe. Health and the default pointer live behind
//! one mutex; the lock is never held across an `.await` or a settings call.
//!
//! # Provider resolution
//!
//! [`ProviderRegistry::get_provider`] walks this chain:
//!
//! 1. the requested provider, when registered and working
//! 2. the current default, when working
//! 3. the first working provider in registration order
//! 4. the first registered provider, logged at error level
//!
//! # Default resolution
//!
//! On [`initialize`](ProviderRegistry::initialize): the persisted
//! `default_shipping_provider` setting, then the configured default
//! (`PARCELHUB_DEFAULT_PROVIDER`), then `sendcloud`, then the first registered
//! provider. Demoting the default promotes another working provider in memory
//! only; the persisted setting is untouched and the preferred provider gets its
//! default role back once it recovers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use parcelhub_settings::{SettingsStore, DEFAULT_SHIPPING_PROVIDER_KEY};
use tracing::{debug, error, info, warn};

use crate::adapters::{DhlCarrier, SendcloudCarrier, UpsCarrier};
use crate::carrier::{Carrier, CarrierError};
use crate::config::{CarrierCredentials, ConfigError, ShippingConfig};
use crate::health::{HealthConfig, HealthTable, ProviderHealth};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::policy::CarrierPolicy;
use crate::{CoreError, ProviderId};

#[derive(Debug)]
struct RegistryState {
    health: HealthTable,
    default: Option<ProviderId>,
    /// Default chosen by configuration or by the operator; restored on recovery.
    preferred: Option<ProviderId>,
    initialized: bool,
}

pub struct ProviderRegistry {
    order: Vec<ProviderId>,
    carriers: HashMap<ProviderId, Arc<dyn Carrier>>,
    settings: Option<Arc<dyn SettingsStore>>,
    configured_default: Option<String>,
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.order)
            .field("has_settings_store", &self.settings.is_some())
            .finish()
    }
}

impl ProviderRegistry {
    /// Registry over the given carriers with in-memory defaults only.
    pub fn new(carriers: Vec<Arc<dyn Carrier>>) -> Self {
        Self::assemble(carriers, None, None, HealthConfig::default())
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn assemble(
        carriers: Vec<Arc<dyn Carrier>>,
        settings: Option<Arc<dyn SettingsStore>>,
        configured_default: Option<String>,
        health_config: HealthConfig,
    ) -> Self {
        let mut order = Vec::with_capacity(carriers.len());
        let mut by_id = HashMap::with_capacity(carriers.len());
        for carrier in carriers {
            let id = carrier.provider_name();
            if by_id.contains_key(&id) {
                warn!(provider = %id, "duplicate carrier registration ignored");
                continue;
            }
            order.push(id.clone());
            by_id.insert(id, carrier);
        }

        Self {
            state: Mutex::new(RegistryState {
                health: HealthTable::new(health_config, &order),
                default: None,
                preferred: None,
                initialized: false,
            }),
            order,
            carriers: by_id,
            settings,
            configured_default,
        }
    }

    /// Resolves the default provider. Later calls are no-ops.
    pub fn initialize(&self) {
        if self.lock_state().initialized {
            return;
        }

        let resolved = self.resolve_initial_default();

        let mut state = self.lock_state();
        if state.initialized {
            return;
        }
        state.initialized = true;
        state.preferred = resolved.clone();
        let default = match resolved {
            Some(preferred) if !state.health.is_working(&preferred) => {
                let replacement = state.health.first_working(&self.order);
                if let Some(replacement) = &replacement {
                    warn!(
                        preferred = %preferred,
                        default = %replacement,
                        "preferred default provider is not working, using another"
                    );
                }
                replacement.or(Some(preferred))
            }
            other => other,
        };
        state.default = default;
        if let Some(default) = &state.default {
            info!(default = %default, providers = self.order.len(), "provider registry initialized");
        }
    }

    fn resolve_initial_default(&self) -> Option<ProviderId> {
        if let Some(store) = &self.settings {
            match store.get(DEFAULT_SHIPPING_PROVIDER_KEY) {
                Ok(Some(value)) => match self.registered(&value) {
                    Some(id) => return Some(id),
                    None => warn!(value = %value, "persisted default provider is not registered"),
                },
                Ok(None) => debug!("no persisted default provider"),
                Err(err) => warn!(error = %err, "failed to read persisted default provider"),
            }
        }

        if let Some(value) = &self.configured_default {
            match self.registered(value) {
                Some(id) => return Some(id),
                None => warn!(value = %value, "configured default provider is not registered"),
            }
        }

        self.registered(ProviderId::SENDCLOUD)
            .or_else(|| self.order.first().cloned())
    }

    fn registered(&self, name: &str) -> Option<ProviderId> {
        ProviderId::parse(name)
            .ok()
            .filter(|id| self.carriers.contains_key(id))
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().expect("registry state should not be poisoned")
    }

    /// Registered providers in registration order.
    pub fn providers(&self) -> Vec<ProviderId> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every registered carrier in registration order, healthy or not.
    pub fn all_carriers(&self) -> Vec<Arc<dyn Carrier>> {
        self.order
            .iter()
            .filter_map(|id| self.carriers.get(id).cloned())
            .collect()
    }

    /// The named carrier, regardless of health.
    ///
    /// # Errors
    ///
    /// `ProviderNotRegistered` for unknown or malformed names.
    pub fn carrier(&self, name: &str) -> Result<Arc<dyn Carrier>, CarrierError> {
        self.registered(name)
            .and_then(|id| self.carriers.get(&id).cloned())
            .ok_or_else(|| CarrierError::provider_not_registered(name))
    }

    /// Picks a carrier through the resolution chain in the module docs.
    ///
    /// # Errors
    ///
    /// `ProviderNotRegistered` when `requested` names an unknown carrier,
    /// `NoProviderAvailable` when nothing is registered at all.
    pub fn get_provider(&self, requested: Option<&str>) -> Result<Arc<dyn Carrier>, CarrierError> {
        self.initialize();

        let requested = match requested {
            Some(name) => Some(
                self.registered(name)
                    .ok_or_else(|| CarrierError::provider_not_registered(name))?,
            ),
            None => None,
        };

        let chosen = {
            let state = self.lock_state();
            let requested_working = requested
                .as_ref()
                .filter(|id| state.health.is_working(id))
                .cloned();
            if let (Some(id), None) = (&requested, &requested_working) {
                warn!(provider = %id, "requested provider is not working, falling back");
            }
            requested_working
                .or_else(|| {
                    state
                        .default
                        .as_ref()
                        .filter(|id| state.health.is_working(id))
                        .cloned()
                })
                .or_else(|| state.health.first_working(&self.order))
        };

        let chosen = match chosen {
            Some(id) => id,
            None => {
                let last_resort = self.order.first().cloned().ok_or_else(|| {
                    CarrierError::no_provider_available("no shipping provider is registered")
                })?;
                error!(
                    provider = %last_resort,
                    "no working shipping provider, using first registered provider"
                );
                last_resort
            }
        };

        self.carriers
            .get(&chosen)
            .cloned()
            .ok_or_else(|| CarrierError::provider_not_registered(chosen.as_str()))
    }

    /// Current in-memory default.
    pub fn default_provider(&self) -> Option<ProviderId> {
        self.initialize();
        self.lock_state().default.clone()
    }

    pub fn is_working(&self, provider: &ProviderId) -> bool {
        self.lock_state().health.is_working(provider)
    }

    /// Demotes `provider`; returns `true` when it was working before.
    ///
    /// When it was the default, another working provider becomes the default
    /// in memory. The persisted setting is not changed.
    pub fn mark_provider_as_not_working(&self, provider: &ProviderId) -> bool {
        self.initialize();
        let mut state = self.lock_state();
        let flipped = state.health.mark_not_working(provider);
        if flipped {
            warn!(provider = %provider, "shipping provider marked as not working");
            self.reassign_default(&mut state, provider);
        }
        flipped
    }

    /// Re-promotes `provider`; returns `true` when it was not working before.
    pub fn mark_provider_as_working(&self, provider: &ProviderId) -> bool {
        self.initialize();
        let mut state = self.lock_state();
        let flipped = state.health.mark_working(provider);
        if flipped {
            info!(provider = %provider, "shipping provider marked as working again");
            let restore = state.preferred.as_ref() == Some(provider)
                && state.default.as_ref() != Some(provider);
            let default_down = state
                .default
                .as_ref()
                .map_or(true, |id| !state.health.is_working(id));
            if restore || default_down {
                info!(provider = %provider, "default shipping provider restored");
                state.default = Some(provider.clone());
            }
        }
        flipped
    }

    /// Feeds a failed call into health tracking.
    ///
    /// Authentication failures demote at once; other failures demote after
    /// the configured number of consecutive failures.
    pub fn record_failure(&self, provider: &ProviderId, failure: &CarrierError) {
        if failure.is_authentication() {
            self.mark_provider_as_not_working(provider);
            return;
        }

        self.initialize();
        let mut state = self.lock_state();
        if state.health.record_failure(provider) {
            warn!(
                provider = %provider,
                failures = state.health.consecutive_failures(provider),
                error = %failure,
                "shipping provider demoted after consecutive failures"
            );
            self.reassign_default(&mut state, provider);
        } else {
            debug!(provider = %provider, error = %failure, "shipping provider call failed");
        }
    }

    pub fn record_success(&self, provider: &ProviderId) {
        self.lock_state().health.record_success(provider);
    }

    fn reassign_default(&self, state: &mut RegistryState, demoted: &ProviderId) {
        if state.default.as_ref() != Some(demoted) {
            return;
        }
        let replacement = self
            .order
            .iter()
            .filter(|id| *id != demoted)
            .find(|id| state.health.is_working(id))
            .cloned();
        match replacement {
            Some(replacement) => {
                warn!(
                    from = %demoted,
                    to = %replacement,
                    "default shipping provider reassigned"
                );
                state.default = Some(replacement);
            }
            None => warn!(provider = %demoted, "no working provider to take over as default"),
        }
    }

    /// Makes `name` the default and persists it when a settings store is
    /// attached.
    ///
    /// # Errors
    ///
    /// Fails for unregistered providers and when the settings store rejects
    /// the write; memory is only updated after a successful write.
    pub fn set_default_provider(&self, name: &str) -> Result<ProviderId, CoreError> {
        self.initialize();
        let id = self
            .registered(name)
            .ok_or_else(|| CarrierError::provider_not_registered(name))?;

        if let Some(store) = &self.settings {
            store.set(DEFAULT_SHIPPING_PROVIDER_KEY, id.as_str())?;
        }

        let mut state = self.lock_state();
        state.default = Some(id.clone());
        state.preferred = Some(id.clone());
        info!(default = %id, persisted = self.settings.is_some(), "default shipping provider set");
        Ok(id)
    }

    /// Health of every provider in registration order.
    pub fn snapshots(&self) -> Vec<ProviderHealth> {
        self.initialize();
        let state = self.lock_state();
        self.order
            .iter()
            .map(|id| ProviderHealth {
                provider: id.clone(),
                working: state.health.is_working(id),
                consecutive_failures: state.health.consecutive_failures(id),
                is_default: state.default.as_ref() == Some(id),
                secs_since_change: state.health.secs_since_change(id),
            })
            .collect()
    }
}

/// Builds a [`ProviderRegistry`] from configuration and explicit carriers.
///
/// Carriers built from credentials come first, in the order sendcloud, dhl,
/// ups; carriers added with [`with_carrier`](Self::with_carrier) follow in
/// insertion order.
///
/// ```rust,ignore
/// use parcelhub_core::RegistryBuilder;
///
/// let registry = RegistryBuilder::from_env()?
///     .with_settings_store(store)
///     .build()?;
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    config: ShippingConfig,
    carriers: Vec<Arc<dyn Carrier>>,
    http_client: Option<Arc<dyn HttpClient>>,
    settings: Option<Arc<dyn SettingsStore>>,
    health: HealthConfig,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ShippingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Builder seeded from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::from_config(ShippingConfig::from_env()?))
    }

    pub fn with_sendcloud(mut self, credentials: CarrierCredentials) -> Self {
        self.config.sendcloud = Some(credentials);
        self
    }

    pub fn with_dhl(mut self, credentials: CarrierCredentials) -> Self {
        self.config.dhl = Some(credentials);
        self
    }

    pub fn with_ups(mut self, credentials: CarrierCredentials) -> Self {
        self.config.ups = Some(credentials);
        self
    }

    /// Transport shared by carriers built from credentials. Defaults to reqwest.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_carrier(mut self, carrier: Arc<dyn Carrier>) -> Self {
        self.carriers.push(carrier);
        self
    }

    pub fn with_settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.config.default_provider = Some(name.into());
        self
    }

    pub fn with_health_config(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn config(&self) -> &ShippingConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Fails when UPS credentials lack an account number.
    pub fn build(self) -> Result<ProviderRegistry, ConfigError> {
        let http_client: Arc<dyn HttpClient> = match self.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::new()),
        };
        let call_timeout = self.config.call_timeout;

        let mut carriers: Vec<Arc<dyn Carrier>> = Vec::new();
        if let Some(credentials) = self.config.sendcloud {
            carriers.push(Arc::new(
                SendcloudCarrier::new(credentials, Arc::clone(&http_client)).with_policy(
                    CarrierPolicy::sendcloud_default().with_call_timeout(call_timeout),
                ),
            ));
        }
        if let Some(credentials) = self.config.dhl {
            carriers.push(Arc::new(
                DhlCarrier::new(credentials, Arc::clone(&http_client))
                    .with_policy(CarrierPolicy::dhl_default().with_call_timeout(call_timeout)),
            ));
        }
        if let Some(credentials) = self.config.ups {
            carriers.push(Arc::new(
                UpsCarrier::new(credentials, Arc::clone(&http_client))?
                    .with_policy(CarrierPolicy::ups_default().with_call_timeout(call_timeout)),
            ));
        }
        carriers.extend(self.carriers);

        Ok(ProviderRegistry::assemble(
            carriers,
            self.settings,
            self.config.default_provider,
            self.health,
        ))
    }
}
