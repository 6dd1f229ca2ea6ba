//! Shipping service: the four operations consumers call.
//!
//! | Operation | Provider selection | Failure handling |
//! |-----------|--------------------|------------------|
//! | [`ShippingService::get_rates`] | named carrier, or fan-out to all | failed carrier contributes no quotes |
//! | [`ShippingService::create_shipment`] | registry resolution chain | typed error, or manual booking when opted in |
//! | [`ShippingService::track_shipment`] | named carrier, or race all | degraded UNKNOWN response |
//! | [`ShippingService::validate_address`] | registry resolution chain | demote and fail over, bounded by the carrier count |
//!
//! Every carrier call carries its own timeout.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::RateCache;
use crate::carrier::{AddressValidation, Carrier, CarrierError, CarrierErrorKind};
use crate::config::{ShippingConfig, DEFAULT_CALL_TIMEOUT};
use crate::domain::{
    Address, LabelFormat, PackageDetails, RateQuote, RateRequest, ServiceLevel, ShipmentRequest,
    ShipmentResponse, ShippingAddress, TrackingRequest, TrackingResponse, TrackingStatus,
};
use crate::fallback::{is_manual_tracking_number, manual_booking};
use crate::registry::ProviderRegistry;
use crate::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound for a single carrier call.
    pub call_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    pub fn from_config(config: &ShippingConfig) -> Self {
        Self {
            call_timeout: config.call_timeout,
        }
    }
}

/// Caller-facing booking input. The service level is the generic name
/// (`standard`, `express`, `priority`, `economy`), case-insensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateShipmentOptions {
    pub shipper: ShippingAddress,
    pub recipient: ShippingAddress,
    pub packages: Vec<PackageDetails>,
    pub service_level: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub rate_id: Option<String>,
    #[serde(default)]
    pub label_format: Option<LabelFormat>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub insured_value: Option<f64>,
    #[serde(default)]
    pub residential: Option<bool>,
    /// Book a placeholder with heuristic pricing when the live booking fails.
    #[serde(default)]
    pub allow_manual_fallback: bool,
}

impl CreateShipmentOptions {
    fn into_request(self) -> Result<ShipmentRequest, CarrierError> {
        let service_level = self.service_level.parse::<ServiceLevel>()?;
        let mut request =
            ShipmentRequest::new(self.shipper, self.recipient, self.packages, service_level)?;
        if let Some(rate_id) = self.rate_id {
            request = request.with_rate_id(rate_id);
        }
        if let Some(label_format) = self.label_format {
            request = request.with_label_format(label_format);
        }
        if let Some(reference) = self.reference {
            request = request.with_reference(reference);
        }
        if let Some(insured_value) = self.insured_value {
            request = request.with_insured_value(insured_value);
        }
        request.residential = self.residential;
        request.validate()?;
        Ok(request)
    }
}

#[derive(Debug, Clone)]
pub struct ShippingService {
    registry: Arc<ProviderRegistry>,
    cache: RateCache,
    config: ServiceConfig,
}

impl ShippingService {
    pub fn new(registry: Arc<ProviderRegistry>, cache: RateCache, config: ServiceConfig) -> Self {
        Self {
            registry,
            cache,
            config,
        }
    }

    /// Service with a rate cache and call timeout taken from `config`.
    pub fn from_config(registry: Arc<ProviderRegistry>, config: &ShippingConfig) -> Self {
        Self::new(
            registry,
            RateCache::new(config.rate_cache_ttl),
            ServiceConfig::from_config(config),
        )
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Quotes for the request shape, merged across carriers.
    ///
    /// A cache hit short-circuits the fan-out and is filtered by `provider`
    /// afterwards. Only fan-out results are written back, and only when at
    /// least one quote was obtained.
    ///
    /// # Errors
    ///
    /// Invalid requests, unregistered provider names, and the failure of a
    /// named carrier. During a fan-out carrier failures are logged and
    /// contribute no quotes.
    pub async fn get_rates(
        &self,
        req: &RateRequest,
        provider: Option<&str>,
        use_cache: bool,
    ) -> Result<Vec<RateQuote>, CarrierError> {
        req.validate()?;
        let pinned = provider.map(|name| self.registry.carrier(name)).transpose()?;

        if use_cache {
            if let Some(cached) = self.cache.get_cached_rates(req).await {
                let quotes = match &pinned {
                    Some(carrier) => {
                        let id = carrier.provider_name();
                        cached
                            .into_iter()
                            .filter(|quote| quote.provider_name == id)
                            .collect()
                    }
                    None => cached,
                };
                return Ok(quotes);
            }
        }

        if let Some(carrier) = pinned {
            return self.rates_from(carrier, req.clone()).await;
        }

        let quotes = self.fan_out_rates(req).await;
        if use_cache && !quotes.is_empty() {
            self.cache.cache_rates(req, quotes.clone()).await;
        }
        Ok(quotes)
    }

    /// One carrier only: its failure is the caller's answer. The result is not
    /// cached because an entry must hold the quotes of every carrier.
    async fn rates_from(
        &self,
        carrier: Arc<dyn Carrier>,
        req: RateRequest,
    ) -> Result<Vec<RateQuote>, CarrierError> {
        let provider = carrier.provider_name();
        match with_timeout(&provider, self.config.call_timeout, carrier.get_rates(req)).await {
            Ok(quotes) => {
                debug!(provider = %provider, quotes = quotes.len(), "rates received");
                self.registry.record_success(&provider);
                Ok(quotes)
            }
            Err(error) => {
                warn!(provider = %provider, error = %error, "rate lookup failed");
                self.note_failure(&provider, &error);
                Err(error)
            }
        }
    }

    async fn fan_out_rates(&self, req: &RateRequest) -> Vec<RateQuote> {
        let mut tasks = JoinSet::new();
        for (index, carrier) in self.registry.all_carriers().into_iter().enumerate() {
            let request = req.clone();
            let call_timeout = self.config.call_timeout;
            tasks.spawn(async move {
                let provider = carrier.provider_name();
                let outcome = with_timeout(&provider, call_timeout, carrier.get_rates(request)).await;
                (index, provider, outcome)
            });
        }

        let mut per_carrier = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, provider, outcome)) => {
                    per_carrier.push((index, self.settle_rates(&provider, outcome)));
                }
                Err(error) => warn!(error = %error, "rate lookup task aborted"),
            }
        }
        per_carrier.sort_by_key(|(index, _)| *index);
        per_carrier.into_iter().flat_map(|(_, quotes)| quotes).collect()
    }

    fn settle_rates(
        &self,
        provider: &ProviderId,
        outcome: Result<Vec<RateQuote>, CarrierError>,
    ) -> Vec<RateQuote> {
        match outcome {
            Ok(quotes) => {
                debug!(provider = %provider, quotes = quotes.len(), "rates received");
                self.registry.record_success(provider);
                quotes
            }
            Err(error) => {
                warn!(provider = %provider, error = %error, "rate lookup failed, skipping carrier");
                self.note_failure(provider, &error);
                Vec::new()
            }
        }
    }

    /// Books a shipment with the carrier picked by the registry.
    ///
    /// # Errors
    ///
    /// Invalid options, unregistered provider names and carrier failures.
    /// With `allow_manual_fallback`, a failed booking on a carrier that
    /// offers manual pricing yields a `MANUAL-` placeholder instead; input
    /// the carrier rejected as invalid is never papered over.
    pub async fn create_shipment(
        &self,
        options: CreateShipmentOptions,
    ) -> Result<ShipmentResponse, CarrierError> {
        let requested = options.provider.clone();
        let allow_manual_fallback = options.allow_manual_fallback;
        let mut request = options.into_request()?;

        let carrier = self.registry.get_provider(requested.as_deref())?;
        let provider = carrier.provider_name();
        // A rate id is only meaningful to the carrier that issued it.
        if let Some(requested) = requested.as_deref().and_then(|name| ProviderId::parse(name).ok()) {
            if requested != provider {
                warn!(
                    requested = %requested,
                    provider = %provider,
                    rate_id = ?request.rate_id,
                    "requested provider is not working, booking elsewhere without its rate id"
                );
                request.rate_id = None;
            }
        }
        let outcome = with_timeout(
            &provider,
            self.config.call_timeout,
            carrier.create_shipment(request.clone()),
        )
        .await;

        match outcome {
            Ok(response) => {
                info!(
                    provider = %provider,
                    tracking_number = %response.tracking_number,
                    "shipment created"
                );
                self.registry.record_success(&provider);
                Ok(response)
            }
            Err(error) => {
                self.note_failure(&provider, &error);
                let pricing = carrier.manual_pricing();
                match pricing {
                    Some(pricing)
                        if allow_manual_fallback
                            && error.kind() != CarrierErrorKind::InvalidRequest =>
                    {
                        warn!(
                            provider = %provider,
                            error = %error,
                            "live booking failed, falling back to manual booking"
                        );
                        manual_booking(provider, &pricing, &request)
                    }
                    _ => Err(error),
                }
            }
        }
    }

    /// Tracks a parcel.
    ///
    /// With a named provider the lookup goes to that carrier only. Otherwise
    /// all carriers are raced and the first known, non-UNKNOWN answer wins;
    /// when nobody knows the parcel the best unknown answer is returned.
    ///
    /// # Errors
    ///
    /// Empty or manual tracking numbers, unregistered provider names, and an
    /// empty registry.
    pub async fn track_shipment(
        &self,
        tracking_number: &str,
        provider: Option<&str>,
    ) -> Result<TrackingResponse, CarrierError> {
        let request = TrackingRequest::new(tracking_number)?;
        if is_manual_tracking_number(&request.tracking_number) {
            return Err(CarrierError::invalid_request(format!(
                "{} is a manual booking and has no carrier tracking yet",
                request.tracking_number
            )));
        }

        if let Some(name) = provider {
            let carrier = self.registry.carrier(name)?;
            return Ok(track_with_timeout(carrier, request, self.config.call_timeout).await);
        }

        let carriers = self.registry.all_carriers();
        if carriers.is_empty() {
            return Err(CarrierError::no_provider_available(
                "no shipping provider is registered",
            ));
        }

        let mut tasks = JoinSet::new();
        for (index, carrier) in carriers.into_iter().enumerate() {
            let request = request.clone();
            let call_timeout = self.config.call_timeout;
            tasks.spawn(async move { (index, track_with_timeout(carrier, request, call_timeout).await) });
        }

        let mut unresolved: Vec<(usize, TrackingResponse)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, response))
                    if !response.degraded && response.status != TrackingStatus::Unknown =>
                {
                    tasks.abort_all();
                    debug!(provider = %response.provider_name, "tracking race won");
                    self.registry.record_success(&response.provider_name);
                    return Ok(response);
                }
                Ok((index, response)) => unresolved.push((index, response)),
                Err(error) if error.is_cancelled() => {}
                Err(error) => warn!(error = %error, "tracking task aborted"),
            }
        }

        // Nobody resolved the parcel: prefer an honest UNKNOWN over a
        // degraded one, then registration order.
        unresolved.sort_by_key(|(index, response)| (response.degraded, *index));
        unresolved
            .into_iter()
            .map(|(_, response)| response)
            .next()
            .ok_or_else(|| CarrierError::no_provider_available("every tracking lookup was aborted"))
    }

    /// Validates an address.
    ///
    /// A pinned provider is asked once and its failure is returned. Without
    /// one, a failing carrier is demoted and the next resolved carrier is
    /// tried; each carrier is asked at most once.
    ///
    /// # Errors
    ///
    /// Invalid addresses, unregistered provider names, and the last carrier
    /// failure once every candidate has been tried.
    pub async fn validate_address(
        &self,
        address: &Address,
        provider: Option<&str>,
    ) -> Result<AddressValidation, CarrierError> {
        address.validate()?;

        if let Some(name) = provider {
            let carrier = self.registry.carrier(name)?;
            let id = carrier.provider_name();
            let outcome = with_timeout(
                &id,
                self.config.call_timeout,
                carrier.validate_address(address.clone()),
            )
            .await;
            return match outcome {
                Ok(validation) => {
                    self.registry.record_success(&id);
                    Ok(validation)
                }
                Err(error) => {
                    self.note_failure(&id, &error);
                    Err(error)
                }
            };
        }

        let mut tried = HashSet::new();
        let mut last_error = None;
        for _ in 0..self.registry.len() {
            let carrier = self.registry.get_provider(None)?;
            let id = carrier.provider_name();
            if !tried.insert(id.clone()) {
                break;
            }

            let outcome = with_timeout(
                &id,
                self.config.call_timeout,
                carrier.validate_address(address.clone()),
            )
            .await;
            match outcome {
                Ok(validation) => {
                    self.registry.record_success(&id);
                    return Ok(validation);
                }
                Err(error) if error.kind() == CarrierErrorKind::InvalidRequest => return Err(error),
                Err(error) => {
                    warn!(provider = %id, error = %error, "address validation failed, failing over");
                    self.registry.mark_provider_as_not_working(&id);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CarrierError::no_provider_available("no shipping provider is registered")
        }))
    }

    /// Health bookkeeping for a failed call. Rejected input says nothing about
    /// the carrier's health.
    fn note_failure(&self, provider: &ProviderId, error: &CarrierError) {
        if error.kind() == CarrierErrorKind::InvalidRequest {
            return;
        }
        self.registry.record_failure(provider, error);
    }
}

async fn with_timeout<T, F>(
    provider: &ProviderId,
    call_timeout: Duration,
    call: F,
) -> Result<T, CarrierError>
where
    F: Future<Output = Result<T, CarrierError>>,
{
    match tokio::time::timeout(call_timeout, call).await {
        Ok(outcome) => outcome,
        Err(_) => Err(CarrierError::timeout(
            provider,
            call_timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        )),
    }
}

async fn track_with_timeout(
    carrier: Arc<dyn Carrier>,
    request: TrackingRequest,
    call_timeout: Duration,
) -> TrackingResponse {
    let provider = carrier.provider_name();
    let tracking_number = request.tracking_number.clone();
    match tokio::time::timeout(call_timeout, carrier.track_shipment(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(provider = %provider, tracking_number = %tracking_number, "tracking lookup timed out");
            TrackingResponse::degraded(
                provider.clone(),
                tracking_number,
                CarrierError::timeout(&provider, call_timeout.as_millis() as u64).to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubCarrier;

    fn party() -> ShippingAddress {
        ShippingAddress::new(
            "Shop",
            Address::new("Meir 10", "Antwerpen", "2000", "BE").expect("valid address"),
        )
        .expect("valid party")
    }

    fn options(service_level: &str) -> CreateShipmentOptions {
        CreateShipmentOptions {
            shipper: party(),
            recipient: party(),
            packages: vec![PackageDetails::new(2.0, 20.0, 15.0, 10.0).expect("valid package")],
            service_level: service_level.to_owned(),
            provider: None,
            rate_id: None,
            label_format: None,
            reference: Some(String::from("order-1001")),
            insured_value: None,
            residential: None,
            allow_manual_fallback: false,
        }
    }

    fn service(carriers: Vec<Arc<dyn Carrier>>) -> ShippingService {
        ShippingService::new(
            Arc::new(ProviderRegistry::new(carriers)),
            RateCache::default(),
            ServiceConfig {
                call_timeout: Duration::from_millis(200),
            },
        )
    }

    #[test]
    fn options_map_generic_service_level_names() {
        let request = options("Express").into_request().expect("valid options");
        assert_eq!(request.service_level, ServiceLevel::Express);
        assert_eq!(request.reference.as_deref(), Some("order-1001"));

        let error = options("overnight").into_request().expect_err("unknown level");
        assert_eq!(error.kind(), CarrierErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn slow_carrier_times_out_without_blocking_the_fan_out() {
        let fast = StubCarrier::new("fast");
        let quote = fast.quote(ServiceLevel::Standard, 5.0, "EUR");
        let fast: Arc<dyn Carrier> = Arc::new(fast.with_rates(vec![quote]));
        let slow: Arc<dyn Carrier> = Arc::new(
            StubCarrier::new("slow")
                .with_rates(Vec::new())
                .with_delay(Duration::from_secs(5)),
        );
        let service = service(vec![slow, fast]);
        let request = RateRequest::new(party(), party(), options("standard").packages)
            .expect("valid request");

        let quotes = service.get_rates(&request, None, false).await.expect("rates");

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].provider_name.as_str(), "fast");
    }

    #[tokio::test]
    async fn invalid_request_does_not_count_against_health() {
        let carrier: Arc<dyn Carrier> = Arc::new(
            StubCarrier::new("alpha")
                .failing_shipments(CarrierError::invalid_request("postal code rejected")),
        );
        let service = service(vec![carrier]);

        for _ in 0..5 {
            let error = service
                .create_shipment(options("standard"))
                .await
                .expect_err("rejected booking");
            assert_eq!(error.kind(), CarrierErrorKind::InvalidRequest);
        }

        let id = ProviderId::parse("alpha").expect("valid");
        assert!(service.registry().is_working(&id));
    }

    #[tokio::test]
    async fn manual_tracking_numbers_are_rejected() {
        let carrier: Arc<dyn Carrier> = Arc::new(StubCarrier::new("alpha"));
        let service = service(vec![carrier]);

        let error = service
            .track_shipment("MANUAL-ABC123", None)
            .await
            .expect_err("manual booking");

        assert_eq!(error.kind(), CarrierErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn tracking_without_carriers_is_an_error() {
        let service = service(Vec::new());

        let error = service.track_shipment("1Z999", None).await.expect_err("empty");

        assert_eq!(error.kind(), CarrierErrorKind::NoProviderAvailable);
    }
}
