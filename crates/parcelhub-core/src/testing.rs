//! In-process carrier double for service, registry and probe tests.
//!
//! [`StubCarrier`] answers every operation from canned values, counts calls,
//! and can be slowed down to exercise timeouts and the tracking race.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::carrier::{AddressValidation, AuthCheck, Carrier, CarrierError, CarrierFuture};
use crate::domain::{
    Address, Label, RateQuote, RateRequest, ServiceLevel, ShipmentRequest, ShipmentResponse,
    TrackingEvent, TrackingRequest, TrackingResponse, TrackingStatus, UtcDateTime,
};
use crate::fallback::ManualPricing;
use crate::ProviderId;

#[derive(Debug, Default)]
struct CallCounters {
    rates: AtomicUsize,
    shipments: AtomicUsize,
    tracking: AtomicUsize,
    addresses: AtomicUsize,
    auth: AtomicUsize,
}

#[derive(Debug)]
pub struct StubCarrier {
    provider: ProviderId,
    rates: Result<Vec<RateQuote>, CarrierError>,
    shipment_error: Option<CarrierError>,
    tracking_status: Option<TrackingStatus>,
    address: Result<AddressValidation, CarrierError>,
    authenticated: AtomicBool,
    manual_pricing: Option<ManualPricing>,
    delay: Option<Duration>,
    calls: CallCounters,
    last_shipment: Mutex<Option<ShipmentRequest>>,
}

impl StubCarrier {
    /// A healthy carrier: no offers, bookings succeed, tracking unknown,
    /// addresses valid, credentials accepted.
    ///
    /// # Panics
    ///
    /// Panics when `provider` is not a valid provider name.
    pub fn new(provider: &str) -> Self {
        Self {
            provider: ProviderId::parse(provider).expect("stub provider name must be valid"),
            rates: Ok(Vec::new()),
            shipment_error: None,
            tracking_status: None,
            address: Ok(AddressValidation::valid()),
            authenticated: AtomicBool::new(true),
            manual_pricing: None,
            delay: None,
            calls: CallCounters::default(),
            last_shipment: Mutex::new(None),
        }
    }

    pub fn with_rates(mut self, quotes: Vec<RateQuote>) -> Self {
        self.rates = Ok(quotes);
        self
    }

    pub fn failing_rates(mut self, error: CarrierError) -> Self {
        self.rates = Err(error);
        self
    }

    pub fn failing_shipments(mut self, error: CarrierError) -> Self {
        self.shipment_error = Some(error);
        self
    }

    /// Tracking lookups report `status`; without it they degrade to UNKNOWN.
    pub fn with_tracking_status(mut self, status: TrackingStatus) -> Self {
        self.tracking_status = Some(status);
        self
    }

    pub fn with_address_result(mut self, result: Result<AddressValidation, CarrierError>) -> Self {
        self.address = result;
        self
    }

    pub fn with_manual_pricing(mut self, pricing: ManualPricing) -> Self {
        self.manual_pricing = Some(pricing);
        self
    }

    /// Every operation sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// A quote from this carrier, for building canned rate lists.
    ///
    /// # Panics
    ///
    /// Panics on a negative amount or an invalid currency code.
    pub fn quote(&self, level: ServiceLevel, amount: f64, currency: &str) -> RateQuote {
        RateQuote::new(
            self.provider.clone(),
            level,
            level.as_str().to_ascii_lowercase(),
            amount,
            currency,
            format!("{}-{}", self.provider, level.as_str().to_ascii_lowercase()),
        )
        .expect("stub quote must be valid")
    }

    pub fn rate_calls(&self) -> usize {
        self.calls.rates.load(Ordering::SeqCst)
    }

    pub fn shipment_calls(&self) -> usize {
        self.calls.shipments.load(Ordering::SeqCst)
    }

    pub fn tracking_calls(&self) -> usize {
        self.calls.tracking.load(Ordering::SeqCst)
    }

    pub fn address_calls(&self) -> usize {
        self.calls.addresses.load(Ordering::SeqCst)
    }

    pub fn auth_calls(&self) -> usize {
        self.calls.auth.load(Ordering::SeqCst)
    }

    /// The most recent booking request this carrier received.
    pub fn last_shipment(&self) -> Option<ShipmentRequest> {
        self.last_shipment
            .lock()
            .expect("stub shipment log should not be poisoned")
            .clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Carrier for StubCarrier {
    fn provider_name(&self) -> ProviderId {
        self.provider.clone()
    }

    fn get_rates<'a>(
        &'a self,
        _req: RateRequest,
    ) -> CarrierFuture<'a, Result<Vec<RateQuote>, CarrierError>> {
        Box::pin(async move {
            self.calls.rates.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.rates.clone()
        })
    }

    fn create_shipment<'a>(
        &'a self,
        req: ShipmentRequest,
    ) -> CarrierFuture<'a, Result<ShipmentResponse, CarrierError>> {
        Box::pin(async move {
            let call = self.calls.shipments.fetch_add(1, Ordering::SeqCst) + 1;
            *self
                .last_shipment
                .lock()
                .expect("stub shipment log should not be poisoned") = Some(req.clone());
            self.pause().await;
            if let Some(error) = &self.shipment_error {
                return Err(error.clone());
            }
            let response = ShipmentResponse::new(
                self.provider.clone(),
                format!("{}-TRK-{call}", self.provider.as_str().to_ascii_uppercase()),
                Label::Url {
                    url: format!("https://labels.example/{}/{call}.pdf", self.provider),
                },
                format!("{}-shp-{call}", self.provider),
                10.0 * req.packages.len() as f64,
                "EUR",
            )?;
            Ok(response)
        })
    }

    fn track_shipment<'a>(&'a self, req: TrackingRequest) -> CarrierFuture<'a, TrackingResponse> {
        Box::pin(async move {
            self.calls.tracking.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            match self.tracking_status {
                Some(status) => TrackingResponse::from_events(
                    self.provider.clone(),
                    req.tracking_number,
                    vec![TrackingEvent {
                        timestamp: UtcDateTime::now(),
                        status,
                        location: None,
                        description: status.as_str().to_owned(),
                    }],
                    None,
                ),
                None => TrackingResponse::degraded(
                    self.provider.clone(),
                    req.tracking_number,
                    "tracking number not found",
                ),
            }
        })
    }

    fn validate_address<'a>(
        &'a self,
        _address: Address,
    ) -> CarrierFuture<'a, Result<AddressValidation, CarrierError>> {
        Box::pin(async move {
            self.calls.addresses.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.address.clone()
        })
    }

    fn test_authentication<'a>(&'a self) -> CarrierFuture<'a, AuthCheck> {
        Box::pin(async move {
            self.calls.auth.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            if self.authenticated.load(Ordering::SeqCst) {
                AuthCheck::ok("stub credentials accepted")
            } else {
                AuthCheck::failed("stub credentials rejected")
            }
        })
    }

    fn manual_pricing(&self) -> Option<ManualPricing> {
        self.manual_pricing.clone()
    }
}
