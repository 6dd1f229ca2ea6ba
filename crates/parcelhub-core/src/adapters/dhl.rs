use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{base_url, json_body, parse_json, send};
use crate::carrier::{
    AddressValidation, AuthCheck, Carrier, CarrierError, CarrierErrorKind, CarrierFuture,
};
use crate::config::CarrierCredentials;
use crate::domain::{
    Address, Label, LabelFormat, PackageDetails, RateQuote, RateRequest, ServiceLevel,
    ShipmentRequest, ShipmentResponse, ShippingAddress, TrackingEvent, TrackingRequest,
    TrackingResponse, TrackingStatus, UtcDateTime,
};
use crate::fallback::ManualPricing;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse};
use crate::policy::CarrierPolicy;
use crate::throttling::ThrottlingQueue;
use crate::{ProviderId, ValidationError};

const DEFAULT_BASE_URL: &str = "https://api-eu.dhl.com";

const MANUAL_PRICING: ManualPricing = ManualPricing::new(7.49, 0.95, "EUR");

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Longer advertised token lifetimes are cut to this.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

const SERVICE_TABLE: &[(&str, ServiceLevel)] = &[
    ("V01PAK", ServiceLevel::Standard),
    ("V53WPAK", ServiceLevel::Standard),
    ("V54EPAK", ServiceLevel::Standard),
    ("V62WP", ServiceLevel::Economy),
    ("V66WPI", ServiceLevel::Economy),
    ("W", ServiceLevel::Economy),
    ("H", ServiceLevel::Economy),
    ("N", ServiceLevel::Express),
    ("P", ServiceLevel::Express),
    ("U", ServiceLevel::Express),
    ("D", ServiceLevel::Express),
    ("T", ServiceLevel::Priority),
    ("K", ServiceLevel::Priority),
    ("Y", ServiceLevel::Priority),
];

const STATUS_TABLE: &[(&str, TrackingStatus)] = &[
    ("pre-transit", TrackingStatus::Created),
    ("picked-up", TrackingStatus::PickedUp),
    ("transit", TrackingStatus::InTransit),
    ("out-for-delivery", TrackingStatus::OutForDelivery),
    ("delivered", TrackingStatus::Delivered),
    ("failure", TrackingStatus::Exception),
    ("returned", TrackingStatus::Exception),
];

fn service_level_for(product_code: &str) -> ServiceLevel {
    let code = product_code.trim().to_ascii_uppercase();
    SERVICE_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map_or(ServiceLevel::Standard, |(_, level)| *level)
}

fn product_code_for(level: ServiceLevel) -> &'static str {
    match level {
        ServiceLevel::Standard => "V01PAK",
        ServiceLevel::Express => "P",
        ServiceLevel::Priority => "K",
        ServiceLevel::Economy => "V62WP",
    }
}

fn tracking_status_for(status_code: &str) -> TrackingStatus {
    let code = status_code.trim().to_ascii_lowercase().replace('_', "-");
    STATUS_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map_or(TrackingStatus::Unknown, |(_, status)| *status)
}

/// DHL sometimes omits the offset; those timestamps are UTC.
fn parse_timestamp(value: &str) -> Result<UtcDateTime, ValidationError> {
    UtcDateTime::parse_lenient(value).or_else(|error| {
        if value.contains('T') {
            UtcDateTime::parse_lenient(&format!("{}Z", value.trim()))
        } else {
            Err(error)
        }
    })
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// DHL carrier using OAuth2 client credentials.
///
/// The access token is shared by clones and refreshed by one caller at a time.
#[derive(Clone)]
pub struct DhlCarrier {
    http_client: Arc<dyn HttpClient>,
    client_id: String,
    client_secret: String,
    base_url: String,
    policy: CarrierPolicy,
    throttle: ThrottlingQueue,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl DhlCarrier {
    pub fn new(credentials: CarrierCredentials, http_client: Arc<dyn HttpClient>) -> Self {
        let policy = CarrierPolicy::dhl_default();
        Self {
            http_client,
            client_id: credentials.api_key,
            client_secret: credentials.api_secret,
            base_url: base_url(credentials.base_url.as_deref(), DEFAULT_BASE_URL),
            throttle: ThrottlingQueue::from_policy(&policy),
            policy,
            token: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_policy(mut self, policy: CarrierPolicy) -> Self {
        self.throttle = ThrottlingQueue::from_policy(&policy);
        self.policy = policy;
        self
    }

    fn id() -> ProviderId {
        ProviderId::from_static(ProviderId::DHL)
    }

    async fn access_token(&self) -> Result<String, CarrierError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        let fresh = self.request_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<CachedToken, CarrierError> {
        let provider = Self::id();
        let request = HttpRequest::post(format!("{}/auth/v1/token", self.base_url))
            .with_form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .with_timeout_ms(self.policy.timeout_ms());
        let response = send(&provider, self.http_client.as_ref(), &self.throttle, request).await?;
        let token: TokenResponse = parse_json(&provider, &response.body)?;
        if token.access_token.trim().is_empty() {
            return Err(CarrierError::authentication("dhl token endpoint returned an empty token"));
        }
        debug!(expires_in = token.expires_in, "dhl access token issued");
        let lifetime = Duration::from_secs(token.expires_in).min(MAX_TOKEN_LIFETIME);
        let expires_at = Instant::now().checked_add(lifetime).ok_or_else(|| {
            CarrierError::malformed_response(format!(
                "dhl token lifetime of {}s is out of range",
                token.expires_in
            ))
        })?;
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn call(&self, request: HttpRequest) -> Result<HttpResponse, CarrierError> {
        let token = self.access_token().await?;
        let request = request
            .with_auth(&HttpAuth::BearerToken(token))
            .with_timeout_ms(self.policy.timeout_ms());
        let result = send(&Self::id(), self.http_client.as_ref(), &self.throttle, request).await;
        if matches!(&result, Err(error) if error.is_authentication()) {
            // A revoked token must not be reused by the next call.
            self.invalidate_token().await;
        }
        result
    }

    async fn fetch_rates(&self, req: &RateRequest) -> Result<Vec<RateQuote>, CarrierError> {
        let provider = Self::id();
        req.validate()?;

        let payload = RateQuery {
            customer_details: CustomerDetails {
                shipper_details: Endpoint::from(&req.shipper),
                receiver_details: Endpoint::from(&req.recipient),
            },
            packages: req.packages.iter().map(WirePackage::from).collect(),
            unit_of_measurement: "metric",
            product_code: req.service_level.map(product_code_for),
        };
        let request = json_body(
            &provider,
            HttpRequest::post(format!("{}/rates/v1/quotes", self.base_url)),
            &payload,
        )?;
        let response = self.call(request).await?;
        let products: RateResponse = parse_json(&provider, &response.body)?;

        let mut quotes = Vec::new();
        for product in products.products {
            let level = service_level_for(&product.product_code);
            if req.service_level.is_some_and(|wanted| wanted != level) {
                continue;
            }
            let Some(price) = product.total_price.into_iter().next() else {
                continue;
            };
            let delivery = product.delivery_capabilities.unwrap_or_default();
            let quote = RateQuote::new(
                provider.clone(),
                level,
                product.product_code.clone(),
                price.price,
                price.price_currency.to_ascii_uppercase(),
                product.product_code,
            )?
            .with_transit_days(delivery.total_transit_days)
            .with_delivery_date(
                delivery
                    .estimated_delivery_date_and_time
                    .as_deref()
                    .and_then(|value| parse_timestamp(value).ok()),
            );
            quotes.push(quote);
        }
        Ok(quotes)
    }

    async fn book(&self, req: &ShipmentRequest) -> Result<ShipmentResponse, CarrierError> {
        let provider = Self::id();
        req.validate()?;

        let product_code = req
            .rate_id
            .clone()
            .unwrap_or_else(|| product_code_for(req.service_level).to_owned());
        let payload = ShipmentOrder {
            product_code: &product_code,
            shipper: Party::from(&req.shipper),
            receiver: Party::from(&req.recipient),
            packages: req.packages.iter().map(WirePackage::from).collect(),
            label_format: label_format_code(req.label_format),
            reference: req.reference.as_deref(),
            insured_value: req.insured_value,
        };
        let request = json_body(
            &provider,
            HttpRequest::post(format!("{}/shipments/v1", self.base_url)),
            &payload,
        )?;
        let response = self.call(request).await?;
        let created: ShipmentCreated = parse_json(&provider, &response.body)?;

        let document = created.documents.into_iter().next().ok_or_else(|| {
            CarrierError::malformed_response("dhl shipment was created without a label document")
        })?;
        let format = document
            .image_format
            .as_deref()
            .and_then(|value| value.parse::<LabelFormat>().ok())
            .unwrap_or(req.label_format);
        let price = created.total_price.into_iter().next().ok_or_else(|| {
            CarrierError::malformed_response("dhl shipment response carries no price")
        })?;

        let shipment_id = created
            .shipment_id
            .unwrap_or_else(|| created.shipment_tracking_number.clone());
        let estimated_delivery = created
            .estimated_delivery_date
            .as_deref()
            .and_then(|value| parse_timestamp(value).ok());

        Ok(ShipmentResponse::new(
            provider,
            created.shipment_tracking_number,
            Label::Document {
                format,
                base64: document.content,
            },
            shipment_id,
            price.price,
            price.price_currency.to_ascii_uppercase(),
        )?
        .with_estimated_delivery(estimated_delivery))
    }

    async fn fetch_tracking(&self, req: &TrackingRequest) -> Result<TrackingResponse, CarrierError> {
        let provider = Self::id();
        let mut url = format!(
            "{}/track/shipments?trackingNumber={}",
            self.base_url,
            urlencoding::encode(&req.tracking_number)
        );
        if let Some(postal_code) = &req.postal_code {
            url.push_str("&recipientPostalCode=");
            url.push_str(&urlencoding::encode(postal_code));
        }
        let response = self.call(HttpRequest::get(url)).await?;
        let payload: TrackingPayload = parse_json(&provider, &response.body)?;
        let shipment = payload.shipments.into_iter().next().ok_or_else(|| {
            CarrierError::invalid_request(format!(
                "dhl does not know tracking number {}",
                req.tracking_number
            ))
        })?;

        let wire_events = if shipment.events.is_empty() {
            shipment.status.into_iter().collect()
        } else {
            shipment.events
        };
        let events = wire_events
            .into_iter()
            .map(|event| -> Result<TrackingEvent, ValidationError> {
                Ok(TrackingEvent {
                    timestamp: parse_timestamp(&event.timestamp)?,
                    status: tracking_status_for(&event.status_code),
                    location: event
                        .location
                        .and_then(|location| location.address)
                        .and_then(|address| address.address_locality),
                    description: event
                        .description
                        .or(event.status)
                        .unwrap_or_else(|| event.status_code.clone()),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| CarrierError::malformed_response(format!("dhl tracking event: {error}")))?;

        let estimated_delivery = shipment
            .estimated_time_of_delivery
            .as_deref()
            .and_then(|value| parse_timestamp(value).ok());

        Ok(TrackingResponse::from_events(
            provider,
            req.tracking_number.clone(),
            events,
            estimated_delivery,
        ))
    }

    async fn check_address(&self, address: &Address) -> Result<AddressValidation, CarrierError> {
        let provider = Self::id();
        let url = format!(
            "{}/location-finder/v1/find-by-address?countryCode={}&postalCode={}&addressLocality={}",
            self.base_url,
            urlencoding::encode(&address.country),
            urlencoding::encode(&address.postal_code),
            urlencoding::encode(&address.city),
        );
        let response = match self.call(HttpRequest::get(url)).await {
            Ok(response) => response,
            // DHL answers unknown postal code / city combinations with 400 or 404.
            Err(error) if error.kind() == CarrierErrorKind::InvalidRequest => {
                return Ok(AddressValidation::invalid(vec![error.message().to_owned()]));
            }
            Err(error) => return Err(error),
        };
        let payload: LocationPayload = parse_json(&provider, &response.body)?;

        if payload.locations.is_empty() {
            return Ok(AddressValidation::invalid(vec![String::from(
                "dhl knows no service area for this postal code and city",
            )]));
        }
        Ok(AddressValidation::valid())
    }
}

fn label_format_code(format: LabelFormat) -> &'static str {
    match format {
        LabelFormat::Pdf => "PDF",
        LabelFormat::Zpl => "ZPL",
        LabelFormat::Png => "PNG",
    }
}

impl Carrier for DhlCarrier {
    fn provider_name(&self) -> ProviderId {
        Self::id()
    }

    fn get_rates<'a>(
        &'a self,
        req: RateRequest,
    ) -> CarrierFuture<'a, Result<Vec<RateQuote>, CarrierError>> {
        Box::pin(async move { self.fetch_rates(&req).await })
    }

    fn create_shipment<'a>(
        &'a self,
        req: ShipmentRequest,
    ) -> CarrierFuture<'a, Result<ShipmentResponse, CarrierError>> {
        Box::pin(async move { self.book(&req).await })
    }

    fn track_shipment<'a>(&'a self, req: TrackingRequest) -> CarrierFuture<'a, TrackingResponse> {
        Box::pin(async move {
            match self.fetch_tracking(&req).await {
                Ok(response) => response,
                Err(error) => {
                    warn!(
                        provider = %Self::id(),
                        tracking_number = %req.tracking_number,
                        error = %error,
                        "tracking lookup degraded"
                    );
                    TrackingResponse::degraded(Self::id(), req.tracking_number, error.to_string())
                }
            }
        })
    }

    fn validate_address<'a>(
        &'a self,
        address: Address,
    ) -> CarrierFuture<'a, Result<AddressValidation, CarrierError>> {
        Box::pin(async move { self.check_address(&address).await })
    }

    fn test_authentication<'a>(&'a self) -> CarrierFuture<'a, AuthCheck> {
        Box::pin(async move {
            self.invalidate_token().await;
            match self.access_token().await {
                Ok(_) => AuthCheck::ok("dhl issued an access token"),
                Err(error) => AuthCheck::failed(error.to_string()),
            }
        })
    }

    fn manual_pricing(&self) -> Option<ManualPricing> {
        Some(MANUAL_PRICING)
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds.
    expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateQuery<'a> {
    customer_details: CustomerDetails<'a>,
    packages: Vec<WirePackage>,
    unit_of_measurement: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomerDetails<'a> {
    shipper_details: Endpoint<'a>,
    receiver_details: Endpoint<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Endpoint<'a> {
    postal_code: &'a str,
    city_name: &'a str,
    country_code: &'a str,
}

impl<'a> From<&'a ShippingAddress> for Endpoint<'a> {
    fn from(party: &'a ShippingAddress) -> Self {
        Self {
            postal_code: &party.address.postal_code,
            city_name: &party.address.city,
            country_code: &party.address.country,
        }
    }
}

#[derive(Debug, Serialize)]
struct WirePackage {
    weight: f64,
    dimensions: WireDimensions,
}

#[derive(Debug, Serialize)]
struct WireDimensions {
    length: f64,
    width: f64,
    height: f64,
}

impl From<&PackageDetails> for WirePackage {
    fn from(package: &PackageDetails) -> Self {
        Self {
            weight: package.weight_kg,
            dimensions: WireDimensions {
                length: package.length_cm,
                width: package.width_cm,
                height: package.height_cm,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    product_code: String,
    #[serde(default)]
    total_price: Vec<Price>,
    #[serde(default)]
    delivery_capabilities: Option<DeliveryCapabilities>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Price {
    price: f64,
    price_currency: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveryCapabilities {
    #[serde(default)]
    total_transit_days: Option<u32>,
    #[serde(default)]
    estimated_delivery_date_and_time: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentOrder<'a> {
    product_code: &'a str,
    shipper: Party<'a>,
    receiver: Party<'a>,
    packages: Vec<WirePackage>,
    label_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    insured_value: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Party<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    company_name: Option<&'a str>,
    address_line1: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address_line2: Option<&'a str>,
    postal_code: &'a str,
    city_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    province_code: Option<&'a str>,
    country_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

impl<'a> From<&'a ShippingAddress> for Party<'a> {
    fn from(party: &'a ShippingAddress) -> Self {
        Self {
            name: &party.name,
            company_name: party.company.as_deref(),
            address_line1: &party.address.line1,
            address_line2: party.address.line2.as_deref(),
            postal_code: &party.address.postal_code,
            city_name: &party.address.city,
            province_code: party.address.state.as_deref(),
            country_code: &party.address.country,
            phone: party.phone.as_deref(),
            email: party.email.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentCreated {
    shipment_tracking_number: String,
    #[serde(default)]
    shipment_id: Option<String>,
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    total_price: Vec<Price>,
    #[serde(default)]
    estimated_delivery_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    image_format: Option<String>,
    content: String,
}

#[derive(Debug, Deserialize)]
struct TrackingPayload {
    #[serde(default)]
    shipments: Vec<TrackedShipment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackedShipment {
    #[serde(default)]
    status: Option<WireEvent>,
    #[serde(default)]
    estimated_time_of_delivery: Option<String>,
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    timestamp: String,
    status_code: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<WireLocation>,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    #[serde(default)]
    address: Option<WireLocationAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLocationAddress {
    #[serde(default)]
    address_locality: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    #[serde(default)]
    locations: Vec<serde_json::Value>,
}
