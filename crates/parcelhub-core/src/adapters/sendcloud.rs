use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{base_url, country_code, json_body, parse_amount, parse_json, send};
use crate::carrier::{AddressValidation, AuthCheck, Carrier, CarrierError, CarrierFuture};
use crate::config::CarrierCredentials;
use crate::domain::{
    total_weight_kg, Address, Label, PackageDetails, RateQuote, RateRequest, ServiceLevel,
    ShipmentRequest, ShipmentResponse, TrackingEvent, TrackingRequest, TrackingResponse,
    TrackingStatus, UtcDateTime,
};
use crate::fallback::ManualPricing;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse};
use crate::policy::CarrierPolicy;
use crate::throttling::ThrottlingQueue;
use crate::ProviderId;

const DEFAULT_BASE_URL: &str = "https://panel.sendcloud.sc/api/v2";

const MANUAL_PRICING: ManualPricing = ManualPricing::new(6.95, 0.85, "EUR");

/// Shipping-method family (the part after `carrier:` in a method code).
const SERVICE_TABLE: &[(&str, ServiceLevel)] = &[
    ("standard", ServiceLevel::Standard),
    ("home", ServiceLevel::Standard),
    ("parcel", ServiceLevel::Standard),
    ("classic", ServiceLevel::Standard),
    ("express", ServiceLevel::Express),
    ("express_saver", ServiceLevel::Express),
    ("next_day", ServiceLevel::Express),
    ("priority", ServiceLevel::Priority),
    ("same_day", ServiceLevel::Priority),
    ("sameday", ServiceLevel::Priority),
    ("express_9", ServiceLevel::Priority),
    ("express_12", ServiceLevel::Priority),
    ("economy", ServiceLevel::Economy),
    ("mailbox", ServiceLevel::Economy),
    ("letterbox", ServiceLevel::Economy),
];

/// Parcel `parent_status` values.
const STATUS_TABLE: &[(&str, TrackingStatus)] = &[
    ("announced", TrackingStatus::Created),
    ("ready_to_send", TrackingStatus::Created),
    ("awaiting_pickup", TrackingStatus::Created),
    ("picked_up", TrackingStatus::PickedUp),
    ("collected_by_carrier", TrackingStatus::PickedUp),
    ("in_transit", TrackingStatus::InTransit),
    ("at_sorting_centre", TrackingStatus::InTransit),
    ("at_customs", TrackingStatus::InTransit),
    ("out_for_delivery", TrackingStatus::OutForDelivery),
    ("driver_en_route", TrackingStatus::OutForDelivery),
    ("delivered", TrackingStatus::Delivered),
    ("delivered_at_service_point", TrackingStatus::Delivered),
    ("delivery_failed", TrackingStatus::Exception),
    ("exception", TrackingStatus::Exception),
    ("returned_to_sender", TrackingStatus::Exception),
    ("cancelled", TrackingStatus::Exception),
];

fn service_level_for(method_code: &str) -> ServiceLevel {
    let family = method_code
        .split_once(':')
        .map_or(method_code, |(_, family)| family);
    let family = family.split('/').next().unwrap_or(family).to_ascii_lowercase();
    SERVICE_TABLE
        .iter()
        .find(|(code, _)| *code == family)
        .map_or(ServiceLevel::Standard, |(_, level)| *level)
}

fn tracking_status_for(parent_status: &str) -> TrackingStatus {
    let normalized = parent_status.trim().to_ascii_lowercase().replace('-', "_");
    STATUS_TABLE
        .iter()
        .find(|(code, _)| *code == normalized)
        .map_or(TrackingStatus::Unknown, |(_, status)| *status)
}

/// Sendcloud carrier, authenticated with the public / secret key pair as
/// Basic credentials.
#[derive(Clone)]
pub struct SendcloudCarrier {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    policy: CarrierPolicy,
    throttle: ThrottlingQueue,
}

impl SendcloudCarrier {
    pub fn new(credentials: CarrierCredentials, http_client: Arc<dyn HttpClient>) -> Self {
        let policy = CarrierPolicy::sendcloud_default();
        Self {
            http_client,
            auth: HttpAuth::Basic {
                username: credentials.api_key,
                password: credentials.api_secret,
            },
            base_url: base_url(credentials.base_url.as_deref(), DEFAULT_BASE_URL),
            throttle: ThrottlingQueue::from_policy(&policy),
            policy,
        }
    }

    pub fn with_policy(mut self, policy: CarrierPolicy) -> Self {
        self.throttle = ThrottlingQueue::from_policy(&policy);
        self.policy = policy;
        self
    }

    fn id() -> ProviderId {
        ProviderId::from_static(ProviderId::SENDCLOUD)
    }

    async fn call(&self, request: HttpRequest) -> Result<HttpResponse, CarrierError> {
        let request = request
            .with_auth(&self.auth)
            .with_timeout_ms(self.policy.timeout_ms());
        send(&Self::id(), self.http_client.as_ref(), &self.throttle, request).await
    }

    async fn fetch_rates(&self, req: &RateRequest) -> Result<Vec<RateQuote>, CarrierError> {
        let provider = Self::id();
        req.validate()?;

        let payload = ShippingOptionsRequest {
            from_country_code: &req.shipper.address.country,
            from_postal_code: &req.shipper.address.postal_code,
            to_country_code: &req.recipient.address.country,
            to_postal_code: &req.recipient.address.postal_code,
            parcels: req.packages.iter().map(WireParcel::from).collect(),
        };
        let request = json_body(
            &provider,
            HttpRequest::post(format!("{}/fetch-shipping-options", self.base_url)),
            &payload,
        )?;
        let response = self.call(request).await?;
        let options: ShippingOptionsResponse = parse_json(&provider, &response.body)?;

        let mut quotes = Vec::new();
        for option in options.data {
            let level = service_level_for(&option.code);
            if req.service_level.is_some_and(|wanted| wanted != level) {
                continue;
            }
            let Some(offer) = option.quotes.into_iter().next() else {
                continue;
            };
            let amount = parse_amount(&provider, &offer.price.total.value)?;
            let quote = RateQuote::new(
                provider.clone(),
                level,
                option.code.clone(),
                amount,
                offer.price.total.currency.to_ascii_uppercase(),
                option.code,
            )?
            .with_transit_days(offer.lead_time.map(|hours| hours.div_ceil(24)));
            quotes.push(quote);
        }
        Ok(quotes)
    }

    async fn book(&self, req: &ShipmentRequest) -> Result<ShipmentResponse, CarrierError> {
        let provider = Self::id();
        req.validate()?;

        // Without a rate id, re-rate and book the cheapest method of the level.
        let (method_code, quoted) = match &req.rate_id {
            Some(rate_id) => (rate_id.clone(), None),
            None => {
                let cheapest = self
                    .fetch_rates(&req.as_rate_request())
                    .await?
                    .into_iter()
                    .min_by(|a, b| a.total_amount.total_cmp(&b.total_amount))
                    .ok_or_else(|| {
                        CarrierError::invalid_request(format!(
                            "sendcloud offers no {} shipping method for this route",
                            req.service_level
                        ))
                    })?;
                (cheapest.rate_id.clone(), Some(cheapest))
            }
        };

        let recipient = &req.recipient;
        let payload = CreateParcelRequest {
            parcel: NewParcel {
                name: &recipient.name,
                company_name: recipient.company.as_deref(),
                address: &recipient.address.line1,
                address_2: recipient.address.line2.as_deref(),
                city: &recipient.address.city,
                postal_code: &recipient.address.postal_code,
                country: &recipient.address.country,
                country_state: recipient.address.state.as_deref(),
                telephone: recipient.phone.as_deref(),
                email: recipient.email.as_deref(),
                weight: format!("{:.3}", total_weight_kg(&req.packages)),
                quantity: req.packages.len(),
                order_number: req.reference.as_deref(),
                insured_value: req.insured_value.map(|value| value.round() as u64),
                request_label: true,
                shipment: ShippingMethodRef { code: &method_code },
            },
        };
        let request = json_body(
            &provider,
            HttpRequest::post(format!("{}/parcels", self.base_url)),
            &payload,
        )?;
        let response = self.call(request).await?;
        let created: CreateParcelResponse = parse_json(&provider, &response.body)?;
        let parcel = created.parcel;

        let label_url = parcel
            .label
            .and_then(|label| label.label_printer.or_else(|| label.normal_printer.into_iter().next()))
            .ok_or_else(|| {
                CarrierError::malformed_response("sendcloud parcel was created without a label")
            })?;

        let (amount, currency) = match (&parcel.total_price, &parcel.currency) {
            (Some(price), Some(currency)) => (parse_amount(&provider, price)?, currency.clone()),
            _ => match &quoted {
                Some(quote) => (quote.total_amount, quote.currency.clone()),
                None => {
                    return Err(CarrierError::malformed_response(
                        "sendcloud parcel response carries no price",
                    ))
                }
            },
        };

        let estimated_delivery = parcel
            .expected_delivery_date
            .as_deref()
            .and_then(|value| UtcDateTime::parse_lenient(value).ok());

        Ok(ShipmentResponse::new(
            provider,
            parcel.tracking_number,
            Label::Url { url: label_url },
            parcel.id.to_string(),
            amount,
            currency.to_ascii_uppercase(),
        )?
        .with_estimated_delivery(estimated_delivery))
    }

    async fn fetch_tracking(&self, req: &TrackingRequest) -> Result<TrackingResponse, CarrierError> {
        let provider = Self::id();
        let request = HttpRequest::get(format!(
            "{}/tracking/{}",
            self.base_url,
            urlencoding::encode(&req.tracking_number)
        ));
        let response = self.call(request).await?;
        let tracking: TrackingPayload = parse_json(&provider, &response.body)?;

        let events = tracking
            .statuses
            .into_iter()
            .map(|status| -> Result<TrackingEvent, crate::ValidationError> {
                let timestamp = UtcDateTime::parse_lenient(&status.carrier_update_timestamp)?;
                let mapped = tracking_status_for(&status.parent_status);
                Ok(TrackingEvent {
                    timestamp,
                    status: mapped,
                    location: status.location,
                    description: status
                        .carrier_message
                        .unwrap_or_else(|| status.parent_status.clone()),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| {
                CarrierError::malformed_response(format!("sendcloud tracking event: {error}"))
            })?;

        let estimated_delivery = tracking
            .expected_delivery_date
            .as_deref()
            .and_then(|value| UtcDateTime::parse_lenient(value).ok());

        Ok(TrackingResponse::from_events(
            provider,
            req.tracking_number.clone(),
            events,
            estimated_delivery,
        ))
    }

    async fn check_address(&self, address: &Address) -> Result<AddressValidation, CarrierError> {
        let provider = Self::id();
        let payload = WireAddress::from(address);
        let request = json_body(
            &provider,
            HttpRequest::post(format!("{}/addresses/validate", self.base_url)),
            &payload,
        )?;
        let response = self.call(request).await?;
        let result: AddressValidationPayload = parse_json(&provider, &response.body)?;

        let suggested_address = result
            .suggestions
            .into_iter()
            .find_map(|candidate| candidate.into_address())
            .filter(|candidate| candidate != address);

        Ok(AddressValidation {
            valid: result.valid,
            suggested_address,
            messages: result.messages,
        })
    }
}

impl Carrier for SendcloudCarrier {
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
            match self
                .call(HttpRequest::get(format!("{}/user", self.base_url)))
                .await
            {
                Ok(_) => AuthCheck::ok("sendcloud credentials accepted"),
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

#[derive(Debug, Serialize)]
struct ShippingOptionsRequest<'a> {
    from_country_code: &'a str,
    from_postal_code: &'a str,
    to_country_code: &'a str,
    to_postal_code: &'a str,
    parcels: Vec<WireParcel>,
}

#[derive(Debug, Serialize)]
struct WireParcel {
    weight: WireMeasure,
    dimensions: WireDimensions,
}

#[derive(Debug, Serialize)]
struct WireMeasure {
    value: String,
    unit: &'static str,
}

#[derive(Debug, Serialize)]
struct WireDimensions {
    length: String,
    width: String,
    height: String,
    unit: &'static str,
}

impl From<&PackageDetails> for WireParcel {
    fn from(package: &PackageDetails) -> Self {
        Self {
            weight: WireMeasure {
                value: format!("{:.3}", package.weight_kg),
                unit: "kg",
            },
            dimensions: WireDimensions {
                length: format!("{:.1}", package.length_cm),
                width: format!("{:.1}", package.width_cm),
                height: format!("{:.1}", package.height_cm),
                unit: "cm",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShippingOptionsResponse {
    #[serde(default)]
    data: Vec<ShippingOption>,
}

#[derive(Debug, Deserialize)]
struct ShippingOption {
    code: String,
    #[serde(default)]
    quotes: Vec<OptionQuote>,
}

#[derive(Debug, Deserialize)]
struct OptionQuote {
    price: QuotePrice,
    /// Hours.
    #[serde(default)]
    lead_time: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct QuotePrice {
    total: Money,
}

#[derive(Debug, Deserialize)]
struct Money {
    value: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct CreateParcelRequest<'a> {
    parcel: NewParcel<'a>,
}

#[derive(Debug, Serialize)]
struct NewParcel<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    company_name: Option<&'a str>,
    address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address_2: Option<&'a str>,
    city: &'a str,
    postal_code: &'a str,
    country: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    country_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    telephone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    weight: String,
    quantity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    insured_value: Option<u64>,
    request_label: bool,
    shipment: ShippingMethodRef<'a>,
}

#[derive(Debug, Serialize)]
struct ShippingMethodRef<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateParcelResponse {
    parcel: CreatedParcel,
}

#[derive(Debug, Deserialize)]
struct CreatedParcel {
    id: u64,
    tracking_number: String,
    #[serde(default)]
    label: Option<ParcelLabel>,
    #[serde(default)]
    total_price: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    expected_delivery_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParcelLabel {
    #[serde(default)]
    label_printer: Option<String>,
    #[serde(default)]
    normal_printer: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TrackingPayload {
    #[serde(default)]
    expected_delivery_date: Option<String>,
    #[serde(default)]
    statuses: Vec<WireStatus>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    carrier_update_timestamp: String,
    parent_status: String,
    #[serde(default)]
    carrier_message: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireAddress {
    address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address_2: Option<String>,
    city: String,
    postal_code: String,
    country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

impl From<&Address> for WireAddress {
    fn from(address: &Address) -> Self {
        Self {
            address: address.line1.clone(),
            address_2: address.line2.clone(),
            city: address.city.clone(),
            postal_code: address.postal_code.clone(),
            country_code: address.country.clone(),
            state: address.state.clone(),
        }
    }
}

impl WireAddress {
    fn into_address(self) -> Option<Address> {
        let country = country_code(&self.country_code)?;
        let mut address = Address::new(self.address, self.city, self.postal_code, country).ok()?;
        address.line2 = self.address_2;
        address.state = self.state;
        Some(address)
    }
}

#[derive(Debug, Deserialize)]
struct AddressValidationPayload {
    valid: bool,
    #[serde(default)]
    suggestions: Vec<WireAddress>,
    #[serde(default)]
    messages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::CarrierErrorKind;
    use crate::domain::ShippingAddress;
    use crate::http_client::{HttpError, HttpMethod, ScriptedHttpClient};

    const OPTIONS: &str = r#"{
        "data": [
            {"code": "postnl:standard", "quotes": [{"price": {"total": {"value": "8.50", "currency": "EUR"}}, "lead_time": 24}]},
            {"code": "dpd:express/10", "quotes": [{"price": {"total": {"value": "14.20", "currency": "EUR"}}, "lead_time": 20}]},
            {"code": "bpost:mailbox", "quotes": [{"price": {"total": {"value": "4.10", "currency": "eur"}}}]},
            {"code": "budbee:evening", "quotes": [{"price": {"total": {"value": "6.00", "currency": "EUR"}}, "lead_time": 30}]},
            {"code": "gls:standard", "quotes": []}
        ]
    }"#;

    fn party(city: &str, postal: &str) -> ShippingAddress {
        ShippingAddress::new(
            "Jan Peeters",
            Address::new("Meir 10", city, postal, "BE").expect("valid address"),
        )
        .expect("valid party")
    }

    fn packages() -> Vec<PackageDetails> {
        vec![PackageDetails::new(1.0, 10.0, 10.0, 10.0).expect("valid package")]
    }

    fn rate_request() -> RateRequest {
        RateRequest::new(party("Antwerpen", "2000"), party("Gent", "9000"), packages())
            .expect("valid request")
    }

    fn sendcloud(http: ScriptedHttpClient) -> (SendcloudCarrier, Arc<ScriptedHttpClient>) {
        let http = Arc::new(http);
        let carrier = SendcloudCarrier::new(
            CarrierCredentials::new("public", "secret").with_base_url("https://sendcloud.test/api/v2/"),
            http.clone(),
        );
        (carrier, http)
    }

    #[tokio::test]
    async fn rates_use_basic_auth_and_map_method_families() {
        let (carrier, http) =
            sendcloud(ScriptedHttpClient::new().route("fetch-shipping-options", HttpResponse::ok_json(OPTIONS)));

        let quotes = carrier.get_rates(rate_request()).await.expect("rates");

        assert_eq!(quotes.len(), 4);
        assert_eq!(quotes[0].service_level, ServiceLevel::Standard);
        assert_eq!(quotes[0].total_amount, 8.5);
        assert_eq!(quotes[0].transit_days, Some(1));
        assert_eq!(quotes[1].service_level, ServiceLevel::Express);
        assert_eq!(quotes[2].service_level, ServiceLevel::Economy);
        assert_eq!(quotes[2].currency, "EUR");
        // Unknown families fall back to STANDARD.
        assert_eq!(quotes[3].service_level, ServiceLevel::Standard);
        assert_eq!(quotes[3].transit_days, Some(2));

        let requests = http.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(
            requests[0].url,
            "https://sendcloud.test/api/v2/fetch-shipping-options"
        );
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Basic cHVibGljOnNlY3JldA==")
        );
        let body = requests[0].body.as_deref().expect("json body");
        assert!(body.contains(r#""to_postal_code":"9000""#));
        assert!(body.contains(r#""unit":"kg""#));
    }

    #[tokio::test]
    async fn rates_honor_requested_service_level() {
        let (carrier, _) =
            sendcloud(ScriptedHttpClient::new().route("fetch-shipping-options", HttpResponse::ok_json(OPTIONS)));

        let quotes = carrier
            .get_rates(rate_request().with_service_level(ServiceLevel::Express))
            .await
            .expect("rates");

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].rate_id, "dpd:express/10");
    }

    #[tokio::test]
    async fn rate_failures_are_typed() {
        let (carrier, _) = sendcloud(
            ScriptedHttpClient::new().route("fetch-shipping-options", HttpResponse::new(401, "denied")),
        );
        let error = carrier.get_rates(rate_request()).await.expect_err("unauthorized");
        assert_eq!(error.kind(), CarrierErrorKind::Authentication);

        let (carrier, _) = sendcloud(
            ScriptedHttpClient::new().route("fetch-shipping-options", HttpResponse::ok_json("<html>")),
        );
        let error = carrier.get_rates(rate_request()).await.expect_err("malformed");
        assert_eq!(error.kind(), CarrierErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn shipment_without_rate_id_books_cheapest_method_of_level() {
        let parcel = r#"{"parcel": {
            "id": 4711,
            "tracking_number": "3SABCD0123456",
            "label": {"normal_printer": ["https://sendcloud.test/labels/4711.pdf"]},
            "expected_delivery_date": "2024-05-03"
        }}"#;
        let (carrier, http) = sendcloud(
            ScriptedHttpClient::new()
                .route("fetch-shipping-options", HttpResponse::ok_json(OPTIONS))
                .route("/parcels", HttpResponse::ok_json(parcel)),
        );
        let request = ShipmentRequest::new(
            party("Antwerpen", "2000"),
            party("Gent", "9000"),
            packages(),
            ServiceLevel::Standard,
        )
        .expect("valid shipment")
        .with_reference("ORDER-1001");

        let booking = carrier.create_shipment(request).await.expect("booking");

        assert_eq!(booking.tracking_number, "3SABCD0123456");
        assert_eq!(booking.shipment_id, "4711");
        assert_eq!(booking.total_amount, 6.0);
        assert_eq!(
            booking.label,
            Label::Url {
                url: String::from("https://sendcloud.test/labels/4711.pdf")
            }
        );
        assert!(booking.estimated_delivery.is_some());
        assert!(!booking.manual);

        let requests = http.recorded_requests();
        let body = requests[1].body.as_deref().expect("parcel body");
        assert!(body.contains(r#""code":"budbee:evening""#));
        assert!(body.contains(r#""order_number":"ORDER-1001""#));
    }

    #[tokio::test]
    async fn shipment_without_label_fails_loudly() {
        let parcel = r#"{"parcel": {"id": 1, "tracking_number": "3S1", "total_price": "8.50", "currency": "EUR"}}"#;
        let (carrier, _) =
            sendcloud(ScriptedHttpClient::new().route("/parcels", HttpResponse::ok_json(parcel)));
        let request = ShipmentRequest::new(
            party("Antwerpen", "2000"),
            party("Gent", "9000"),
            packages(),
            ServiceLevel::Standard,
        )
        .expect("valid shipment")
        .with_rate_id("postnl:standard");

        let error = carrier.create_shipment(request).await.expect_err("no label");
        assert_eq!(error.kind(), CarrierErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn tracking_maps_statuses_and_orders_events() {
        let payload = r#"{
            "tracking_number": "3SABCD",
            "statuses": [
                {"carrier_update_timestamp": "2024-05-02T09:30:00+02:00", "parent_status": "delivered", "location": "Gent"},
                {"carrier_update_timestamp": "2024-05-01T08:00:00Z", "parent_status": "announced", "carrier_message": "Label created"}
            ]
        }"#;
        let (carrier, http) =
            sendcloud(ScriptedHttpClient::new().route("/tracking/", HttpResponse::ok_json(payload)));

        let response = carrier
            .track_shipment(TrackingRequest::new("3SABCD").expect("valid"))
            .await;

        assert_eq!(response.status, TrackingStatus::Delivered);
        assert!(!response.degraded);
        assert_eq!(response.events.len(), 2);
        assert_eq!(response.events[0].description, "Label created");
        assert_eq!(response.events[1].location.as_deref(), Some("Gent"));
        assert!(http.recorded_requests()[0].url.ends_with("/tracking/3SABCD"));
    }

    #[tokio::test]
    async fn tracking_failure_degrades_to_unknown() {
        let (carrier, _) = sendcloud(
            ScriptedHttpClient::new().route_error("/tracking/", HttpError::new("connection reset")),
        );

        let response = carrier
            .track_shipment(TrackingRequest::new("3SXYZ").expect("valid"))
            .await;

        assert!(response.degraded);
        assert_eq!(response.status, TrackingStatus::Unknown);
        assert_eq!(response.events.len(), 1);
        assert!(response.events[0].description.contains("connection reset"));
    }

    #[tokio::test]
    async fn address_validation_returns_differing_suggestion() {
        let payload = r#"{
            "valid": false,
            "suggestions": [{"address": "Meir 10", "city": "Antwerpen", "postal_code": "2000", "country_code": "Belgium"}],
            "messages": ["postal code does not match city"]
        }"#;
        let (carrier, _) =
            sendcloud(ScriptedHttpClient::new().route("/addresses/validate", HttpResponse::ok_json(payload)));
        let input = Address::new("Meir 10", "Antwerp", "2000", "BE").expect("valid");

        let result = carrier.validate_address(input).await.expect("validation");

        assert!(!result.valid);
        let suggestion = result.suggested_address.expect("suggestion");
        assert_eq!(suggestion.city, "Antwerpen");
        assert_eq!(suggestion.country, "BE");
        assert_eq!(result.messages.len(), 1);
    }

    #[tokio::test]
    async fn authentication_check_never_errors() {
        let (ok, _) = sendcloud(ScriptedHttpClient::new().route("/user", HttpResponse::ok_json("{}")));
        assert!(ok.test_authentication().await.authenticated);

        let (denied, _) =
            sendcloud(ScriptedHttpClient::new().route("/user", HttpResponse::new(403, "forbidden")));
        let check = denied.test_authentication().await;
        assert!(!check.authenticated);
        assert!(check.message.contains("403"));
    }

    #[test]
    fn status_table_is_total() {
        for status in TrackingStatus::ALL {
            if status == TrackingStatus::Unknown {
                continue;
            }
            assert!(
                STATUS_TABLE.iter().any(|(_, mapped)| *mapped == status),
                "no sendcloud status maps to {status}"
            );
        }
        for (code, status) in STATUS_TABLE {
            assert_eq!(tracking_status_for(code), *status);
        }
        assert_eq!(tracking_status_for("Delivered"), TrackingStatus::Delivered);
        assert_eq!(tracking_status_for("out-for-delivery"), TrackingStatus::OutForDelivery);
        assert_eq!(tracking_status_for("teleported"), TrackingStatus::Unknown);
    }

    #[test]
    fn service_table_covers_every_level() {
        for level in ServiceLevel::ALL {
            assert!(SERVICE_TABLE.iter().any(|(_, mapped)| *mapped == level));
        }
        assert_eq!(service_level_for("dhl:same_day/evening"), ServiceLevel::Priority);
        assert_eq!(service_level_for("unknown"), ServiceLevel::Standard);
    }
}
