use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{base_url, country_code, json_body, parse_amount, parse_json, send};
use crate::carrier::{
    AddressValidation, AuthCheck, Carrier, CarrierError, CarrierErrorKind, CarrierFuture,
};
use crate::config::{CarrierCredentials, ConfigError};
use crate::domain::{
    Address, Label, LabelFormat, PackageDetails, RateQuote, RateRequest, ServiceLevel,
    ShipmentRequest, ShipmentResponse, ShippingAddress, TrackingEvent, TrackingRequest,
    TrackingResponse, TrackingStatus, UtcDateTime,
};
use crate::fallback::ManualPricing;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::policy::CarrierPolicy;
use crate::throttling::ThrottlingQueue;
use crate::{ProviderId, ValidationError};

const DEFAULT_BASE_URL: &str = "https://onlinetools.ups.com/api";

const MANUAL_PRICING: ManualPricing = ManualPricing::new(9.90, 1.20, "EUR");

/// Published sample number; any non-auth answer proves the credentials work.
const AUTH_PROBE_TRACKING_NUMBER: &str = "1Z12345E0205271688";

const SERVICE_TABLE: &[(&str, ServiceLevel)] = &[
    ("03", ServiceLevel::Standard),
    ("11", ServiceLevel::Standard),
    ("12", ServiceLevel::Express),
    ("02", ServiceLevel::Express),
    ("59", ServiceLevel::Express),
    ("13", ServiceLevel::Express),
    ("07", ServiceLevel::Express),
    ("08", ServiceLevel::Express),
    ("65", ServiceLevel::Express),
    ("01", ServiceLevel::Priority),
    ("14", ServiceLevel::Priority),
    ("54", ServiceLevel::Priority),
    ("17", ServiceLevel::Economy),
    ("92", ServiceLevel::Economy),
    ("93", ServiceLevel::Economy),
];

/// Activity `status.type` values.
const STATUS_TABLE: &[(&str, TrackingStatus)] = &[
    ("M", TrackingStatus::Created),
    ("P", TrackingStatus::PickedUp),
    ("I", TrackingStatus::InTransit),
    ("W", TrackingStatus::InTransit),
    ("DO", TrackingStatus::InTransit),
    ("DD", TrackingStatus::InTransit),
    ("O", TrackingStatus::OutForDelivery),
    ("D", TrackingStatus::Delivered),
    ("X", TrackingStatus::Exception),
    ("RS", TrackingStatus::Exception),
    ("MV", TrackingStatus::Exception),
];

fn service_level_for(service_code: &str) -> ServiceLevel {
    let code = service_code.trim();
    SERVICE_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map_or(ServiceLevel::Standard, |(_, level)| *level)
}

fn service_code_for(level: ServiceLevel, domestic_us: bool) -> &'static str {
    match (level, domestic_us) {
        (ServiceLevel::Standard, true) => "03",
        (ServiceLevel::Express, true) => "02",
        (ServiceLevel::Priority, true) => "01",
        (ServiceLevel::Economy, true) => "93",
        (ServiceLevel::Standard, false) => "11",
        (ServiceLevel::Express, false) => "07",
        (ServiceLevel::Priority, false) => "54",
        (ServiceLevel::Economy, false) => "17",
    }
}

fn tracking_status_for(status_type: &str) -> TrackingStatus {
    let code = status_type.trim().to_ascii_uppercase();
    STATUS_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map_or(TrackingStatus::Unknown, |(_, status)| *status)
}

/// UPS reports `YYYYMMDD` / `HHMMSS` local to the scan; stored as UTC.
fn parse_timestamp(date: &str, time: Option<&str>) -> Result<UtcDateTime, ValidationError> {
    let time = time.unwrap_or("000000");
    let well_formed = date.len() == 8
        && time.len() == 6
        && date.chars().chain(time.chars()).all(|ch| ch.is_ascii_digit());
    if !well_formed {
        return Err(ValidationError::TimestampNotUtc {
            value: format!("{date} {time}"),
        });
    }
    UtcDateTime::parse(&format!(
        "{}-{}-{}T{}:{}:{}Z",
        &date[0..4],
        &date[4..6],
        &date[6..8],
        &time[0..2],
        &time[2..4],
        &time[4..6]
    ))
}

fn label_format_code(format: LabelFormat) -> &'static str {
    match format {
        LabelFormat::Pdf => "PDF",
        LabelFormat::Zpl => "ZPL",
        LabelFormat::Png => "PNG",
    }
}

/// UPS carrier. Authenticates with static key / secret headers and bills the
/// configured shipper account. Talks lb / in on the wire.
#[derive(Clone)]
pub struct UpsCarrier {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    api_secret: String,
    account_number: String,
    base_url: String,
    policy: CarrierPolicy,
    throttle: ThrottlingQueue,
}

impl UpsCarrier {
    /// # Errors
    ///
    /// UPS bills every call to a shipper account; credentials without an
    /// account number are rejected.
    pub fn new(
        credentials: CarrierCredentials,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, ConfigError> {
        let account_number = credentials
            .account_number
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::IncompleteCredentials {
                carrier: ProviderId::UPS,
                var: String::from("PARCELHUB_UPS_ACCOUNT_NUMBER"),
            })?;
        let policy = CarrierPolicy::ups_default();
        Ok(Self {
            http_client,
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
            account_number,
            base_url: base_url(credentials.base_url.as_deref(), DEFAULT_BASE_URL),
            throttle: ThrottlingQueue::from_policy(&policy),
            policy,
        })
    }

    pub fn with_policy(mut self, policy: CarrierPolicy) -> Self {
        self.throttle = ThrottlingQueue::from_policy(&policy);
        self.policy = policy;
        self
    }

    fn id() -> ProviderId {
        ProviderId::from_static(ProviderId::UPS)
    }

    async fn call(&self, request: HttpRequest) -> Result<HttpResponse, CarrierError> {
        let request = request
            .with_header("x-api-key", &self.api_key)
            .with_header("x-api-secret", &self.api_secret)
            .with_header("transid", uuid::Uuid::new_v4().simple().to_string())
            .with_header("transactionsrc", "parcelhub")
            .with_timeout_ms(self.policy.timeout_ms());
        send(&Self::id(), self.http_client.as_ref(), &self.throttle, request).await
    }

    async fn fetch_rates(&self, req: &RateRequest) -> Result<Vec<RateQuote>, CarrierError> {
        let provider = Self::id();
        req.validate()?;

        let residential = req.residential.unwrap_or(false).then_some("");
        let payload = RateEnvelope {
            rate_request: RateShipmentRequest {
                shipment: RateShipment {
                    shipper: Shipper {
                        name: None,
                        shipper_number: &self.account_number,
                        address: WireAddress::from_address(&req.shipper.address, None),
                    },
                    ship_from: AddressOnly {
                        address: WireAddress::from_address(&req.shipper.address, None),
                    },
                    ship_to: AddressOnly {
                        address: WireAddress::from_address(&req.recipient.address, residential),
                    },
                    package: req.packages.iter().map(WirePackage::from).collect(),
                },
            },
        };
        let request = json_body(
            &provider,
            HttpRequest::post(format!("{}/rating/v2/Shop", self.base_url)),
            &payload,
        )?;
        let response = self.call(request).await?;
        let rated: RateResponseEnvelope = parse_json(&provider, &response.body)?;

        let mut quotes = Vec::new();
        for shipment in rated.rate_response.rated_shipment.into_vec() {
            let level = service_level_for(&shipment.service.code);
            if req.service_level.is_some_and(|wanted| wanted != level) {
                continue;
            }
            // Account-specific negotiated rates take precedence over list rates.
            let charges = shipment
                .negotiated_rate_charges
                .map(|negotiated| negotiated.total_charge)
                .unwrap_or(shipment.total_charges);
            let transit_days = shipment
                .guaranteed_delivery
                .and_then(|delivery| delivery.business_days_in_transit)
                .and_then(|days| days.trim().parse::<u32>().ok());

            let quote = RateQuote::new(
                provider.clone(),
                level,
                shipment.service.code.clone(),
                parse_amount(&provider, &charges.monetary_value)?,
                charges.currency_code.to_ascii_uppercase(),
                shipment.service.code,
            )?
            .with_transit_days(transit_days);
            quotes.push(quote);
        }
        Ok(quotes)
    }

    async fn book(&self, req: &ShipmentRequest) -> Result<ShipmentResponse, CarrierError> {
        let provider = Self::id();
        req.validate()?;

        let domestic_us = req.shipper.address.country == "US" && req.recipient.address.country == "US";
        let service_code = req
            .rate_id
            .clone()
            .unwrap_or_else(|| service_code_for(req.service_level, domestic_us).to_owned());
        let residential = req.residential.unwrap_or(false).then_some("");

        let payload = ShipEnvelope {
            shipment_request: ShipRequest {
                shipment: ShipShipment {
                    description: req.reference.as_deref().unwrap_or("Merchandise"),
                    shipper: Shipper {
                        name: Some(&req.shipper.name),
                        shipper_number: &self.account_number,
                        address: WireAddress::from_address(&req.shipper.address, None),
                    },
                    ship_to: NamedParty::new(&req.recipient, residential),
                    payment_information: PaymentInformation {
                        shipment_charge: ShipmentCharge {
                            charge_type: "01",
                            bill_shipper: BillShipper {
                                account_number: &self.account_number,
                            },
                        },
                    },
                    service: CodeRef {
                        code: service_code.as_str(),
                    },
                    package: req.packages.iter().map(WirePackage::from).collect(),
                },
                label_specification: LabelSpecification {
                    label_image_format: CodeRef {
                        code: label_format_code(req.label_format),
                    },
                },
            },
        };
        let request = json_body(
            &provider,
            HttpRequest::post(format!("{}/shipments/v2/ship", self.base_url)),
            &payload,
        )?;
        let response = self.call(request).await?;
        let shipped: ShipResponseEnvelope = parse_json(&provider, &response.body)?;
        let results = shipped.shipment_response.shipment_results;

        let package = results
            .package_results
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| CarrierError::malformed_response("ups shipment has no package results"))?;
        let label = package.shipping_label.ok_or_else(|| {
            CarrierError::malformed_response("ups shipment was created without a label")
        })?;
        let format = label
            .image_format
            .and_then(|format| format.code.parse::<LabelFormat>().ok())
            .unwrap_or(req.label_format);
        let charges = results
            .negotiated_rate_charges
            .map(|negotiated| negotiated.total_charge)
            .or(results.shipment_charges.map(|charges| charges.total_charges))
            .ok_or_else(|| CarrierError::malformed_response("ups shipment response carries no charges"))?;

        Ok(ShipmentResponse::new(
            provider.clone(),
            package.tracking_number,
            Label::Document {
                format,
                base64: label.graphic_image,
            },
            results.shipment_identification_number,
            parse_amount(&provider, &charges.monetary_value)?,
            charges.currency_code.to_ascii_uppercase(),
        )?)
    }

    async fn fetch_tracking(&self, req: &TrackingRequest) -> Result<TrackingResponse, CarrierError> {
        let provider = Self::id();
        let request = HttpRequest::get(format!(
            "{}/track/v1/details/{}",
            self.base_url,
            urlencoding::encode(&req.tracking_number)
        ));
        let response = self.call(request).await?;
        let payload: TrackEnvelope = parse_json(&provider, &response.body)?;

        let package = payload
            .track_response
            .shipment
            .into_iter()
            .flat_map(|shipment| shipment.package)
            .next()
            .ok_or_else(|| {
                CarrierError::invalid_request(format!(
                    "ups does not know tracking number {}",
                    req.tracking_number
                ))
            })?;

        let events = package
            .activity
            .into_iter()
            .map(|activity| -> Result<TrackingEvent, ValidationError> {
                Ok(TrackingEvent {
                    timestamp: parse_timestamp(&activity.date, activity.time.as_deref())?,
                    status: tracking_status_for(&activity.status.status_type),
                    location: activity.location.and_then(|location| location.address).and_then(
                        |address| address.display(),
                    ),
                    description: activity
                        .status
                        .description
                        .unwrap_or_else(|| activity.status.status_type.clone()),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| CarrierError::malformed_response(format!("ups tracking activity: {error}")))?;

        let estimated_delivery = package
            .delivery_date
            .iter()
            .find(|date| matches!(date.date_type.as_str(), "SDD" | "RDD"))
            .and_then(|date| parse_timestamp(&date.date, None).ok());

        Ok(TrackingResponse::from_events(
            provider,
            req.tracking_number.clone(),
            events,
            estimated_delivery,
        ))
    }

    async fn check_address(&self, address: &Address) -> Result<AddressValidation, CarrierError> {
        let provider = Self::id();
        let payload = XavEnvelope {
            xav_request: XavRequest {
                address_key_format: AddressKeyFormat::from(address),
            },
        };
        let request = json_body(
            &provider,
            HttpRequest::post(format!("{}/addressvalidation/v2/3", self.base_url)),
            &payload,
        )?;
        let response = self.call(request).await?;
        let result: XavResponseEnvelope = parse_json(&provider, &response.body)?;
        let xav = result.xav_response;

        let mut messages = Vec::new();
        if xav.ambiguous_address_indicator.is_some() {
            messages.push(String::from("address is ambiguous, several candidates match"));
        }
        if xav.no_candidates_indicator.is_some() {
            messages.push(String::from("ups found no candidate address"));
        }
        let suggested_address = xav
            .candidate
            .into_vec()
            .into_iter()
            .find_map(|candidate| candidate.address_key_format.into_address())
            .filter(|candidate| candidate != address);

        Ok(AddressValidation {
            valid: xav.valid_address_indicator.is_some(),
            suggested_address,
            messages,
        })
    }
}

impl Carrier for UpsCarrier {
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
            let request = HttpRequest::get(format!(
                "{}/track/v1/details/{AUTH_PROBE_TRACKING_NUMBER}",
                self.base_url
            ));
            match self.call(request).await {
                Ok(_) => AuthCheck::ok("ups credentials accepted"),
                Err(error) if error.kind() == CarrierErrorKind::InvalidRequest => {
                    AuthCheck::ok("ups credentials accepted")
                }
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

/// UPS collapses single-element arrays into bare objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireAddress<'a> {
    address_line: Vec<&'a str>,
    city: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_province_code: Option<&'a str>,
    postal_code: &'a str,
    country_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    residential_address_indicator: Option<&'static str>,
}

impl<'a> WireAddress<'a> {
    fn from_address(address: &'a Address, residential: Option<&'static str>) -> Self {
        let mut address_line = vec![address.line1.as_str()];
        if let Some(line2) = &address.line2 {
            address_line.push(line2);
        }
        Self {
            address_line,
            city: &address.city,
            state_province_code: address.state.as_deref(),
            postal_code: &address.postal_code,
            country_code: &address.country,
            residential_address_indicator: residential,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Shipper<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    shipper_number: &'a str,
    address: WireAddress<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AddressOnly<'a> {
    address: WireAddress<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NamedParty<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attention_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<PhoneNumber<'a>>,
    #[serde(rename = "EMailAddress", skip_serializing_if = "Option::is_none")]
    email_address: Option<&'a str>,
    address: WireAddress<'a>,
}

impl<'a> NamedParty<'a> {
    fn new(party: &'a ShippingAddress, residential: Option<&'static str>) -> Self {
        // UPS prints the company as the addressee and the person as attention.
        let (name, attention_name) = match party.company.as_deref() {
            Some(company) => (company, Some(party.name.as_str())),
            None => (party.name.as_str(), None),
        };
        Self {
            name,
            attention_name,
            phone: party.phone.as_deref().map(|number| PhoneNumber { number }),
            email_address: party.email.as_deref(),
            address: WireAddress::from_address(&party.address, residential),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PhoneNumber<'a> {
    number: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CodeRef<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WirePackage {
    packaging_type: CodeRef<'static>,
    dimensions: WireDimensions,
    package_weight: WireWeight,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireDimensions {
    unit_of_measurement: CodeRef<'static>,
    length: String,
    width: String,
    height: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireWeight {
    unit_of_measurement: CodeRef<'static>,
    weight: String,
}

impl From<&PackageDetails> for WirePackage {
    fn from(package: &PackageDetails) -> Self {
        let imperial = package.to_imperial();
        Self {
            packaging_type: CodeRef { code: "02" },
            dimensions: WireDimensions {
                unit_of_measurement: CodeRef { code: "IN" },
                length: format!("{:.1}", imperial.length_in),
                width: format!("{:.1}", imperial.width_in),
                height: format!("{:.1}", imperial.height_in),
            },
            package_weight: WireWeight {
                unit_of_measurement: CodeRef { code: "LBS" },
                weight: format!("{:.2}", imperial.weight_lb),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RateEnvelope<'a> {
    rate_request: RateShipmentRequest<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RateShipmentRequest<'a> {
    shipment: RateShipment<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RateShipment<'a> {
    shipper: Shipper<'a>,
    ship_from: AddressOnly<'a>,
    ship_to: AddressOnly<'a>,
    package: Vec<WirePackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RateResponseEnvelope {
    rate_response: RateResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RateResponse {
    #[serde(default)]
    rated_shipment: OneOrMany<RatedShipment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RatedShipment {
    service: ServiceCode,
    total_charges: Charges,
    #[serde(default)]
    negotiated_rate_charges: Option<NegotiatedCharges>,
    #[serde(default)]
    guaranteed_delivery: Option<GuaranteedDelivery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceCode {
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Charges {
    currency_code: String,
    monetary_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NegotiatedCharges {
    total_charge: Charges,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GuaranteedDelivery {
    #[serde(default)]
    business_days_in_transit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ShipEnvelope<'a> {
    shipment_request: ShipRequest<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ShipRequest<'a> {
    shipment: ShipShipment<'a>,
    label_specification: LabelSpecification,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ShipShipment<'a> {
    description: &'a str,
    shipper: Shipper<'a>,
    ship_to: NamedParty<'a>,
    payment_information: PaymentInformation<'a>,
    service: CodeRef<'a>,
    package: Vec<WirePackage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PaymentInformation<'a> {
    shipment_charge: ShipmentCharge<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ShipmentCharge<'a> {
    #[serde(rename = "Type")]
    charge_type: &'static str,
    bill_shipper: BillShipper<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BillShipper<'a> {
    account_number: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LabelSpecification {
    label_image_format: CodeRef<'static>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ShipResponseEnvelope {
    shipment_response: ShipResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ShipResponse {
    shipment_results: ShipmentResults,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ShipmentResults {
    shipment_identification_number: String,
    #[serde(default)]
    shipment_charges: Option<ShipmentCharges>,
    #[serde(default)]
    negotiated_rate_charges: Option<NegotiatedCharges>,
    #[serde(default)]
    package_results: OneOrMany<PackageResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ShipmentCharges {
    total_charges: Charges,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PackageResult {
    tracking_number: String,
    #[serde(default)]
    shipping_label: Option<ShippingLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ShippingLabel {
    #[serde(default)]
    image_format: Option<ServiceCode>,
    graphic_image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackEnvelope {
    track_response: TrackResponse,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    shipment: Vec<TrackedShipment>,
}

#[derive(Debug, Deserialize)]
struct TrackedShipment {
    #[serde(default)]
    package: Vec<TrackedPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackedPackage {
    #[serde(default)]
    delivery_date: Vec<DeliveryDate>,
    #[serde(default)]
    activity: Vec<Activity>,
}

#[derive(Debug, Deserialize)]
struct DeliveryDate {
    #[serde(rename = "type")]
    date_type: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct Activity {
    #[serde(default)]
    location: Option<ActivityLocation>,
    status: ActivityStatus,
    date: String,
    #[serde(default)]
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivityLocation {
    #[serde(default)]
    address: Option<ActivityAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityAddress {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

impl ActivityAddress {
    /// `City, CC`, with full country names mapped back to ISO codes.
    fn display(self) -> Option<String> {
        let country = self
            .country_code
            .or(self.country)
            .map(|value| country_code(&value).unwrap_or(value));
        match (self.city, country) {
            (Some(city), Some(country)) => Some(format!("{city}, {country}")),
            (Some(city), None) => Some(city),
            (None, country) => country,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActivityStatus {
    #[serde(rename = "type")]
    status_type: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct XavEnvelope<'a> {
    #[serde(rename = "XAVRequest")]
    xav_request: XavRequest<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct XavRequest<'a> {
    address_key_format: AddressKeyFormat<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AddressKeyFormat<'a> {
    address_line: Vec<&'a str>,
    political_division2: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    political_division1: Option<&'a str>,
    postcode_primary_low: &'a str,
    country_code: &'a str,
}

impl<'a> From<&'a Address> for AddressKeyFormat<'a> {
    fn from(address: &'a Address) -> Self {
        let mut address_line = vec![address.line1.as_str()];
        if let Some(line2) = &address.line2 {
            address_line.push(line2);
        }
        Self {
            address_line,
            political_division2: &address.city,
            political_division1: address.state.as_deref(),
            postcode_primary_low: &address.postal_code,
            country_code: &address.country,
        }
    }
}

#[derive(Debug, Deserialize)]
struct XavResponseEnvelope {
    #[serde(rename = "XAVResponse")]
    xav_response: XavResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XavResponse {
    #[serde(default)]
    valid_address_indicator: Option<serde_json::Value>,
    #[serde(default)]
    ambiguous_address_indicator: Option<serde_json::Value>,
    #[serde(default)]
    no_candidates_indicator: Option<serde_json::Value>,
    #[serde(default)]
    candidate: OneOrMany<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Candidate {
    address_key_format: CandidateAddress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CandidateAddress {
    #[serde(default)]
    address_line: OneOrMany<String>,
    #[serde(default)]
    political_division2: Option<String>,
    #[serde(default)]
    political_division1: Option<String>,
    #[serde(default)]
    postcode_primary_low: Option<String>,
    #[serde(default)]
    postcode_extended_low: Option<String>,
    country_code: String,
}

impl CandidateAddress {
    fn into_address(self) -> Option<Address> {
        let mut lines = self.address_line.into_vec().into_iter();
        let line1 = lines.next()?;
        let postal_code = match (self.postcode_primary_low, self.postcode_extended_low) {
            (Some(primary), Some(extended)) if !extended.is_empty() => format!("{primary}-{extended}"),
            (Some(primary), _) => primary,
            (None, _) => return None,
        };
        let country = country_code(&self.country_code)?;
        let mut address = Address::new(line1, self.political_division2?, postal_code, country).ok()?;
        address.line2 = lines.next();
        address.state = self.political_division1;
        Some(address)
    }
}
