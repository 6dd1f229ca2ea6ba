use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::rate::{validate_amount, validate_currency_code, validate_packages};
use crate::domain::{PackageDetails, RateRequest, ServiceLevel, ShippingAddress, UtcDateTime};
use crate::{ProviderId, ValidationError};

/// Requested label document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelFormat {
    #[default]
    Pdf,
    Zpl,
    Png,
}

impl LabelFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Zpl => "zpl",
            Self::Png => "png",
        }
    }
}

impl Display for LabelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelFormat {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "zpl" => Ok(Self::Zpl),
            "png" => Ok(Self::Png),
            other => Err(ValidationError::InvalidLabelFormat {
                value: other.to_owned(),
            }),
        }
    }
}

/// Shipping label as returned by the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Label {
    Url { url: String },
    Document { format: LabelFormat, base64: String },
    /// Manual bookings have no carrier label yet.
    Pending,
}

/// Booking input for one carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub shipper: ShippingAddress,
    pub recipient: ShippingAddress,
    pub packages: Vec<PackageDetails>,
    pub service_level: ServiceLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_id: Option<String>,
    #[serde(default)]
    pub label_format: LabelFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insured_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residential: Option<bool>,
}

impl ShipmentRequest {
    pub fn new(
        shipper: ShippingAddress,
        recipient: ShippingAddress,
        packages: Vec<PackageDetails>,
        service_level: ServiceLevel,
    ) -> Result<Self, ValidationError> {
        let request = Self {
            shipper,
            recipient,
            packages,
            service_level,
            rate_id: None,
            label_format: LabelFormat::default(),
            reference: None,
            insured_value: None,
            residential: None,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_rate_id(mut self, rate_id: impl Into<String>) -> Self {
        self.rate_id = Some(rate_id.into());
        self
    }

    pub fn with_label_format(mut self, label_format: LabelFormat) -> Self {
        self.label_format = label_format;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_insured_value(mut self, insured_value: f64) -> Self {
        self.insured_value = Some(insured_value);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.shipper.validate()?;
        self.recipient.validate()?;
        validate_packages(&self.packages)?;
        if let Some(insured_value) = self.insured_value {
            validate_amount("insured_value", insured_value)?;
        }
        Ok(())
    }

    /// Rate request with the same shape, used when a carrier needs to re-rate.
    pub fn as_rate_request(&self) -> RateRequest {
        RateRequest {
            shipper: self.shipper.clone(),
            recipient: self.recipient.clone(),
            packages: self.packages.clone(),
            service_level: Some(self.service_level),
            residential: self.residential,
        }
    }
}

/// Durable record of a booking. The caller persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentResponse {
    pub provider_name: ProviderId,
    pub tracking_number: String,
    pub label: Label,
    pub shipment_id: String,
    pub total_amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<UtcDateTime>,
    /// `true` for placeholder bookings synthesized while the carrier was down.
    #[serde(default)]
    pub manual: bool,
}

impl ShipmentResponse {
    pub fn new(
        provider_name: ProviderId,
        tracking_number: impl Into<String>,
        label: Label,
        shipment_id: impl Into<String>,
        total_amount: f64,
        currency: impl AsRef<str>,
    ) -> Result<Self, ValidationError> {
        let tracking_number = tracking_number.into();
        if tracking_number.trim().is_empty() {
            return Err(ValidationError::EmptyTrackingNumber);
        }
        let shipment_id = shipment_id.into();
        if shipment_id.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "shipment_id",
            });
        }
        validate_amount("total_amount", total_amount)?;

        Ok(Self {
            provider_name,
            tracking_number,
            label,
            shipment_id,
            total_amount,
            currency: validate_currency_code(currency.as_ref())?,
            estimated_delivery: None,
            manual: false,
        })
    }

    pub fn with_estimated_delivery(mut self, estimated_delivery: Option<UtcDateTime>) -> Self {
        self.estimated_delivery = estimated_delivery;
        self
    }
}
