use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{PackageDetails, ShippingAddress, UtcDateTime};
use crate::{ProviderId, ValidationError};

/// Carrier-neutral service tier every carrier product maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceLevel {
    Standard,
    Express,
    Priority,
    Economy,
}

impl ServiceLevel {
    pub const ALL: [Self; 4] = [Self::Standard, Self::Express, Self::Priority, Self::Economy];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Express => "EXPRESS",
            Self::Priority => "PRIORITY",
            Self::Economy => "ECONOMY",
        }
    }
}

impl Display for ServiceLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceLevel {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "express" => Ok(Self::Express),
            "priority" => Ok(Self::Priority),
            "economy" => Ok(Self::Economy),
            other => Err(ValidationError::InvalidServiceLevel {
                value: other.to_owned(),
            }),
        }
    }
}

/// Input for rate shopping. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRequest {
    pub shipper: ShippingAddress,
    pub recipient: ShippingAddress,
    pub packages: Vec<PackageDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_level: Option<ServiceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residential: Option<bool>,
}

impl RateRequest {
    pub fn new(
        shipper: ShippingAddress,
        recipient: ShippingAddress,
        packages: Vec<PackageDetails>,
    ) -> Result<Self, ValidationError> {
        let request = Self {
            shipper,
            recipient,
            packages,
            service_level: None,
            residential: None,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_service_level(mut self, service_level: ServiceLevel) -> Self {
        self.service_level = Some(service_level);
        self
    }

    pub fn with_residential(mut self, residential: bool) -> Self {
        self.residential = Some(residential);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.shipper.validate()?;
        self.recipient.validate()?;
        validate_packages(&self.packages)
    }
}

pub(crate) fn validate_packages(packages: &[PackageDetails]) -> Result<(), ValidationError> {
    if packages.is_empty() {
        return Err(ValidationError::NoPackages);
    }
    packages.iter().try_for_each(PackageDetails::validate)
}

/// One bookable offer from one carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub provider_name: ProviderId,
    pub service_level: ServiceLevel,
    /// Carrier's own product code, kept for display and booking.
    pub service_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<UtcDateTime>,
    pub total_amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_days: Option<u32>,
    pub rate_id: String,
}

impl RateQuote {
    pub fn new(
        provider_name: ProviderId,
        service_level: ServiceLevel,
        service_code: impl Into<String>,
        total_amount: f64,
        currency: impl AsRef<str>,
        rate_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        validate_amount("total_amount", total_amount)?;
        Ok(Self {
            provider_name,
            service_level,
            service_code: service_code.into(),
            delivery_date: None,
            total_amount,
            currency: validate_currency_code(currency.as_ref())?,
            transit_days: None,
            rate_id: rate_id.into(),
        })
    }

    pub fn with_transit_days(mut self, transit_days: Option<u32>) -> Self {
        self.transit_days = transit_days;
        self
    }

    pub fn with_delivery_date(mut self, delivery_date: Option<UtcDateTime>) -> Self {
        self.delivery_date = delivery_date;
        self
    }
}

pub fn validate_currency_code(value: &str) -> Result<String, ValidationError> {
    let valid = value.len() == 3 && value.chars().all(|ch| ch.is_ascii_uppercase());
    if !valid {
        return Err(ValidationError::InvalidCurrency {
            value: value.to_owned(),
        });
    }
    Ok(value.to_owned())
}

pub(crate) fn validate_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
