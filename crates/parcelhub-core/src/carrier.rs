//! Carrier adapter contract and its error type.
//!
//! Every carrier integration implements [`Carrier`]. The shipping service only
//! ever talks to carriers through this trait, so a new carrier is one new
//! struct and one registration in the [`RegistryBuilder`](crate::RegistryBuilder).
//!
//! | Method | Failure behavior |
//! |--------|------------------|
//! | [`get_rates`](Carrier::get_rates) | `Err` on call failure, `Ok(vec![])` when no offers |
//! | [`create_shipment`](Carrier::create_shipment) | `Err`, never a partial booking |
//! | [`track_shipment`](Carrier::track_shipment) | never `Err`: degraded UNKNOWN response |
//! | [`validate_address`](Carrier::validate_address) | `Err` on call failure |
//! | [`test_authentication`](Carrier::test_authentication) | never `Err` |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Address, RateQuote, RateRequest, ShipmentRequest, ShipmentResponse, TrackingRequest,
    TrackingResponse,
};
use crate::fallback::ManualPricing;
use crate::http_client::HttpError;
use crate::{ProviderId, ValidationError};

/// Boxed future returned by carrier operations.
pub type CarrierFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierErrorKind {
    Unavailable,
    RateLimited,
    Authentication,
    InvalidRequest,
    MalformedResponse,
    Timeout,
    ProviderNotRegistered,
    NoProviderAvailable,
    Internal,
}

/// Structured carrier error used for failover decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierError {
    kind: CarrierErrorKind,
    message: String,
    retryable: bool,
}

impl CarrierError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(CarrierErrorKind::Unavailable, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(CarrierErrorKind::RateLimited, message, true)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(CarrierErrorKind::Authentication, message, false)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(CarrierErrorKind::InvalidRequest, message, false)
    }

    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(CarrierErrorKind::MalformedResponse, message, true)
    }

    pub fn timeout(provider: &ProviderId, timeout_ms: u64) -> Self {
        Self::new(
            CarrierErrorKind::Timeout,
            format!("carrier '{provider}' did not answer within {timeout_ms}ms"),
            true,
        )
    }

    pub fn provider_not_registered(name: &str) -> Self {
        Self::new(
            CarrierErrorKind::ProviderNotRegistered,
            format!("shipping provider '{name}' is not registered"),
            false,
        )
    }

    pub fn no_provider_available(message: impl Into<String>) -> Self {
        Self::new(CarrierErrorKind::NoProviderAvailable, message, false)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CarrierErrorKind::Internal, message, false)
    }

    fn new(kind: CarrierErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// Maps an HTTP status from a carrier into an error kind.
    pub fn from_status(provider: &ProviderId, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let message = format!("{provider} upstream returned status {status}: {snippet}");
        match status {
            401 | 403 => Self::authentication(message),
            429 => Self::rate_limited(message),
            400 | 404 | 409 | 422 => Self::invalid_request(message),
            _ => Self::unavailable(message),
        }
    }

    pub fn from_transport(provider: &ProviderId, error: &HttpError) -> Self {
        let message = format!("{provider} transport error: {}", error.message());
        if error.retryable() {
            Self::unavailable(message)
        } else {
            Self::internal(message)
        }
    }

    pub const fn kind(&self) -> CarrierErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Credentials or account configuration are unusable; demote immediately.
    pub const fn is_authentication(&self) -> bool {
        matches!(self.kind, CarrierErrorKind::Authentication)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            CarrierErrorKind::Unavailable => "carrier.unavailable",
            CarrierErrorKind::RateLimited => "carrier.rate_limited",
            CarrierErrorKind::Authentication => "carrier.authentication",
            CarrierErrorKind::InvalidRequest => "carrier.invalid_request",
            CarrierErrorKind::MalformedResponse => "carrier.malformed_response",
            CarrierErrorKind::Timeout => "carrier.timeout",
            CarrierErrorKind::ProviderNotRegistered => "carrier.provider_not_registered",
            CarrierErrorKind::NoProviderAvailable => "carrier.no_provider_available",
            CarrierErrorKind::Internal => "carrier.internal",
        }
    }
}

impl Display for CarrierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for CarrierError {}

impl From<ValidationError> for CarrierError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_request(error.to_string())
    }
}

/// Normalized carrier address-correction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl AddressValidation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            suggested_address: None,
            messages: Vec::new(),
        }
    }

    pub fn invalid(messages: Vec<String>) -> Self {
        Self {
            valid: false,
            suggested_address: None,
            messages,
        }
    }
}

/// Result of the cheapest authenticated call against a carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCheck {
    pub authenticated: bool,
    pub message: String,
}

impl AuthCheck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            message: message.into(),
        }
    }
}

/// Carrier adapter contract.
///
/// Implementations must be `Send + Sync`; the shipping service shares them
/// behind `Arc` across concurrently running fan-out tasks.
pub trait Carrier: Send + Sync {
    /// Stable identifier, also the cache and health-map key.
    fn provider_name(&self) -> ProviderId;

    /// Fetches offers for the request shape.
    ///
    /// # Errors
    ///
    /// Returns [`CarrierError`] when the call itself fails (authentication,
    /// transport, malformed payload). Zero offers is `Ok(vec![])`.
    fn get_rates<'a>(
        &'a self,
        req: RateRequest,
    ) -> CarrierFuture<'a, Result<Vec<RateQuote>, CarrierError>>;

    /// Books a label.
    ///
    /// # Errors
    ///
    /// Any failure is surfaced; a partially populated booking is never returned.
    fn create_shipment<'a>(
        &'a self,
        req: ShipmentRequest,
    ) -> CarrierFuture<'a, Result<ShipmentResponse, CarrierError>>;

    /// Looks up a parcel. Carrier failures become a degraded UNKNOWN response.
    fn track_shipment<'a>(&'a self, req: TrackingRequest) -> CarrierFuture<'a, TrackingResponse>;

    /// Validates and possibly corrects an address.
    ///
    /// # Errors
    ///
    /// Returns [`CarrierError`] when the carrier cannot be reached or rejects
    /// the credentials. An invalid address is `Ok` with `valid = false`.
    fn validate_address<'a>(
        &'a self,
        address: Address,
    ) -> CarrierFuture<'a, Result<AddressValidation, CarrierError>>;

    /// Performs the cheapest authenticated call. Never fails.
    fn test_authentication<'a>(&'a self) -> CarrierFuture<'a, AuthCheck>;

    /// Heuristic pricing for placeholder bookings while the carrier is down.
    /// `None` means the carrier does not support manual bookings.
    fn manual_pricing(&self) -> Option<ManualPricing> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_error_kinds() {
        let provider = ProviderId::parse("dhl").expect("valid");
        assert_eq!(
            CarrierError::from_status(&provider, 401, "").kind(),
            CarrierErrorKind::Authentication
        );
        assert_eq!(
            CarrierError::from_status(&provider, 429, "").kind(),
            CarrierErrorKind::RateLimited
        );
        assert_eq!(
            CarrierError::from_status(&provider, 422, "").kind(),
            CarrierErrorKind::InvalidRequest
        );
        let server = CarrierError::from_status(&provider, 502, "bad gateway");
        assert_eq!(server.kind(), CarrierErrorKind::Unavailable);
        assert!(server.retryable());
        assert!(server.message().contains("bad gateway"));
    }

    #[test]
    fn error_display_includes_stable_code() {
        let error = CarrierError::authentication("token rejected");
        assert_eq!(error.to_string(), "token rejected (carrier.authentication)");
        assert!(error.is_authentication());
    }
}
