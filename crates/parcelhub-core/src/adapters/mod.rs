//! Carrier integrations.
//!
//! | Carrier | Auth | Units | Notes |
//! |---------|------|-------|-------|
//! | [`SendcloudCarrier`] | Basic (public key : secret key) | kg / cm | shipping methods grouped by family |
//! | [`DhlCarrier`] | OAuth2 client credentials, token cached | kg / cm | |
//! | [`UpsCarrier`] | static key + secret headers, account number | lb / in | returns full country names |

mod country;
mod dhl;
mod sendcloud;
mod ups;

pub use dhl::DhlCarrier;
pub use sendcloud::SendcloudCarrier;
pub use ups::UpsCarrier;

pub(crate) use country::country_code;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::carrier::CarrierError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::throttling::ThrottlingQueue;
use crate::ProviderId;

/// Throttles, executes and status-checks one carrier call.
pub(crate) async fn send(
    provider: &ProviderId,
    http_client: &dyn HttpClient,
    throttle: &ThrottlingQueue,
    request: HttpRequest,
) -> Result<HttpResponse, CarrierError> {
    if let Err(retry_after) = throttle.acquire() {
        return Err(CarrierError::rate_limited(format!(
            "{provider} client-side quota exhausted, retry in {} ms",
            retry_after.as_millis()
        )));
    }

    debug!(provider = %provider, url = %request.url, "carrier request");
    let response = http_client
        .execute(request)
        .await
        .map_err(|error| CarrierError::from_transport(provider, &error))?;

    if !response.is_success() {
        return Err(CarrierError::from_status(
            provider,
            response.status,
            &response.body,
        ));
    }
    Ok(response)
}

pub(crate) fn json_body<T: Serialize>(
    provider: &ProviderId,
    request: HttpRequest,
    payload: &T,
) -> Result<HttpRequest, CarrierError> {
    request.with_json(payload).map_err(|error| {
        CarrierError::internal(format!("failed to encode {provider} request: {error}"))
    })
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    provider: &ProviderId,
    body: &str,
) -> Result<T, CarrierError> {
    serde_json::from_str(body).map_err(|error| {
        CarrierError::malformed_response(format!("{provider} returned an unexpected payload: {error}"))
    })
}

/// Parses a decimal amount that carriers send as a JSON string.
pub(crate) fn parse_amount(provider: &ProviderId, value: &str) -> Result<f64, CarrierError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite() && *amount >= 0.0)
        .ok_or_else(|| {
            CarrierError::malformed_response(format!("{provider} returned an invalid amount '{value}'"))
        })
}

/// Trims a configured base URL so paths can be appended with `/`.
pub(crate) fn base_url(configured: Option<&str>, default: &str) -> String {
    configured
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_owned()
}
