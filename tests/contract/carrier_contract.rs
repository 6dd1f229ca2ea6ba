use std::sync::Arc;

use parcelhub_core::{
    Address, Carrier, CarrierCredentials, CarrierErrorKind, DhlCarrier, HttpError, HttpResponse,
    PackageDetails, RateRequest, ScriptedHttpClient, SendcloudCarrier, ShippingAddress,
    TrackingRequest, TrackingStatus, UpsCarrier,
};

struct CarrierCase {
    name: &'static str,
    carrier: Arc<dyn Carrier>,
    http: Arc<ScriptedHttpClient>,
}

fn credentials(base_url: &str) -> CarrierCredentials {
    CarrierCredentials::new("contract-key", "contract-secret")
        .with_account_number("ACC123")
        .with_base_url(base_url)
}

/// Every adapter wired to the same scripted transport behaviour.
fn carrier_cases(script: impl Fn() -> ScriptedHttpClient) -> Vec<CarrierCase> {
    let sendcloud_http = Arc::new(script());
    let dhl_http = Arc::new(script());
    let ups_http = Arc::new(script());

    vec![
        CarrierCase {
            name: "sendcloud",
            carrier: Arc::new(SendcloudCarrier::new(
                credentials("https://sendcloud.contract.test/api/v2"),
                sendcloud_http.clone(),
            )),
            http: sendcloud_http,
        },
        CarrierCase {
            name: "dhl",
            carrier: Arc::new(DhlCarrier::new(
                credentials("https://dhl.contract.test"),
                dhl_http.clone(),
            )),
            http: dhl_http,
        },
        CarrierCase {
            name: "ups",
            carrier: Arc::new(
                UpsCarrier::new(credentials("https://ups.contract.test/api"), ups_http.clone())
                    .expect("complete ups credentials"),
            ),
            http: ups_http,
        },
    ]
}

fn address() -> Address {
    Address::new("Rue Neuve 1", "Bruxelles", "1000", "BE").expect("valid address")
}

fn rate_request() -> RateRequest {
    let party = ShippingAddress::new("Contract Shop", address()).expect("valid party");
    RateRequest::new(
        party.clone(),
        party,
        vec![PackageDetails::new(1.0, 10.0, 10.0, 10.0).expect("valid package")],
    )
    .expect("valid request")
}

fn unavailable() -> ScriptedHttpClient {
    ScriptedHttpClient::new().route("", HttpResponse::new(503, "maintenance"))
}

fn rejecting_credentials() -> ScriptedHttpClient {
    ScriptedHttpClient::new().route("", HttpResponse::new(401, "invalid credentials"))
}

#[test]
fn every_carrier_reports_its_own_provider_name() {
    for case in carrier_cases(ScriptedHttpClient::new) {
        assert_eq!(case.carrier.provider_name().as_str(), case.name);
    }
}

#[test]
fn every_carrier_offers_manual_pricing() {
    for case in carrier_cases(ScriptedHttpClient::new) {
        let pricing = case
            .carrier
            .manual_pricing()
            .unwrap_or_else(|| panic!("{} should offer manual pricing", case.name));
        assert!(pricing.base_amount > 0.0, "{}", case.name);
        assert!(pricing.per_kg_amount >= 0.0, "{}", case.name);
        assert_eq!(pricing.currency.len(), 3, "{}", case.name);
    }
}

#[tokio::test]
async fn unavailable_upstream_yields_retryable_rate_errors() {
    for case in carrier_cases(unavailable) {
        let error = case
            .carrier
            .get_rates(rate_request())
            .await
            .expect_err("503 must not produce quotes");

        assert_eq!(error.kind(), CarrierErrorKind::Unavailable, "{}", case.name);
        assert!(error.retryable(), "{}", case.name);
    }
}

#[tokio::test]
async fn transport_failures_never_panic_tracking() {
    let script = || {
        ScriptedHttpClient::new().route_error("", HttpError::new("connection reset by peer"))
    };
    for case in carrier_cases(script) {
        let response = case
            .carrier
            .track_shipment(TrackingRequest::new("CONTRACT-1").expect("valid"))
            .await;

        assert!(response.degraded, "{}", case.name);
        assert_eq!(response.status, TrackingStatus::Unknown, "{}", case.name);
        assert_eq!(response.tracking_number, "CONTRACT-1");
        assert_eq!(response.provider_name.as_str(), case.name);
        assert_eq!(response.events.len(), 1, "{}", case.name);
    }
}

#[tokio::test]
async fn rejected_credentials_surface_as_authentication_errors() {
    for case in carrier_cases(rejecting_credentials) {
        let error = case
            .carrier
            .get_rates(rate_request())
            .await
            .expect_err("401 must not produce quotes");
        assert_eq!(error.kind(), CarrierErrorKind::Authentication, "{}", case.name);

        let check = case.carrier.test_authentication().await;
        assert!(!check.authenticated, "{}", case.name);
        assert!(!check.message.is_empty(), "{}", case.name);
    }
}

#[tokio::test]
async fn address_validation_failures_are_errors_not_verdicts() {
    for case in carrier_cases(unavailable) {
        let error = case
            .carrier
            .validate_address(address())
            .await
            .expect_err("503 is not an address verdict");

        assert_eq!(error.kind(), CarrierErrorKind::Unavailable, "{}", case.name);
    }
}

#[tokio::test]
async fn invalid_packages_are_rejected_before_any_http_call() {
    for case in carrier_cases(ScriptedHttpClient::new) {
        let mut request = rate_request();
        request.packages[0].weight_kg = 0.0;

        let error = case
            .carrier
            .get_rates(request)
            .await
            .expect_err("zero weight must be rejected");

        assert_eq!(error.kind(), CarrierErrorKind::InvalidRequest, "{}", case.name);
        assert!(case.http.recorded_requests().is_empty(), "{}", case.name);
    }
}

#[tokio::test]
async fn malformed_payloads_are_reported_as_such() {
    let script = || ScriptedHttpClient::new().route("", HttpResponse::ok_json("<html>gateway</html>"));
    for case in carrier_cases(script) {
        let error = case
            .carrier
            .get_rates(rate_request())
            .await
            .expect_err("html is not a rate payload");

        assert_eq!(error.kind(), CarrierErrorKind::MalformedResponse, "{}", case.name);
    }
}
