//! Behavior-driven tests for the shipping service
//!
//! These tests verify HOW the service combines carriers: fan-out tolerance,
//! the rate cache window, the tracking race and the manual booking fallback.

use parcelhub_core::testing::StubCarrier;
use parcelhub_core::{
    Address, Carrier, CarrierError, CarrierErrorKind, CreateShipmentOptions, Label, ManualPricing,
    PackageDetails, ProviderId, ProviderRegistry, RateCache, RateRequest, ServiceConfig, ServiceLevel,
    ShippingAddress, ShippingService, TrackingStatus,
};
use parcelhub_tests::shared;
use std::sync::Arc;
use std::time::Duration;

fn belgian_party(name: &str, city: &str, postal: &str) -> ShippingAddress {
    ShippingAddress::new(
        name,
        Address::new("Grote Markt 1", city, postal, "BE").expect("valid address"),
    )
    .expect("valid party")
}

fn one_kilo_box() -> Vec<PackageDetails> {
    vec![PackageDetails::new(1.0, 10.0, 10.0, 10.0).expect("valid package")]
}

fn be_to_be() -> RateRequest {
    RateRequest::new(
        belgian_party("Webshop", "Antwerpen", "2000"),
        belgian_party("Customer", "Gent", "9000"),
        one_kilo_box(),
    )
    .expect("valid request")
}

fn service_over(carriers: Vec<Arc<dyn Carrier>>, cache: RateCache) -> ShippingService {
    ShippingService::new(
        Arc::new(ProviderRegistry::new(carriers)),
        cache,
        ServiceConfig {
            call_timeout: Duration::from_millis(500),
        },
    )
}

fn booking(provider: Option<&str>, allow_manual_fallback: bool) -> CreateShipmentOptions {
    CreateShipmentOptions {
        shipper: belgian_party("Webshop", "Antwerpen", "2000"),
        recipient: belgian_party("Customer", "Gent", "9000"),
        packages: one_kilo_box(),
        service_level: String::from("standard"),
        provider: provider.map(str::to_owned),
        rate_id: None,
        label_format: None,
        reference: Some(String::from("ORDER-42")),
        insured_value: None,
        residential: None,
        allow_manual_fallback,
    }
}

// =============================================================================
// Rates: fan-out
// =============================================================================

#[tokio::test]
async fn when_one_carrier_fails_rates_contain_exactly_the_other_carriers_quote() {
    // Given: carrier A quoting STANDARD at EUR 8.50 and carrier B failing
    let alpha = StubCarrier::new("alpha");
    let expected = alpha.quote(ServiceLevel::Standard, 8.50, "EUR");
    let alpha: Arc<dyn Carrier> = Arc::new(alpha.with_rates(vec![expected.clone()]));
    let beta: Arc<dyn Carrier> = Arc::new(
        StubCarrier::new("beta").failing_rates(CarrierError::unavailable("beta is down")),
    );
    let service = service_over(vec![alpha, beta], RateCache::default());

    // When: rates are requested for a 1 kg BE -> BE parcel
    let quotes = service
        .get_rates(&be_to_be(), None, true)
        .await
        .expect("fan-out tolerates failures");

    // Then: the result is exactly A's quote
    assert_eq!(quotes, vec![expected]);
}

#[tokio::test]
async fn when_every_carrier_fails_rates_are_empty_and_not_cached() {
    // Given: two failing carriers
    let alpha = Arc::new(
        StubCarrier::new("alpha").failing_rates(CarrierError::unavailable("alpha is down")),
    );
    let beta: Arc<dyn Carrier> = Arc::new(
        StubCarrier::new("beta").failing_rates(CarrierError::timeout(
            &parcelhub_core::ProviderId::parse("beta").expect("valid"),
            500,
        )),
    );
    let service = service_over(vec![shared(&alpha), beta], RateCache::default());

    // When: rates are requested twice
    let first = service.get_rates(&be_to_be(), None, true).await.expect("rates");
    let second = service.get_rates(&be_to_be(), None, true).await.expect("rates");

    // Then: both are empty and both went to the carriers
    assert!(first.is_empty());
    assert!(second.is_empty());
    assert_eq!(alpha.rate_calls(), 2);
    assert!(service.cache().is_empty().await);
}

#[tokio::test]
async fn when_provider_is_not_registered_rates_fail_with_typed_error() {
    // Given: a service with one carrier
    let alpha: Arc<dyn Carrier> = Arc::new(StubCarrier::new("alpha"));
    let service = service_over(vec![alpha], RateCache::default());

    // When: rates are pinned to an unknown carrier
    let error = service
        .get_rates(&be_to_be(), Some("fedex"), true)
        .await
        .expect_err("unknown carrier");

    // Then: the error names the problem
    assert_eq!(error.kind(), CarrierErrorKind::ProviderNotRegistered);
}

#[tokio::test]
async fn when_pinned_carrier_rejects_credentials_rates_fail_instead_of_coming_back_empty() {
    // Given: a single carrier whose API key is rejected
    let alpha = Arc::new(
        StubCarrier::new("alpha").failing_rates(CarrierError::authentication("401 bad key")),
    );
    let service = service_over(vec![shared(&alpha)], RateCache::default());

    // When: rates are pinned to that carrier
    let error = service
        .get_rates(&be_to_be(), Some("alpha"), true)
        .await
        .expect_err("a rejected key is not an empty offer list");

    // Then: the caller sees the authentication failure and the carrier is demoted
    assert_eq!(error.kind(), CarrierErrorKind::Authentication);
    assert!(!service
        .registry()
        .is_working(&ProviderId::parse("alpha").expect("valid provider")));
    assert!(service.cache().is_empty().await);
}

#[tokio::test]
async fn when_pinned_carrier_has_no_offers_rates_are_empty_but_ok() {
    // Given: a healthy carrier without offers for this lane
    let alpha = Arc::new(StubCarrier::new("alpha"));
    let service = service_over(vec![shared(&alpha)], RateCache::default());

    // When
    let quotes = service
        .get_rates(&be_to_be(), Some("alpha"), true)
        .await
        .expect("no offers is not an error");

    // Then
    assert!(quotes.is_empty());
}

// =============================================================================
// Rates: cache
// =============================================================================

#[tokio::test]
async fn when_same_shape_is_requested_twice_carriers_are_called_once() {
    // Given: two quoting carriers
    let alpha = StubCarrier::new("alpha");
    let alpha_quote = alpha.quote(ServiceLevel::Standard, 8.50, "EUR");
    let alpha = Arc::new(alpha.with_rates(vec![alpha_quote]));
    let beta = StubCarrier::new("beta");
    let beta_quote = beta.quote(ServiceLevel::Express, 15.00, "EUR");
    let beta = Arc::new(beta.with_rates(vec![beta_quote]));
    let service = service_over(vec![shared(&alpha), shared(&beta)], RateCache::default());

    // When: the same request shape is quoted twice
    let first = service.get_rates(&be_to_be(), None, true).await.expect("rates");
    let second = service.get_rates(&be_to_be(), None, true).await.expect("rates");

    // Then: one fan-out served both calls
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(alpha.rate_calls(), 1);
    assert_eq!(beta.rate_calls(), 1);
}

#[tokio::test]
async fn when_cache_hit_is_pinned_to_a_provider_only_its_quotes_are_returned() {
    // Given: a warmed cache holding quotes from two carriers
    let alpha = StubCarrier::new("alpha");
    let alpha_quote = alpha.quote(ServiceLevel::Standard, 8.50, "EUR");
    let alpha = Arc::new(alpha.with_rates(vec![alpha_quote]));
    let beta = StubCarrier::new("beta");
    let beta_quote = beta.quote(ServiceLevel::Express, 15.00, "EUR");
    let beta = Arc::new(beta.with_rates(vec![beta_quote.clone()]));
    let service = service_over(vec![shared(&alpha), shared(&beta)], RateCache::default());
    service.get_rates(&be_to_be(), None, true).await.expect("warm cache");

    // When: the same shape is requested for beta only
    let pinned = service
        .get_rates(&be_to_be(), Some("BETA"), true)
        .await
        .expect("rates");

    // Then: the cached quotes are filtered, no carrier is called again
    assert_eq!(pinned, vec![beta_quote]);
    assert_eq!(beta.rate_calls(), 1);
}

#[tokio::test]
async fn when_rates_were_pinned_first_a_later_fan_out_still_sees_every_carrier() {
    // Given: two quoting carriers and a pinned lookup for alpha
    let alpha = StubCarrier::new("alpha");
    let alpha_quote = alpha.quote(ServiceLevel::Standard, 8.50, "EUR");
    let alpha = Arc::new(alpha.with_rates(vec![alpha_quote]));
    let beta = StubCarrier::new("beta");
    let beta_quote = beta.quote(ServiceLevel::Standard, 7.00, "EUR");
    let beta = Arc::new(beta.with_rates(vec![beta_quote]));
    let service = service_over(vec![shared(&alpha), shared(&beta)], RateCache::default());
    let pinned = service
        .get_rates(&be_to_be(), Some("alpha"), true)
        .await
        .expect("rates");
    assert_eq!(pinned.len(), 1);

    // When: the same shape is quoted across carriers
    let merged = service.get_rates(&be_to_be(), None, true).await.expect("rates");

    // Then: both carriers are present, beta having been asked by the fan-out
    let providers = merged
        .iter()
        .map(|quote| quote.provider_name.as_str().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(providers, vec!["alpha", "beta"]);
    assert_eq!(beta.rate_calls(), 1);
}

#[tokio::test]
async fn when_cache_window_expires_carriers_are_called_again() {
    // Given: a cache with a short TTL
    let alpha = StubCarrier::new("alpha");
    let quote = alpha.quote(ServiceLevel::Standard, 8.50, "EUR");
    let alpha = Arc::new(alpha.with_rates(vec![quote]));
    let service = service_over(vec![shared(&alpha)], RateCache::new(Duration::from_millis(50)));

    // When: the shape is quoted, the window passes, and it is quoted again
    service.get_rates(&be_to_be(), None, true).await.expect("rates");
    tokio::time::sleep(Duration::from_millis(80)).await;
    service.get_rates(&be_to_be(), None, true).await.expect("rates");

    // Then: each window triggered one fan-out
    assert_eq!(alpha.rate_calls(), 2);
}

#[tokio::test]
async fn when_cache_is_bypassed_every_call_fans_out() {
    // Given: a quoting carrier
    let alpha = StubCarrier::new("alpha");
    let quote = alpha.quote(ServiceLevel::Standard, 8.50, "EUR");
    let alpha = Arc::new(alpha.with_rates(vec![quote]));
    let service = service_over(vec![shared(&alpha)], RateCache::default());

    // When: rates are requested twice without the cache
    service.get_rates(&be_to_be(), None, false).await.expect("rates");
    service.get_rates(&be_to_be(), None, false).await.expect("rates");

    // Then: both calls reached the carrier and nothing was stored
    assert_eq!(alpha.rate_calls(), 2);
    assert!(service.cache().is_empty().await);
}

// =============================================================================
// Tracking race
// =============================================================================

#[tokio::test]
async fn when_only_second_carrier_knows_the_parcel_its_answer_wins() {
    // Given: A does not know the parcel, B reports it DELIVERED
    let alpha: Arc<dyn Carrier> = Arc::new(StubCarrier::new("alpha"));
    let beta: Arc<dyn Carrier> =
        Arc::new(StubCarrier::new("beta").with_tracking_status(TrackingStatus::Delivered));
    let service = service_over(vec![alpha, beta], RateCache::default());

    // When: the parcel is tracked without naming a carrier
    let response = service
        .track_shipment("3SABCD0123456789", None)
        .await
        .expect("tracking");

    // Then: B's response is returned
    assert_eq!(response.provider_name.as_str(), "beta");
    assert_eq!(response.status, TrackingStatus::Delivered);
    assert!(!response.degraded);
}

#[tokio::test]
async fn when_fast_carrier_resolves_the_parcel_slow_carriers_are_not_awaited() {
    // Given: a slow carrier and a fast one that knows the parcel
    let slow: Arc<dyn Carrier> = Arc::new(
        StubCarrier::new("slow")
            .with_tracking_status(TrackingStatus::InTransit)
            .with_delay(Duration::from_millis(400)),
    );
    let fast: Arc<dyn Carrier> =
        Arc::new(StubCarrier::new("fast").with_tracking_status(TrackingStatus::OutForDelivery));
    let service = service_over(vec![slow, fast], RateCache::default());

    // When: the parcel is tracked
    let started = tokio::time::Instant::now();
    let response = service.track_shipment("JJD000390007", None).await.expect("tracking");

    // Then: the fast answer wins well before the slow carrier finishes
    assert_eq!(response.provider_name.as_str(), "fast");
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn when_no_carrier_knows_the_parcel_a_degraded_unknown_is_returned() {
    // Given: two carriers that do not know the parcel
    let alpha: Arc<dyn Carrier> = Arc::new(StubCarrier::new("alpha"));
    let beta: Arc<dyn Carrier> = Arc::new(StubCarrier::new("beta"));
    let service = service_over(vec![alpha, beta], RateCache::default());

    // When: the parcel is tracked
    let response = service.track_shipment("UNKNOWN-1", None).await.expect("tracking");

    // Then: the answer is UNKNOWN, degraded, from the first registered carrier
    assert_eq!(response.status, TrackingStatus::Unknown);
    assert!(response.degraded);
    assert_eq!(response.provider_name.as_str(), "alpha");
}

#[tokio::test]
async fn when_tracking_is_pinned_only_that_carrier_is_asked() {
    // Given: two carriers that both know the parcel
    let alpha = Arc::new(StubCarrier::new("alpha").with_tracking_status(TrackingStatus::Delivered));
    let beta = Arc::new(StubCarrier::new("beta").with_tracking_status(TrackingStatus::InTransit));
    let service = service_over(vec![shared(&alpha), shared(&beta)], RateCache::default());

    // When: tracking is pinned to beta
    let response = service
        .track_shipment("1Z999AA10123456784", Some("beta"))
        .await
        .expect("tracking");

    // Then: only beta was asked
    assert_eq!(response.status, TrackingStatus::InTransit);
    assert_eq!(alpha.tracking_calls(), 0);
    assert_eq!(beta.tracking_calls(), 1);
}

// =============================================================================
// Booking
// =============================================================================

#[tokio::test]
async fn when_booking_without_provider_the_default_carrier_books() {
    // Given: two healthy carriers, the first being the default
    let alpha = Arc::new(StubCarrier::new("alpha"));
    let beta = Arc::new(StubCarrier::new("beta"));
    let service = service_over(vec![shared(&alpha), shared(&beta)], RateCache::default());

    // When: a shipment is booked without naming a carrier
    let response = service
        .create_shipment(booking(None, false))
        .await
        .expect("booking");

    // Then: the default carrier booked it
    assert_eq!(response.provider_name.as_str(), "alpha");
    assert_eq!(response.tracking_number, "ALPHA-TRK-1");
    assert!(!response.manual);
    assert_eq!(beta.shipment_calls(), 0);
}

#[tokio::test]
async fn when_live_booking_fails_and_fallback_is_allowed_a_manual_booking_is_made() {
    // Given: a carrier whose booking endpoint is down but offers manual pricing
    let alpha: Arc<dyn Carrier> = Arc::new(
        StubCarrier::new("alpha")
            .failing_shipments(CarrierError::unavailable("label service down"))
            .with_manual_pricing(ManualPricing::new(6.0, 1.5, "EUR")),
    );
    let service = service_over(vec![alpha], RateCache::default());

    // When: the caller opts into the manual fallback
    let response = service
        .create_shipment(booking(Some("alpha"), true))
        .await
        .expect("manual booking");

    // Then: a flagged placeholder booking with heuristic pricing is returned
    assert!(response.manual);
    assert!(response.tracking_number.starts_with("MANUAL-"));
    assert_eq!(response.label, Label::Pending);
    assert_eq!(response.total_amount, 7.5);
    assert_eq!(response.currency, "EUR");
}

#[tokio::test]
async fn when_live_booking_fails_without_fallback_the_error_is_surfaced() {
    // Given: a failing carrier with manual pricing
    let alpha: Arc<dyn Carrier> = Arc::new(
        StubCarrier::new("alpha")
            .failing_shipments(CarrierError::unavailable("label service down"))
            .with_manual_pricing(ManualPricing::new(6.0, 1.5, "EUR")),
    );
    let service = service_over(vec![alpha], RateCache::default());

    // When: the caller does not opt into the fallback
    let error = service
        .create_shipment(booking(None, false))
        .await
        .expect_err("live failure");

    // Then: the carrier error is returned as is
    assert_eq!(error.kind(), CarrierErrorKind::Unavailable);
}

#[tokio::test]
async fn when_service_level_is_unknown_nothing_is_booked() {
    // Given: a healthy carrier
    let alpha = Arc::new(StubCarrier::new("alpha"));
    let service = service_over(vec![shared(&alpha)], RateCache::default());
    let mut options = booking(None, true);
    options.service_level = String::from("teleport");

    // When: the booking names an unknown service level
    let error = service.create_shipment(options).await.expect_err("invalid level");

    // Then: the request is rejected before reaching the carrier
    assert_eq!(error.kind(), CarrierErrorKind::InvalidRequest);
    assert_eq!(alpha.shipment_calls(), 0);
}

#[tokio::test]
async fn when_requested_carrier_is_down_the_substitute_never_sees_its_rate_id() {
    // Given: alpha is demoted and the caller books against one of alpha's rates
    let alpha = Arc::new(StubCarrier::new("alpha"));
    let beta = Arc::new(StubCarrier::new("beta"));
    let service = service_over(vec![shared(&alpha), shared(&beta)], RateCache::default());
    service
        .registry()
        .mark_provider_as_not_working(&ProviderId::parse("alpha").expect("valid provider"));
    let mut options = booking(Some("alpha"), false);
    options.rate_id = Some(String::from("alpha-standard"));

    // When
    let shipment = service.create_shipment(options).await.expect("booking");

    // Then: beta booked without alpha's rate id
    assert_eq!(shipment.provider_name.as_str(), "beta");
    assert_eq!(alpha.shipment_calls(), 0);
    let booked = beta.last_shipment().expect("beta received the booking");
    assert_eq!(booked.rate_id, None);
}

#[tokio::test]
async fn when_requested_carrier_books_its_rate_id_is_kept() {
    let alpha = Arc::new(StubCarrier::new("alpha"));
    let service = service_over(vec![shared(&alpha)], RateCache::default());
    let mut options = booking(Some("alpha"), false);
    options.rate_id = Some(String::from("alpha-standard"));

    service.create_shipment(options).await.expect("booking");

    let booked = alpha.last_shipment().expect("alpha received the booking");
    assert_eq!(booked.rate_id.as_deref(), Some("alpha-standard"));
}
