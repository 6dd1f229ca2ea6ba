//! # Parcelhub Core
//!
//! Multi-carrier shipping abstraction: one contract over several parcel
//! carriers, with rate shopping, booking, tracking and address validation.
//!
//! ## Overview
//!
//! - **Carrier-neutral domain models** for addresses, parcels, quotes,
//!   bookings and tracking events
//! - **Carrier trait** implemented by one adapter per carrier API
//! - **Rate cache** keyed by request shape, shared by all carriers
//! - **Provider registry** with health tracking and a persisted default
//! - **Shipping service** exposing the four consumer operations
//! - **Health probe** that re-promotes recovered carriers
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Sendcloud, DHL and UPS adapters |
//! | [`cache`] | Rate cache |
//! | [`carrier`] | Carrier trait and error type |
//! | [`config`] | Environment configuration and credentials |
//! | [`domain`] | Domain models |
//! | [`error`] | Validation and core errors |
//! | [`fallback`] | Manual booking fallback |
//! | [`health`] | Per-provider health bookkeeping |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`policy`] | Per-carrier quota and timeout policy |
//! | [`probe`] | Background authentication probe |
//! | [`provider`] | Provider identifiers |
//! | [`registry`] | Provider registry and builder |
//! | [`service`] | Shipping service |
//! | `testing` | In-process carrier double (feature `testing`) |
//! | [`throttling`] | Client-side rate limiting |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parcelhub_core::{RegistryBuilder, ShippingConfig, ShippingService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ShippingConfig::from_env()?;
//!     let registry = Arc::new(RegistryBuilder::from_config(config.clone()).build()?);
//!     let service = ShippingService::from_config(registry, &config);
//!
//!     let tracking = service.track_shipment("1Z999AA10123456784", None).await?;
//!     println!("{} via {}", tracking.status, tracking.provider_name);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ShippingService │────▶│ RateCache        │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ProviderRegistry│◀────│ HealthProbe      │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Carrier         │────▶│ HTTP Client      │
//! │ (Adapter Trait) │     │ (reqwest)        │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Carrier-facing operations return [`CarrierError`], whose kind tells the
//! caller what to do next:
//!
//! ```rust
//! use parcelhub_core::{CarrierError, CarrierErrorKind};
//!
//! fn handle_error(error: CarrierError) {
//!     match error.kind() {
//!         CarrierErrorKind::RateLimited | CarrierErrorKind::Timeout => {
//!             // Retry later
//!         }
//!         CarrierErrorKind::InvalidRequest => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Credentials are read from environment variables and never logged
//! - Carrier APIs are only reached over HTTPS by default

pub mod adapters;
pub mod cache;
pub mod carrier;
pub mod config;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod health;
pub mod http_client;
pub mod policy;
pub mod probe;
pub mod provider;
pub mod registry;
pub mod service;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod throttling;

// Adapter implementations
pub use adapters::{DhlCarrier, SendcloudCarrier, UpsCarrier};

// Caching
pub use cache::{RateCache, DEFAULT_RATE_CACHE_TTL};

// Carrier trait and types
pub use carrier::{
    AddressValidation, AuthCheck, Carrier, CarrierError, CarrierErrorKind, CarrierFuture,
};

// Configuration
pub use config::{CarrierCredentials, ConfigError, ShippingConfig, DEFAULT_CALL_TIMEOUT};

// Domain models
pub use domain::{
    Address, ImperialMeasures, Label, LabelFormat, PackageDetails, RateQuote, RateRequest,
    ServiceLevel, ShipmentRequest, ShipmentResponse, ShippingAddress, TrackingEvent,
    TrackingRequest, TrackingResponse, TrackingStatus, UtcDateTime,
};

// Error types
pub use error::{CoreError, ValidationError};

// Manual booking fallback
pub use fallback::{is_manual_tracking_number, ManualPricing, MANUAL_TRACKING_PREFIX};

// Health tracking
pub use health::{HealthConfig, ProviderHealth};
pub use probe::{HealthProbe, ProbeConfig, ProbeHandle, ProbeReport};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};

// Carrier policies
pub use policy::{BackoffPolicy, CarrierPolicy};

// Provider identifiers
pub use provider::ProviderId;

// Registry and service
pub use registry::{ProviderRegistry, RegistryBuilder};
pub use service::{CreateShipmentOptions, ServiceConfig, ShippingService};

// Throttling
pub use throttling::ThrottlingQueue;
