//! # Domain Models
//!
//! Carrier-neutral value types exchanged between callers, the shipping
//! service and carrier adapters.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Address`] / [`ShippingAddress`] | Postal address, with contact metadata |
//! | [`PackageDetails`] | One parcel in kg / cm |
//! | [`RateRequest`] / [`RateQuote`] | Rate shopping input and normalized offers |
//! | [`ShipmentRequest`] / [`ShipmentResponse`] | Booking input and durable booking record |
//! | [`TrackingRequest`] / [`TrackingResponse`] | Tracking lookup and normalized events |
//! | [`ServiceLevel`] / [`TrackingStatus`] | Shared enumerations carrier codes map onto |
//!
//! Constructors validate their invariants; values that arrive through serde
//! are re-checked with `validate()` before they reach a carrier.

mod address;
mod package;
mod rate;
mod shipment;
mod timestamp;
mod tracking;

pub use address::{validate_country_code, Address, ShippingAddress};
pub use package::{total_weight_kg, ImperialMeasures, PackageDetails};
pub use rate::{validate_currency_code, RateQuote, RateRequest, ServiceLevel};
pub use shipment::{Label, LabelFormat, ShipmentRequest, ShipmentResponse};
pub use timestamp::UtcDateTime;
pub use tracking::{TrackingEvent, TrackingRequest, TrackingResponse, TrackingStatus};
