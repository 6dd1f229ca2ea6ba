//! Manual (degraded) booking used when a live carrier booking fails and the
//! caller opted in.
//!
//! Manual bookings are non-authoritative: the tracking number starts with
//! [`MANUAL_TRACKING_PREFIX`], the label is [`Label::Pending`] and the
//! response has `manual = true`, so reconciliation can find and re-book them.

use crate::domain::{total_weight_kg, Label, ShipmentRequest, ShipmentResponse};
use crate::{CarrierError, ProviderId};

pub const MANUAL_TRACKING_PREFIX: &str = "MANUAL-";

/// Heuristic price: `base_amount + per_kg_amount * total weight`.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualPricing {
    pub base_amount: f64,
    pub per_kg_amount: f64,
    pub currency: &'static str,
}

impl ManualPricing {
    pub const fn new(base_amount: f64, per_kg_amount: f64, currency: &'static str) -> Self {
        Self {
            base_amount,
            per_kg_amount,
            currency,
        }
    }

    pub fn price(&self, req: &ShipmentRequest) -> f64 {
        let amount = self.base_amount + self.per_kg_amount * total_weight_kg(&req.packages);
        (amount * 100.0).round() / 100.0
    }
}

/// Synthesizes a placeholder booking for `provider`.
pub fn manual_booking(
    provider: ProviderId,
    pricing: &ManualPricing,
    req: &ShipmentRequest,
) -> Result<ShipmentResponse, CarrierError> {
    let placeholder = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    let tracking_number = format!("{MANUAL_TRACKING_PREFIX}{}", &placeholder[..12]);
    let shipment_id = format!("manual-{placeholder}");

    let mut response = ShipmentResponse::new(
        provider,
        tracking_number,
        Label::Pending,
        shipment_id,
        pricing.price(req),
        pricing.currency,
    )?;
    response.manual = true;
    Ok(response)
}

/// `true` for tracking numbers produced by [`manual_booking`].
pub fn is_manual_tracking_number(tracking_number: &str) -> bool {
    tracking_number.starts_with(MANUAL_TRACKING_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, PackageDetails, ServiceLevel, ShippingAddress};

    fn request(weights: &[f64]) -> ShipmentRequest {
        let address = Address::new("Meir 10", "Antwerpen", "2000", "BE").expect("valid");
        let party = ShippingAddress::new("Shop", address).expect("valid");
        let packages = weights
            .iter()
            .map(|weight| PackageDetails::new(*weight, 10.0, 10.0, 10.0).expect("valid"))
            .collect();
        ShipmentRequest::new(party.clone(), party, packages, ServiceLevel::Standard)
            .expect("valid request")
    }

    #[test]
    fn price_is_base_plus_linear_weight_surcharge() {
        let pricing = ManualPricing::new(5.0, 1.25, "EUR");
        assert_eq!(pricing.price(&request(&[2.0, 2.0])), 10.0);
    }

    #[test]
    fn manual_booking_is_clearly_marked() {
        let provider = ProviderId::parse("sendcloud").expect("valid");
        let pricing = ManualPricing::new(5.0, 1.0, "EUR");
        let booking = manual_booking(provider, &pricing, &request(&[1.0])).expect("booking");

        assert!(booking.manual);
        assert!(is_manual_tracking_number(&booking.tracking_number));
        assert_eq!(booking.label, Label::Pending);
        assert_eq!(booking.total_amount, 6.0);
        assert_eq!(booking.currency, "EUR");
    }
}
