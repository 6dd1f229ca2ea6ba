use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::UtcDateTime;
use crate::{ProviderId, ValidationError};

/// Normalized parcel status. Every carrier code maps onto exactly one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingStatus {
    Created,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Exception,
    Unknown,
}

impl TrackingStatus {
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::PickedUp,
        Self::InTransit,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Exception,
        Self::Unknown,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PickedUp => "PICKED_UP",
            Self::InTransit => "IN_TRANSIT",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Exception => "EXCEPTION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Display for TrackingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRequest {
    pub tracking_number: String,
    /// Destination postal code; some carriers require it for lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

impl TrackingRequest {
    pub fn new(tracking_number: impl Into<String>) -> Result<Self, ValidationError> {
        let tracking_number = tracking_number.into().trim().to_owned();
        if tracking_number.is_empty() {
            return Err(ValidationError::EmptyTrackingNumber);
        }
        Ok(Self {
            tracking_number,
            postal_code: None,
        })
    }

    pub fn with_postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = Some(postal_code.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub timestamp: UtcDateTime,
    pub status: TrackingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingResponse {
    pub provider_name: ProviderId,
    pub tracking_number: String,
    pub status: TrackingStatus,
    pub events: Vec<TrackingEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<UtcDateTime>,
    /// Set when the carrier call failed and this response is synthetic.
    #[serde(default)]
    pub degraded: bool,
}

impl TrackingResponse {
    /// Builds a response from carrier events ordered oldest first; the current
    /// status is the status of the newest event.
    pub fn from_events(
        provider_name: ProviderId,
        tracking_number: impl Into<String>,
        mut events: Vec<TrackingEvent>,
        estimated_delivery: Option<UtcDateTime>,
    ) -> Self {
        events.sort_by_key(|event| event.timestamp);
        let status = events
            .last()
            .map(|event| event.status)
            .unwrap_or(TrackingStatus::Unknown);
        Self {
            provider_name,
            tracking_number: tracking_number.into(),
            status,
            events,
            estimated_delivery,
            degraded: false,
        }
    }

    /// UNKNOWN response whose single event carries the failure description.
    pub fn degraded(
        provider_name: ProviderId,
        tracking_number: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            provider_name,
            tracking_number: tracking_number.into(),
            status: TrackingStatus::Unknown,
            events: vec![TrackingEvent {
                timestamp: UtcDateTime::now(),
                status: TrackingStatus::Unknown,
                location: None,
                description: error_description.into(),
            }],
            estimated_delivery: None,
            degraded: true,
        }
    }
}
