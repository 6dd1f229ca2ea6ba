use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_PROVIDER_LEN: usize = 32;

/// Case-insensitive carrier identifier, stored lowercase.
///
/// Used as the health-map key and as the provider name stamped on quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    pub const SENDCLOUD: &'static str = "sendcloud";
    pub const DHL: &'static str = "dhl";
    pub const UPS: &'static str = "ups";

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_lowercase();
        let valid = !normalized.is_empty()
            && normalized.len() <= MAX_PROVIDER_LEN
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(ValidationError::InvalidProviderName {
                value: input.to_owned(),
            });
        }
        Ok(Self(normalized))
    }

    /// Builds an id from a compile-time constant known to be valid.
    pub(crate) fn from_static(value: &'static str) -> Self {
        Self(value.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProviderId> for String {
    fn from(value: ProviderId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_case_insensitive() {
        let upper = ProviderId::parse(" DHL ").expect("valid provider");
        let lower = ProviderId::parse("dhl").expect("valid provider");
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "dhl");
    }

    #[test]
    fn rejects_blank_and_punctuated_names() {
        assert!(ProviderId::parse("   ").is_err());
        assert!(ProviderId::parse("dhl express").is_err());
        assert!(ProviderId::parse("ups!").is_err());
    }
}
