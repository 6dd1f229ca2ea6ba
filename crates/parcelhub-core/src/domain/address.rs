use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Postal address. Country is always an uppercase ISO-3166 alpha-2 code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub country: String,
}

impl Address {
    pub fn new(
        line1: impl Into<String>,
        city: impl Into<String>,
        postal_code: impl Into<String>,
        country: impl AsRef<str>,
    ) -> Result<Self, ValidationError> {
        let address = Self {
            line1: line1.into(),
            line2: None,
            city: city.into(),
            postal_code: postal_code.into(),
            state: None,
            country: validate_country_code(country.as_ref())?,
        };
        address.validate()?;
        Ok(address)
    }

    pub fn with_line2(mut self, line2: impl Into<String>) -> Self {
        self.line2 = Some(line2.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Re-checks invariants, used for values that arrived through serde.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("line1", &self.line1)?;
        require_non_empty("city", &self.city)?;
        require_non_empty("postal_code", &self.postal_code)?;
        validate_country_code(&self.country)?;
        Ok(())
    }

    /// Postal code without whitespace, uppercased; used for cache signatures.
    pub fn normalized_postal_code(&self) -> String {
        self.postal_code
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase()
    }
}

/// Address plus contact metadata, required for rating and booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub address: Address,
}

impl ShippingAddress {
    pub fn new(name: impl Into<String>, address: Address) -> Result<Self, ValidationError> {
        let shipping = Self {
            name: name.into(),
            company: None,
            phone: None,
            email: None,
            address,
        };
        shipping.validate()?;
        Ok(shipping)
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("name", &self.name)?;
        self.address.validate()
    }
}

pub fn validate_country_code(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    let valid = trimmed.len() == 2 && trimmed.chars().all(|ch| ch.is_ascii_uppercase());
    if !valid {
        return Err(ValidationError::InvalidCountry {
            value: value.to_owned(),
        });
    }
    Ok(trimmed.to_owned())
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_lowercase_or_long_country_codes() {
        assert!(Address::new("Rue Neuve 1", "Brussels", "1000", "be").is_err());
        assert!(Address::new("Rue Neuve 1", "Brussels", "1000", "BEL").is_err());
        assert!(Address::new("Rue Neuve 1", "Brussels", "1000", "BE").is_ok());
    }

    #[test]
    fn normalizes_postal_code_for_signatures() {
        let address = Address::new("1 High St", "London", "sw1a 1aa", "GB").expect("valid");
        assert_eq!(address.normalized_postal_code(), "SW1A1AA");
    }

    #[test]
    fn shipping_address_flattens_address_fields() {
        let shipping = ShippingAddress::new(
            "Jo Peeters",
            Address::new("Meir 10", "Antwerpen", "2000", "BE").expect("valid"),
        )
        .expect("valid");
        let json = serde_json::to_value(&shipping).expect("serialize");
        assert_eq!(json["country"], "BE");
        assert_eq!(json["name"], "Jo Peeters");
        assert!(json.get("company").is_none());
    }
}
