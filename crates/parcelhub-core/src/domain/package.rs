use serde::{Deserialize, Serialize};

use crate::ValidationError;

const LB_PER_KG: f64 = 2.204_622_621_8;
const IN_PER_CM: f64 = 0.393_700_787_4;

/// One physical parcel, metric units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub weight_kg: f64,
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Imperial measures for carriers that rate in pounds and inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImperialMeasures {
    pub weight_lb: f64,
    pub length_in: f64,
    pub width_in: f64,
    pub height_in: f64,
}

impl PackageDetails {
    pub fn new(
        weight_kg: f64,
        length_cm: f64,
        width_cm: f64,
        height_cm: f64,
    ) -> Result<Self, ValidationError> {
        let package = Self {
            weight_kg,
            length_cm,
            width_cm,
            height_cm,
            description: None,
        };
        package.validate()?;
        Ok(package)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_positive("weight_kg", self.weight_kg)?;
        validate_positive("length_cm", self.length_cm)?;
        validate_positive("width_cm", self.width_cm)?;
        validate_positive("height_cm", self.height_cm)?;
        Ok(())
    }

    /// Orientation-independent shape key: dimensions sorted descending, then weight.
    pub fn shape_key(&self) -> String {
        let mut dims = [self.length_cm, self.width_cm, self.height_cm];
        dims.sort_by(|a, b| b.total_cmp(a));
        format!(
            "{:.1}x{:.1}x{:.1}@{:.3}",
            dims[0], dims[1], dims[2], self.weight_kg
        )
    }

    pub fn to_imperial(&self) -> ImperialMeasures {
        ImperialMeasures {
            weight_lb: round_to(self.weight_kg * LB_PER_KG, 2),
            length_in: round_to(self.length_cm * IN_PER_CM, 1),
            width_in: round_to(self.width_cm * IN_PER_CM, 1),
            height_in: round_to(self.height_cm * IN_PER_CM, 1),
        }
    }
}

/// Sum of package weights in kilograms.
pub fn total_weight_kg(packages: &[PackageDetails]) -> f64 {
    packages.iter().map(|package| package.weight_kg).sum()
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
