use thiserror::Error;

/// Validation errors raised when constructing shipping value types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    #[error("country must be a 2-letter ISO code: '{value}'")]
    InvalidCountry { value: String },

    #[error("currency must be a 3-letter uppercase ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be greater than zero")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("request must include at least one package")]
    NoPackages,

    #[error("invalid service level '{value}', expected one of standard, express, priority, economy")]
    InvalidServiceLevel { value: String },

    #[error("invalid label format '{value}', expected one of pdf, zpl, png")]
    InvalidLabelFormat { value: String },

    #[error("provider name '{value}' must be non-empty ASCII alphanumeric, '-' or '_'")]
    InvalidProviderName { value: String },

    #[error("tracking number cannot be empty")]
    EmptyTrackingNumber,

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
}

/// Top-level error type for core operations outside the carrier contract.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Settings(#[from] parcelhub_settings::SettingsError),

    #[error(transparent)]
    Carrier(#[from] crate::CarrierError),

    #[error(transparent)]
    Config(#[from] crate::ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
