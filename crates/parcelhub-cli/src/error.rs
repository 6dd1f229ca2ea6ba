use parcelhub_core::{CarrierError, CarrierErrorKind, ConfigError, CoreError, ValidationError};
use parcelhub_settings::SettingsError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("carrier error [{}]: {}", .0.code(), .0.message())]
    Carrier(#[from] CarrierError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("command error: {0}")]
    Command(String),

    #[error("cannot read '{path}': {reason}")]
    Input { path: String, reason: String },

    #[error("strict mode failed: warnings={warning_count}")]
    StrictModeViolation { warning_count: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(error) => Self::Validation(error),
            CoreError::Settings(error) => Self::Settings(error),
            CoreError::Carrier(error) => Self::Carrier(error),
            CoreError::Config(error) => Self::Config(error),
            CoreError::Serialization(error) => Self::Serialization(error),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) | Self::Input { .. } => 2,
            Self::Carrier(error) => match error.kind() {
                CarrierErrorKind::InvalidRequest | CarrierErrorKind::ProviderNotRegistered => 2,
                CarrierErrorKind::Authentication => 7,
                _ => 3,
            },
            Self::Serialization(_) => 4,
            Self::StrictModeViolation { .. } => 5,
            Self::Config(_) => 6,
            Self::Settings(_) => 8,
            Self::Io(_) => 10,
        }
    }
}
