//! Environment-driven configuration.
//!
//! Every variable is read under its `PARCELHUB_` name first and falls back to
//! the unprefixed name, so existing deployments keep working.
//!
//! | Setting | Primary | Fallback | Default |
//! |---------|---------|----------|---------|
//! | default provider | `PARCELHUB_DEFAULT_PROVIDER` | `DEFAULT_SHIPPING_PROVIDER` | `sendcloud` |
//! | rate cache TTL | `PARCELHUB_RATE_CACHE_TTL_SECS` | `RATE_CACHE_TTL_SECS` | 3600 |
//! | per-call timeout | `PARCELHUB_CALL_TIMEOUT_MS` | `CALL_TIMEOUT_MS` | 8000 |
//! | API key | `PARCELHUB_<CARRIER>_API_KEY` | `<CARRIER>_API_KEY` | - |
//! | API secret | `PARCELHUB_<CARRIER>_API_SECRET` | `<CARRIER>_API_SECRET` | - |
//! | account number | `PARCELHUB_<CARRIER>_ACCOUNT_NUMBER` | `<CARRIER>_ACCOUNT_NUMBER` | - |
//! | base URL | `PARCELHUB_<CARRIER>_BASE_URL` | `<CARRIER>_BASE_URL` | carrier production URL |

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::cache::DEFAULT_RATE_CACHE_TTL;
use crate::ProviderId;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(8_000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: String, value: String },

    #[error("{carrier} credentials are incomplete: {var} is not set")]
    IncompleteCredentials { carrier: &'static str, var: String },
}

/// Credentials and endpoint of one carrier account.
#[derive(Clone, PartialEq, Eq)]
pub struct CarrierCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub account_number: Option<String>,
    pub base_url: Option<String>,
}

impl CarrierCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            account_number: None,
            base_url: None,
        }
    }

    pub fn with_account_number(mut self, account_number: impl Into<String>) -> Self {
        self.account_number = Some(account_number.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

// Secrets stay out of logs and panic messages.
impl std::fmt::Debug for CarrierCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("account_number", &self.account_number)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Process-level shipping configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingConfig {
    pub default_provider: Option<String>,
    pub rate_cache_ttl: Duration,
    pub call_timeout: Duration,
    pub sendcloud: Option<CarrierCredentials>,
    pub dhl: Option<CarrierCredentials>,
    pub ups: Option<CarrierCredentials>,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            rate_cache_ttl: DEFAULT_RATE_CACHE_TTL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            sendcloud: None,
            dhl: None,
            ups: None,
        }
    }
}

impl ShippingConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Fails on unparsable numbers and on carriers configured with a key but
    /// without the rest of their credentials.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| -> Option<(String, String)> {
            let primary = format!("PARCELHUB_{suffix}");
            lookup(&primary)
                .map(|value| (primary, value))
                .or_else(|| lookup(suffix).map(|value| (suffix.to_owned(), value)))
                .filter(|(_, value)| !value.trim().is_empty())
        };

        let default_provider = lookup("PARCELHUB_DEFAULT_PROVIDER")
            .or_else(|| lookup("DEFAULT_SHIPPING_PROVIDER"))
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty());

        let rate_cache_ttl = match read("RATE_CACHE_TTL_SECS") {
            Some((var, value)) => Duration::from_secs(parse_number(&var, &value)?),
            None => DEFAULT_RATE_CACHE_TTL,
        };
        let call_timeout = match read("CALL_TIMEOUT_MS") {
            Some((var, value)) => Duration::from_millis(parse_number(&var, &value)?),
            None => DEFAULT_CALL_TIMEOUT,
        };

        Ok(Self {
            default_provider,
            rate_cache_ttl,
            call_timeout,
            sendcloud: carrier_credentials(&read, ProviderId::SENDCLOUD, false)?,
            dhl: carrier_credentials(&read, ProviderId::DHL, false)?,
            ups: carrier_credentials(&read, ProviderId::UPS, true)?,
        })
    }

    pub fn has_any_carrier(&self) -> bool {
        self.sendcloud.is_some() || self.dhl.is_some() || self.ups.is_some()
    }
}

fn parse_number(var: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidNumber {
            var: var.to_owned(),
            value: value.to_owned(),
        })
}

fn carrier_credentials<R>(
    read: &R,
    carrier: &'static str,
    needs_account: bool,
) -> Result<Option<CarrierCredentials>, ConfigError>
where
    R: Fn(&str) -> Option<(String, String)>,
{
    let prefix = carrier.to_ascii_uppercase();
    let Some((_, api_key)) = read(&format!("{prefix}_API_KEY")) else {
        return Ok(None);
    };

    let incomplete = |suffix: &str| ConfigError::IncompleteCredentials {
        carrier,
        var: format!("PARCELHUB_{prefix}_{suffix}"),
    };

    let (_, api_secret) = read(&format!("{prefix}_API_SECRET")).ok_or_else(|| incomplete("API_SECRET"))?;
    let account_number = read(&format!("{prefix}_ACCOUNT_NUMBER")).map(|(_, value)| value);
    if needs_account && account_number.is_none() {
        return Err(incomplete("ACCOUNT_NUMBER"));
    }

    Ok(Some(CarrierCredentials {
        api_key,
        api_secret,
        account_number,
        base_url: read(&format!("{prefix}_BASE_URL")).map(|(_, value)| value),
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ShippingConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ShippingConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = config(&[]).expect("config");
        assert_eq!(config, ShippingConfig::default());
        assert!(!config.has_any_carrier());
    }

    #[test]
    fn prefixed_names_win_over_fallbacks() {
        let config = config(&[
            ("PARCELHUB_SENDCLOUD_API_KEY", "primary"),
            ("SENDCLOUD_API_KEY", "fallback"),
            ("SENDCLOUD_API_SECRET", "secret"),
            ("DEFAULT_SHIPPING_PROVIDER", " DHL "),
            ("PARCELHUB_CALL_TIMEOUT_MS", "2500"),
        ])
        .expect("config");

        let sendcloud = config.sendcloud.expect("sendcloud configured");
        assert_eq!(sendcloud.api_key, "primary");
        assert_eq!(sendcloud.api_secret, "secret");
        assert_eq!(config.default_provider.as_deref(), Some("dhl"));
        assert_eq!(config.call_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn ups_requires_an_account_number() {
        let error = config(&[("UPS_API_KEY", "key"), ("UPS_API_SECRET", "secret")])
            .expect_err("account number missing");
        assert_eq!(
            error,
            ConfigError::IncompleteCredentials {
                carrier: "ups",
                var: String::from("PARCELHUB_UPS_ACCOUNT_NUMBER"),
            }
        );
    }

    #[test]
    fn rejects_non_numeric_ttl() {
        let error = config(&[("PARCELHUB_RATE_CACHE_TTL_SECS", "an hour")]).expect_err("invalid");
        assert!(matches!(error, ConfigError::InvalidNumber { .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let credentials = CarrierCredentials::new("key-123", "secret-456");
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("key-123"));
        assert!(!rendered.contains("secret-456"));
    }
}
