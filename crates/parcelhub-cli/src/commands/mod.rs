mod default_provider;
mod providers;
mod rates;
mod ship;
mod track;
mod validate_address;

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parcelhub_core::{ProviderId, RegistryBuilder, ShippingConfig, ShippingService};
use parcelhub_settings::{DuckDbSettingsStore, SettingsConfig, SettingsStore};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::output::Envelope;

#[derive(Debug)]
pub struct CommandResult {
    pub data: Value,
    pub providers: Vec<ProviderId>,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            providers: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        if !self.providers.contains(&provider) {
            self.providers.push(provider);
        }
        self
    }

    pub fn with_providers(self, providers: impl IntoIterator<Item = ProviderId>) -> Self {
        providers
            .into_iter()
            .fold(self, |result, provider| result.with_provider(provider))
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// What every command runs against.
pub struct Context {
    pub service: ShippingService,
    pub settings: Arc<dyn SettingsStore>,
}

impl Context {
    fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = ShippingConfig::from_env()?;
        if let Some(timeout_ms) = cli.timeout_ms {
            config.call_timeout = Duration::from_millis(timeout_ms);
        }

        let mut settings_config = SettingsConfig::default();
        if let Some(path) = &cli.settings_db {
            settings_config.db_path = path.clone();
        }
        debug!(path = %settings_config.db_path.display(), "opening settings store");
        let settings: Arc<dyn SettingsStore> = Arc::new(DuckDbSettingsStore::open(settings_config)?);

        let registry = RegistryBuilder::from_config(config.clone())
            .with_settings_store(Arc::clone(&settings))
            .build()?;
        let service = ShippingService::from_config(Arc::new(registry), &config);

        Ok(Self { service, settings })
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let context = Context::from_cli(cli)?;
    let started = Instant::now();

    let (name, result) = dispatch(&cli.command, &context).await?;
    let CommandResult {
        data,
        providers,
        mut warnings,
    } = result;

    if context.service.registry().is_empty() {
        warnings.push(String::from(
            "no carrier is configured; set PARCELHUB_<CARRIER>_API_KEY and _API_SECRET",
        ));
    }

    let latency_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
    Envelope::new(name, data, providers, latency_ms, warnings)
}

async fn dispatch(
    command: &Command,
    context: &Context,
) -> Result<(&'static str, CommandResult), CliError> {
    let outcome = match command {
        Command::Rates(args) => ("rates", rates::run(args, context).await?),
        Command::Ship(args) => ("ship", ship::run(args, context).await?),
        Command::Track(args) => ("track", track::run(args, context).await?),
        Command::ValidateAddress(args) => {
            ("validate-address", validate_address::run(args, context).await?)
        }
        Command::Providers(args) => ("providers", providers::run(args, context).await?),
        Command::DefaultProvider(args) => {
            ("default-provider", default_provider::run(args, context)?)
        }
    };
    Ok(outcome)
}

/// Reads a JSON document from a file, or from stdin when the path is `-`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let shown_path = path.display().to_string();
    let raw = if shown_path == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(path).map_err(|error| CliError::Input {
            path: shown_path.clone(),
            reason: error.to_string(),
        })?
    };

    serde_json::from_str(&raw).map_err(|error| {
        warn!(path = %shown_path, error = %error, "request file is not valid JSON");
        CliError::Input {
            path: shown_path,
            reason: error.to_string(),
        }
    })
}


#[cfg(test)]
mod tests {
    use std::io::Write;

    use parcelhub_core::Address;

    use super::*;

    #[test]
    fn request_files_are_parsed_as_json() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"line1":"Rue Neuve 1","city":"Bruxelles","postal_code":"1000","country":"BE"}}"#
        )
        .expect("write request");

        let address: Address = read_json(file.path()).expect("valid address");
        assert_eq!(address.country, "BE");
    }

    #[test]
    fn unreadable_request_files_report_their_path() {
        let error = read_json::<Address>(Path::new("/nonexistent/parcelhub/address.json"))
            .expect_err("missing file");

        match error {
            CliError::Input { path, .. } => assert_eq!(path, "/nonexistent/parcelhub/address.json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_an_input_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "line1=Rue Neuve").expect("write request");

        let error = read_json::<Address>(file.path()).expect_err("not json");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn providers_are_listed_once_in_first_seen_order() {
        let ups = ProviderId::parse("ups").expect("valid provider");
        let dhl = ProviderId::parse("dhl").expect("valid provider");

        let result = CommandResult::ok(Value::Null).with_providers([
            ups.clone(),
            dhl.clone(),
            ups.clone(),
        ]);

        assert_eq!(result.providers, vec![ups, dhl]);
    }
}
