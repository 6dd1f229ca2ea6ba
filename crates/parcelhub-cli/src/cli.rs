//! CLI argument definitions for parcelhub.
//!
//! Every command prints one JSON envelope on stdout; logs go to stderr.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rates` | Shop rates across carriers |
//! | `ship` | Book a shipment and fetch its label |
//! | `track` | Track a parcel |
//! | `validate-address` | Check an address with a carrier |
//! | `providers` | Show carrier health, optionally probing credentials |
//! | `default-provider` | Show or persist the default carrier |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as errors |
//! | `--settings-db` | `$PARCELHUB_HOME/settings.duckdb` | Settings database path |
//! | `--timeout-ms` | `PARCELHUB_CALL_TIMEOUT_MS` or `8000` | Per-carrier call timeout |
//! | `--log-level` | `info` | Log filter when `RUST_LOG` is unset |
//! | `--log-json` | `false` | Emit logs as JSON lines |
//!
//! # Examples
//!
//! ```bash
//! # Cheapest rates for a request file
//! parcelhub rates --request rate.json --pretty
//!
//! # Track with whichever carrier knows the parcel
//! parcelhub track 1Z999AA10123456784
//!
//! # Persist DHL as default carrier
//! parcelhub default-provider set dhl
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// parcelhub - multi-carrier shipping from the command line
///
/// Credentials come from `PARCELHUB_<CARRIER>_API_KEY`, `_API_SECRET`,
/// `_ACCOUNT_NUMBER` and `_BASE_URL`; only configured carriers are used.
#[derive(Debug, Parser)]
#[command(
    name = "parcelhub",
    author,
    version,
    about = "Multi-carrier shipping CLI",
    long_about = "parcelhub talks to several parcel carriers through one interface:\n\
\n\
  • Rate shopping across Sendcloud, DHL and UPS\n\
  • Booking with optional manual fallback\n\
  • Tracking raced across carriers\n\
  • Address validation with failover\n\
\n\
Use 'parcelhub <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Exit with a failure code when the command produced warnings.
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Path of the DuckDB settings database.
    #[arg(long, global = true, value_name = "PATH")]
    pub settings_db: Option<PathBuf>,

    /// Per-carrier call timeout in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shop rates across carriers.
    ///
    /// The request file holds a rate request: `shipper`, `recipient` and
    /// `packages`. Quotes are cached per request shape.
    ///
    /// # Examples
    ///
    /// ```bash
    /// parcelhub rates --request rate.json
    /// parcelhub rates --request rate.json --provider ups --no-cache
    /// ```
    Rates(RatesArgs),

    /// Book a shipment.
    ///
    /// The request file holds shipment options: `shipper`, `recipient`,
    /// `packages`, `service_level` and optional `rate_id`, `label_format`,
    /// `reference`, `insured_value`.
    ///
    /// # Examples
    ///
    /// ```bash
    /// parcelhub ship --request shipment.json --provider dhl
    /// parcelhub ship --request shipment.json --manual-fallback
    /// ```
    Ship(ShipArgs),

    /// Track a parcel.
    ///
    /// # Examples
    ///
    /// ```bash
    /// parcelhub track 00340434161094042557
    /// parcelhub track 1Z999AA10123456784 --provider ups
    /// ```
    Track(TrackArgs),

    /// Validate an address.
    ///
    /// # Examples
    ///
    /// ```bash
    /// parcelhub validate-address --address address.json
    /// ```
    ValidateAddress(ValidateAddressArgs),

    /// Show carrier health.
    ///
    /// # Examples
    ///
    /// ```bash
    /// parcelhub providers
    /// parcelhub providers --check
    /// ```
    Providers(ProvidersArgs),

    /// Show or persist the default carrier.
    ///
    /// # Examples
    ///
    /// ```bash
    /// parcelhub default-provider show
    /// parcelhub default-provider set sendcloud
    /// ```
    DefaultProvider(DefaultProviderArgs),
}

#[derive(Debug, Args)]
pub struct RatesArgs {
    /// JSON rate request file, `-` for stdin.
    #[arg(long, value_name = "FILE")]
    pub request: PathBuf,

    /// Ask only this carrier.
    #[arg(long)]
    pub provider: Option<String>,

    /// Skip the rate cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

#[derive(Debug, Args)]
pub struct ShipArgs {
    /// JSON shipment options file, `-` for stdin.
    #[arg(long, value_name = "FILE")]
    pub request: PathBuf,

    /// Book with this carrier instead of the default.
    #[arg(long)]
    pub provider: Option<String>,

    /// Book a manual placeholder when the live booking fails.
    #[arg(long, default_value_t = false)]
    pub manual_fallback: bool,
}

#[derive(Debug, Args)]
pub struct TrackArgs {
    pub tracking_number: String,

    /// Ask only this carrier.
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Debug, Args)]
pub struct ValidateAddressArgs {
    /// JSON address file, `-` for stdin.
    #[arg(long, value_name = "FILE")]
    pub address: PathBuf,

    /// Ask only this carrier.
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProvidersArgs {
    /// Test every carrier's credentials and update health accordingly.
    #[arg(long, default_value_t = false)]
    pub check: bool,
}

#[derive(Debug, Args)]
pub struct DefaultProviderArgs {
    #[command(subcommand)]
    pub command: DefaultProviderCommand,
}

#[derive(Debug, Subcommand)]
pub enum DefaultProviderCommand {
    /// Print the effective default carrier.
    Show,
    /// Persist a new default carrier.
    Set {
        /// Registered carrier name.
        provider: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "parcelhub",
            "track",
            "1Z999AA10123456784",
            "--provider",
            "ups",
            "--pretty",
            "--timeout-ms",
            "2500",
        ])
        .expect("valid arguments");

        assert!(cli.pretty);
        assert_eq!(cli.timeout_ms, Some(2500));
        match cli.command {
            Command::Track(args) => {
                assert_eq!(args.tracking_number, "1Z999AA10123456784");
                assert_eq!(args.provider.as_deref(), Some("ups"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn default_provider_set_requires_a_name() {
        assert!(Cli::try_parse_from(["parcelhub", "default-provider", "set"]).is_err());

        let cli = Cli::try_parse_from(["parcelhub", "default-provider", "set", "dhl"])
            .expect("valid arguments");
        match cli.command {
            Command::DefaultProvider(DefaultProviderArgs {
                command: DefaultProviderCommand::Set { provider },
            }) => assert_eq!(provider, "dhl"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
