use parcelhub_core::ProviderId;
use parcelhub_settings::DEFAULT_SHIPPING_PROVIDER_KEY;
use serde::Serialize;

use crate::cli::{DefaultProviderArgs, DefaultProviderCommand};
use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct DefaultProviderData {
    /// Provider the registry currently hands out.
    default: Option<ProviderId>,
    /// Value stored in the settings database, if any.
    persisted: Option<String>,
}

pub fn run(args: &DefaultProviderArgs, context: &Context) -> Result<CommandResult, CliError> {
    let registry = context.service.registry();
    if let DefaultProviderCommand::Set { provider } = &args.command {
        registry.set_default_provider(provider)?;
    }

    let default = registry.default_provider();
    let persisted = context.settings.get(DEFAULT_SHIPPING_PROVIDER_KEY)?;
    let mut result = CommandResult::ok(serde_json::to_value(DefaultProviderData {
        default: default.clone(),
        persisted,
    })?);
    if let Some(default) = default {
        result = result.with_provider(default);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parcelhub_core::testing::StubCarrier;

    use super::*;
    use crate::commands::test_support::{context, shared};

    #[test]
    fn set_persists_and_show_reads_back() {
        let alpha = Arc::new(StubCarrier::new("alpha"));
        let beta = Arc::new(StubCarrier::new("beta"));
        let context = context(vec![shared(&alpha), shared(&beta)]);

        let shown = run(
            &DefaultProviderArgs {
                command: DefaultProviderCommand::Show,
            },
            &context,
        )
        .expect("show");
        assert_eq!(shown.data["default"], "alpha");
        assert!(shown.data["persisted"].is_null());

        let set = run(
            &DefaultProviderArgs {
                command: DefaultProviderCommand::Set {
                    provider: String::from("BETA"),
                },
            },
            &context,
        )
        .expect("set");
        assert_eq!(set.data["default"], "beta");
        assert_eq!(set.data["persisted"], "beta");
    }

    #[test]
    fn unregistered_defaults_are_refused() {
        let alpha = Arc::new(StubCarrier::new("alpha"));
        let context = context(vec![shared(&alpha)]);

        let error = run(
            &DefaultProviderArgs {
                command: DefaultProviderCommand::Set {
                    provider: String::from("fedex"),
                },
            },
            &context,
        )
        .expect_err("fedex is not registered");

        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            context
                .settings
                .get(DEFAULT_SHIPPING_PROVIDER_KEY)
                .expect("readable settings"),
            None
        );
    }
}
