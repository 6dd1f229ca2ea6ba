use std::sync::Arc;

use parcelhub_core::{HealthProbe, ProbeConfig, ProbeReport, ProviderHealth};
use serde::Serialize;

use crate::cli::ProvidersArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct ProvidersResponseData {
    providers: Vec<ProviderHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checks: Option<Vec<ProbeReport>>,
}

pub async fn run(args: &ProvidersArgs, context: &Context) -> Result<CommandResult, CliError> {
    let registry = context.service.registry();

    // Probe first so the snapshot reflects the fresh results.
    let checks = if args.check {
        let probe = HealthProbe::new(Arc::clone(registry), ProbeConfig::default());
        Some(probe.probe_once().await)
    } else {
        None
    };

    let failed = checks
        .iter()
        .flatten()
        .filter(|report| !report.authenticated)
        .map(|report| format!("{}: {}", report.provider, report.message))
        .collect::<Vec<_>>();

    let providers = registry.snapshots();
    let ids = providers
        .iter()
        .map(|health| health.provider.clone())
        .collect::<Vec<_>>();
    let data = serde_json::to_value(ProvidersResponseData { providers, checks })?;

    Ok(failed.into_iter().fold(
        CommandResult::ok(data).with_providers(ids),
        |result, failure| result.with_warning(format!("authentication check failed for {failure}")),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::commands::test_support::{context, shared};
    use parcelhub_core::testing::StubCarrier;

    #[tokio::test]
    async fn snapshots_list_every_carrier_without_probing() {
        let alpha = Arc::new(StubCarrier::new("alpha"));
        let beta = Arc::new(StubCarrier::new("beta"));
        let context = context(vec![shared(&alpha), shared(&beta)]);

        let result = run(&ProvidersArgs { check: false }, &context)
            .await
            .expect("providers");

        assert_eq!(result.data["providers"].as_array().map(Vec::len), Some(2));
        assert_eq!(result.data["providers"][0]["is_default"], true);
        assert!(result.data.get("checks").is_none());
        assert_eq!(alpha.auth_calls(), 0);
    }

    #[tokio::test]
    async fn check_demotes_carriers_with_rejected_credentials() {
        // Given: alpha's credentials are no longer accepted
        let alpha = Arc::new(StubCarrier::new("alpha"));
        alpha.set_authenticated(false);
        let beta = Arc::new(StubCarrier::new("beta"));
        let context = context(vec![shared(&alpha), shared(&beta)]);

        // When
        let result = run(&ProvidersArgs { check: true }, &context)
            .await
            .expect("providers");

        // Then: alpha is reported unhealthy and beta took over as default
        assert_eq!(result.data["providers"][0]["working"], false);
        assert_eq!(result.data["providers"][1]["is_default"], true);
        assert_eq!(result.data["checks"].as_array().map(Vec::len), Some(2));
        assert_eq!(result.warnings.len(), 1);
    }
}
