use parcelhub_core::{Address, ProviderId};

use crate::cli::ValidateAddressArgs;
use crate::error::CliError;

use super::{read_json, CommandResult, Context};

pub async fn run(args: &ValidateAddressArgs, context: &Context) -> Result<CommandResult, CliError> {
    let address: Address = read_json(&args.address)?;

    let validation = context
        .service
        .validate_address(&address, args.provider.as_deref())
        .await?;

    let valid = validation.valid;
    let data = serde_json::to_value(validation)?;
    let mut result = CommandResult::ok(data);
    if let Some(provider) = &args.provider {
        result = result.with_provider(ProviderId::parse(provider)?);
    }
    if !valid {
        result = result.with_warning("address was rejected by the carrier");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use parcelhub_core::testing::StubCarrier;
    use parcelhub_core::{AddressValidation, CarrierError};

    use super::*;
    use crate::commands::test_support::{context, shared};

    fn address_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(
            br#"{"line1": "Rue Neuve 1", "city": "Bruxelles", "postal_code": "1000", "country": "BE"}"#,
        )
        .expect("write address");
        file
    }

    #[tokio::test]
    async fn failover_reaches_a_working_carrier() {
        // Given: the default carrier is down, beta accepts the address
        let alpha = Arc::new(
            StubCarrier::new("alpha")
                .with_address_result(Err(CarrierError::unavailable("validation API down"))),
        );
        let beta = Arc::new(StubCarrier::new("beta"));
        let context = context(vec![shared(&alpha), shared(&beta)]);
        let file = address_file();

        // When
        let args = ValidateAddressArgs {
            address: file.path().to_path_buf(),
            provider: None,
        };
        let result = run(&args, &context).await.expect("validation");

        // Then
        assert_eq!(result.data["valid"], true);
        assert_eq!(alpha.address_calls(), 1);
        assert_eq!(beta.address_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_addresses_carry_a_warning() {
        let alpha = Arc::new(StubCarrier::new("alpha").with_address_result(Ok(
            AddressValidation::invalid(vec![String::from("unknown street")]),
        )));
        let context = context(vec![shared(&alpha)]);
        let file = address_file();

        let args = ValidateAddressArgs {
            address: file.path().to_path_buf(),
            provider: Some(String::from("alpha")),
        };
        let result = run(&args, &context).await.expect("validation");

        assert_eq!(result.data["valid"], false);
        assert_eq!(result.providers.len(), 1);
        assert_eq!(result.warnings.len(), 1);
    }
}
