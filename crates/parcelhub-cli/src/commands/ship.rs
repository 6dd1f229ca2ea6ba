use parcelhub_core::CreateShipmentOptions;

use crate::cli::ShipArgs;
use crate::error::CliError;

use super::{read_json, CommandResult, Context};

pub async fn run(args: &ShipArgs, context: &Context) -> Result<CommandResult, CliError> {
    let mut options: CreateShipmentOptions = read_json(&args.request)?;
    if args.provider.is_some() {
        options.provider = args.provider.clone();
    }
    options.allow_manual_fallback |= args.manual_fallback;

    let shipment = context.service.create_shipment(options).await?;

    let provider = shipment.provider_name.clone();
    let manual = shipment.manual;
    let tracking_number = shipment.tracking_number.clone();
    let data = serde_json::to_value(shipment)?;

    let mut result = CommandResult::ok(data).with_provider(provider);
    if manual {
        result = result.with_warning(format!(
            "carrier booking failed; {tracking_number} is a manual placeholder without a label"
        ));
    }
    Ok(result)
}
