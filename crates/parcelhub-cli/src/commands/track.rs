use crate::cli::TrackArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

pub async fn run(args: &TrackArgs, context: &Context) -> Result<CommandResult, CliError> {
    let tracking = context
        .service
        .track_shipment(&args.tracking_number, args.provider.as_deref())
        .await?;

    let provider = tracking.provider_name.clone();
    let degraded = tracking.degraded;
    let data = serde_json::to_value(tracking)?;

    let mut result = CommandResult::ok(data).with_provider(provider);
    if degraded {
        result = result.with_warning("no carrier could be reached for this parcel; status is UNKNOWN");
    }
    Ok(result)
}
