use parcelhub_core::{RateQuote, RateRequest};
use serde::Serialize;

use crate::cli::RatesArgs;
use crate::error::CliError;

use super::{read_json, CommandResult, Context};

#[derive(Debug, Serialize)]
struct RatesResponseData {
    quotes: Vec<RateQuote>,
}

pub async fn run(args: &RatesArgs, context: &Context) -> Result<CommandResult, CliError> {
    let request: RateRequest = read_json(&args.request)?;
    request.validate()?;

    let quotes = context
        .service
        .get_rates(&request, args.provider.as_deref(), !args.no_cache)
        .await?;

    let providers = quotes
        .iter()
        .map(|quote| quote.provider_name.clone())
        .collect::<Vec<_>>();
    let empty = quotes.is_empty();
    let data = serde_json::to_value(RatesResponseData { quotes })?;

    let mut result = CommandResult::ok(data).with_providers(providers);
    if empty {
        result = result.with_warning("no carrier returned a quote for this request");
    }
    Ok(result)
}
