use std::io::{self, Write};

use parcelhub_core::ProviderId;
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::CliError;

/// Metadata attached to every command result.
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    pub command: &'static str,
    pub generated_at: String,
    /// Carriers that contributed to `data`, in the order they answered.
    pub providers: Vec<ProviderId>,
    pub latency_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub meta: EnvelopeMeta,
    pub data: Value,
}

impl Envelope {
    pub fn new(
        command: &'static str,
        data: Value,
        providers: Vec<ProviderId>,
        latency_ms: u64,
        warnings: Vec<String>,
    ) -> Result<Self, CliError> {
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|error| CliError::Command(format!("timestamp formatting failed: {error}")))?;

        Ok(Self {
            meta: EnvelopeMeta {
                request_id: Uuid::new_v4().hyphenated().to_string(),
                command,
                generated_at,
                providers,
                latency_ms,
                warnings,
            },
            data,
        })
    }
}

pub fn render(envelope: &Envelope, pretty: bool) -> Result<(), CliError> {
    let json = to_json(envelope, pretty)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

fn to_json(envelope: &Envelope, pretty: bool) -> Result<String, CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };
    Ok(json)
}
