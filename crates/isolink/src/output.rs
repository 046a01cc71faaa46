use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use isolink_adaptor::AdaptorStats;
use isolink_field::Message;
use serde::{Deserialize, Serialize};

use crate::exit::{CliError, CliResult, DATA_INVALID};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One message as a JSON line: field number to hex value.
///
/// This is both the `run` input format and its JSON output payload.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct MessageLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub fields: BTreeMap<u16, String>,
}

impl MessageLine {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            header: msg.header().map(hex::encode_upper),
            fields: msg
                .fields()
                .map(|(number, value)| (number, hex::encode_upper(value)))
                .collect(),
        }
    }

    pub fn into_message(self) -> CliResult<Message> {
        let mut msg = Message::new();
        for (number, value) in self.fields {
            let bytes = hex::decode(value.trim()).map_err(|err| {
                CliError::new(DATA_INVALID, format!("field {number}: invalid hex: {err}"))
            })?;
            msg.set(number, bytes);
        }
        if let Some(header) = self.header {
            let bytes = hex::decode(header.trim())
                .map_err(|err| CliError::new(DATA_INVALID, format!("header: invalid hex: {err}")))?;
            msg.set_header(Some(bytes));
        }
        Ok(msg)
    }
}

/// Parse one input line into a message.
pub fn parse_message_line(line: &str) -> CliResult<Message> {
    let parsed: MessageLine = serde_json::from_str(line)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid message line: {err}")))?;
    parsed.into_message()
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    schema_id: &'a str,
    adaptor: &'a str,
    #[serde(flatten)]
    message: MessageLine,
    timestamp: String,
}

pub fn print_message(msg: &Message, adaptor: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                schema_id: "https://schemas.3leaps.dev/isolink/cli/v1/message-received.schema.json",
                adaptor,
                message: MessageLine::from_message(msg),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "LENGTH", "VALUE"]);
            if let Some(header) = msg.header() {
                table.add_row(vec![
                    "header".to_string(),
                    header.len().to_string(),
                    hex::encode_upper(header),
                ]);
            }
            for (number, value) in msg.fields() {
                table.add_row(vec![
                    number.to_string(),
                    value.len().to_string(),
                    hex::encode_upper(value),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let fields: Vec<String> = msg
                .fields()
                .map(|(number, value)| format!("{number}={}", hex::encode_upper(value)))
                .collect();
            println!("adaptor={adaptor} {}", fields.join(" "));
        }
        OutputFormat::Raw => {
            let line = serde_json::to_string(&MessageLine::from_message(msg))
                .unwrap_or_else(|_| "{}".to_string());
            println!("{line}");
        }
    }
}

pub fn print_stats(stats: &AdaptorStats, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADAPTOR", "STATE", "CONNECTED", "TX", "RX", "CONNECTS", "IDLE (ms)"])
                .add_row(vec![
                    stats.name.clone(),
                    stats.state.to_string(),
                    stats.connected.to_string(),
                    stats.tx.to_string(),
                    stats.rx.to_string(),
                    stats.connects.to_string(),
                    stats.idle_ms.map_or_else(|| "-".to_string(), |idle| idle.to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "adaptor={} state={} connected={} tx={} rx={} connects={}",
                stats.name, stats.state, stats.connected, stats.tx, stats.rx, stats.connects
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
