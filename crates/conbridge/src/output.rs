use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use conbridge_frame::LogRecord;
use serde::Serialize;

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
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct RecordOutput<'a> {
    kind: &'static str,
    channel_id: i32,
    channel_name: &'a str,
    severity: i32,
    color: [u8; 4],
    message: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct CommandOutput<'a> {
    kind: &'static str,
    command: &'a str,
    bytes: usize,
    timestamp: String,
}

pub fn print_record(record: &LogRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = RecordOutput {
                kind: "log",
                channel_id: record.channel_id,
                channel_name: &record.channel_name,
                severity: record.severity,
                color: record.rgba(),
                message: &record.message,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let [r, g, b, a] = record.rgba();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "ID", "SEVERITY", "COLOR", "MESSAGE"])
                .add_row(vec![
                    record.channel_name.clone(),
                    record.channel_id.to_string(),
                    record.severity.to_string(),
                    format!("#{r:02x}{g:02x}{b:02x}{a:02x}"),
                    record.message.trim_end_matches('\n').to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "[{}/{}] sev={} {}",
                record.channel_name,
                record.channel_id,
                record.severity,
                record.message.trim_end_matches('\n')
            );
        }
        OutputFormat::Raw => {
            print_raw(record.message.as_bytes());
        }
    }
}

/// Report a command that was sent or executed.
pub fn print_command(kind: &'static str, command: &str, format: OutputFormat) {
    let display = command.trim_end_matches('\n');
    match format {
        OutputFormat::Json => {
            let out = CommandOutput {
                kind,
                command: display,
                bytes: command.len(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "BYTES", "COMMAND"])
                .add_row(vec![
                    kind.to_string(),
                    command.len().to_string(),
                    display.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{kind}: {display}"),
        OutputFormat::Raw => print_raw(command.as_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
