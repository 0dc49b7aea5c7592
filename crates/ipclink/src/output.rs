use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ipclink_session::{msg_type::msg_type_name, Message};
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
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    msg_type: i32,
    msg_type_name: &'a str,
    data_size: usize,
    data: String,
    timestamp: String,
}

pub fn print_message(msg: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                msg_type: msg.msg_type,
                msg_type_name: msg_type_name(msg.msg_type),
                data_size: msg.data.len(),
                data: payload_preview(&msg.data),
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
                .set_header(vec!["TYPE", "SIZE", "DATA"])
                .add_row(vec![
                    msg_type_name(msg.msg_type).to_string(),
                    msg.data.len().to_string(),
                    payload_preview(&msg.data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} ({}) size={} data={}",
                msg.msg_type,
                msg_type_name(msg.msg_type),
                msg.data.len(),
                payload_preview(&msg.data)
            );
        }
        OutputFormat::Raw => {
            print_raw(&msg.data);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
