use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::path::Path;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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
struct EndpointOutput<'a> {
    schema_id: &'a str,
    host: String,
    port: u16,
    channel_path: String,
}

/// Announce the substitute TCP endpoint on stdout.
///
/// Flushes explicitly so a piped consumer sees the address while the relay
/// keeps running.
pub fn print_endpoint(addr: SocketAddr, path: &Path, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EndpointOutput {
                schema_id: "https://schemas.pipebridge.dev/cli/v1/endpoint.schema.json",
                host: addr.ip().to_string(),
                port: addr.port(),
                channel_path: path.display().to_string(),
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
                .set_header(vec!["HOST", "PORT", "CHANNEL"])
                .add_row(vec![
                    addr.ip().to_string(),
                    addr.port().to_string(),
                    path.display().to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("tcp://{addr} -> {}", path.display());
        }
        OutputFormat::Raw => {
            println!("{addr}");
        }
    }
    let _ = std::io::stdout().flush();
}
