use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionOutput<'a> {
    name: &'a str,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol_version: Option<u8>,
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let out = VersionOutput {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        protocol_version: args.extended.then_some(ipclink_session::IPC_VERSION),
    };

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        ),
        _ => {
            println!("{} {}", out.name, out.version);
            if let Some(protocol) = out.protocol_version {
                println!("protocol version {protocol}");
            }
        }
    }

    Ok(SUCCESS)
}
