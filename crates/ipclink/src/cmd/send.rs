use std::fs;
use std::time::Duration;

use ipclink_session::{dial_and_handshake, ClientConfig};

use crate::cmd::SendArgs;
use crate::exit::{io_error, session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;

    let mut config = ClientConfig {
        encryption: args.encrypted,
        timeout,
        ..ClientConfig::default()
    };
    if let Some(base_path) = &args.base_path {
        config.socket_base_path = base_path.clone();
    }

    let client = dial_and_handshake(&args.name, Some(config))
        .map_err(|err| session_error("connect failed", err))?;

    let payload = resolve_payload(&args)?;
    client
        .write(args.msg_type, &payload)
        .map_err(|err| session_error("send failed", err))?;

    if args.wait {
        let msg = client
            .read()
            .map_err(|err| session_error("receive failed", err))?;
        print_message(&msg, format);
    }

    client.close();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
