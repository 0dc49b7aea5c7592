use std::sync::Arc;

use ipclink_session::{start_server, ServerConfig, SessionError};

use crate::cmd::ServeArgs;
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = ServerConfig {
        encryption: args.encrypted,
        ..ServerConfig::default()
    };
    if let Some(base_path) = args.base_path {
        config.socket_base_path = base_path;
    }
    if let Some(max_msg_size) = args.max_msg_size {
        config.max_msg_size = max_msg_size;
    }

    let server = Arc::new(
        start_server(&args.name, Some(config))
            .map_err(|err| session_error("server start failed", err))?,
    );

    install_ctrlc_handler(Arc::clone(&server))?;

    let mut printed = 0usize;

    loop {
        let msg = match server.read() {
            Ok(msg) => msg,
            // Closed locally (Ctrl-C) or the queue went away with the peer.
            Err(SessionError::Closed) | Err(SessionError::QueueClosed) => break,
            Err(err) => return Err(session_error("receive failed", err)),
        };

        print_message(&msg, format);
        printed = printed.saturating_add(1);

        if args.echo {
            if let Err(err) = server.write(msg.msg_type, &msg.data) {
                tracing::warn!(%err, "echo write failed");
            }
        }

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    server.close();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(server: Arc<ipclink_session::Server>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        server.close();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
