use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a server and print (optionally echo) received messages.
    Serve(ServeArgs),
    /// Dial a server and send a single message.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// IPC name to listen on.
    pub name: String,
    /// Directory the socket file is created in.
    #[arg(long, value_name = "DIR")]
    pub base_path: Option<String>,
    /// Offer encrypted transport.
    #[arg(long)]
    pub encrypted: bool,
    /// Maximum message size in bytes.
    #[arg(long)]
    pub max_msg_size: Option<u32>,
    /// Echo every received message back to the client.
    #[arg(long)]
    pub echo: bool,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// IPC name to dial.
    pub name: String,
    /// Directory the server's socket file lives in.
    #[arg(long, value_name = "DIR")]
    pub base_path: Option<String>,
    /// Require encrypted transport.
    #[arg(long)]
    pub encrypted: bool,
    /// Message type tag (positive integer).
    #[arg(long, short = 't', default_value = "2")]
    pub msg_type: i32,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<std::path::PathBuf>,
    /// Wait for one response message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Dial timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}
