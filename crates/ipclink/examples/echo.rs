//! Minimal encrypted echo pair — a server and a client in one process.
//!
//! Run with:
//!   cargo run --example echo

use std::time::Duration;

use ipclink::session::msg_type;
use ipclink::{dial_and_handshake, start_server, ClientConfig, ServerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base = std::env::temp_dir().join(format!("ipclink-echo-{}", std::process::id()));
    std::fs::create_dir_all(&base)?;
    let base = base.to_string_lossy().into_owned();

    let server = start_server(
        "echo-example",
        Some(ServerConfig {
            encryption: true,
            socket_base_path: base.clone(),
            ..ServerConfig::default()
        }),
    )?;

    // Echo everything the server receives until the client hangs up.
    let echo = std::thread::spawn(move || {
        while let Ok(msg) = server.read() {
            eprintln!(
                "server: {} bytes of {}",
                msg.data.len(),
                msg_type::msg_type_name(msg.msg_type)
            );
            if server.write(msg.msg_type, &msg.data).is_err() {
                break;
            }
        }
    });

    let client = dial_and_handshake(
        "echo-example",
        Some(ClientConfig {
            encryption: true,
            socket_base_path: base.clone(),
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        }),
    )?;

    for text in ["hello", "over", "and out"] {
        client.write(msg_type::STRING, text.as_bytes())?;
        let reply = client.read()?;
        println!("client: echoed {:?}", reply.data_as_string());
    }

    client.close();
    echo.join().ok();

    let _ = std::fs::remove_dir_all(&base);
    Ok(())
}
