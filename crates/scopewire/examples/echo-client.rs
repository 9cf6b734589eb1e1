//! Client for the echo-server example — discovers the server by
//! identifier and round-trips a few requests.
//!
//! Run with:
//!   cargo run --example echo-client

use serde::{Deserialize, Serialize};
use scopewire::transport::{connect_discover, ConnectConfig};

#[derive(Serialize, Deserialize)]
struct Add {
    a: i64,
    b: i64,
}

pub const SERVICE: &str = "com.scopewire.echo-example";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let conn = connect_discover(SERVICE, &ConnectConfig::default()).await?;

    let pong: String = conn.send_request_empty("ping").await?;
    println!("ping -> {pong}");

    let echoed: String = conn.send_request("echo", "hello scopewire").await?;
    println!("echo -> {echoed}");

    let sum: i64 = conn.send_request("add", &Add { a: 19, b: 23 }).await?;
    println!("add(19, 23) -> {sum}");

    conn.close().await;
    Ok(())
}
