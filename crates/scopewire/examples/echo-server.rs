//! Discoverable echo server — publishes its port and answers requests.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --example echo-client

use serde::{Deserialize, Serialize};
use scopewire::transport::SocketServer;

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

    let server = SocketServer::bind_discoverable(SERVICE).await?;
    eprintln!("Listening on 127.0.0.1:{}", server.port());

    loop {
        let conn = server.accept().await?;
        eprintln!("Peer connected");

        conn.set_handler("echo", |message: String| async move { Ok(message) });
        conn.set_handler("add", |req: Add| async move { Ok(req.a + req.b) });
        conn.set_source_handler("ping", || async move { Ok("pong".to_string()) });

        let closed = conn.clone();
        tokio::spawn(async move {
            closed.closed().await;
            eprintln!("Peer disconnected");
        });
    }
}
