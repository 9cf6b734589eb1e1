//! Worker process speaking the framed protocol over stdin/stdout.
//!
//! A supervisor spawns this binary and drives it through its standard
//! streams. All diagnostics go to stderr; stdout belongs to the protocol.
//!
//! Run with:
//!   cargo run --example stdio-worker

use serde::{Deserialize, Serialize};
use scopewire::transport::stdio_connection;

#[derive(Serialize, Deserialize)]
struct TypeInterfaceRequest {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let conn = stdio_connection();

    // Stand-ins for an inspector worker's real surface.
    conn.set_source_handler("listTypes", || async move {
        Ok(vec!["NSObject".to_string(), "NSString".to_string()])
    });
    conn.set_handler("typeInterface", |req: TypeInterfaceRequest| async move {
        Ok(format!("@interface {} : NSObject\n@end", req.name))
    });
    conn.set_source_handler("ping", || async move { Ok("pong".to_string()) });

    // Serve until the supervisor closes our stdin.
    conn.closed().await;
    Ok(())
}
