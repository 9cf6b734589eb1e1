//! File-based port discovery.
//!
//! Servers bind an ephemeral port and publish it to a well-known file;
//! clients poll that file until the port appears. The file path is derived
//! from a service identifier so unrelated services never collide.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Namespace directory under the per-user data dir holding port files.
const NAMESPACE: &str = "scopewire";

/// How often a discovering client re-reads the port file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Directory holding port files.
///
/// Defaults to `<data dir>/scopewire/ports`; overridable through the
/// `SCOPEWIRE_RUNTIME_DIR` environment variable, which tests use to point
/// discovery at a temporary directory.
pub fn runtime_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("SCOPEWIRE_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(NAMESPACE)
        .join("ports")
}

/// The port file path for a service identifier.
///
/// Path separators in the identifier are replaced with `_` so an
/// identifier like `com.example/debug` cannot escape the rendezvous
/// directory.
pub fn port_file_path(identifier: &str) -> PathBuf {
    let sanitized: String = identifier
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    runtime_dir().join(format!("{sanitized}.port"))
}

/// Publish `port` for `identifier`, overwriting any stale file.
///
/// The write is atomic (temp file + rename) so a polling reader never
/// observes a partially written port.
pub async fn write_port(identifier: &str, port: u16) -> Result<PathBuf> {
    let path = port_file_path(identifier);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("port.tmp");
    tokio::fs::write(&tmp, port.to_string()).await?;
    tokio::fs::rename(&tmp, &path).await?;

    info!(identifier, port, path = %path.display(), "published port");
    Ok(path)
}

/// Read the published port for `identifier` without polling.
///
/// An absent file fails immediately with
/// [`TransportError::ServerNotRunning`]; use [`read_port`] to wait for a
/// server that may still be starting up.
pub fn current_port(identifier: &str) -> Result<u16> {
    let path = port_file_path(identifier);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransportError::ServerNotRunning {
                identifier: identifier.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };
    contents
        .trim()
        .parse::<u16>()
        .map_err(|err| TransportError::InvalidPortFile {
            path,
            reason: err.to_string(),
        })
}

/// Read the published port for `identifier`, polling until `timeout`.
///
/// Returns as soon as the file exists and parses; a file that exists but
/// holds garbage fails immediately with
/// [`TransportError::InvalidPortFile`] rather than burning the deadline.
pub async fn read_port(identifier: &str, timeout: Duration) -> Result<u16> {
    read_port_with_interval(identifier, timeout, DEFAULT_POLL_INTERVAL).await
}

/// [`read_port`] with an explicit poll interval.
pub async fn read_port_with_interval(
    identifier: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<u16> {
    let path = port_file_path(identifier);
    let deadline = Instant::now() + timeout;

    loop {
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let port = contents.trim().parse::<u16>().map_err(|err| {
                    TransportError::InvalidPortFile {
                        path: path.clone(),
                        reason: err.to_string(),
                    }
                })?;
                debug!(identifier, port, "discovered port");
                return Ok(port);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        if Instant::now() >= deadline {
            return Err(TransportError::DiscoveryTimeout {
                identifier: identifier.to_string(),
                timeout,
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Remove the port file for `identifier`. Missing files are not an error.
pub fn remove_port_file(identifier: &str) {
    let path = port_file_path(identifier);
    match std::fs::remove_file(&path) {
        Ok(()) => debug!(identifier, path = %path.display(), "removed port file"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => debug!(identifier, %err, "failed to remove port file"),
    }
}
