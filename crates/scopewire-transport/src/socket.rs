//! TCP socket transport on the loopback interface.
//!
//! Servers bind `127.0.0.1` (an ephemeral port by default) and optionally
//! publish the bound port through [`discovery`](crate::discovery) so
//! clients can find it by service identifier alone.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scopewire_peer::Connection;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::discovery;
use crate::error::{Result, TransportError};

const LOOPBACK: &str = "127.0.0.1";

/// Client-side connect behavior.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Deadline for both port discovery and the TCP connect itself.
    pub connect_timeout: Duration,
    /// How often discovery re-reads the port file.
    pub poll_interval: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            poll_interval: discovery::DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ConnectConfig {
    /// Override the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the discovery poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Tracks a published port file so it is removed exactly once, whether the
/// last accepted connection closes first or the server is dropped first.
struct Advertisement {
    identifier: String,
    removed: AtomicBool,
}

impl Advertisement {
    fn remove(&self) {
        if !self.removed.swap(true, Ordering::SeqCst) {
            discovery::remove_port_file(&self.identifier);
        }
    }
}

/// A listening socket server.
pub struct SocketServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    advertisement: Option<Arc<Advertisement>>,
}

impl SocketServer {
    /// Bind a loopback listener. Port `0` requests an ephemeral port;
    /// the actual port is available through [`port`](SocketServer::port).
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = format!("{LOOPBACK}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "socket server listening");

        Ok(Self {
            listener,
            local_addr,
            advertisement: None,
        })
    }

    /// Bind an ephemeral loopback port and publish it for `identifier`.
    ///
    /// The port file is removed when the server is dropped or when a
    /// connection accepted from it closes.
    pub async fn bind_discoverable(identifier: &str) -> Result<Self> {
        let mut server = Self::bind(0).await?;
        discovery::write_port(identifier, server.local_addr.port()).await?;
        server.advertisement = Some(Arc::new(Advertisement {
            identifier: identifier.to_string(),
            removed: AtomicBool::new(false),
        }));
        Ok(server)
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept the next inbound connection and open a session over it.
    pub async fn accept(&self) -> Result<Connection> {
        let (stream, peer_addr) = self.listener.accept().await.map_err(TransportError::Accept)?;
        debug!(%peer_addr, "accepted connection");
        configure_stream(&stream);

        let (reader, writer) = stream.into_split();
        let mut builder = Connection::builder();
        if let Some(advertisement) = &self.advertisement {
            let advertisement = Arc::clone(advertisement);
            builder = builder.on_close(move || advertisement.remove());
        }
        let connection = builder.build(reader, writer);
        connection.open();
        Ok(connection)
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if let Some(advertisement) = &self.advertisement {
            advertisement.remove();
        }
    }
}

/// Connect to a loopback port and open a session.
///
/// A refused connection (no server listening) fails with
/// [`TransportError::ConnectionFailed`]; an unresponsive host fails with
/// [`TransportError::Timeout`] after `config.connect_timeout`.
pub async fn connect(port: u16, config: &ConnectConfig) -> Result<Connection> {
    let addr = format!("{LOOPBACK}:{port}");
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| TransportError::Timeout {
            port,
            timeout: config.connect_timeout,
        })?
        .map_err(|source| TransportError::ConnectionFailed { port, source })?;

    configure_stream(&stream);
    debug!(%addr, "connected");

    let (reader, writer) = stream.into_split();
    let connection = Connection::new(reader, writer);
    connection.open();
    Ok(connection)
}

/// Discover the port published for `identifier`, then connect to it.
///
/// The single `connect_timeout` deadline covers discovery and the TCP
/// connect together.
pub async fn connect_discover(identifier: &str, config: &ConnectConfig) -> Result<Connection> {
    let started = tokio::time::Instant::now();
    let port = discovery::read_port_with_interval(
        identifier,
        config.connect_timeout,
        config.poll_interval,
    )
    .await?;

    let remaining = config
        .connect_timeout
        .saturating_sub(started.elapsed())
        .max(Duration::from_millis(1));
    let result = connect(port, &ConnectConfig {
        connect_timeout: remaining,
        poll_interval: config.poll_interval,
    })
    .await;

    match result {
        // A refused connect right after successful discovery means the
        // port file is stale: its server is gone.
        Err(TransportError::ConnectionFailed { .. }) => Err(TransportError::ServerNotRunning {
            identifier: identifier.to_string(),
        }),
        other => other,
    }
}

/// Low latency matters more than batching for small request frames.
fn configure_stream(stream: &TcpStream) {
    if let Err(err) = stream.set_nodelay(true) {
        warn!(%err, "failed to set TCP_NODELAY");
    }
}
