use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::service::{TransportConfig, TransportError, TransportResult};

use super::connection::Connection;
use super::timeout::TimeoutPolicy;

/// Identity of a live connection, as seen by the application callbacks.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub remote: SocketAddr,
}

/// Reply returned by the message handler: the payload to write back, plus
/// the timeout to use while awaiting the peer's next message.
/// [`IMMEDIATE_TIMEOUT`](super::IMMEDIATE_TIMEOUT) marks the reply as final;
/// the connection closes once it is written.
#[derive(Debug, Clone)]
pub struct Reply {
    pub payload: Bytes,
    pub timeout: Duration,
}

/// Invoked with every fully received payload; may return a reply.
pub type MessageHandler = Arc<dyn Fn(Bytes, &ConnectionInfo) -> Option<Reply> + Send + Sync>;

/// Invoked once per failed connection attempt or exchange. The application
/// never sees raw socket errors anywhere else.
pub type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

pub(crate) struct TransportInner {
    pub(crate) config: TransportConfig,
    pub(crate) timeouts: TimeoutPolicy,
    pub(crate) on_message: MessageHandler,
    pub(crate) on_error: ErrorHandler,
    connections: DashMap<u64, ConnectionInfo>,
    next_connection_id: AtomicU64,
}

impl fmt::Debug for TransportInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportInner")
            .field("config", &self.config)
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl TransportInner {
    pub(crate) fn report(&self, err: &TransportError) {
        error!("transport error: {}", err);
        (self.on_error)(err);
    }

    pub(crate) fn drop_connection(&self, id: u64) {
        if self.connections.remove(&id).is_some() {
            debug!(id, "connection removed from registry");
        }
    }
}

/// Factory and owner of connections.
///
/// Holds the injected configuration, the application callbacks and the
/// registry of live connections. Clones are cheap and share the same
/// registry.
#[derive(Debug, Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    pub fn new(
        config: TransportConfig,
        on_message: MessageHandler,
        on_error: ErrorHandler,
    ) -> Transport {
        let timeouts = TimeoutPolicy::new(&config.timeout);
        Transport {
            inner: Arc::new(TransportInner {
                config,
                timeouts,
                on_message,
                on_error,
                connections: DashMap::new(),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Create an initiator connection toward `remote`. The connection holds
    /// no socket until [`Connection::send`] connects it.
    pub fn outbound(&self, remote: SocketAddr) -> Connection {
        let id = self.next_id();
        let conn = Connection::outbound(id, remote, self.inner.clone());
        self.register(&conn);
        conn
    }

    /// Adopt an accepted socket as a responder connection.
    pub fn inbound(&self, stream: TcpStream) -> TransportResult<Connection> {
        let remote = stream.peer_addr()?;
        let id = self.next_id();
        let conn = Connection::inbound(id, remote, stream, self.inner.clone());
        self.register(&conn);
        Ok(conn)
    }

    /// Connect to `remote`, send one message and drive the exchange to
    /// completion, including the expected response unless `timeout` is the
    /// immediate sentinel. The outcome arrives through the callbacks.
    pub async fn send(&self, remote: SocketAddr, payload: &[u8], timeout: Duration) {
        let mut conn = self.outbound(remote);
        conn.send(payload, timeout, false).await;
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    fn next_id(&self) -> u64 {
        self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    fn register(&self, conn: &Connection) {
        self.inner.connections.insert(conn.id(), conn.info());
    }
}
