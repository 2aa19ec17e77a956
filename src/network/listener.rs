use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info};

use crate::service::{Shutdown, TransportError, TransportResult};

use super::transport::Transport;

/// Accepting endpoint: feeds inbound sockets into the transport as
/// responder connections, one task per connection.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    limit_connections: Arc<Semaphore>,
    transport: Transport,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
}

impl Listener {
    pub fn new(
        listener: TcpListener,
        limit_connections: Arc<Semaphore>,
        transport: Transport,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Listener {
        Listener {
            listener,
            limit_connections,
            transport,
            notify_shutdown,
            shutdown_complete_tx,
        }
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop.
    ///
    /// Each accepted socket becomes a responder connection driven by its own
    /// task: it receives one message, dispatches it, optionally replies, and
    /// keeps exchanging until a final reply or an error closes it. The task
    /// also watches the shutdown broadcast; either way the connection is
    /// closed idempotently before the permit is released.
    ///
    /// # Returns
    /// Under normal operation, continuously accepts new connections.
    /// Exits with an error if accepting keeps failing after backoff.
    #[tracing::instrument]
    pub async fn run(&self) -> TransportResult<()> {
        info!("listening on {}", self.local_addr()?);
        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .unwrap();

            debug!("accept new connection");

            let socket = self.accept().await?;
            let mut conn = match self.transport.inbound(socket) {
                Ok(conn) => conn,
                Err(err) => {
                    error!("failed to adopt accepted socket: {}", err);
                    continue;
                }
            };
            debug!(id = conn.id(), remote = %conn.remote_addr(), "accepted connection");

            let mut shutdown = Shutdown::new(self.notify_shutdown.subscribe());
            let shutdown_complete_tx = self.shutdown_complete_tx.clone();

            tokio::spawn(async move {
                tokio::select! {
                    _ = conn.start_receiving() => {}
                    _ = shutdown.recv() => {
                        debug!("connection task exits after recv shutdown signal");
                    }
                }
                // whether finished or interrupted, release the connection
                conn.close();
                drop(permit);
                drop(shutdown_complete_tx);
            });
        }
    }

    async fn accept(&self) -> TransportResult<TcpStream> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok((socket, _)) => return Ok(socket),
                Err(err) => {
                    if backoff > 64 {
                        return Err(TransportError::Accept(format!(
                            "accept tcp connection error: {}",
                            err
                        )));
                    }
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        debug!("listener dropped");
    }
}
