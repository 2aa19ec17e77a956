use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::service::{TransportError, TransportResult};

use super::buffer::FrameBuffer;
use super::frame::{self, LENGTH_FIELD_LEN};
use super::timeout::is_immediate;
use super::transport::{ConnectionInfo, TransportInner};

/// Why the connection left the `Open` state.
///
/// The deadline timer and the socket operation it guards race. The engine
/// records which one won as a tagged state instead of inferring the cause
/// from whether the socket is still open, so closure for any other reason
/// stays unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Open,
    ClosedByTimeout,
    ClosedByError,
    Closed,
}

/// The asynchronous step currently guarded by a deadline.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Connect,
    Write,
    ReadLength,
    ReadBody,
}

impl Phase {
    fn timeout_error(self, after: Duration) -> TransportError {
        match self {
            Phase::Connect | Phase::Write => TransportError::SendTimeout(after),
            Phase::ReadLength | Phase::ReadBody => TransportError::ReceiveTimeout(after),
        }
    }

    fn failure_error(self, err: std::io::Error) -> TransportError {
        match self {
            Phase::Connect | Phase::Write => TransportError::SendFailure(err.to_string()),
            Phase::ReadLength | Phase::ReadBody => TransportError::ReceiveFailure(err.to_string()),
        }
    }
}

/// Next move for the driver loop.
enum Step {
    Receive,
    Reply { payload: Bytes, timeout: Duration },
    Shutdown,
}

/// One TCP stream and the state machine that drives it.
///
/// A connection is created by its [`Transport`](super::Transport) either
/// toward a remote endpoint (initiator role, not yet connected) or from an
/// accepted socket (responder role). One tokio task owns the connection and
/// advances it one step at a time: connect, write, read the length field,
/// read the body, dispatch, optionally write a reply. At most one read or
/// write is ever pending, and every terminal path reports through the error
/// callback and removes the connection from the registry exactly once.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    remote: SocketAddr,
    stream: Option<TcpStream>,
    buffer: FrameBuffer,
    response_timeout: Duration,
    state: ConnState,
    transport: Arc<TransportInner>,
}

impl Connection {
    pub(crate) fn outbound(id: u64, remote: SocketAddr, transport: Arc<TransportInner>) -> Connection {
        Connection {
            id,
            remote,
            stream: None,
            buffer: FrameBuffer::new(),
            response_timeout: transport.timeouts.initial(),
            state: ConnState::Open,
            transport,
        }
    }

    pub(crate) fn inbound(
        id: u64,
        remote: SocketAddr,
        stream: TcpStream,
        transport: Arc<TransportInner>,
    ) -> Connection {
        Connection {
            id,
            remote,
            stream: Some(stream),
            buffer: FrameBuffer::new(),
            response_timeout: transport.timeouts.initial(),
            state: ConnState::Open,
            transport,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            remote: self.remote,
        }
    }

    /// Send one message and drive the exchange to completion.
    ///
    /// `timeout` is recorded as the deadline for the response that follows
    /// the write; the write itself is always bounded by the size-scaled
    /// deadline. Pass [`IMMEDIATE_TIMEOUT`](super::IMMEDIATE_TIMEOUT) when
    /// no response is expected and the connection should close after the
    /// frame is written. With `is_response` the socket must already be open;
    /// without it the connection must not have connected yet.
    ///
    /// An oversized payload is reported without touching the socket and the
    /// connection is left open for the caller to decide what happens next.
    /// Every other error closes the connection.
    pub async fn send(&mut self, payload: &[u8], timeout: Duration, is_response: bool) {
        let first = self.send_step(payload, timeout, is_response).await;
        self.drive(first).await;
    }

    /// Await one inbound message and dispatch it.
    ///
    /// Valid only while the socket is open: responder connections receive
    /// first, initiator connections receive after their request was written.
    /// The current response timeout covers the length read and the body read
    /// together.
    pub async fn start_receiving(&mut self) {
        let first = self.receive_step().await;
        self.drive(first).await;
    }

    /// Close the socket and hand the connection back to its owner.
    ///
    /// Idempotent: only the first call drops the socket and removes the
    /// registry entry.
    pub fn close(&mut self) {
        if self.state == ConnState::Closed {
            return;
        }
        debug!(id = self.id, remote = %self.remote, state = ?self.state, "closing connection");
        self.stream = None;
        self.state = ConnState::Closed;
        self.transport.drop_connection(self.id);
    }

    /// Advance the state machine until a terminal step.
    ///
    /// The loop makes the responder ping-pong (receive, reply, receive ...)
    /// iterative. Any error is reported through the error callback; all of
    /// them close the connection except the size-limit error, which performs
    /// no I/O and leaves the connection to the caller.
    async fn drive(&mut self, first: TransportResult<Step>) {
        let mut result = first;
        loop {
            match result {
                Ok(Step::Receive) => result = self.receive_step().await,
                Ok(Step::Reply { payload, timeout }) => {
                    result = self.send_step(&payload, timeout, true).await;
                }
                Ok(Step::Shutdown) => return self.close(),
                Err(err) => {
                    let keep_open = matches!(err, TransportError::MessageSizeTooLarge { .. });
                    self.transport.report(&err);
                    if !keep_open {
                        self.close();
                    }
                    return;
                }
            }
        }
    }

    async fn send_step(
        &mut self,
        payload: &[u8],
        timeout: Duration,
        is_response: bool,
    ) -> TransportResult<Step> {
        if self.state != ConnState::Open {
            return Err(TransportError::IllegalState(
                "send on a closed connection".into(),
            ));
        }
        frame::encode(
            payload,
            self.transport.config.network.max_message_size,
            &mut self.buffer,
        )?;
        // Authoritative for the receive that follows the write, never for
        // the write itself.
        self.response_timeout = timeout;

        if is_response {
            if self.stream.is_none() {
                return Err(TransportError::IllegalState(
                    "response on a connection without an open socket".into(),
                ));
            }
        } else {
            if self.stream.is_some() {
                return Err(TransportError::IllegalState(
                    "initial send on an already connected socket".into(),
                ));
            }
            self.connect().await?;
        }
        self.write_frame(payload.len()).await?;

        if is_immediate(self.response_timeout) {
            Ok(Step::Shutdown)
        } else {
            Ok(Step::Receive)
        }
    }

    async fn receive_step(&mut self) -> TransportResult<Step> {
        if self.state != ConnState::Open {
            return Err(TransportError::IllegalState(
                "receive on a closed connection".into(),
            ));
        }
        let response_timeout = self.response_timeout;
        // One deadline spans the length read and the body read.
        let deadline = Instant::now() + response_timeout;

        self.buffer.allocate(LENGTH_FIELD_LEN);
        self.read_exact(Phase::ReadLength, deadline, response_timeout)
            .await?;
        let body_len = frame::decode_len(
            self.buffer.as_slice(),
            self.transport.config.network.max_message_size,
        )?;

        self.buffer.allocate(body_len);
        self.read_exact(Phase::ReadBody, deadline, response_timeout)
            .await?;
        // Reaching here before the deadline drops it; it can no longer fire.

        let payload = self.buffer.split_payload();
        self.dispatch(payload)
    }

    fn dispatch(&mut self, payload: Bytes) -> TransportResult<Step> {
        debug!(id = self.id, len = payload.len(), "dispatching message");
        let info = self.info();
        match (self.transport.on_message)(payload, &info) {
            Some(reply) => Ok(Step::Reply {
                payload: reply.payload,
                timeout: reply.timeout,
            }),
            None => Ok(Step::Shutdown),
        }
    }

    async fn connect(&mut self) -> TransportResult<()> {
        let initial = self.transport.timeouts.initial();
        let deadline = Instant::now() + initial;
        match time::timeout_at(deadline, TcpStream::connect(self.remote)).await {
            Ok(Ok(stream)) => {
                trace!(id = self.id, remote = %self.remote, "connected");
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(err)) => {
                self.state = ConnState::ClosedByError;
                Err(Phase::Connect.failure_error(err))
            }
            Err(_) => {
                self.state = ConnState::ClosedByTimeout;
                Err(Phase::Connect.timeout_error(initial))
            }
        }
    }

    async fn write_frame(&mut self, payload_len: usize) -> TransportResult<()> {
        let timeout = self.transport.timeouts.scaled(payload_len);
        let deadline = Instant::now() + timeout;
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::IllegalState(
                "write on a connection without an open socket".into(),
            ));
        };
        let result = time::timeout_at(deadline, stream.write_all(self.buffer.as_slice())).await;
        match result {
            Ok(Ok(())) => {
                trace!(id = self.id, len = self.buffer.len(), "frame written");
                Ok(())
            }
            Ok(Err(err)) => {
                self.state = ConnState::ClosedByError;
                Err(Phase::Write.failure_error(err))
            }
            Err(_) => {
                self.state = ConnState::ClosedByTimeout;
                Err(Phase::Write.timeout_error(timeout))
            }
        }
    }

    async fn read_exact(
        &mut self,
        phase: Phase,
        deadline: Instant,
        response_timeout: Duration,
    ) -> TransportResult<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::IllegalState(
                "receive on a connection without an open socket".into(),
            ));
        };
        let result = time::timeout_at(deadline, stream.read_exact(self.buffer.as_mut_slice())).await;
        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => {
                self.state = ConnState::ClosedByError;
                Err(phase.failure_error(err))
            }
            Err(_) => {
                self.state = ConnState::ClosedByTimeout;
                Err(phase.timeout_error(response_timeout))
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // a dropped connection must still leave the registry exactly once
        self.close();
    }
}
