//! Network Module Implementation
//!
//! This module provides the per-connection engine for the length-prefixed
//! message protocol, covering both roles a connection can play:
//! initiating (connect, send, await response) and responding (receive,
//! dispatch, optionally reply).
//!
//! # Components
//!
//! - `Connection`: drives one TCP stream through its entire lifecycle
//! - `Transport`: owns the configuration, callbacks and connection registry
//! - `Listener`: accepts sockets and hands them to the transport
//!
//! # Features
//!
//! - Asynchronous I/O with one task per connection
//! - A deadline racing every socket operation, resolved deterministically
//! - Frame size validation before any bytes are written
//! - Connection tracking with exactly-once removal on close

pub use connection::Connection;
pub use listener::Listener;
pub use timeout::IMMEDIATE_TIMEOUT;
pub use transport::{ConnectionInfo, ErrorHandler, MessageHandler, Reply, Transport};

mod buffer;
mod connection;
mod frame;
mod listener;
mod timeout;
mod transport;
