mod network;
mod service;

pub use network::{
    Connection, ConnectionInfo, ErrorHandler, Listener, MessageHandler, Reply, Transport,
    IMMEDIATE_TIMEOUT,
};
pub use service::{
    setup_local_tracing, setup_tracing, NetworkConfig, Shutdown, TimeoutConfig, TransportConfig,
    TransportError, TransportResult,
};
