pub use config::{NetworkConfig, TimeoutConfig, TransportConfig};
pub use error::{TransportError, TransportResult};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod config;
mod error;
mod shutdown;
mod tracing_config;
