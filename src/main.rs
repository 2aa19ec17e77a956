use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{error, info};

use wirelink::{
    setup_local_tracing, ErrorHandler, Listener, MessageHandler, Reply, Transport,
    TransportConfig, TransportResult, IMMEDIATE_TIMEOUT,
};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser)]
pub enum Command {
    /// print the effective configuration and exit
    PrintConfig,
    /// run a responder that echoes every message back to its sender
    Listen,
    /// send one message and await the echo
    Send {
        addr: SocketAddr,
        message: String,
        /// response timeout in milliseconds, 0 to fire and forget
        #[arg(short, long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> TransportResult<()> {
    setup_local_tracing()?;

    let commandline = CommandLine::parse();
    let config = match &commandline.conf {
        Some(path) => TransportConfig::set_up_config(PathBuf::from(path))?,
        None => TransportConfig::default(),
    };

    match commandline.command {
        Command::PrintConfig => {
            println!("{:#?}", config);
            Ok(())
        }
        Command::Listen => listen(config).await,
        Command::Send {
            addr,
            message,
            timeout_ms,
        } => send(config, addr, message, timeout_ms).await,
    }
}

async fn listen(config: TransportConfig) -> TransportResult<()> {
    let listen_address = format!("{}:{}", config.network.ip, config.network.port);
    let tcp_listener = TcpListener::bind(&listen_address).await?;
    let limit_connections = Arc::new(Semaphore::new(config.network.max_connection));

    let on_message: MessageHandler = Arc::new(|payload: Bytes, info| {
        info!("message from {}: {} bytes, echoing back", info.remote, payload.len());
        Some(Reply {
            payload,
            timeout: IMMEDIATE_TIMEOUT,
        })
    });
    let on_error: ErrorHandler = Arc::new(|err| error!("exchange failed: {}", err));
    let transport = Transport::new(config, on_message, on_error);

    let (notify_shutdown, _) = broadcast::channel(1);
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);
    let listener = Listener::new(
        tcp_listener,
        limit_connections,
        transport,
        notify_shutdown.clone(),
        shutdown_complete_tx,
    );

    tokio::select! {
        res = listener.run() => {
            if let Err(err) = res {
                error!("listener exited: {}", err);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    // stop accepting, tell connection tasks to wind down, then wait for them
    drop(listener);
    let _ = notify_shutdown.send(());
    let _ = shutdown_complete_rx.recv().await;
    info!("shutdown complete");
    Ok(())
}

async fn send(
    config: TransportConfig,
    addr: SocketAddr,
    message: String,
    timeout_ms: u64,
) -> TransportResult<()> {
    let on_message: MessageHandler = Arc::new(|payload: Bytes, info| {
        match std::str::from_utf8(&payload) {
            Ok(text) => info!("response from {}: {}", info.remote, text),
            Err(_) => info!("response from {}: {} bytes", info.remote, payload.len()),
        }
        None
    });
    let on_error: ErrorHandler = Arc::new(|err| error!("exchange failed: {}", err));
    let transport = Transport::new(config, on_message, on_error);

    let timeout = if timeout_ms == 0 {
        IMMEDIATE_TIMEOUT
    } else {
        Duration::from_millis(timeout_ms)
    };
    transport.send(addr, message.as_bytes(), timeout).await;
    Ok(())
}
