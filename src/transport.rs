use crate::config::{ConnectionType, ModemConfig, NetworkConfig, SerialConfig};
use crate::error::{Error, Result};
use log::info;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_serial::SerialPortBuilderExt;

/// A duplex byte stream to the modem.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Open the byte stream described by `config`.
pub async fn connect(config: &ModemConfig) -> Result<Box<dyn Transport>> {
    match config.connection_type {
        ConnectionType::Serial => open_serial(&config.serial),
        ConnectionType::Network => connect_network(&config.network).await,
    }
}

fn open_serial(config: &SerialConfig) -> Result<Box<dyn Transport>> {
    info!("Opening serial port {} at {}", config.port, config.baudrate);
    let port = tokio_serial::new(&config.port, config.baudrate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .open_native_async()?;
    Ok(Box::new(port))
}

/// Serial-over-TCP bridges (ser2net and friends).
async fn connect_network(config: &NetworkConfig) -> Result<Box<dyn Transport>> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Connecting to network AT server at {}", addr);
    match timeout(Duration::from_secs(config.timeout), TcpStream::connect(&addr)).await {
        Ok(result) => {
            let stream = result?;
            info!("Connected to network AT server");
            Ok(Box::new(stream))
        }
        Err(_) => Err(Error::Transport(format!("connecting to {} timed out", addr))),
    }
}
