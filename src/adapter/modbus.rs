//! Modbus TCP adapter
//!
//! Holding-register reads (function 3) and multiple-register writes
//! (function 16) through `tokio-modbus`. Every request is bounded by the
//! per-operation timeout; transport failures tear the context down and are
//! retried on a fresh connection up to the configured attempt count. Reopened
//! sessions are reported through `take_reconnects`.

use super::ProtocolAdapter;
use crate::config::{Config, ConnectionConfig};
use crate::error::{DeviceException, HeatlinkError, Result};
use crate::logging::{LogContext, StructuredLogger};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::ExceptionCode;
use tokio_modbus::client::{Context, tcp};
use tokio_modbus::prelude::*;

pub const DEFAULT_PORT: u16 = 502;

/// Largest quantity a single function-3 request may ask for
pub const MAX_READ_REGISTERS: u16 = 125;

#[derive(Debug, Clone, Copy)]
enum Request<'a> {
    Read { address: u16, count: u16 },
    Write { address: u16, values: &'a [u16] },
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { address, count } => write!(f, "read {}+{}", address, count),
            Self::Write { address, values } => write!(f, "write {}+{}", address, values.len()),
        }
    }
}

enum Reply {
    Words(Vec<u16>),
    Ack,
}

/// Map a Modbus exception response onto the crate's device exceptions
pub fn map_exception(code: ExceptionCode) -> DeviceException {
    match code {
        ExceptionCode::IllegalFunction => DeviceException::IllegalFunction,
        ExceptionCode::IllegalDataAddress => DeviceException::IllegalDataAddress,
        ExceptionCode::IllegalDataValue => DeviceException::IllegalDataValue,
        ExceptionCode::ServerDeviceFailure => DeviceException::ServerDeviceFailure,
        ExceptionCode::ServerDeviceBusy => DeviceException::ServerDeviceBusy,
        ExceptionCode::Acknowledge => DeviceException::Other(0x05),
        ExceptionCode::MemoryParityError => DeviceException::Other(0x08),
        ExceptionCode::GatewayPathUnavailable => DeviceException::Other(0x0A),
        ExceptionCode::GatewayTargetDevice => DeviceException::Other(0x0B),
        ExceptionCode::Custom(c) => DeviceException::Other(c),
        #[allow(unreachable_patterns)]
        _ => DeviceException::Other(0),
    }
}

/// Register-oriented adapter over Modbus TCP
pub struct StandardAdapter {
    context: Option<Context>,
    host: String,
    port: u16,
    unit_id: u8,
    operation_timeout: Duration,
    attempts: u32,
    /// Sessions reopened inside `execute` and not yet collected
    reconnects: u32,
    logger: StructuredLogger,
}

impl StandardAdapter {
    pub fn new(host: &str, port: u16, unit_id: u8, connection: &ConnectionConfig) -> Self {
        Self {
            context: None,
            host: host.to_string(),
            port,
            unit_id,
            operation_timeout: connection.operation_timeout(),
            attempts: connection.retries.max(1),
            reconnects: 0,
            logger: StructuredLogger::new(
                LogContext::new("modbus")
                    .with_endpoint(format!("{}:{}", host, port))
                    .with_field("unit", unit_id.to_string()),
            ),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.device.host,
            config.device.port.unwrap_or(DEFAULT_PORT),
            config.device.unit_id,
            &config.connection,
        )
    }

    // Owns its inputs: the context is not `Sync`, so no `&self` may live
    // across the lookup
    async fn resolve(host: String, port: u16, limit: Duration) -> Result<SocketAddr> {
        let lookup = tokio::net::lookup_host((host.as_str(), port));
        match timeout(limit, lookup).await {
            Ok(Ok(mut addrs)) => addrs
                .next()
                .ok_or_else(|| HeatlinkError::connection(format!("No address found for {}", host))),
            Ok(Err(e)) => Err(HeatlinkError::connection(format!(
                "Failed to resolve {}: {}",
                host, e
            ))),
            Err(_) => Err(HeatlinkError::timeout(format!("Resolving {} timed out", host))),
        }
    }

    async fn open(&mut self) -> Result<()> {
        let socket_addr =
            Self::resolve(self.host.clone(), self.port, self.operation_timeout).await?;
        self.logger
            .debug(&format!("Connecting to Modbus server at {}", socket_addr));

        match timeout(
            self.operation_timeout,
            tcp::connect_slave(socket_addr, Slave(self.unit_id)),
        )
        .await
        {
            Ok(Ok(context)) => {
                self.context = Some(context);
                Ok(())
            }
            Ok(Err(e)) => Err(HeatlinkError::connection(format!(
                "Failed to connect to Modbus server: {}",
                e
            ))),
            Err(_) => Err(HeatlinkError::timeout("Connection timeout")),
        }
    }

    // Dropping the context closes the socket
    fn drop_context(&mut self) {
        self.context = None;
    }

    async fn dispatch(&mut self, request: Request<'_>) -> Result<Reply> {
        let limit = self.operation_timeout;
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| HeatlinkError::connection("Not connected to Modbus server"))?;

        let outcome = match request {
            Request::Read { address, count } => timeout(
                limit,
                context.read_holding_registers(address, count),
            )
            .await
            .map(|r| r.map(|r| r.map(Reply::Words))),
            Request::Write { address, values } => timeout(
                limit,
                context.write_multiple_registers(address, values),
            )
            .await
            .map(|r| r.map(|r| r.map(|()| Reply::Ack))),
        };

        match outcome {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(exception))) => Err(HeatlinkError::device(
                map_exception(exception),
                format!("{} rejected", request),
            )),
            Ok(Err(tokio_modbus::Error::Transport(e))) => Err(HeatlinkError::connection(
                format!("{} failed: {}", request, e),
            )),
            Ok(Err(e)) => Err(HeatlinkError::protocol(format!(
                "{} failed: {}",
                request, e
            ))),
            Err(_) => Err(HeatlinkError::timeout(format!("{} timed out", request))),
        }
    }

    /// Run a request, reconnecting between attempts on transport failures
    async fn execute(&mut self, request: Request<'_>) -> Result<Reply> {
        if self.context.is_none() {
            return Err(HeatlinkError::connection("Not connected to Modbus server"));
        }

        let mut attempt = 1;
        loop {
            let err = match self.dispatch(request).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transport() => e,
                Err(e) => {
                    if matches!(e, HeatlinkError::Protocol { .. }) {
                        self.drop_context();
                    }
                    return Err(e);
                }
            };

            self.drop_context();
            if attempt >= self.attempts {
                return Err(err);
            }
            self.logger.debug(&format!(
                "Attempt {}/{} for {} failed: {}",
                attempt, self.attempts, request, err
            ));
            attempt += 1;
            self.open().await?;
            self.reconnects += 1;
        }
    }
}

#[async_trait::async_trait]
impl ProtocolAdapter for StandardAdapter {
    fn protocol(&self) -> &'static str {
        "Modbus TCP"
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn is_open(&self) -> bool {
        self.context.is_some()
    }

    fn take_reconnects(&mut self) -> u32 {
        std::mem::take(&mut self.reconnects)
    }

    async fn connect(&mut self) -> Result<()> {
        self.drop_context();
        self.open().await
    }

    async fn close(&mut self) {
        if self.context.is_some() {
            self.logger.debug("Disconnecting from Modbus server");
        }
        self.drop_context();
    }

    async fn read_block(&mut self, address: u16, count: u16) -> Result<Vec<i32>> {
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(HeatlinkError::unsupported(format!(
                "Cannot read {} registers in one request",
                count
            )));
        }
        match self.execute(Request::Read { address, count }).await? {
            Reply::Words(words) if words.len() == usize::from(count) => {
                self.logger
                    .trace(&format!("Read {} registers at {}", words.len(), address));
                Ok(words.into_iter().map(i32::from).collect())
            }
            Reply::Words(words) => Err(HeatlinkError::protocol(format!(
                "Expected {} registers at {}, got {}",
                count,
                address,
                words.len()
            ))),
            Reply::Ack => Err(HeatlinkError::protocol("Unexpected reply to read")),
        }
    }

    async fn write_block(&mut self, address: u16, values: &[u16]) -> Result<()> {
        if values.is_empty() {
            return Err(HeatlinkError::unsupported("Empty register write"));
        }
        self.logger.debug(&format!(
            "Writing {} registers starting at {}",
            values.len(),
            address
        ));
        self.execute(Request::Write { address, values }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceptions_map_to_device_errors() {
        assert_eq!(
            map_exception(ExceptionCode::IllegalDataAddress),
            DeviceException::IllegalDataAddress
        );
        assert_eq!(
            map_exception(ExceptionCode::ServerDeviceBusy),
            DeviceException::ServerDeviceBusy
        );
        assert_eq!(
            map_exception(ExceptionCode::GatewayTargetDevice),
            DeviceException::Other(0x0B)
        );
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let mut adapter = StandardAdapter::new("127.0.0.1", 1502, 1, &ConnectionConfig::default());
        assert!(!adapter.is_open());
        assert_eq!(adapter.endpoint(), "127.0.0.1:1502");
        assert_eq!(adapter.take_reconnects(), 0);
        assert_eq!(adapter.logger.context().extra_fields["unit"], "1");
        let err = adapter.read_block(0, 1).await.unwrap_err();
        assert!(matches!(err, HeatlinkError::Connection { .. }));
        let err = adapter.write_block(0, &[1]).await.unwrap_err();
        assert!(matches!(err, HeatlinkError::Connection { .. }));
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn session_futures_are_send() {
        let mut adapter = StandardAdapter::new("127.0.0.1", 1502, 1, &ConnectionConfig::default());
        assert_send(StandardAdapter::resolve(
            "127.0.0.1".to_string(),
            1502,
            Duration::from_secs(1),
        ));
        assert_send(adapter.open());
        assert_send(adapter.execute(Request::Read { address: 0, count: 1 }));
    }

    #[tokio::test]
    async fn oversized_read_is_refused_locally() {
        let mut adapter = StandardAdapter::new("127.0.0.1", 1502, 1, &ConnectionConfig::default());
        let err = adapter.read_block(0, 200).await.unwrap_err();
        assert!(matches!(err, HeatlinkError::Unsupported { .. }));
    }
}
