//! Luxtronik 2.x binary adapter
//!
//! The controller has no register map: one request returns the whole
//! "calculations" table as big-endian signed 32-bit cells, and a sensor's
//! address is its index into that table. Every `read_block` therefore
//! fetches the full table and slices the requested window out of it.
//!
//! Wire format, all integers big-endian:
//! request `[3004:u32][0:u32]`,
//! response `[3004:u32][status:u32][count:u32][count x i32]`.

use super::ProtocolAdapter;
use crate::config::{Config, ConnectionConfig};
use crate::error::{DeviceException, HeatlinkError, Result};
use crate::logging::{StructuredLogger, get_device_logger};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const DEFAULT_PORT: u16 = 8889;
pub const CMD_READ_CALCULATIONS: u32 = 3004;
pub const HEADER_LEN: usize = 12;

/// Upper bound on the advertised value count; real controllers send a few hundred
pub const MAX_VALUES: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub status: u32,
    pub count: u32,
}

impl FrameHeader {
    pub fn payload_len(&self) -> usize {
        self.count as usize * 4
    }
}

pub fn encode_request(command: u32) -> [u8; 8] {
    let mut frame = [0u8; 8];
    frame[..4].copy_from_slice(&command.to_be_bytes());
    frame
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Validate the echoed command and the advertised value count
pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<FrameHeader> {
    let echo = be_u32(&header[0..4]);
    if echo != CMD_READ_CALCULATIONS {
        return Err(HeatlinkError::protocol(format!(
            "Expected command echo {}, got {}",
            CMD_READ_CALCULATIONS, echo
        )));
    }
    let count = be_u32(&header[8..12]);
    if count > MAX_VALUES {
        return Err(HeatlinkError::protocol(format!(
            "Value count {} exceeds limit {}",
            count, MAX_VALUES
        )));
    }
    Ok(FrameHeader {
        status: be_u32(&header[4..8]),
        count,
    })
}

pub fn decode_values(payload: &[u8]) -> Vec<i32> {
    payload
        .chunks_exact(4)
        .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Decode a complete response held in memory
pub fn decode_frame(frame: &[u8]) -> Result<Vec<i32>> {
    let header: &[u8; HEADER_LEN] = frame
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| HeatlinkError::protocol("Truncated response header"))?;
    let header = parse_header(header)?;
    let payload = frame
        .get(HEADER_LEN..HEADER_LEN + header.payload_len())
        .ok_or_else(|| HeatlinkError::protocol("Truncated response payload"))?;
    Ok(decode_values(payload))
}

/// Window `[address, address + count)` of a fetched table
pub fn slice_values(values: &[i32], address: u16, count: u16) -> Result<Vec<i32>> {
    let start = usize::from(address);
    let end = start + usize::from(count);
    values.get(start..end).map(<[i32]>::to_vec).ok_or_else(|| {
        HeatlinkError::device(
            DeviceException::IllegalDataAddress,
            format!("read out of bounds: {}+{} > {}", address, count, values.len()),
        )
    })
}

fn map_read_error(e: std::io::Error) -> HeatlinkError {
    if e.kind() == ErrorKind::UnexpectedEof {
        HeatlinkError::connection("Socket connection broken")
    } else {
        HeatlinkError::from(e)
    }
}

/// Send one calculations request and read the complete response
pub async fn fetch_calculations<S>(stream: &mut S) -> Result<Vec<i32>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&encode_request(CMD_READ_CALCULATIONS))
        .await?;

    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await.map_err(map_read_error)?;
    let header = parse_header(&header)?;

    let mut payload = vec![0u8; header.payload_len()];
    stream.read_exact(&mut payload).await.map_err(map_read_error)?;
    Ok(decode_values(&payload))
}

pub struct LuxtronikAdapter {
    stream: Option<TcpStream>,
    host: String,
    port: u16,
    operation_timeout: Duration,
    logger: StructuredLogger,
}

impl LuxtronikAdapter {
    pub fn new(host: &str, port: u16, connection: &ConnectionConfig) -> Self {
        Self {
            stream: None,
            host: host.to_string(),
            port,
            operation_timeout: connection.operation_timeout(),
            logger: get_device_logger("luxtronik", &format!("{}:{}", host, port)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.device.host,
            config.device.port.unwrap_or(DEFAULT_PORT),
            &config.connection,
        )
    }
}

#[async_trait::async_trait]
impl ProtocolAdapter for LuxtronikAdapter {
    fn protocol(&self) -> &'static str {
        "Luxtronik TCP"
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        self.stream = None;
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match timeout(self.operation_timeout, connect).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(HeatlinkError::connection(format!(
                "Luxtronik connect error: {}",
                e
            ))),
            Err(_) => Err(HeatlinkError::timeout("Connection timeout")),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }

    async fn read_block(&mut self, address: u16, count: u16) -> Result<Vec<i32>> {
        let limit = self.operation_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| HeatlinkError::connection("Not connected to Luxtronik controller"))?;

        let values = match timeout(limit, fetch_calculations(stream)).await {
            Ok(Ok(values)) => values,
            Ok(Err(e)) => {
                self.logger.error(&format!("Luxtronik read error: {}", e));
                self.close().await;
                return Err(e);
            }
            Err(_) => {
                self.close().await;
                return Err(HeatlinkError::timeout("Luxtronik read timed out"));
            }
        };

        self.logger
            .trace(&format!("Fetched {} calculation values", values.len()));
        slice_values(&values, address, count).inspect_err(|e| {
            self.logger.warn(&format!("Luxtronik {}", e));
        })
    }

    async fn write_block(&mut self, address: u16, _values: &[u16]) -> Result<()> {
        self.logger
            .warn(&format!("Luxtronik write to {} not implemented", address));
        Err(HeatlinkError::unsupported(
            "Luxtronik parameter writes are not implemented",
        ))
    }
}
