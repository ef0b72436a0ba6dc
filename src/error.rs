//! Error types and handling for Heatlink
//!
//! Errors are split by how a caller should react to them: validation errors
//! are surfaced immediately, connectivity and timeout errors are retried by
//! the connection manager, device exceptions are tracked per address range,
//! and decode errors stay local to a single sensor.

use std::fmt;
use thiserror::Error;

/// Result type alias for Heatlink operations
pub type Result<T> = std::result::Result<T, HeatlinkError>;

/// Exception reported by the device in an otherwise well-formed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceException {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    ServerDeviceBusy,
    Other(u8),
}

impl fmt::Display for DeviceException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalFunction => f.write_str("illegal function"),
            Self::IllegalDataAddress => f.write_str("illegal data address"),
            Self::IllegalDataValue => f.write_str("illegal data value"),
            Self::ServerDeviceFailure => f.write_str("server device failure"),
            Self::ServerDeviceBusy => f.write_str("server device busy"),
            Self::Other(code) => write!(f, "exception code {}", code),
        }
    }
}

/// Main error type for Heatlink
#[derive(Debug, Error)]
pub enum HeatlinkError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Configuration validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Socket refused, reset or otherwise unavailable
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Malformed or unexpected frame on the wire
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Device answered with an exception response
    #[error("Device exception ({exception}): {message}")]
    Device {
        exception: DeviceException,
        message: String,
    },

    /// Raw value could not be interpreted for a sensor's datatype
    #[error("Decode error for {sensor}: {message}")]
    Decode { sensor: String, message: String },

    #[error("Sensor {name} not found")]
    SensorNotFound { name: String },

    #[error("Sensor {name} is read-only")]
    ReadOnly { name: String },

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    /// Operation not implemented by the active protocol adapter
    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    /// No driver registered for a manufacturer/model pair
    #[error("Unknown driver: {manufacturer}/{model}")]
    UnknownDriver { manufacturer: String, model: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl HeatlinkError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new device exception error
    pub fn device<S: Into<String>>(exception: DeviceException, message: S) -> Self {
        Self::Device {
            exception,
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(sensor: S, message: S) -> Self {
        Self::Decode {
            sensor: sensor.into(),
            message: message.into(),
        }
    }

    pub fn sensor_not_found<S: Into<String>>(name: S) -> Self {
        Self::SensorNotFound { name: name.into() }
    }

    pub fn read_only<S: Into<String>>(name: S) -> Self {
        Self::ReadOnly { name: name.into() }
    }

    pub fn invalid_value<S: Into<String>>(name: S, message: S) -> Self {
        Self::InvalidValue {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new unsupported-operation error
    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Device rejected the requested address range
    pub fn is_illegal_address(&self) -> bool {
        matches!(
            self,
            Self::Device {
                exception: DeviceException::IllegalDataAddress,
                ..
            }
        )
    }

    /// Device asked us to come back later
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Device {
                exception: DeviceException::ServerDeviceBusy,
                ..
            }
        )
    }

    /// Socket-level failure: refused, reset, broken pipe or timed out
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Io { .. }
        )
    }

    /// Caller-side mistake on the write path; never retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SensorNotFound { .. } | Self::ReadOnly { .. } | Self::InvalidValue { .. }
        )
    }
}

impl From<std::io::Error> for HeatlinkError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeatlinkError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeatlinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
