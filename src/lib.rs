//! # Heatlink - heat pump field-protocol poller
//!
//! Polls heat pump controllers over Modbus TCP or the Luxtronik binary
//! protocol and turns their registers into named, typed, scaled values.
//!
//! ## Architecture
//!
//! - `sensor`, `catalog`: sensor definitions and the per-installation catalog
//! - `codec`: value decoding, write coercion and encoding
//! - `adapter`: the `ProtocolAdapter` trait with Modbus and Luxtronik transports
//! - `connection`: connect/reconnect backoff and health statistics
//! - `planner`: grouping sensors into bulk read blocks
//! - `failure_cache`: address ranges the device refused to bulk-read
//! - `poller`: the read and write paths of a poll cycle
//! - `registry`, `drivers`: manufacturer/model drivers
//! - `service`: single-owner actor serializing cycles and commands
//! - `sink`: output boundary for collaborators
//! - `config`, `logging`, `error`: ambient plumbing

pub mod adapter;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod connection;
pub mod drivers;
pub mod error;
pub mod failure_cache;
pub mod logging;
pub mod planner;
pub mod poller;
pub mod registry;
pub mod sensor;
pub mod service;
pub mod sink;

// Re-export commonly used types
pub use config::Config;
pub use error::{HeatlinkError, Result};
pub use poller::{Poller, Readings};
pub use registry::DriverRegistry;
