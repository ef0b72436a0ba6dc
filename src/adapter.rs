//! Protocol adapters
//!
//! Every transport the poller talks through presents the same block
//! contract: open a channel, read `count` words starting at `address`,
//! write a run of 16-bit registers. The planner and poll cycle only see
//! this trait.

pub mod luxtronik;
pub mod modbus;

use crate::error::Result;

pub use luxtronik::LuxtronikAdapter;
pub use modbus::StandardAdapter;

#[async_trait::async_trait]
pub trait ProtocolAdapter: Send {
    /// Short protocol name for logs and health output
    fn protocol(&self) -> &'static str;

    /// `host:port` of the device
    fn endpoint(&self) -> String;

    fn is_open(&self) -> bool;

    /// Sessions the adapter reopened on its own since the last call.
    /// The connection manager folds these into its reconnect statistics.
    fn take_reconnects(&mut self) -> u32 {
        0
    }

    /// Open the transport. An already open adapter reconnects.
    async fn connect(&mut self) -> Result<()>;

    /// Drop the transport; never fails
    async fn close(&mut self);

    /// Read `count` words starting at `address`. Register protocols widen
    /// each `u16` to `i32`; native 32-bit protocols return cells unchanged.
    async fn read_block(&mut self, address: u16, count: u16) -> Result<Vec<i32>>;

    /// Write consecutive 16-bit registers starting at `address`
    async fn write_block(&mut self, address: u16, values: &[u16]) -> Result<()>;
}
