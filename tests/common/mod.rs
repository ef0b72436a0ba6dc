#![allow(dead_code)]

use heatlink::adapter::ProtocolAdapter;
use heatlink::error::{DeviceException, HeatlinkError, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// In-memory register device shared between a test and its adapter
#[derive(Default)]
pub struct MockDevice {
    pub reachable: bool,
    pub registers: HashMap<u16, i32>,
    /// Reads with more words than this are rejected as illegal address
    pub bulk_limit: Option<u16>,
    /// Reads touching any of these addresses are rejected as illegal address
    pub refused: HashSet<u16>,
    /// Errors returned by the next reads, in order
    pub read_errors: VecDeque<fn() -> HeatlinkError>,
    pub write_error: Option<fn() -> HeatlinkError>,
    pub reads: Vec<(u16, u16)>,
    pub writes: Vec<(u16, Vec<u16>)>,
    pub connects: u32,
}

pub struct MockAdapter {
    open: bool,
    device: Arc<Mutex<MockDevice>>,
}

impl MockAdapter {
    pub fn new(device: Arc<Mutex<MockDevice>>) -> Self {
        Self {
            open: false,
            device,
        }
    }
}

pub fn device() -> Arc<Mutex<MockDevice>> {
    Arc::new(Mutex::new(MockDevice {
        reachable: true,
        ..MockDevice::default()
    }))
}

fn illegal_address(address: u16, count: u16) -> HeatlinkError {
    HeatlinkError::device(
        DeviceException::IllegalDataAddress,
        format!("read {}+{}", address, count),
    )
}

#[async_trait::async_trait]
impl ProtocolAdapter for MockAdapter {
    fn protocol(&self) -> &'static str {
        "mock"
    }

    fn endpoint(&self) -> String {
        "mock:502".to_string()
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn connect(&mut self) -> Result<()> {
        let mut device = self.device.lock().unwrap();
        device.connects += 1;
        self.open = device.reachable;
        if self.open {
            Ok(())
        } else {
            Err(HeatlinkError::connection("Connection refused"))
        }
    }

    async fn close(&mut self) {
        self.open = false;
    }

    async fn read_block(&mut self, address: u16, count: u16) -> Result<Vec<i32>> {
        if !self.open {
            return Err(HeatlinkError::connection("Not connected"));
        }
        let mut device = self.device.lock().unwrap();
        device.reads.push((address, count));

        if let Some(error) = device.read_errors.pop_front() {
            let error = error();
            if matches!(error, HeatlinkError::Connection { .. }) {
                self.open = false;
            }
            return Err(error);
        }
        if device.bulk_limit.is_some_and(|limit| count > limit) {
            return Err(illegal_address(address, count));
        }
        let range = address..address + count;
        if device.refused.iter().any(|a| range.contains(a)) {
            return Err(illegal_address(address, count));
        }
        Ok(range
            .map(|a| device.registers.get(&a).copied().unwrap_or(0))
            .collect())
    }

    async fn write_block(&mut self, address: u16, values: &[u16]) -> Result<()> {
        if !self.open {
            return Err(HeatlinkError::connection("Not connected"));
        }
        let mut device = self.device.lock().unwrap();
        if let Some(error) = device.write_error {
            return Err(error());
        }
        device.writes.push((address, values.to_vec()));
        for (offset, value) in values.iter().enumerate() {
            device
                .registers
                .insert(address + offset as u16, i32::from(*value));
        }
        Ok(())
    }
}
