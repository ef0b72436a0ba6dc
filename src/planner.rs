//! Read-block planning
//!
//! Groups readable sensors into contiguous bulk reads. One greedy pass over
//! the sensors sorted by address: a sensor joins the open block when the
//! block stays within `max_block_size`, the gap before it is at most
//! `max_gap`, and no register of a write-only sensor sits in that gap.
//! A poorer grouping only costs round-trips, so there is no backtracking.

use crate::catalog::SensorCatalog;
use crate::config::PollingConfig;
use crate::sensor::SensorDefinition;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerLimits {
    pub max_block_size: u16,
    pub max_gap: u16,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self {
            max_block_size: 50,
            max_gap: 5,
        }
    }
}

impl From<&PollingConfig> for PlannerLimits {
    fn from(config: &PollingConfig) -> Self {
        Self {
            max_block_size: config.max_block_size,
            max_gap: config.max_gap,
        }
    }
}

/// Address range identifying a block: `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    pub start: u32,
    pub end: u32,
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadBlock {
    sensors: Vec<SensorDefinition>,
    start_address: u32,
    end_address: u32,
}

impl ReadBlock {
    fn open(sensor: &SensorDefinition) -> Self {
        Self {
            start_address: u32::from(sensor.address),
            end_address: sensor.end_address(),
            sensors: vec![sensor.clone()],
        }
    }

    fn push(&mut self, sensor: &SensorDefinition) {
        self.end_address = self.end_address.max(sensor.end_address());
        self.sensors.push(sensor.clone());
    }

    /// Sensors in ascending address order
    pub fn sensors(&self) -> &[SensorDefinition] {
        &self.sensors
    }

    pub fn start_address(&self) -> u32 {
        self.start_address
    }

    /// Exclusive
    pub fn end_address(&self) -> u32 {
        self.end_address
    }

    pub fn register_count(&self) -> u32 {
        self.end_address - self.start_address
    }

    pub fn key(&self) -> BlockKey {
        BlockKey {
            start: self.start_address,
            end: self.end_address,
        }
    }

    /// Position of a sensor's first word inside a bulk response
    pub fn offset_of(&self, sensor: &SensorDefinition) -> usize {
        (u32::from(sensor.address) - self.start_address) as usize
    }
}

/// Partition every readable sensor of the catalog into read blocks
pub fn plan_blocks(catalog: &SensorCatalog, limits: PlannerLimits) -> Vec<ReadBlock> {
    let forbidden = catalog.forbidden_addresses();
    let mut readable: Vec<&SensorDefinition> = catalog.readable().collect();
    // Stable: equal addresses keep name order from the catalog
    readable.sort_by_key(|s| s.address);

    let mut blocks = Vec::new();
    let mut iter = readable.into_iter();
    let Some(first) = iter.next() else {
        return blocks;
    };

    let mut current = ReadBlock::open(first);
    for sensor in iter {
        if should_extend(&current, sensor, limits, &forbidden) {
            current.push(sensor);
        } else {
            blocks.push(std::mem::replace(&mut current, ReadBlock::open(sensor)));
        }
    }
    blocks.push(current);
    blocks
}

fn should_extend(
    block: &ReadBlock,
    sensor: &SensorDefinition,
    limits: PlannerLimits,
    forbidden: &BTreeSet<u32>,
) -> bool {
    let start = u32::from(sensor.address);
    let new_end = block.end_address.max(sensor.end_address());
    if new_end - block.start_address > u32::from(limits.max_block_size) {
        return false;
    }

    let gap = start.saturating_sub(block.end_address);
    if gap > u32::from(limits.max_gap) {
        return false;
    }

    gap == 0 || forbidden.range(block.end_address..start).next().is_none()
}

/// Blocks computed for one catalog identity
#[derive(Debug, Clone)]
pub struct ReadPlan {
    fingerprint: u64,
    blocks: Vec<ReadBlock>,
    sensor_count: usize,
}

impl ReadPlan {
    pub fn build(catalog: &SensorCatalog, limits: PlannerLimits) -> Self {
        Self {
            fingerprint: catalog.fingerprint(),
            blocks: plan_blocks(catalog, limits),
            sensor_count: catalog.readable().count(),
        }
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn blocks(&self) -> &[ReadBlock] {
        &self.blocks
    }

    /// Readable sensors covered by the blocks
    pub fn sensor_count(&self) -> usize {
        self.sensor_count
    }

    pub fn is_current_for(&self, catalog: &SensorCatalog) -> bool {
        self.fingerprint == catalog.fingerprint()
    }
}
