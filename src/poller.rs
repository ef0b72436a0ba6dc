//! Poll cycle: planned bulk reads with per-sensor fallback, and writes
//!
//! `read_sensors` never fails. Whatever goes wrong during a cycle ends up in
//! the connection statistics and the log, and the caller gets whatever was
//! read before the problem. `write_sensor` is the opposite: every failure is
//! returned so a caller changing a setpoint knows the outcome.

use crate::catalog::SensorCatalog;
use crate::codec::{self, Decoded, LABEL_SUFFIX, SensorValue};
use crate::config::PollingConfig;
use crate::connection::{ConnectionManager, HealthSnapshot};
use crate::error::{HeatlinkError, Result};
use crate::failure_cache::FailureCache;
use crate::logging::{StructuredLogger, get_logger};
use crate::planner::{PlannerLimits, ReadBlock, ReadPlan};
use crate::sensor::SensorDefinition;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Flat sensor name -> value map produced by one cycle
pub type Readings = BTreeMap<String, SensorValue>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub limits: PlannerLimits,
    pub inter_block_delay: Duration,
    pub bulk_retry_delay: Duration,
    pub failed_block_ttl: Duration,
    pub failed_block_sweep_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            limits: PlannerLimits::from(config),
            inter_block_delay: config.inter_block_delay(),
            bulk_retry_delay: config.bulk_retry_delay(),
            failed_block_ttl: config.failed_block_ttl(),
            failed_block_sweep_interval: config.failed_block_sweep_interval(),
        }
    }
}

pub struct Poller {
    catalog: SensorCatalog,
    connection: ConnectionManager,
    plan: Option<Arc<ReadPlan>>,
    failures: FailureCache,
    settings: PollSettings,
    unavailable_reported: bool,
    logger: StructuredLogger,
}

fn insert_decoded(readings: &mut Readings, sensor: &SensorDefinition, decoded: Decoded) {
    if let Some(label) = decoded.label {
        readings.insert(
            format!("{}{}", sensor.id, LABEL_SUFFIX),
            SensorValue::Text(label),
        );
    }
    readings.insert(sensor.id.clone(), decoded.value);
}

fn block_request(block: &ReadBlock) -> Result<(u16, u16)> {
    let address = u16::try_from(block.start_address())
        .map_err(|_| HeatlinkError::unsupported(format!("block {} out of range", block.key())))?;
    let count = u16::try_from(block.register_count())
        .map_err(|_| HeatlinkError::unsupported(format!("block {} too large", block.key())))?;
    Ok((address, count))
}

impl Poller {
    pub fn new(catalog: SensorCatalog, connection: ConnectionManager, settings: PollSettings) -> Self {
        Self {
            catalog,
            connection,
            plan: None,
            failures: FailureCache::new(
                settings.failed_block_ttl,
                settings.failed_block_sweep_interval,
            ),
            settings,
            unavailable_reported: false,
            logger: get_logger("poller"),
        }
    }

    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }

    /// Swap the catalog; plan and failure knowledge are dropped with it
    pub fn replace_catalog(&mut self, catalog: SensorCatalog) {
        self.logger.info(&format!(
            "Catalog replaced: {} -> {} sensors",
            self.catalog.len(),
            catalog.len()
        ));
        self.catalog = catalog;
        self.plan = None;
        self.failures.clear();
    }

    /// Plan used by the most recent cycle
    pub fn plan(&self) -> Option<&ReadPlan> {
        self.plan.as_deref()
    }

    pub fn failure_cache(&self) -> &FailureCache {
        &self.failures
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.connection
    }

    pub fn health(&self) -> HealthSnapshot {
        self.connection.health()
    }

    pub async fn close(&mut self) {
        self.connection.close().await;
    }

    fn current_plan(&mut self) -> Arc<ReadPlan> {
        if let Some(plan) = &self.plan
            && plan.is_current_for(&self.catalog)
        {
            return plan.clone();
        }

        let plan = Arc::new(ReadPlan::build(&self.catalog, self.settings.limits));
        if !self.failures.is_empty() {
            self.logger.debug(&format!(
                "Dropping {} failed block entries after catalog change",
                self.failures.len()
            ));
        }
        self.failures.clear();
        self.logger.info(&format!(
            "Read plan built: {} blocks for {} sensors",
            plan.blocks().len(),
            plan.sensor_count()
        ));
        self.plan = Some(plan.clone());
        plan
    }

    /// Run one read pass over every readable sensor
    pub async fn read_sensors(&mut self) -> Readings {
        let mut readings = Readings::new();

        if !self.connection.ensure_connection().await {
            if !self.unavailable_reported {
                self.unavailable_reported = true;
                self.logger.error(&format!(
                    "Device {} unavailable, skipping poll",
                    self.connection.endpoint()
                ));
            }
            return readings;
        }
        self.unavailable_reported = false;

        let plan = self.current_plan();
        let evicted = self.failures.sweep(Instant::now());
        if evicted > 0 {
            self.logger
                .debug(&format!("Expired {} failed block entries", evicted));
        }

        for (index, block) in plan.blocks().iter().enumerate() {
            if index > 0 && !self.settings.inter_block_delay.is_zero() {
                sleep(self.settings.inter_block_delay).await;
            }
            if self.read_block(block, &mut readings).await.is_break() {
                break;
            }
            if !self.connection.is_connected() {
                self.logger.warn("Connection dropped during poll cycle");
                break;
            }
        }

        if !readings.is_empty() {
            self.connection.mark_successful_read();
        }
        readings
    }

    async fn read_block(&mut self, block: &ReadBlock, readings: &mut Readings) -> ControlFlow<()> {
        let key = block.key();
        if self.failures.is_failed(key, Instant::now()) {
            self.logger
                .trace(&format!("Block {} known to fail, reading per sensor", key));
            return self.read_individually(block, readings).await;
        }

        match self.bulk_read(block).await {
            Ok(words) => {
                self.decode_block(block, &words, readings);
                ControlFlow::Continue(())
            }
            Err(e) if e.is_illegal_address() => {
                self.failures.record(key, Instant::now());
                self.logger.info(&format!(
                    "Block {} rejected ({}), using per-sensor reads for {}s",
                    key,
                    e,
                    self.failures.ttl().as_secs()
                ));
                self.read_individually(block, readings).await
            }
            Err(e @ HeatlinkError::Protocol { .. }) => {
                self.logger
                    .error(&format!("Protocol error reading block {}: {}", key, e));
                self.connection.record_read_error(&e);
                self.connection.close().await;
                ControlFlow::Break(())
            }
            Err(e) => {
                self.logger
                    .warn(&format!("Bulk read of block {} failed: {}", key, e));
                self.connection.record_read_error(&e);
                if !self.connection.is_connected() {
                    return ControlFlow::Break(());
                }
                self.read_individually(block, readings).await
            }
        }
    }

    /// One bulk request, retried once after a short pause on transport or busy errors
    async fn bulk_read(&mut self, block: &ReadBlock) -> Result<Vec<i32>> {
        let (address, count) = block_request(block)?;
        match self.connection.read_block(address, count).await {
            Err(e) if e.is_transport() || e.is_busy() => {
                self.logger.debug(&format!(
                    "Retrying block {} after: {}",
                    block.key(),
                    e
                ));
                sleep(self.settings.bulk_retry_delay).await;
                if !self.connection.ensure_connection().await {
                    return Err(e);
                }
                self.connection.read_block(address, count).await
            }
            other => other,
        }
    }

    fn decode_block(&self, block: &ReadBlock, words: &[i32], readings: &mut Readings) {
        for sensor in block.sensors() {
            let window = words.get(block.offset_of(sensor)..).unwrap_or(&[]);
            match codec::decode(sensor, window) {
                Ok(decoded) => insert_decoded(readings, sensor, decoded),
                Err(e) => self.logger.debug(&format!("Skipping {}", e)),
            }
        }
    }

    async fn read_individually(
        &mut self,
        block: &ReadBlock,
        readings: &mut Readings,
    ) -> ControlFlow<()> {
        for sensor in block.sensors() {
            if !self.connection.is_connected() {
                return ControlFlow::Break(());
            }
            let result = self
                .connection
                .read_block(sensor.address, sensor.size)
                .await;
            match result {
                Ok(words) => match codec::decode(sensor, &words) {
                    Ok(decoded) => insert_decoded(readings, sensor, decoded),
                    Err(e) => self.logger.debug(&format!("Skipping {}", e)),
                },
                Err(e @ HeatlinkError::Protocol { .. }) => {
                    self.logger
                        .error(&format!("Protocol error reading {}: {}", sensor.id, e));
                    self.connection.record_read_error(&e);
                    self.connection.close().await;
                    return ControlFlow::Break(());
                }
                Err(e) => {
                    self.logger
                        .debug(&format!("Read of {} failed: {}", sensor.id, e));
                    if !e.is_illegal_address() {
                        self.connection.record_read_error(&e);
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Coerce, encode and write one value
    pub async fn write_sensor(&mut self, name: &str, value: &Value) -> Result<()> {
        let sensor = self
            .catalog
            .get(name)
            .ok_or_else(|| HeatlinkError::sensor_not_found(name))?
            .clone();
        if !sensor.is_writable() {
            return Err(HeatlinkError::read_only(name));
        }

        let words = codec::coerce(&sensor, value)
            .and_then(|v| codec::encode(&sensor, v))
            .inspect_err(|e| self.logger.warn(&format!("Encoding error: {}", e)))?;

        if !self.connection.ensure_connection().await {
            return Err(HeatlinkError::connection(format!(
                "Cannot write {}: device unavailable",
                name
            )));
        }

        match self
            .connection
            .write_block(sensor.address, &words)
            .await
        {
            Ok(()) => {
                self.logger.info(&format!("Wrote {} = {}", name, value));
                Ok(())
            }
            Err(e @ (HeatlinkError::Device { .. } | HeatlinkError::Unsupported { .. })) => {
                self.logger
                    .warn(&format!("Write of {} rejected: {}", name, e));
                self.connection.record_write_error(&e);
                Err(e)
            }
            Err(e) => {
                self.logger.error(&format!("Write of {} failed: {}", name, e));
                self.connection.record_write_error(&e);
                self.connection.close().await;
                Err(e)
            }
        }
    }
}
