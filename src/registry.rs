//! Driver registry
//!
//! An explicit map from `(manufacturer, model)` to a driver descriptor,
//! filled from [`crate::drivers::builtin`] when constructed. Nothing
//! registers itself; the full set of drivers is whatever the map holds.

use crate::adapter::ProtocolAdapter;
use crate::catalog::{CatalogTables, SensorCatalog};
use crate::config::{CatalogConfig, Config};
use crate::connection::{BackoffPolicy, ConnectionManager};
use crate::error::{HeatlinkError, Result};
use crate::logging::get_logger;
use crate::poller::{PollSettings, Poller};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Heating,
    Cooling,
    HotWater,
    Solar,
    SmartGrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriverCapabilities {
    pub domains: &'static [Domain],
    pub max_circuits: usize,
    pub max_zones: usize,
}

impl DriverCapabilities {
    pub fn supports(&self, domain: Domain) -> bool {
        self.domains.contains(&domain)
    }
}

/// One line of a chart, referencing a sensor by name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub sensor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ChartSeries {
    pub fn new(label: &str, sensor: &str) -> Self {
        Self {
            label: label.to_string(),
            sensor: sensor.to_string(),
            color: None,
        }
    }

    pub fn color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartTemplate {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub series: Vec<ChartSeries>,
    pub hours: u32,
}

impl ChartTemplate {
    pub fn line(title: &str, hours: u32, series: Vec<ChartSeries>) -> Self {
        Self {
            title: title.to_string(),
            kind: "line".to_string(),
            series,
            hours,
        }
    }
}

/// Default dashboard handed to the dashboard collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardTemplate {
    pub name: String,
    pub charts: Vec<ChartTemplate>,
}

/// Everything needed to talk to one controller model
pub struct DriverDescriptor {
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub display_name: &'static str,
    pub protocol: &'static str,
    pub default_port: u16,
    pub capabilities: DriverCapabilities,
    pub tables: CatalogTables,
    pub dashboard: fn() -> DashboardTemplate,
    pub adapter: fn(&Config) -> Box<dyn ProtocolAdapter>,
    pub setup_instructions: &'static str,
}

impl DriverDescriptor {
    pub fn key(&self) -> String {
        format!("{}/{}", self.manufacturer, self.model)
    }

    /// Assemble the catalog, dropping circuits and zones beyond the model's limits
    pub fn build_catalog(&self, config: &CatalogConfig) -> SensorCatalog {
        let logger = get_logger("registry");
        let caps = &self.capabilities;
        let mut config = config.clone();

        if config.circuits.len() > caps.max_circuits {
            logger.warn(&format!(
                "{} supports {} heating circuits, ignoring {:?}",
                self.display_name,
                caps.max_circuits,
                &config.circuits[caps.max_circuits..]
            ));
            config.circuits.truncate(caps.max_circuits);
        }
        if config.zones.len() > caps.max_zones {
            logger.warn(&format!(
                "{} supports {} zones, ignoring {:?}",
                self.display_name,
                caps.max_zones,
                &config.zones[caps.max_zones..]
            ));
            config.zones.truncate(caps.max_zones);
        }

        SensorCatalog::assemble(&self.tables, &config)
    }

    pub fn dashboard_template(&self) -> DashboardTemplate {
        (self.dashboard)()
    }

    pub fn create_adapter(&self, config: &Config) -> Box<dyn ProtocolAdapter> {
        (self.adapter)(config)
    }

    /// Wire catalog, adapter and connection manager into a ready poller
    pub fn build_poller(&self, config: &Config) -> Poller {
        let catalog = self.build_catalog(&config.catalog);
        let connection = ConnectionManager::new(
            self.create_adapter(config),
            BackoffPolicy::from(&config.connection),
        );
        Poller::new(catalog, connection, PollSettings::from(&config.polling))
    }
}

fn registry_key(manufacturer: &str, model: &str) -> (String, String) {
    (
        manufacturer.trim().to_ascii_lowercase(),
        model.trim().to_ascii_lowercase(),
    )
}

#[derive(Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<(String, String), DriverDescriptor>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every driver shipped with the crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in crate::drivers::builtin() {
            registry.register(descriptor);
        }
        registry
    }

    /// Insert a descriptor, replacing any previous one with the same key
    pub fn register(&mut self, descriptor: DriverDescriptor) {
        let key = registry_key(descriptor.manufacturer, descriptor.model);
        self.drivers.insert(key, descriptor);
    }

    pub fn lookup(&self, manufacturer: &str, model: &str) -> Result<&DriverDescriptor> {
        self.drivers
            .get(&registry_key(manufacturer, model))
            .ok_or_else(|| HeatlinkError::UnknownDriver {
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
            })
    }

    /// Driver configured in `config.device`
    pub fn for_config(&self, config: &Config) -> Result<&DriverDescriptor> {
        self.lookup(&config.device.manufacturer, &config.device.model)
    }

    /// Descriptors ordered by manufacturer, then model
    pub fn drivers(&self) -> impl Iterator<Item = &DriverDescriptor> {
        self.drivers.values()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
