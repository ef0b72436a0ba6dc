//! Per-installation sensor catalog
//!
//! Assembled once from a driver's common points plus the per-circuit and
//! per-zone tables for whatever the installation has enabled. The catalog
//! is keyed by sensor name; its [`SensorCatalog::fingerprint`] is what the
//! poller compares to decide whether a read plan is stale.

use crate::config::CatalogConfig;
use crate::error::{HeatlinkError, Result};
use crate::logging::get_logger;
use crate::sensor::SensorDefinition;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Heating circuit identifier (A..G)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeatingCircuit {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl HeatingCircuit {
    pub const ALL: [HeatingCircuit; 7] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
    ];

    /// Zero-based position, used as register stride multiplier
    pub const fn index(self) -> u16 {
        self as u16
    }

    pub const fn letter(self) -> char {
        match self {
            Self::A => 'a',
            Self::B => 'b',
            Self::C => 'c',
            Self::D => 'd',
            Self::E => 'e',
            Self::F => 'f',
            Self::G => 'g',
        }
    }
}

impl fmt::Display for HeatingCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for HeatingCircuit {
    type Err = HeatlinkError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| wanted.len() == 1 && wanted.starts_with(c.letter()))
            .ok_or_else(|| HeatlinkError::config(format!("Invalid heating circuit: {}", s)))
    }
}

/// Static tables a driver contributes to a catalog
pub struct CatalogTables {
    pub common: fn() -> Vec<SensorDefinition>,
    pub circuit: fn(HeatingCircuit) -> Vec<SensorDefinition>,
    pub zone: fn(u8) -> Result<Vec<SensorDefinition>>,
}

#[derive(Debug, Clone, Default)]
pub struct SensorCatalog {
    sensors: BTreeMap<String, SensorDefinition>,
}

impl SensorCatalog {
    /// Later definitions with the same id replace earlier ones
    pub fn new(sensors: impl IntoIterator<Item = SensorDefinition>) -> Self {
        let sensors = sensors
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect::<BTreeMap<_, _>>();
        Self { sensors }
    }

    /// Build from driver tables and the installation's circuits/zones.
    /// Invalid circuit names and zone indices are logged and skipped.
    pub fn assemble(tables: &CatalogTables, config: &CatalogConfig) -> Self {
        let logger = get_logger("catalog");
        let mut sensors = (tables.common)();

        for name in &config.circuits {
            match name.parse::<HeatingCircuit>() {
                Ok(circuit) => sensors.extend((tables.circuit)(circuit)),
                Err(_) => logger.warn(&format!("Invalid heating circuit configured: {}", name)),
            }
        }

        for zone in &config.zones {
            match (tables.zone)(*zone) {
                Ok(zone_sensors) => sensors.extend(zone_sensors),
                Err(e) => logger.warn(&format!("Invalid zone configured: {} ({})", zone, e)),
            }
        }

        Self::new(sensors)
    }

    pub fn get(&self, name: &str) -> Option<&SensorDefinition> {
        self.sensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sensors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Sensors in name order
    pub fn iter(&self) -> impl Iterator<Item = &SensorDefinition> {
        self.sensors.values()
    }

    pub fn readable(&self) -> impl Iterator<Item = &SensorDefinition> {
        self.iter().filter(|s| s.read_supported)
    }

    /// Every word occupied by a sensor that must never be read
    pub fn forbidden_addresses(&self) -> BTreeSet<u32> {
        self.iter()
            .filter(|s| !s.read_supported)
            .flat_map(SensorDefinition::addresses)
            .collect()
    }

    /// Structural identity: a hash over the sorted sensor names
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for name in self.sensors.keys() {
            name.hash(&mut hasher);
        }
        self.sensors.len().hash(&mut hasher);
        hasher.finish()
    }
}
