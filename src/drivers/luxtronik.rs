//! Luxtronik 2.1 (Alpha Innotec, Bosch, Novelan) over the native TCP protocol
//!
//! Sensor addresses are indices into the calculations table. Every value
//! is a native 32-bit cell; temperatures arrive in tenths of a degree.

use crate::adapter::luxtronik::DEFAULT_PORT;
use crate::adapter::{LuxtronikAdapter, ProtocolAdapter};
use crate::catalog::{CatalogTables, HeatingCircuit};
use crate::config::Config;
use crate::error::Result;
use crate::registry::{
    ChartSeries, ChartTemplate, DashboardTemplate, Domain, DriverCapabilities, DriverDescriptor,
};
use crate::sensor::{DataType, SensorDefinition};

fn cell(id: &str, index: u16, label: &str) -> SensorDefinition {
    SensorDefinition::new(id, index, DataType::Int32)
        .size(1)
        .label(label)
}

fn temperature(id: &str, index: u16, label: &str) -> SensorDefinition {
    cell(id, index, label).unit("°C").scale(0.1)
}

fn common() -> Vec<SensorDefinition> {
    vec![
        temperature("temp_flow", 10, "Vorlauf"),
        temperature("temp_return", 11, "Rücklauf"),
        temperature("temp_outside", 15, "Außentemperatur"),
        temperature("temp_outside_avg", 16, "Außentemperatur Mittel"),
        temperature("temp_hot_water", 17, "Warmwasser Ist"),
        temperature("temp_hot_water_target", 18, "Warmwasser Soll"),
        temperature("temp_source_in", 19, "Wärmequelle Ein"),
        temperature("temp_source_out", 20, "Wärmequelle Aus"),
        cell("error_code", 99, "Fehlercode"),
        cell("heat_quantity_heating", 151, "Wärmemenge Heizen").unit("kWh"),
        cell("heat_quantity_hot_water", 152, "Wärmemenge WW").unit("kWh"),
    ]
}

// The calculations table carries no per-circuit or per-zone points
fn circuit(_: HeatingCircuit) -> Vec<SensorDefinition> {
    Vec::new()
}

fn zone(_: u8) -> Result<Vec<SensorDefinition>> {
    Ok(Vec::new())
}

fn dashboard() -> DashboardTemplate {
    DashboardTemplate {
        name: "Luxtronik Dashboard".to_string(),
        charts: vec![
            ChartTemplate::line(
                "Temperaturen",
                24,
                vec![
                    ChartSeries::new("Außen", "temp_outside").color("#3b82f6"),
                    ChartSeries::new("Vorlauf", "temp_flow").color("#ef4444"),
                    ChartSeries::new("Rücklauf", "temp_return").color("#10b981"),
                    ChartSeries::new("Warmwasser", "temp_hot_water").color("#f59e0b"),
                ],
            ),
            ChartTemplate::line(
                "Energie",
                24,
                vec![
                    ChartSeries::new("Heizen (kWh)", "heat_quantity_heating"),
                    ChartSeries::new("WW (kWh)", "heat_quantity_hot_water"),
                ],
            ),
        ],
    }
}

fn adapter(config: &Config) -> Box<dyn ProtocolAdapter> {
    Box::new(LuxtronikAdapter::from_config(config))
}

pub fn descriptor() -> DriverDescriptor {
    DriverDescriptor {
        manufacturer: "luxtronik",
        model: "luxtronik_2_1",
        display_name: "Luxtronik 2.1 (Bosch, Alpha Innotec)",
        protocol: "Luxtronik TCP",
        default_port: DEFAULT_PORT,
        capabilities: DriverCapabilities {
            domains: &[
                Domain::Heating,
                Domain::Cooling,
                Domain::HotWater,
                Domain::Solar,
            ],
            max_circuits: 2,
            max_zones: 2,
        },
        tables: CatalogTables {
            common,
            circuit,
            zone,
        },
        dashboard,
        adapter,
        setup_instructions: "\
**Luxtronik 2.1 Setup**

1. Verbinden Sie die Wärmepumpe mit dem Netzwerk.
2. Stellen Sie sicher, dass Port 8889 erreichbar ist.
3. Konfigurieren Sie die IP-Adresse in den Einstellungen.

*Unterstützte Geräte:*
- Alpha Innotec (Luxtronik 2.0 / 2.1)
- Bosch / Junkers (mit entsprechendem Modul)
- Novelan
- Roth",
    }
}
