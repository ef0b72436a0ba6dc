//! iDM Navigator 2.0 over Modbus TCP
//!
//! Floats are IEEE-754 over two holding registers, high word first.
//! A handful of registers accept writes (PV and external sensor inputs)
//! but answer reads with an exception; those are marked write-only so the
//! planner never bridges a gap across them.

use crate::adapter::{ProtocolAdapter, StandardAdapter};
use crate::adapter::modbus::DEFAULT_PORT;
use crate::catalog::{CatalogTables, HeatingCircuit};
use crate::config::Config;
use crate::error::{HeatlinkError, Result};
use crate::registry::{
    ChartSeries, ChartTemplate, DashboardTemplate, Domain, DriverCapabilities, DriverDescriptor,
};
use crate::sensor::{DataType, Member, SensorDefinition};

pub const MAX_ZONES: u8 = 10;
const ZONE_BASE: u16 = 2000;
const ZONE_STRIDE: u16 = 65;

static SYSTEM_MODES: [Member; 5] = [
    Member::new(0, "standby"),
    Member::new(1, "automatic"),
    Member::new(2, "away"),
    Member::new(4, "hot_water_only"),
    Member::new(5, "heating_cooling_only"),
];

static SMART_GRID_STATES: [Member; 4] = [
    Member::new(0, "grid_blocked_solar_off"),
    Member::new(1, "grid_allowed_solar_off"),
    Member::new(2, "grid_unused_solar_on"),
    Member::new(4, "grid_blocked_solar_on"),
];

static HEAT_PUMP_STATUS: [Member; 4] = [
    Member::new(1, "heating"),
    Member::new(2, "cooling"),
    Member::new(4, "hot_water"),
    Member::new(8, "defrost"),
];

static CIRCUIT_MODES: [Member; 6] = [
    Member::new(0, "off"),
    Member::new(1, "timed"),
    Member::new(2, "normal"),
    Member::new(3, "eco"),
    Member::new(4, "manual_heating"),
    Member::new(5, "manual_cooling"),
];

static ZONE_MODES: [Member; 2] = [Member::new(0, "cooling"), Member::new(1, "heating")];

fn temperature(id: &str, address: u16, label: &str) -> SensorDefinition {
    SensorDefinition::new(id, address, DataType::Float32)
        .label(label)
        .unit("°C")
}

fn common() -> Vec<SensorDefinition> {
    vec![
        temperature("temp_outside", 1000, "Außentemperatur"),
        temperature("temp_outside_avg", 1002, "Außentemperatur gemittelt"),
        SensorDefinition::new("failure_id", 1004, DataType::UInt16).label("Störnummer"),
        SensorDefinition::new("system_mode", 1005, DataType::Enum(&SYSTEM_MODES))
            .label("Betriebsart System")
            .writable(),
        SensorDefinition::new("smart_grid_status", 1006, DataType::Enum(&SMART_GRID_STATES))
            .label("Smart Grid Status"),
        temperature("temp_heat_storage", 1008, "Wärmespeicher"),
        temperature("temp_water_heater_bottom", 1012, "Warmwasser unten"),
        temperature("temp_water_heater_top", 1014, "Warmwasser oben"),
        SensorDefinition::new("temp_water_target", 1032, DataType::UInt16)
            .label("Warmwasser Soll")
            .unit("°C")
            .writable(),
        SensorDefinition::new("temp_water_switch_on", 1033, DataType::UInt16)
            .label("Warmwasser Einschalttemperatur")
            .unit("°C")
            .writable(),
        SensorDefinition::new("temp_water_switch_off", 1034, DataType::UInt16)
            .label("Warmwasser Ausschalttemperatur")
            .unit("°C")
            .writable(),
        temperature("temp_flow", 1050, "Vorlauf Wärmepumpe"),
        temperature("temp_return", 1052, "Rücklauf Wärmepumpe"),
        SensorDefinition::new("heat_pump_status", 1090, DataType::Bitfield(&HEAT_PUMP_STATUS))
            .label("Betriebsart Wärmepumpe"),
        SensorDefinition::new("heating_request", 1710, DataType::Bool)
            .label("Anforderung Heizen")
            .writable(),
        SensorDefinition::new("energy_heat_total", 1750, DataType::Float32)
            .label("Wärmemenge gesamt")
            .unit("kWh"),
        SensorDefinition::new("power_current", 1790, DataType::Float32)
            .label("Momentanleistung")
            .unit("kW"),
        SensorDefinition::new("pv_surplus", 74, DataType::Float32)
            .label("PV-Überschuss")
            .unit("kW")
            .write_only(),
        SensorDefinition::new("pv_production", 78, DataType::Float32)
            .label("PV-Produktion")
            .unit("kW")
            .write_only(),
        SensorDefinition::new("power_use_house", 82, DataType::Float32)
            .label("Hausverbrauch")
            .unit("kW")
            .write_only(),
        temperature("temp_external_outdoor", 1690, "Externe Außentemperatur").write_only(),
        SensorDefinition::new("humidity_external", 1692, DataType::Float32)
            .label("Externe Feuchte")
            .unit("%")
            .write_only(),
    ]
}

fn circuit(c: HeatingCircuit) -> Vec<SensorDefinition> {
    let i = c.index();
    let upper = c.letter().to_ascii_uppercase();
    vec![
        temperature(
            &format!("temp_flow_circuit_{}", c),
            1350 + 2 * i,
            &format!("Vorlauf Heizkreis {}", upper),
        ),
        temperature(
            &format!("temp_room_circuit_{}", c),
            1364 + 2 * i,
            &format!("Raumtemperatur Heizkreis {}", upper),
        ),
        temperature(
            &format!("temp_flow_target_circuit_{}", c),
            1378 + 2 * i,
            &format!("Vorlauf Soll Heizkreis {}", upper),
        ),
        SensorDefinition::new(
            format!("mode_circuit_{}", c),
            1393 + i,
            DataType::Enum(&CIRCUIT_MODES),
        )
        .label(format!("Betriebsart Heizkreis {}", upper))
        .writable(),
        SensorDefinition::new(
            format!("curve_circuit_{}", c),
            1429 + 2 * i,
            DataType::Float32,
        )
        .label(format!("Heizkurve Heizkreis {}", upper))
        .writable(),
    ]
}

fn zone(z: u8) -> Result<Vec<SensorDefinition>> {
    if z >= MAX_ZONES {
        return Err(HeatlinkError::config(format!(
            "zone index must be below {}",
            MAX_ZONES
        )));
    }
    let base = ZONE_BASE + ZONE_STRIDE * u16::from(z);
    Ok(vec![
        SensorDefinition::new(format!("zone_{}_mode", z), base, DataType::Enum(&ZONE_MODES))
            .label(format!("Zone {} Modus", z + 1))
            .writable(),
        temperature(
            &format!("zone_{}_room_1_temp", z),
            base + 4,
            &format!("Zone {} Raum 1", z + 1),
        ),
        temperature(
            &format!("zone_{}_room_1_target", z),
            base + 6,
            &format!("Zone {} Raum 1 Soll", z + 1),
        )
        .writable(),
    ])
}

fn dashboard() -> DashboardTemplate {
    DashboardTemplate {
        name: "iDM Dashboard".to_string(),
        charts: vec![
            ChartTemplate::line(
                "Temperaturen",
                24,
                vec![
                    ChartSeries::new("Außen", "temp_outside").color("#3b82f6"),
                    ChartSeries::new("Vorlauf", "temp_flow").color("#ef4444"),
                    ChartSeries::new("Rücklauf", "temp_return").color("#10b981"),
                    ChartSeries::new("Warmwasser", "temp_water_heater_top").color("#f59e0b"),
                ],
            ),
            ChartTemplate::line(
                "Leistung",
                24,
                vec![ChartSeries::new("Momentanleistung (kW)", "power_current")],
            ),
        ],
    }
}

fn adapter(config: &Config) -> Box<dyn ProtocolAdapter> {
    Box::new(StandardAdapter::from_config(config))
}

pub fn descriptor() -> DriverDescriptor {
    DriverDescriptor {
        manufacturer: "idm",
        model: "navigator_2_0",
        display_name: "iDM Navigator 2.0",
        protocol: "Modbus TCP",
        default_port: DEFAULT_PORT,
        capabilities: DriverCapabilities {
            domains: &[
                Domain::Heating,
                Domain::Cooling,
                Domain::HotWater,
                Domain::Solar,
                Domain::SmartGrid,
            ],
            max_circuits: HeatingCircuit::ALL.len(),
            max_zones: usize::from(MAX_ZONES),
        },
        tables: CatalogTables {
            common,
            circuit,
            zone,
        },
        dashboard,
        adapter,
        setup_instructions: "\
**iDM Navigator 2.0 Setup**

1. Aktivieren Sie Modbus TCP im Navigator (Fachmann-Ebene, Gebäudeleittechnik).
2. Stellen Sie sicher, dass Port 502 erreichbar ist.
3. Konfigurieren Sie IP-Adresse, Heizkreise und Zonen in den Einstellungen.",
    }
}
