use heatlink::catalog::SensorCatalog;
use heatlink::config::CatalogConfig;
use heatlink::planner::{PlannerLimits, ReadPlan, plan_blocks};
use heatlink::registry::DriverRegistry;
use heatlink::sensor::{DataType, SensorDefinition};
use std::collections::HashSet;

fn idm_catalog() -> SensorCatalog {
    let registry = DriverRegistry::builtin();
    let driver = registry.lookup("idm", "navigator_2_0").unwrap();
    driver.build_catalog(&CatalogConfig {
        circuits: vec!["a".into(), "b".into(), "c".into(), "g".into()],
        zones: vec![0, 1, 9],
    })
}

#[test]
fn mixed_widths_with_a_wide_gap() {
    let catalog = SensorCatalog::new(vec![
        SensorDefinition::new("a", 10, DataType::UInt16),
        SensorDefinition::new("b", 11, DataType::UInt16),
        SensorDefinition::new("c", 20, DataType::UInt16),
    ]);
    let blocks = plan_blocks(&catalog, PlannerLimits::default());
    let ranges: Vec<(u32, u32)> = blocks
        .iter()
        .map(|b| (b.start_address(), b.end_address()))
        .collect();
    assert_eq!(ranges, vec![(10, 12), (20, 21)]);
}

#[test]
fn every_readable_sensor_lands_in_exactly_one_block() {
    let catalog = idm_catalog();
    let blocks = plan_blocks(&catalog, PlannerLimits::default());

    let mut seen = HashSet::new();
    for block in &blocks {
        for sensor in block.sensors() {
            assert!(seen.insert(sensor.id.clone()), "{} planned twice", sensor.id);
        }
    }
    let readable: HashSet<String> = catalog.readable().map(|s| s.id.clone()).collect();
    assert_eq!(seen, readable);
}

#[test]
fn blocks_respect_limits_and_never_cover_write_only_registers() {
    let catalog = idm_catalog();
    let forbidden = catalog.forbidden_addresses();
    let limits = PlannerLimits::default();

    for block in plan_blocks(&catalog, limits) {
        assert!(block.register_count() <= u32::from(limits.max_block_size));
        for address in block.start_address()..block.end_address() {
            assert!(
                !forbidden.contains(&address),
                "block {} covers write-only register {}",
                block.key(),
                address
            );
        }
        // Sensors sit inside their block and are address ordered
        let addresses: Vec<u16> = block.sensors().iter().map(|s| s.address).collect();
        assert!(addresses.windows(2).all(|w| w[0] <= w[1]));
        for sensor in block.sensors() {
            assert!(u32::from(sensor.address) >= block.start_address());
            assert!(sensor.end_address() <= block.end_address());
        }
    }
}

#[test]
fn consecutive_sensors_in_a_block_are_at_most_max_gap_apart() {
    let catalog = idm_catalog();
    let limits = PlannerLimits {
        max_block_size: 50,
        max_gap: 2,
    };
    for block in plan_blocks(&catalog, limits) {
        let mut end = block.start_address();
        for sensor in block.sensors() {
            let start = u32::from(sensor.address);
            assert!(start.saturating_sub(end) <= 2);
            end = end.max(sensor.end_address());
        }
    }
}

#[test]
fn smaller_block_size_gives_more_blocks() {
    let catalog = idm_catalog();
    let wide = plan_blocks(&catalog, PlannerLimits::default()).len();
    let narrow = plan_blocks(
        &catalog,
        PlannerLimits {
            max_block_size: 4,
            max_gap: 5,
        },
    )
    .len();
    assert!(narrow > wide);
}

#[test]
fn plan_follows_the_catalog_fingerprint() {
    let catalog = idm_catalog();
    let plan = ReadPlan::build(&catalog, PlannerLimits::default());
    assert!(plan.is_current_for(&catalog));
    assert_eq!(plan.sensor_count(), catalog.readable().count());

    let smaller = SensorCatalog::new(catalog.iter().skip(1).cloned());
    assert!(!plan.is_current_for(&smaller));
}
