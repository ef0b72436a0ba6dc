#![no_main]
use heatlink::codec::decode;
use heatlink::sensor::{DataType, Member, SensorDefinition};
use libfuzzer_sys::fuzz_target;

static FLAGS: [Member; 3] = [
    Member::new(1, "heating"),
    Member::new(2, "cooling"),
    Member::new(4, "hot_water"),
];

fuzz_target!(|data: &[u8]| {
    // Big-endian register pairs widened the way the Modbus adapter does
    let words: Vec<i32> = data
        .chunks_exact(2)
        .map(|b| i32::from(u16::from_be_bytes([b[0], b[1]])))
        .collect();

    let sensors = [
        SensorDefinition::new("f", 0, DataType::Float32).scale(0.1),
        SensorDefinition::new("i", 0, DataType::Int32),
        SensorDefinition::new("s", 0, DataType::Int16).scale(0.5),
        SensorDefinition::new("b", 0, DataType::Bitfield(&FLAGS)),
        SensorDefinition::new("e", 0, DataType::Enum(&FLAGS)),
    ];
    for sensor in &sensors {
        let _ = decode(sensor, &words);
    }
});
