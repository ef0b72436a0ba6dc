//! Value decoding and write-value coercion
//!
//! Raw words arrive as `i32`: a Modbus holding register widened from `u16`,
//! or a native Luxtronik calculation value. Decoding turns them into a
//! [`SensorValue`]; the write path runs the opposite direction, coercing a
//! loosely typed caller value and encoding it into 16-bit registers.

use crate::error::{HeatlinkError, Result};
use crate::sensor::{DataType, Member, SensorDefinition};
use serde::Serialize;
use serde_json::Value;

/// Suffix of the companion entry carrying an enum/bitfield rendering
pub const LABEL_SUFFIX: &str = "_str";

/// Decoded sensor value as handed to collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SensorValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

/// Result of decoding one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: SensorValue,
    /// Member name(s) for enum and bitfield sensors
    pub label: Option<String>,
}

/// Caller value after datatype-specific coercion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    EnumCode(u16),
}

impl WriteValue {
    fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => f64::from(u8::from(b)),
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
            Self::EnumCode(c) => f64::from(c),
        }
    }
}

/// Decode 32-bit float from two 16-bit registers (big-endian)
pub fn decode_32bit_float(words: &[i32]) -> Option<f32> {
    combine_words(words).map(f32::from_bits)
}

/// Encode 32-bit float to two 16-bit registers (big-endian)
pub fn encode_32bit_float(value: f32) -> [u16; 2] {
    split_words(value.to_bits())
}

fn combine_words(words: &[i32]) -> Option<u32> {
    match words {
        [hi, lo, ..] => Some((u32::from(*hi as u16) << 16) | u32::from(*lo as u16)),
        _ => None,
    }
}

fn split_words(bits: u32) -> [u16; 2] {
    [(bits >> 16) as u16, (bits & 0xFFFF) as u16]
}

/// Decimal places in the shortest representation of `scale`
fn scale_decimals(scale: f64) -> i32 {
    scale
        .abs()
        .to_string()
        .split_once('.')
        .map_or(0, |(_, frac)| frac.len().min(15) as i32)
}

/// `raw * scale`, with binary noise below the scale's own precision removed
fn apply_scale(raw: f64, scale: f64) -> f64 {
    let value = raw * scale;
    let decimals = scale_decimals(scale);
    if decimals == 0 {
        return value;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn scaled_number(sensor: &SensorDefinition, raw: i64) -> SensorValue {
    if (sensor.scale - 1.0).abs() < f64::EPSILON {
        SensorValue::Int(raw)
    } else {
        SensorValue::Float(apply_scale(raw as f64, sensor.scale))
    }
}

fn render_flags(members: &[Member], bits: u16) -> String {
    if bits == 0 {
        return "none".to_string();
    }
    let mut names: Vec<String> = members
        .iter()
        .filter(|m| m.code != 0 && bits & m.code == m.code)
        .map(|m| m.name.to_string())
        .collect();
    let known = members.iter().fold(0u16, |acc, m| acc | m.code);
    let unknown = bits & !known;
    if unknown != 0 {
        names.push(format!("0x{:04X}", unknown));
    }
    names.join("|")
}

/// Decode one sensor from the words starting at its address
pub fn decode(sensor: &SensorDefinition, words: &[i32]) -> Result<Decoded> {
    let needed = usize::from(sensor.size);
    if words.len() < needed || needed == 0 {
        return Err(HeatlinkError::decode(
            sensor.id.clone(),
            format!("expected {} words, got {}", needed, words.len()),
        ));
    }
    let first = words[0];

    let decoded = match sensor.datatype {
        DataType::Int16 => plain(scaled_number(sensor, i64::from(first as u16 as i16))),
        DataType::UInt16 => plain(scaled_number(sensor, i64::from(first as u16))),
        DataType::Int32 => {
            let raw = if sensor.size == 1 {
                first
            } else {
                combine_words(words).map_or(first, |bits| bits as i32)
            };
            plain(scaled_number(sensor, i64::from(raw)))
        }
        DataType::Float32 => {
            let value = decode_32bit_float(words).ok_or_else(|| {
                HeatlinkError::decode(sensor.id.as_str(), "float needs two registers")
            })?;
            if !value.is_finite() {
                return Err(HeatlinkError::decode(
                    sensor.id.clone(),
                    format!("non-finite float {}", value),
                ));
            }
            plain(SensorValue::Float(apply_scale(f64::from(value), sensor.scale)))
        }
        DataType::Bool => plain(SensorValue::Int(i64::from(first != 0))),
        DataType::Enum(members) => {
            let code = first as u16;
            let member = members.iter().find(|m| m.code == code).ok_or_else(|| {
                HeatlinkError::decode(sensor.id.clone(), format!("unknown enum code {}", code))
            })?;
            Decoded {
                value: SensorValue::Int(i64::from(code)),
                label: Some(member.name.to_string()),
            }
        }
        DataType::Bitfield(members) => {
            let bits = first as u16;
            Decoded {
                value: SensorValue::Int(i64::from(bits)),
                label: Some(render_flags(members, bits)),
            }
        }
    };
    Ok(decoded)
}

fn plain(value: SensorValue) -> Decoded {
    Decoded { value, label: None }
}

fn invalid(sensor: &SensorDefinition, message: impl Into<String>) -> HeatlinkError {
    HeatlinkError::invalid_value(sensor.id.clone(), message.into())
}

fn coerce_bool(sensor: &SensorDefinition, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Ok(false),
            Some(v) if v == 1.0 => Ok(true),
            _ => Err(invalid(sensor, "binary sensors accept only 0 or 1")),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid(
                sensor,
                "binary sensors accept only true/false, yes/no, on/off or 0/1",
            )),
        },
        _ => Err(invalid(
            sensor,
            "binary sensors accept only bool, number or string values",
        )),
    }
}

fn coerce_float(sensor: &SensorDefinition, value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(sensor, format!("expected a number, got {}", value))),
    }
}

fn coerce_int(sensor: &SensorDefinition, value: &Value) -> Result<i64> {
    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    number.ok_or_else(|| invalid(sensor, format!("expected an integer, got {}", value)))
}

fn coerce_enum(sensor: &SensorDefinition, members: &[Member], value: &Value) -> Result<u16> {
    let by_code = |code: i64| {
        members
            .iter()
            .find(|m| i64::from(m.code) == code)
            .map(|m| m.code)
            .ok_or_else(|| invalid(sensor, format!("{} is not a valid code", code)))
    };
    match value {
        Value::Number(_) => by_code(coerce_int(sensor, value)?),
        Value::String(s) => {
            let wanted = s.trim();
            if !wanted.is_empty() && wanted.chars().all(|c| c.is_ascii_digit()) {
                return by_code(coerce_int(sensor, value)?);
            }
            members
                .iter()
                .find(|m| m.name.eq_ignore_ascii_case(wanted))
                .map(|m| m.code)
                .ok_or_else(|| invalid(sensor, format!("unknown member '{}'", wanted)))
        }
        _ => Err(invalid(sensor, "expected a member name or numeric code")),
    }
}

/// Coerce a caller-supplied value to the sensor's datatype
pub fn coerce(sensor: &SensorDefinition, value: &Value) -> Result<WriteValue> {
    match sensor.datatype {
        DataType::Bool => coerce_bool(sensor, value).map(WriteValue::Bool),
        DataType::Enum(members) => coerce_enum(sensor, members, value).map(WriteValue::EnumCode),
        DataType::Float32 => coerce_float(sensor, value).map(WriteValue::Float),
        _ if (sensor.scale - 1.0).abs() > f64::EPSILON => {
            coerce_float(sensor, value).map(WriteValue::Float)
        }
        _ => coerce_int(sensor, value).map(WriteValue::Int),
    }
}

fn to_raw(sensor: &SensorDefinition, value: WriteValue, min: i64, max: i64) -> Result<i64> {
    let raw = match value {
        WriteValue::Int(v) if (sensor.scale - 1.0).abs() < f64::EPSILON => v,
        other => {
            if sensor.scale == 0.0 {
                return Err(invalid(sensor, "sensor has a zero scale"));
            }
            (other.as_f64() / sensor.scale).round() as i64
        }
    };
    if raw < min || raw > max {
        return Err(invalid(
            sensor,
            format!("{} is outside {}..={}", value.as_f64(), min, max),
        ));
    }
    Ok(raw)
}

/// Encode a coerced value into the registers written at the sensor's address
pub fn encode(sensor: &SensorDefinition, value: WriteValue) -> Result<Vec<u16>> {
    let words = match sensor.datatype {
        DataType::Bool => match value {
            WriteValue::Bool(b) => vec![u16::from(b)],
            WriteValue::Int(0) => vec![0],
            WriteValue::Int(1) => vec![1],
            _ => return Err(invalid(sensor, "expected a boolean")),
        },
        DataType::Int16 => {
            let raw = to_raw(sensor, value, i64::from(i16::MIN), i64::from(i16::MAX))?;
            vec![raw as i16 as u16]
        }
        DataType::UInt16 | DataType::Bitfield(_) => {
            let raw = to_raw(sensor, value, 0, i64::from(u16::MAX))?;
            vec![raw as u16]
        }
        DataType::Int32 => {
            if sensor.size != 2 {
                return Err(invalid(sensor, "native 32-bit cells cannot be written"));
            }
            let raw = to_raw(sensor, value, i64::from(i32::MIN), i64::from(i32::MAX))?;
            split_words(raw as i32 as u32).to_vec()
        }
        DataType::Float32 => {
            let scaled = value.as_f64() / sensor.scale;
            let single = scaled as f32;
            if !single.is_finite() || sensor.scale == 0.0 {
                return Err(invalid(sensor, format!("{} is not representable", scaled)));
            }
            encode_32bit_float(single).to_vec()
        }
        DataType::Enum(members) => {
            let code = match value {
                WriteValue::EnumCode(c) => c,
                WriteValue::Int(v) => u16::try_from(v)
                    .map_err(|_| invalid(sensor, format!("{} is not a valid code", v)))?,
                _ => return Err(invalid(sensor, "expected an enum member")),
            };
            if !members.iter().any(|m| m.code == code) {
                return Err(invalid(sensor, format!("{} is not a valid code", code)));
            }
            vec![code]
        }
    };
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static MODES: [Member; 3] = [
        Member::new(0, "off"),
        Member::new(1, "automatic"),
        Member::new(2, "eco"),
    ];

    static FLAGS: [Member; 3] = [
        Member::new(1, "heating"),
        Member::new(2, "cooling"),
        Member::new(4, "hot_water"),
    ];

    fn widen(words: &[u16]) -> Vec<i32> {
        words.iter().map(|w| i32::from(*w)).collect()
    }

    #[test]
    fn test_decode_32bit_float() {
        let result = decode_32bit_float(&[0x3F80, 0x0000]).unwrap();
        assert!((result - 1.0).abs() < f32::EPSILON);
        assert!(decode_32bit_float(&[0x3F80]).is_none());
    }

    #[test]
    fn test_encode_32bit_float() {
        assert_eq!(encode_32bit_float(1.0), [0x3F80, 0x0000]);
        assert_eq!(encode_32bit_float(2.5), [0x4020, 0x0000]);
    }

    #[test]
    fn int16_is_signed_and_scaled() {
        let s = SensorDefinition::new("t", 0, DataType::Int16).scale(0.1);
        let d = decode(&s, &[0xFFCE]).unwrap();
        assert_eq!(d.value, SensorValue::Float(-5.0));
        assert_eq!(d.label, None);
    }

    #[test]
    fn native_int32_cell_scales_exactly() {
        let s = SensorDefinition::new("temp_outside", 15, DataType::Int32)
            .size(1)
            .scale(0.1);
        assert_eq!(decode(&s, &[150]).unwrap().value, SensorValue::Float(15.0));
        assert_eq!(decode(&s, &[-25]).unwrap().value, SensorValue::Float(-2.5));
    }

    #[test]
    fn fractional_scales_keep_their_own_precision() {
        let quarter = SensorDefinition::new("q", 0, DataType::UInt16).scale(0.25);
        assert_eq!(decode(&quarter, &[1]).unwrap().value, SensorValue::Float(0.25));
        assert_eq!(decode(&quarter, &[7]).unwrap().value, SensorValue::Float(1.75));

        let fine = SensorDefinition::new("f", 0, DataType::UInt16).scale(0.025);
        assert_eq!(decode(&fine, &[3]).unwrap().value, SensorValue::Float(0.075));

        let coarse = SensorDefinition::new("c", 0, DataType::Int16).scale(2.5);
        assert_eq!(decode(&coarse, &[3]).unwrap().value, SensorValue::Float(7.5));
    }

    #[test]
    fn two_word_int32_combines_high_word_first() {
        let s = SensorDefinition::new("e", 0, DataType::Int32);
        assert_eq!(
            decode(&s, &[0x0001, 0x0002]).unwrap().value,
            SensorValue::Int(65538)
        );
        assert_eq!(
            decode(&s, &[0xFFFF, 0xFFFF]).unwrap().value,
            SensorValue::Int(-1)
        );
    }

    #[test]
    fn enum_decodes_with_label_and_rejects_unknown() {
        let s = SensorDefinition::new("mode", 0, DataType::Enum(&MODES));
        let d = decode(&s, &[1]).unwrap();
        assert_eq!(d.value, SensorValue::Int(1));
        assert_eq!(d.label.as_deref(), Some("automatic"));
        assert!(decode(&s, &[9]).is_err());
    }

    #[test]
    fn bitfield_renders_flags() {
        let s = SensorDefinition::new("status", 0, DataType::Bitfield(&FLAGS));
        assert_eq!(
            decode(&s, &[5]).unwrap().label.as_deref(),
            Some("heating|hot_water")
        );
        assert_eq!(decode(&s, &[0]).unwrap().label.as_deref(), Some("none"));
        assert_eq!(
            decode(&s, &[0x0012]).unwrap().label.as_deref(),
            Some("cooling|0x0010")
        );
    }

    #[test]
    fn short_input_is_a_decode_error() {
        let s = SensorDefinition::new("f", 0, DataType::Float32);
        let err = decode(&s, &[0x3F80]).unwrap_err();
        assert!(matches!(err, HeatlinkError::Decode { .. }));
    }

    #[test]
    fn nan_float_is_rejected() {
        let s = SensorDefinition::new("f", 0, DataType::Float32);
        let nan = encode_32bit_float(f32::NAN);
        assert!(decode(&s, &widen(&nan)).is_err());
    }

    #[test]
    fn bool_accepts_textual_forms() {
        let s = SensorDefinition::new("b", 0, DataType::Bool).writable();
        for v in [json!(true), json!(1), json!("on"), json!("YES"), json!(" True ")] {
            assert_eq!(coerce(&s, &v).unwrap(), WriteValue::Bool(true));
        }
        for v in [json!(false), json!(0), json!("off"), json!("No")] {
            assert_eq!(coerce(&s, &v).unwrap(), WriteValue::Bool(false));
        }
        assert!(coerce(&s, &json!(2)).is_err());
        assert!(coerce(&s, &json!("maybe")).is_err());
        assert!(coerce(&s, &json!(null)).is_err());
    }

    #[test]
    fn enum_accepts_name_or_code() {
        let s = SensorDefinition::new("mode", 0, DataType::Enum(&MODES)).writable();
        assert_eq!(coerce(&s, &json!("ECO")).unwrap(), WriteValue::EnumCode(2));
        assert_eq!(coerce(&s, &json!("1")).unwrap(), WriteValue::EnumCode(1));
        assert_eq!(coerce(&s, &json!(0)).unwrap(), WriteValue::EnumCode(0));
        let err = coerce(&s, &json!("turbo")).unwrap_err();
        assert!(err.to_string().contains("mode"));
        assert!(coerce(&s, &json!(7)).is_err());
    }

    #[test]
    fn scaled_int_coerces_to_float_and_encodes_raw() {
        let s = SensorDefinition::new("t", 0, DataType::Int16).scale(0.1).writable();
        let v = coerce(&s, &json!("21.5")).unwrap();
        assert_eq!(v, WriteValue::Float(21.5));
        assert_eq!(encode(&s, v).unwrap(), vec![215]);
    }

    #[test]
    fn unscaled_int_rejects_fractions_and_range() {
        let s = SensorDefinition::new("u", 0, DataType::UInt16).writable();
        assert!(coerce(&s, &json!(2.5)).is_err());
        assert_eq!(coerce(&s, &json!(2.0)).unwrap(), WriteValue::Int(2));
        assert!(encode(&s, WriteValue::Int(70_000)).is_err());
        assert!(encode(&s, WriteValue::Int(-1)).is_err());
    }

    #[test]
    fn round_trip_within_scale_precision() {
        let temp = SensorDefinition::new("t", 0, DataType::Float32).writable();
        let words = encode(&temp, coerce(&temp, &json!(48.3)).unwrap()).unwrap();
        let back = decode(&temp, &widen(&words)).unwrap().value.as_f64().unwrap();
        assert!((back - 48.3).abs() < 1e-4);

        let scaled = SensorDefinition::new("s", 0, DataType::Int16).scale(0.5).writable();
        let words = encode(&scaled, coerce(&scaled, &json!(-3.5)).unwrap()).unwrap();
        assert_eq!(
            decode(&scaled, &widen(&words)).unwrap().value,
            SensorValue::Float(-3.5)
        );

        let flag = SensorDefinition::new("b", 0, DataType::Bool).writable();
        let words = encode(&flag, coerce(&flag, &json!("on")).unwrap()).unwrap();
        assert_eq!(decode(&flag, &widen(&words)).unwrap().value, SensorValue::Int(1));

        let mode = SensorDefinition::new("m", 0, DataType::Enum(&MODES)).writable();
        let by_name = encode(&mode, coerce(&mode, &json!("eco")).unwrap()).unwrap();
        let by_code = encode(&mode, coerce(&mode, &json!(2)).unwrap()).unwrap();
        assert_eq!(by_name, by_code);
        let d = decode(&mode, &widen(&by_name)).unwrap();
        assert_eq!(d.label.as_deref(), Some("eco"));
    }

    #[test]
    fn sensor_value_serializes_untagged() {
        let v = serde_json::to_string(&vec![
            SensorValue::Int(3),
            SensorValue::Float(1.5),
            SensorValue::Text("eco".into()),
        ])
        .unwrap();
        assert_eq!(v, r#"[3,1.5,"eco"]"#);
    }
}
