//! Sensor definitions: one addressable point on the controller
//!
//! A definition says where a value lives (`address`, `size` in words), how
//! to interpret the words (`datatype`, `scale`) and what the device allows
//! (`access`, `read_supported`). Definitions are immutable once a catalog is
//! built from them.

use std::fmt;

/// Named member of an enumerated or bitfield register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Member {
    pub code: u16,
    pub name: &'static str,
}

impl Member {
    pub const fn new(code: u16, name: &'static str) -> Self {
        Self { code, name }
    }
}

/// Wire interpretation of a sensor's words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int16,
    UInt16,
    /// Two 16-bit registers (high word first), or one native 32-bit cell
    Int32,
    /// IEEE-754 single precision over two registers, high word first
    Float32,
    Bool,
    /// Code table; `code` is the raw register value
    Enum(&'static [Member]),
    /// Flag table; `code` is the bit mask of each flag
    Bitfield(&'static [Member]),
}

impl DataType {
    /// Number of 16-bit registers the type occupies on a register protocol
    pub const fn register_count(&self) -> u16 {
        match self {
            Self::Int32 | Self::Float32 => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Bool => "bool",
            Self::Enum(_) => "enum",
            Self::Bitfield(_) => "bitfield",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorDefinition {
    /// Unique name, also the key in poll output
    pub id: String,
    /// Human readable label for dashboards
    pub label: String,
    pub unit: &'static str,
    pub address: u16,
    /// Words occupied starting at `address`
    pub size: u16,
    pub datatype: DataType,
    pub access: AccessMode,
    /// Applied to the raw numeric value after decoding
    pub scale: f64,
    /// Some registers answer writes but fault on reads; never bulk-read those
    pub read_supported: bool,
}

impl SensorDefinition {
    pub fn new(id: impl Into<String>, address: u16, datatype: DataType) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            unit: "",
            address,
            size: datatype.register_count(),
            datatype,
            access: AccessMode::ReadOnly,
            scale: 1.0,
            read_supported: true,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn size(mut self, size: u16) -> Self {
        self.size = size;
        self
    }

    pub fn writable(mut self) -> Self {
        self.access = AccessMode::ReadWrite;
        self
    }

    /// Writable register that must never be read
    pub fn write_only(mut self) -> Self {
        self.access = AccessMode::ReadWrite;
        self.read_supported = false;
        self
    }

    pub fn is_writable(&self) -> bool {
        self.access == AccessMode::ReadWrite
    }

    /// One past the last word this sensor occupies
    pub fn end_address(&self) -> u32 {
        u32::from(self.address) + u32::from(self.size)
    }

    /// Every word address this sensor occupies
    pub fn addresses(&self) -> std::ops::Range<u32> {
        u32::from(self.address)..self.end_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static MODES: [Member; 2] = [Member::new(0, "off"), Member::new(1, "on")];

    #[test]
    fn size_follows_datatype() {
        assert_eq!(SensorDefinition::new("a", 10, DataType::Float32).size, 2);
        assert_eq!(SensorDefinition::new("b", 10, DataType::Int16).size, 1);
        assert_eq!(SensorDefinition::new("c", 10, DataType::Enum(&MODES)).size, 1);
        assert_eq!(
            SensorDefinition::new("d", 10, DataType::Int32).size(1).size,
            1
        );
    }

    #[test]
    fn write_only_is_writable_but_not_readable() {
        let s = SensorDefinition::new("pv", 74, DataType::Float32).write_only();
        assert!(s.is_writable());
        assert!(!s.read_supported);
        assert_eq!(s.addresses().collect::<Vec<_>>(), vec![74, 75]);
    }
}
