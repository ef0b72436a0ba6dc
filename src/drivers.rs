//! Built-in controller drivers

pub mod idm;
pub mod luxtronik;

use crate::registry::DriverDescriptor;

/// Every driver shipped with the crate
pub fn builtin() -> Vec<DriverDescriptor> {
    vec![idm::descriptor(), luxtronik::descriptor()]
}
