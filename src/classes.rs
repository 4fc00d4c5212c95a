//! Road class masks and priority classes.

use serde::{Deserialize, Serialize};

/// Fixed-width bitmask over user-declared road classes.
pub type ClassData = u8;

/// Highest usable class bit index.
pub const MAX_CLASS_INDEX: usize = 7;

/// Maximum number of saved excludable-class combinations, index 0 included.
pub const MAX_EXCLUDABLE_CLASSES: usize = 8;

pub fn class_mask(index: usize) -> ClassData {
    debug_assert!(index <= MAX_CLASS_INDEX);
    1 << index
}

/// Class names come from the profile and end up in the properties artifact,
/// so they are restricted to `[A-Za-z0-9]+`.
pub fn is_valid_class_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Coarse road importance, used for turn penalties and the segregated-edge
/// length thresholds.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadPriorityClass {
    Motorway = 0,
    Trunk = 1,
    Primary = 2,
    Secondary = 3,
    Tertiary = 4,
    Residential = 5,
    Service = 6,
    LinkRoad = 7,
    Path = 8,
    Ferry = 9,
    Unclassified = 10,
}

impl RoadPriorityClass {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Motorway,
            1 => Self::Trunk,
            2 => Self::Primary,
            3 => Self::Secondary,
            4 => Self::Tertiary,
            5 => Self::Residential,
            6 => Self::Service,
            7 => Self::LinkRoad,
            8 => Self::Path,
            9 => Self::Ferry,
            _ => Self::Unclassified,
        }
    }
}
