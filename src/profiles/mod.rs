//! Compiled-in profiles.

mod car;

pub use car::CarProfile;

use crate::profile::Profile;

/// Look up a compiled-in profile by name.
pub fn by_name(name: &str) -> Option<Box<dyn Profile>> {
    match name {
        "car" => Some(Box::new(CarProfile)),
        _ => None,
    }
}
