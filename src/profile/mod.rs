//! The tag-interpretation collaborator contract.
//!
//! A profile turns raw entity tags into routing attributes. The extractor
//! calls it once per entity from parallel workers, so implementations must
//! either be stateless or carry their own synchronization.

use std::collections::HashMap;

use anyhow::Result;
use log::warn;

use crate::classes::{
    class_mask, is_valid_class_name, ClassData, RoadPriorityClass, MAX_CLASS_INDEX,
    MAX_EXCLUDABLE_CLASSES,
};
use crate::error::ExtractionError;
use crate::reader::{RawNode, RawWay};
use crate::relations::RelationContainer;

/// Per-node extraction result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractedNode {
    pub barrier: bool,
    pub traffic_signal: bool,
}

/// Travel mode carried into the annotation table.
pub const TRAVEL_MODE_INACCESSIBLE: u8 = 0;
pub const TRAVEL_MODE_DRIVING: u8 = 1;

/// Per-way extraction result. Speeds are km/h; a non-positive speed marks
/// the direction as not traversable.
#[derive(Debug, Clone)]
pub struct ExtractedWay {
    pub name: String,
    pub travel_mode: u8,
    pub forward_speed: f64,
    pub backward_speed: f64,
    /// Weight rate in meters per second; `None` means weight follows
    /// duration.
    pub forward_rate: Option<f64>,
    pub backward_rate: Option<f64>,
    pub priority_class: RoadPriorityClass,
    pub roundabout: bool,
    pub is_startpoint: bool,
    /// Names of declared classes this way belongs to.
    pub classes: Vec<String>,
    pub turn_lanes_forward: Option<String>,
    pub turn_lanes_backward: Option<String>,
}

impl Default for ExtractedWay {
    fn default() -> Self {
        Self {
            name: String::new(),
            travel_mode: TRAVEL_MODE_DRIVING,
            forward_speed: 0.0,
            backward_speed: 0.0,
            forward_rate: None,
            backward_rate: None,
            priority_class: RoadPriorityClass::Unclassified,
            roundabout: false,
            is_startpoint: true,
            classes: Vec::new(),
            turn_lanes_forward: None,
            turn_lanes_backward: None,
        }
    }
}

impl ExtractedWay {
    pub fn forward(&self) -> bool {
        self.forward_speed > 0.0
    }

    pub fn backward(&self) -> bool {
        self.backward_speed > 0.0
    }

    pub fn is_traversable(&self) -> bool {
        self.forward() || self.backward()
    }
}

/// Everything the profile may weigh when pricing a single turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnDescription {
    /// Deflection in degrees, (-180, 180]; 0 is straight on, positive right.
    pub angle: f64,
    pub is_u_turn: bool,
    pub has_traffic_signal: bool,
    /// The approach edge is one side of a divided carriageway.
    pub is_through_segregated: bool,
    /// Number of roads meeting at the intersection.
    pub number_of_roads: usize,
    pub source_class: RoadPriorityClass,
    pub target_class: RoadPriorityClass,
}

/// Turn penalty in deciseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnPenalty {
    pub weight: u32,
    pub duration: u32,
}

pub trait Profile: Send + Sync {
    fn name(&self) -> &str;

    /// Relation `type` values the pre-pass should keep.
    fn relation_types(&self) -> Vec<String>;

    /// Restriction tag vocabulary, e.g. `["motorcar", "vehicle"]`.
    fn restriction_vocabulary(&self) -> Vec<String>;

    /// Declared road classes; validated against `[A-Za-z0-9]+` and the
    /// class-count limit before ingestion starts.
    fn class_names(&self) -> Vec<String>;

    /// Excludable class combinations; at most `MAX_EXCLUDABLE_CLASSES`.
    fn excludable_classes(&self) -> Vec<Vec<String>>;

    /// Whether ways need resolved node locations; turns the location-cache
    /// stage on.
    fn has_location_dependent_data(&self) -> bool {
        false
    }

    fn process_node(&self, node: &RawNode) -> Result<ExtractedNode>;

    /// `None` means the way is of no routing interest.
    fn process_way(&self, way: &RawWay, relations: &RelationContainer)
        -> Result<Option<ExtractedWay>>;

    fn turn_penalty(&self, turn: &TurnDescription) -> TurnPenalty;

    fn base_properties(&self) -> ProfileProperties;
}

/// Profile-level properties written to the `.osrm.properties` artifact.
#[derive(Debug, Clone)]
pub struct ProfileProperties {
    pub weight_name: String,
    pub u_turn_penalty_ds: u32,
    pub traffic_signal_penalty_ds: u32,
    pub use_turn_restrictions: bool,
    pub left_hand_driving: bool,
    /// U-turns at dead ends stay legal even without an explicit exception.
    pub allow_u_turn_at_dead_end: bool,
    pub(crate) class_names: Vec<String>,
    pub(crate) excludable: Vec<ClassData>,
}

impl Default for ProfileProperties {
    fn default() -> Self {
        Self {
            weight_name: "duration".to_owned(),
            u_turn_penalty_ds: 0,
            traffic_signal_penalty_ds: 0,
            use_turn_restrictions: true,
            left_hand_driving: false,
            allow_u_turn_at_dead_end: true,
            class_names: Vec::new(),
            // Index 0 is reserved: nothing excluded.
            excludable: vec![0],
        }
    }
}

impl ProfileProperties {
    pub fn set_class_name(&mut self, index: usize, name: &str) {
        if self.class_names.len() <= index {
            self.class_names.resize(index + 1, String::new());
        }
        self.class_names[index] = name.to_owned();
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn push_excludable(&mut self, mask: ClassData) {
        self.excludable.push(mask);
    }

    pub fn excludable(&self) -> &[ClassData] {
        &self.excludable
    }
}

/// Interning map from class name to its single-bit mask.
pub type ClassesMap = HashMap<String, ClassData>;

/// Validate the declared class list and pre-populate the classes map, in
/// declaration order. Must run before ingestion so that way processing can
/// reject undeclared classes.
pub fn assign_class_names(
    declared: &[String],
    classes_map: &mut ClassesMap,
    properties: &mut ProfileProperties,
) -> Result<()> {
    for name in declared {
        if !is_valid_class_name(name) {
            return Err(ExtractionError::InvalidProfileDeclaration(format!(
                "invalid class name {name:?}, only [A-Za-z0-9]+ allowed"
            ))
            .into());
        }
        if !classes_map.contains_key(name) {
            let index = classes_map.len();
            if index > MAX_CLASS_INDEX {
                return Err(ExtractionError::InvalidProfileDeclaration(format!(
                    "at most {} classes are allowed",
                    MAX_CLASS_INDEX + 1
                ))
                .into());
            }
            classes_map.insert(name.clone(), class_mask(index));
        }
    }
    for name in declared {
        let mask = classes_map[name];
        properties.set_class_name(mask.trailing_zeros() as usize, name);
    }
    Ok(())
}

/// Convert the excludable name combinations to masks. Unknown names are
/// warned about and ignored; an all-unknown combination is dropped.
pub fn assign_excludable_classes(
    classes_map: &ClassesMap,
    excludable: &[Vec<String>],
    properties: &mut ProfileProperties,
) -> Result<()> {
    if excludable.len() > MAX_EXCLUDABLE_CLASSES {
        return Err(ExtractionError::InvalidProfileDeclaration(format!(
            "at most {MAX_EXCLUDABLE_CLASSES} excludable combinations are allowed"
        ))
        .into());
    }
    for combination in excludable {
        let mut mask: ClassData = 0;
        for name in combination {
            match classes_map.get(name) {
                Some(&m) => mask |= m,
                None => warn!("unknown class name {name:?} in excludable combination, ignoring"),
            }
        }
        if mask > 0 {
            properties.push_excludable(mask);
        }
    }
    Ok(())
}
