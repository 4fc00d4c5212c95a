//! Turn-lane descriptions: parsing `turn:lanes` strings into mask tuples
//! and interning identical tuples under dense ids.

use std::collections::HashMap;

pub type LaneDescriptionId = u16;
pub type TurnLaneMask = u16;

pub const INVALID_LANE_DESCRIPTION: LaneDescriptionId = u16::MAX;

pub mod turn_lane {
    use super::TurnLaneMask;

    pub const NONE: TurnLaneMask = 0;
    pub const STRAIGHT: TurnLaneMask = 1 << 0;
    pub const SHARP_LEFT: TurnLaneMask = 1 << 1;
    pub const LEFT: TurnLaneMask = 1 << 2;
    pub const SLIGHT_LEFT: TurnLaneMask = 1 << 3;
    pub const SLIGHT_RIGHT: TurnLaneMask = 1 << 4;
    pub const RIGHT: TurnLaneMask = 1 << 5;
    pub const SHARP_RIGHT: TurnLaneMask = 1 << 6;
    pub const UTURN: TurnLaneMask = 1 << 7;
    pub const MERGE_TO_LEFT: TurnLaneMask = 1 << 8;
    pub const MERGE_TO_RIGHT: TurnLaneMask = 1 << 9;
}

fn lane_value_mask(value: &str) -> TurnLaneMask {
    match value {
        "through" => turn_lane::STRAIGHT,
        "sharp_left" => turn_lane::SHARP_LEFT,
        "left" => turn_lane::LEFT,
        "slight_left" => turn_lane::SLIGHT_LEFT,
        "slight_right" => turn_lane::SLIGHT_RIGHT,
        "right" => turn_lane::RIGHT,
        "sharp_right" => turn_lane::SHARP_RIGHT,
        "reverse" => turn_lane::UTURN,
        "merge_to_left" => turn_lane::MERGE_TO_LEFT,
        "merge_to_right" => turn_lane::MERGE_TO_RIGHT,
        _ => turn_lane::NONE,
    }
}

/// Parse a `turn:lanes`-style string, e.g. `"left|through;right|"`, into one
/// mask per lane. Unknown values and empty lanes map to `NONE`.
pub fn parse_lane_string(s: &str) -> Vec<TurnLaneMask> {
    s.split('|')
        .map(|lane| {
            lane.split(';')
                .map(lane_value_mask)
                .fold(turn_lane::NONE, |acc, m| acc | m)
        })
        .collect()
}

/// Interning map from a lane tuple to a dense id. Assignments are stable:
/// an interned tuple keeps its id for the lifetime of the map, so ids handed
/// out before edge expansion stay valid afterwards.
#[derive(Debug, Default)]
pub struct LaneDescriptionMap {
    ids: HashMap<Vec<TurnLaneMask>, LaneDescriptionId>,
    tuples: Vec<Vec<TurnLaneMask>>,
}

impl LaneDescriptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, tuple: Vec<TurnLaneMask>) -> LaneDescriptionId {
        if let Some(&id) = self.ids.get(&tuple) {
            return id;
        }
        let id = self.tuples.len() as LaneDescriptionId;
        self.ids.insert(tuple.clone(), id);
        self.tuples.push(tuple);
        id
    }

    pub fn is_valid(&self, id: LaneDescriptionId) -> bool {
        id == INVALID_LANE_DESCRIPTION || (id as usize) < self.tuples.len()
    }

    pub fn tuple(&self, id: LaneDescriptionId) -> &[TurnLaneMask] {
        &self.tuples[id as usize]
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Flatten into a prefix-sum offset array plus the concatenated masks,
    /// ordered by id. This is the `.tls` artifact layout.
    pub fn to_arrays(&self) -> (Vec<u32>, Vec<TurnLaneMask>) {
        let mut offsets = Vec::with_capacity(self.tuples.len() + 1);
        let mut masks = Vec::new();
        offsets.push(0);
        for tuple in &self.tuples {
            masks.extend_from_slice(tuple);
            offsets.push(masks.len() as u32);
        }
        (offsets, masks)
    }
}
