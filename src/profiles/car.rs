//! Car profile: tag semantics for automobile routing.

use anyhow::Result;

use crate::classes::RoadPriorityClass;
use crate::profile::{
    ExtractedNode, ExtractedWay, Profile, ProfileProperties, TurnDescription, TurnPenalty,
};
use crate::reader::{RawNode, RawWay};
use crate::relations::RelationContainer;

const U_TURN_PENALTY_DS: u32 = 200;
const TRAFFIC_SIGNAL_PENALTY_DS: u32 = 20;
/// Penalty for a full 90-degree turn, in deciseconds.
const TURN_PENALTY_DS: f64 = 75.0;

pub struct CarProfile;

/// Barriers a car can pass without further ado.
fn barrier_is_passable(value: &str) -> bool {
    matches!(
        value,
        "cattle_grid"
            | "border_control"
            | "toll_booth"
            | "sally_port"
            | "gate"
            | "lift_gate"
            | "no"
            | "entrance"
            | "height_restrictor"
    )
}

fn is_denied(value: Option<&str>) -> bool {
    matches!(value, Some("no") | Some("private") | Some("agricultural") | Some("forestry"))
}

impl Profile for CarProfile {
    fn name(&self) -> &str {
        "car"
    }

    fn relation_types(&self) -> Vec<String> {
        vec!["route".to_owned()]
    }

    fn restriction_vocabulary(&self) -> Vec<String> {
        vec!["motorcar".to_owned(), "motor_vehicle".to_owned(), "vehicle".to_owned()]
    }

    fn class_names(&self) -> Vec<String> {
        vec![
            "motorway".to_owned(),
            "toll".to_owned(),
            "ferry".to_owned(),
            "restricted".to_owned(),
        ]
    }

    fn excludable_classes(&self) -> Vec<Vec<String>> {
        vec![vec!["toll".to_owned()], vec!["ferry".to_owned()]]
    }

    fn process_node(&self, node: &RawNode) -> Result<ExtractedNode> {
        let mut result = ExtractedNode::default();
        if let Some(barrier) = node.tags.get("barrier") {
            let access_overrides = node
                .tags
                .get("access")
                .map(|v| matches!(v, "yes" | "permissive" | "designated"))
                .unwrap_or(false);
            result.barrier = !barrier_is_passable(barrier) && !access_overrides;
        }
        if node.tags.get("highway") == Some("traffic_signals") {
            result.traffic_signal = true;
        }
        Ok(result)
    }

    fn process_way(
        &self,
        way: &RawWay,
        _relations: &RelationContainer,
    ) -> Result<Option<ExtractedWay>> {
        let tags = &way.tags;
        let is_ferry = tags.get("route") == Some("ferry");

        let highway = match tags.get("highway") {
            Some(h) => h,
            None if is_ferry => "ferry",
            None => return Ok(None),
        };

        let (speed_kmh, class) = match highway {
            "motorway" => (110.0, RoadPriorityClass::Motorway),
            "motorway_link" => (60.0, RoadPriorityClass::LinkRoad),
            "trunk" => (90.0, RoadPriorityClass::Trunk),
            "trunk_link" => (50.0, RoadPriorityClass::LinkRoad),
            "primary" => (70.0, RoadPriorityClass::Primary),
            "primary_link" => (40.0, RoadPriorityClass::LinkRoad),
            "secondary" => (60.0, RoadPriorityClass::Secondary),
            "secondary_link" => (40.0, RoadPriorityClass::LinkRoad),
            "tertiary" => (50.0, RoadPriorityClass::Tertiary),
            "tertiary_link" => (30.0, RoadPriorityClass::LinkRoad),
            "unclassified" => (50.0, RoadPriorityClass::Unclassified),
            "residential" => (30.0, RoadPriorityClass::Residential),
            "living_street" => (10.0, RoadPriorityClass::Residential),
            "service" => (20.0, RoadPriorityClass::Service),
            "ferry" => (10.0, RoadPriorityClass::Ferry),
            _ => return Ok(None),
        };

        if is_denied(tags.get("motor_vehicle"))
            || is_denied(tags.get("vehicle"))
            || is_denied(tags.get("access"))
        {
            return Ok(None);
        }

        let mut result = ExtractedWay {
            forward_speed: speed_kmh,
            backward_speed: speed_kmh,
            priority_class: class,
            ..ExtractedWay::default()
        };

        if let Some(speed) = tags.get("maxspeed").and_then(|v| v.parse::<f64>().ok()) {
            if speed > 0.0 {
                result.forward_speed = speed;
                result.backward_speed = speed;
            }
        }

        result.roundabout = tags.get("junction") == Some("roundabout");

        match tags.get("oneway") {
            Some("yes") | Some("1") | Some("true") => result.backward_speed = 0.0,
            Some("-1") | Some("reverse") => result.forward_speed = 0.0,
            Some("no") | Some("0") | Some("false") => {}
            _ => {
                // Motorways and roundabouts are oneway unless tagged otherwise.
                if highway == "motorway" || result.roundabout {
                    result.backward_speed = 0.0;
                }
            }
        }

        if let Some(name) = tags.get("name").or_else(|| tags.get("ref")) {
            result.name = name.to_owned();
        }

        if highway == "motorway" || highway == "motorway_link" {
            result.classes.push("motorway".to_owned());
        }
        if tags.get("toll") == Some("yes") {
            result.classes.push("toll".to_owned());
        }
        if is_ferry {
            result.classes.push("ferry".to_owned());
            result.is_startpoint = false;
        }
        if tags.get("access") == Some("destination") {
            result.classes.push("restricted".to_owned());
        }

        result.turn_lanes_forward = tags
            .get("turn:lanes:forward")
            .or_else(|| tags.get("turn:lanes"))
            .map(str::to_owned);
        result.turn_lanes_backward = tags.get("turn:lanes:backward").map(str::to_owned);

        if !result.is_traversable() {
            return Ok(None);
        }
        Ok(Some(result))
    }

    fn turn_penalty(&self, turn: &TurnDescription) -> TurnPenalty {
        let mut duration = 0.0;
        if turn.is_u_turn {
            duration += U_TURN_PENALTY_DS as f64;
        } else {
            // Quadratic in the deflection: shallow turns are nearly free.
            let mut sharpness = (turn.angle.abs() / 90.0).powi(2) * TURN_PENALTY_DS;
            if turn.is_through_segregated {
                // One side of a divided carriageway; the apparent sharp turn
                // is really half of a normal crossing.
                sharpness *= 0.5;
            }
            duration += sharpness;
        }
        if turn.has_traffic_signal {
            duration += TRAFFIC_SIGNAL_PENALTY_DS as f64;
        }
        let duration = duration.round() as u32;
        TurnPenalty {
            weight: duration,
            duration,
        }
    }

    fn base_properties(&self) -> ProfileProperties {
        ProfileProperties {
            weight_name: "duration".to_owned(),
            u_turn_penalty_ds: U_TURN_PENALTY_DS,
            traffic_signal_penalty_ds: TRAFFIC_SIGNAL_PENALTY_DS,
            ..ProfileProperties::default()
        }
    }
}
