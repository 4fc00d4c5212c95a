//! Edge-expanded graph construction.
//!
//! Every directed traversable half of a node-based edge becomes an
//! edge-based node; every legal movement between two of them becomes an
//! edge-based edge carrying the approach weight plus a profile-priced turn
//! penalty.

pub mod intersection;
pub mod way_restrictions;

use std::collections::HashSet;

use anyhow::Result;

use crate::geo;
use crate::lanes::{turn_lane, LaneDescriptionId, LaneDescriptionMap, TurnLaneMask, INVALID_LANE_DESCRIPTION};
use crate::nbg::NodeBasedGraphFactory;
use crate::profile::{Profile, ProfileProperties, TurnDescription, TurnPenalty};
use crate::restrictions::{NodeRestrictionMap, RestrictionKind, TurnRestriction};
use crate::{AnnotationId, EdgeId, NodeId};
use self::intersection::{BearingClassId, EntryClassId, EntryMask, IntersectionClassRegistry};
use self::way_restrictions::WayRestrictionMap;

pub const INVALID_EBN: u32 = u32::MAX;

/// One directed segment of the node-based graph, promoted to a node.
#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedNode {
    /// The directed node-based edge this node represents.
    pub nbg_edge: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub geometry_id: u32,
    pub toward_target: bool,
    pub annotation_id: AnnotationId,
    pub weight: u32,
    pub duration: u32,
    /// Constrained copy created for a way restriction; kept out of the
    /// spatial index.
    pub is_duplicate: bool,
}

/// A legal turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeBasedEdge {
    pub source: u32,
    pub target: u32,
    pub weight: u32,
    pub duration: u32,
    pub forward: bool,
    pub backward: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentId {
    pub id: u32,
    pub enabled: bool,
}

/// Geometry-bearing record for the spatial index: one per sub-segment of
/// every compressed edge with at least one traversable half.
#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedNodeSegment {
    pub forward_segment_id: SegmentId,
    pub reverse_segment_id: SegmentId,
    pub u: NodeId,
    pub v: NodeId,
    pub fwd_position: u16,
}

/// Conditional restrictions survive expansion as data for the query engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalRestrictionRecord {
    pub is_only: bool,
    pub from: NodeId,
    pub via: Vec<NodeId>,
    pub to: NodeId,
    pub condition: String,
}

pub struct EdgeExpandedGraph {
    pub nodes: Vec<EdgeBasedNode>,
    pub edges: Vec<EdgeBasedEdge>,
    pub segments: Vec<EdgeBasedNodeSegment>,
    /// Parallel to `segments`.
    pub node_is_startpoint: Vec<bool>,
    /// Parallel to `nodes`.
    pub node_weights: Vec<u32>,
    /// Parallel to `edges`: the pure turn cost and the (from, via, to)
    /// node triple behind each edge.
    pub turn_penalties: Vec<TurnPenalty>,
    pub turn_index: Vec<(NodeId, NodeId, NodeId)>,
    /// Parallel to `edges`: lane tuple constraining the turn, if any.
    pub turn_lane_ids: Vec<LaneDescriptionId>,
    pub conditional_restrictions: Vec<ConditionalRestrictionRecord>,
    pub registry: IntersectionClassRegistry,
    /// Parallel to `nodes`: interned intersection classification of the
    /// node's head intersection.
    pub node_classes: Vec<(BearingClassId, EntryClassId)>,
}

impl EdgeExpandedGraph {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Lane mask matching a turn's rough direction.
fn direction_mask(angle: f64, is_u_turn: bool) -> TurnLaneMask {
    if is_u_turn {
        return turn_lane::UTURN;
    }
    let magnitude = angle.abs();
    if magnitude <= 10.0 {
        turn_lane::STRAIGHT
    } else if angle > 0.0 {
        if magnitude <= 45.0 {
            turn_lane::SLIGHT_RIGHT
        } else if magnitude <= 135.0 {
            turn_lane::RIGHT
        } else {
            turn_lane::SHARP_RIGHT
        }
    } else if magnitude <= 45.0 {
        turn_lane::SLIGHT_LEFT
    } else if magnitude <= 135.0 {
        turn_lane::LEFT
    } else {
        turn_lane::SHARP_LEFT
    }
}

/// Lane tuple for one turn: the approach lanes whose masks admit the turn
/// direction. New tuples discovered here are added to the map; existing ids
/// stay stable.
fn turn_lane_for(
    approach: LaneDescriptionId,
    angle: f64,
    is_u_turn: bool,
    lane_map: &mut LaneDescriptionMap,
) -> LaneDescriptionId {
    if approach == INVALID_LANE_DESCRIPTION {
        return INVALID_LANE_DESCRIPTION;
    }
    let mask = direction_mask(angle, is_u_turn);
    let tuple: Vec<TurnLaneMask> = lane_map.tuple(approach).to_vec();
    let subset: Vec<TurnLaneMask> =
        tuple.iter().copied().filter(|&lane| lane & mask != 0).collect();
    if subset.is_empty() || subset.len() == tuple.len() {
        approach
    } else {
        lane_map.intern(subset)
    }
}

pub fn build_edge_expanded_graph(
    factory: &mut NodeBasedGraphFactory,
    turn_restrictions: &[TurnRestriction],
    conditional_restrictions: &[TurnRestriction],
    segregated_edges: &HashSet<EdgeId>,
    profile: &dyn Profile,
    properties: &ProfileProperties,
) -> Result<EdgeExpandedGraph> {
    let mut lane_map = std::mem::take(&mut factory.lane_map);
    let result = expand(
        factory,
        turn_restrictions,
        conditional_restrictions,
        segregated_edges,
        profile,
        properties,
        &mut lane_map,
    );
    factory.lane_map = lane_map;
    result
}

#[allow(clippy::too_many_arguments)]
fn expand(
    factory: &NodeBasedGraphFactory,
    turn_restrictions: &[TurnRestriction],
    conditional_restrictions: &[TurnRestriction],
    segregated_edges: &HashSet<EdgeId>,
    profile: &dyn Profile,
    properties: &ProfileProperties,
    lane_map: &mut LaneDescriptionMap,
) -> Result<EdgeExpandedGraph> {
    let graph = &factory.graph;
    let coordinates = &factory.coordinates;
    let num_nbg_nodes = graph.num_nodes();
    let num_nbg_edges = graph.num_edges();
    let num_geometries = factory.compressed.num_edges();

    // 1. One edge-based node per directed traversable half.
    let mut ebn_of_edge = vec![INVALID_EBN; num_nbg_edges];
    let mut geometry_entries: Vec<[Option<EdgeId>; 2]> = vec![[None, None]; num_geometries];
    let mut nodes: Vec<EdgeBasedNode> = Vec::new();
    for edge_id in 0..num_nbg_edges as EdgeId {
        let edge = graph.edge(edge_id);
        let slot = if edge.data.toward_target { 0 } else { 1 };
        geometry_entries[edge.data.geometry_id as usize][slot] = Some(edge_id);
        if !edge.data.reversed {
            ebn_of_edge[edge_id as usize] = nodes.len() as u32;
            nodes.push(EdgeBasedNode {
                nbg_edge: edge_id,
                source: edge.source,
                target: edge.target,
                geometry_id: edge.data.geometry_id,
                toward_target: edge.data.toward_target,
                annotation_id: edge.data.annotation_id,
                weight: edge.data.weight,
                duration: edge.data.duration,
                is_duplicate: false,
            });
        }
    }

    // 2. Constrained duplicates for way restrictions.
    let mut way_map = WayRestrictionMap::new(turn_restrictions, graph);
    for copied_edge in way_map.allocate_duplicates(nodes.len() as u32) {
        let edge = graph.edge(copied_edge);
        nodes.push(EdgeBasedNode {
            nbg_edge: copied_edge,
            source: edge.source,
            target: edge.target,
            geometry_id: edge.data.geometry_id,
            toward_target: edge.data.toward_target,
            annotation_id: edge.data.annotation_id,
            weight: edge.data.weight,
            duration: edge.data.duration,
            is_duplicate: true,
        });
    }
    let way_map = way_map;

    // 3. Segments for the spatial index; each records both directions of
    //    its undirected sub-segment.
    let ebn_of_entry = |entry: Option<EdgeId>| -> Option<u32> {
        entry
            .filter(|&id| !graph.edge(id).data.reversed)
            .map(|id| ebn_of_edge[id as usize])
    };
    let mut segments = Vec::new();
    let mut node_is_startpoint = Vec::new();
    for g in 0..num_geometries as u32 {
        let fwd = ebn_of_entry(geometry_entries[g as usize][0]);
        let rev = ebn_of_entry(geometry_entries[g as usize][1]);
        if fwd.is_none() && rev.is_none() {
            continue;
        }
        let geometry = factory.compressed.geometry(g);
        for i in 0..geometry.len() - 1 {
            segments.push(EdgeBasedNodeSegment {
                forward_segment_id: SegmentId {
                    id: fwd.unwrap_or(INVALID_EBN),
                    enabled: fwd.is_some(),
                },
                reverse_segment_id: SegmentId {
                    id: rev.unwrap_or(INVALID_EBN),
                    enabled: rev.is_some(),
                },
                u: geometry[i],
                v: geometry[i + 1],
                fwd_position: i as u16,
            });
            node_is_startpoint.push(factory.compressed.is_startpoint(g));
        }
    }

    // 4. Incoming adjacency and intersection bearings.
    let mut incoming: Vec<Vec<EdgeId>> = vec![Vec::new(); num_nbg_nodes];
    for edge_id in 0..num_nbg_edges as EdgeId {
        let edge = graph.edge(edge_id);
        if !edge.data.reversed {
            incoming[edge.target as usize].push(edge_id);
        }
    }

    // Bearing away from `v` along a directed edge starting there.
    let exit_bearing = |v: NodeId, edge_id: EdgeId| -> f64 {
        let edge = graph.edge(edge_id);
        let geometry = factory.compressed.geometry(edge.data.geometry_id);
        let (from, to) = if edge.data.toward_target {
            (geometry[0], geometry[1])
        } else {
            (geometry[geometry.len() - 1], geometry[geometry.len() - 2])
        };
        debug_assert_eq!(from, v);
        geo::bearing(coordinates[from as usize], coordinates[to as usize])
    };
    // Bearing of the last sub-segment of a directed edge ending at `v`.
    let entry_bearing = |edge_id: EdgeId| -> f64 {
        let edge = graph.edge(edge_id);
        let geometry = factory.compressed.geometry(edge.data.geometry_id);
        let (from, to) = if edge.data.toward_target {
            (geometry[geometry.len() - 2], geometry[geometry.len() - 1])
        } else {
            (geometry[1], geometry[0])
        };
        geo::bearing(coordinates[from as usize], coordinates[to as usize])
    };

    let mut registry = IntersectionClassRegistry::new();
    let empty_entry = registry.intern_entry(0);
    let mut node_bearings: Vec<(Vec<u16>, BearingClassId)> = Vec::with_capacity(num_nbg_nodes);
    for v in 0..num_nbg_nodes as NodeId {
        let mut bins: Vec<u16> = graph
            .edges_of(v)
            .map(|(id, _)| geo::discretize_bearing(exit_bearing(v, id)))
            .collect();
        bins.sort_unstable();
        bins.dedup();
        let id = registry.intern_bearings(bins.clone());
        node_bearings.push((bins, id));
    }

    let mut node_classes: Vec<(BearingClassId, EntryClassId)> = nodes
        .iter()
        .map(|node| (node_bearings[node.target as usize].1, empty_entry))
        .collect();

    let restriction_map = NodeRestrictionMap::new(turn_restrictions);

    // 5. Turn enumeration.
    let mut edges: Vec<EdgeBasedEdge> = Vec::new();
    let mut turn_penalties: Vec<TurnPenalty> = Vec::new();
    let mut turn_index: Vec<(NodeId, NodeId, NodeId)> = Vec::new();
    let mut turn_lane_ids: Vec<LaneDescriptionId> = Vec::new();

    for v in 0..num_nbg_nodes as NodeId {
        let outgoing: Vec<EdgeId> = graph
            .edges_of(v)
            .filter(|(_, e)| !e.data.reversed)
            .map(|(id, _)| id)
            .collect();
        if outgoing.is_empty() {
            continue;
        }
        let is_barrier = factory.barriers.contains(&v);
        let has_signal = factory.traffic_signals.contains(&v);
        let number_of_roads = graph.degree(v);
        let bins = &node_bearings[v as usize].0;

        for &a_id in &incoming[v as usize] {
            let a = graph.edge(a_id);
            let u = a.source;
            let source_ebn = ebn_of_edge[a_id as usize];
            let in_bearing = entry_bearing(a_id);
            let mut entry_mask: EntryMask = 0;

            for &b_id in &outgoing {
                let b = graph.edge(b_id);
                let w = b.target;
                let is_twin = b.data.geometry_id == a.data.geometry_id
                    && b.data.toward_target != a.data.toward_target;
                let is_u_turn = w == u;

                if is_barrier {
                    // A barrier blocks throughput; only turning back is
                    // possible.
                    if !is_twin {
                        continue;
                    }
                } else if is_u_turn
                    && !(properties.allow_u_turn_at_dead_end && outgoing.len() == 1)
                {
                    continue;
                }
                if restriction_map.is_forbidden(u, v, w) {
                    continue;
                }
                if let Some(required) = way_map.only_exit(u, v) {
                    if w != required {
                        continue;
                    }
                }

                let target_ebn = way_map
                    .start_duplicate(u, v, w)
                    .unwrap_or(ebn_of_edge[b_id as usize]);

                let angle = geo::turn_angle(in_bearing, exit_bearing(v, b_id));
                let turn = TurnDescription {
                    angle,
                    is_u_turn,
                    has_traffic_signal: has_signal,
                    is_through_segregated: segregated_edges.contains(&a_id),
                    number_of_roads,
                    source_class: a.data.priority_class,
                    target_class: b.data.priority_class,
                };
                let penalty = profile.turn_penalty(&turn);

                let bin = geo::discretize_bearing(exit_bearing(v, b_id));
                if let Ok(position) = bins.binary_search(&bin) {
                    entry_mask |= 1 << position.min(31);
                }

                edges.push(EdgeBasedEdge {
                    source: source_ebn,
                    target: target_ebn,
                    weight: nodes[source_ebn as usize].weight + penalty.weight,
                    duration: nodes[source_ebn as usize].duration + penalty.duration,
                    forward: true,
                    backward: false,
                });
                turn_penalties.push(penalty);
                turn_index.push((u, v, w));
                turn_lane_ids.push(turn_lane_for(
                    a.data.lane_description_id,
                    angle,
                    is_u_turn,
                    lane_map,
                ));
            }
            node_classes[source_ebn as usize] =
                (node_bearings[v as usize].1, registry.intern_entry(entry_mask));
        }
    }

    // 6. Turns leaving the constrained duplicates.
    for restriction in way_map.restrictions() {
        for (position, &via_edge) in restriction.via_edges.iter().enumerate() {
            let source_ebn = restriction.duplicates[position];
            let a = graph.edge(via_edge);
            let u = a.source;
            let v = a.target;
            let at_chain_end = position + 1 == restriction.via_edges.len();
            let in_bearing = entry_bearing(via_edge);
            let is_barrier = factory.barriers.contains(&v);
            let has_signal = factory.traffic_signals.contains(&v);
            let number_of_roads = graph.degree(v);
            let bins = &node_bearings[v as usize].0;
            let mut entry_mask: EntryMask = 0;

            let outgoing: Vec<EdgeId> = graph
                .edges_of(v)
                .filter(|(_, e)| !e.data.reversed)
                .map(|(id, _)| id)
                .collect();
            for &b_id in &outgoing {
                let b = graph.edge(b_id);
                let w = b.target;
                let is_twin = b.data.geometry_id == a.data.geometry_id
                    && b.data.toward_target != a.data.toward_target;
                let is_u_turn = w == u;

                if is_barrier {
                    if !is_twin {
                        continue;
                    }
                } else if is_u_turn
                    && !(properties.allow_u_turn_at_dead_end && outgoing.len() == 1)
                {
                    continue;
                }
                if restriction_map.is_forbidden(u, v, w) {
                    continue;
                }

                let continues_chain = !at_chain_end && b_id == restriction.via_edges[position + 1];
                let target_ebn = if continues_chain {
                    restriction.duplicates[position + 1]
                } else if restriction.is_only {
                    // The designated path is the only way through.
                    if !at_chain_end || w != restriction.to {
                        continue;
                    }
                    ebn_of_edge[b_id as usize]
                } else {
                    // The completed forbidden path is the one banned move.
                    if at_chain_end && w == restriction.to {
                        continue;
                    }
                    ebn_of_edge[b_id as usize]
                };

                let angle = geo::turn_angle(in_bearing, exit_bearing(v, b_id));
                let turn = TurnDescription {
                    angle,
                    is_u_turn,
                    has_traffic_signal: has_signal,
                    is_through_segregated: segregated_edges.contains(&via_edge),
                    number_of_roads,
                    source_class: a.data.priority_class,
                    target_class: b.data.priority_class,
                };
                let penalty = profile.turn_penalty(&turn);

                let bin = geo::discretize_bearing(exit_bearing(v, b_id));
                if let Ok(found) = bins.binary_search(&bin) {
                    entry_mask |= 1 << found.min(31);
                }

                edges.push(EdgeBasedEdge {
                    source: source_ebn,
                    target: target_ebn,
                    weight: nodes[source_ebn as usize].weight + penalty.weight,
                    duration: nodes[source_ebn as usize].duration + penalty.duration,
                    forward: true,
                    backward: false,
                });
                turn_penalties.push(penalty);
                turn_index.push((u, v, w));
                turn_lane_ids.push(turn_lane_for(
                    a.data.lane_description_id,
                    angle,
                    is_u_turn,
                    lane_map,
                ));
            }
            node_classes[source_ebn as usize] =
                (node_bearings[v as usize].1, registry.intern_entry(entry_mask));
        }
    }

    debug_assert!(edges
        .iter()
        .all(|e| (e.source as usize) < nodes.len() && (e.target as usize) < nodes.len()));

    // 7. Conditional restrictions survive into the sidecar.
    let conditional_restrictions = conditional_restrictions
        .iter()
        .map(|restriction| {
            let (from, via, to) = match &restriction.kind {
                RestrictionKind::Node(node) => (node.from, vec![node.via], node.to),
                RestrictionKind::Way(way) => (way.from, way.via.clone(), way.to),
            };
            ConditionalRestrictionRecord {
                is_only: restriction.is_only,
                from,
                via,
                to,
                condition: restriction.condition.clone().unwrap_or_default(),
            }
        })
        .collect();

    let node_weights = nodes.iter().map(|node| node.weight).collect();

    Ok(EdgeExpandedGraph {
        nodes,
        edges,
        segments,
        node_is_startpoint,
        node_weights,
        turn_penalties,
        turn_index,
        turn_lane_ids,
        conditional_restrictions,
        registry,
        node_classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::CarProfile;
    use crate::restrictions::{remove_invalid_restrictions, NodeRestriction, WayRestriction};
    use crate::segregated::find_segregated_edges;
    use crate::test_support::{bidirectional, NetworkBuilder};

    fn expand_network(
        mut factory: NodeBasedGraphFactory,
        restrictions: Vec<TurnRestriction>,
        conditionals: Vec<TurnRestriction>,
    ) -> EdgeExpandedGraph {
        let profile = CarProfile;
        let properties = profile.base_properties();
        let segregated = find_segregated_edges(&factory);
        let restrictions = remove_invalid_restrictions(restrictions, &factory.graph);
        let conditionals = remove_invalid_restrictions(conditionals, &factory.graph);
        build_edge_expanded_graph(
            &mut factory,
            &restrictions,
            &conditionals,
            &segregated,
            &profile,
            &properties,
        )
        .unwrap()
    }

    fn t_intersection() -> NodeBasedGraphFactory {
        let mut b = NetworkBuilder::new();
        b.node(1, 0.0, 0.0)
            .node(2, 0.001, 0.0)
            .node(3, 0.001, 0.001)
            .way(1, &[1, 2], bidirectional("Main"))
            .way(2, &[2, 3], bidirectional("Side"));
        b.factory()
    }

    #[test]
    fn two_node_way_yields_two_nodes_and_dead_end_u_turns() {
        let mut b = NetworkBuilder::new();
        b.node(1, 0.0, 0.0)
            .node(2, 0.001, 0.0)
            .way(1, &[1, 2], bidirectional("Main"));
        let ebg = expand_network(b.factory(), vec![], vec![]);
        assert_eq!(ebg.num_nodes(), 2);
        // the only moves are turning around at either dead end
        assert_eq!(ebg.edges.len(), 2);
        assert!(ebg.turn_index.contains(&(0, 1, 0)));
        assert!(ebg.turn_index.contains(&(1, 0, 1)));
        assert_eq!(ebg.segments.len(), 1);
        assert!(ebg.segments[0].forward_segment_id.enabled);
        assert!(ebg.segments[0].reverse_segment_id.enabled);
        assert_eq!(ebg.node_is_startpoint, vec![true]);
    }

    #[test]
    fn t_intersection_has_four_turns() {
        let ebg = expand_network(t_intersection(), vec![], vec![]);
        // 2 bidirectional ways = 4 edge-based nodes
        assert_eq!(ebg.num_nodes(), 4);
        // Main<->Side at the junction (u-turns excluded there), plus one
        // turn-around at each dead end
        assert_eq!(ebg.edges.len(), 4);
        assert!(ebg.turn_index.contains(&(0, 1, 2)));
        assert!(ebg.turn_index.contains(&(2, 1, 0)));
        assert!(!ebg.turn_index.contains(&(0, 1, 0)));
        for edge in &ebg.edges {
            assert!((edge.source as usize) < ebg.num_nodes());
            assert!((edge.target as usize) < ebg.num_nodes());
            assert!(edge.weight >= 1);
        }
        assert_eq!(ebg.turn_penalties.len(), 4);
        assert_eq!(ebg.turn_index.len(), 4);
    }

    #[test]
    fn node_restriction_removes_exactly_one_turn() {
        let unrestricted = expand_network(t_intersection(), vec![], vec![]);
        // forbid the turn Main(1->2) onto Side(2->3); dense ids 0,1,2
        let restriction = TurnRestriction {
            kind: RestrictionKind::Node(NodeRestriction { from: 0, via: 1, to: 2 }),
            is_only: false,
            condition: None,
        };
        let restricted = expand_network(t_intersection(), vec![restriction], vec![]);
        assert_eq!(restricted.edges.len(), unrestricted.edges.len() - 1);
        assert!(!restricted.turn_index.contains(&(0, 1, 2)));
        assert!(restricted.turn_index.contains(&(2, 1, 0)));
    }

    #[test]
    fn conditional_restriction_keeps_the_turn_and_the_condition() {
        let restriction = TurnRestriction {
            kind: RestrictionKind::Node(NodeRestriction { from: 0, via: 1, to: 2 }),
            is_only: false,
            condition: Some("(Mo-Fr 07:00-19:00)".to_owned()),
        };
        let ebg = expand_network(t_intersection(), vec![], vec![restriction]);
        // the turn stays in the graph
        assert!(ebg.turn_index.contains(&(0, 1, 2)));
        assert_eq!(ebg.conditional_restrictions.len(), 1);
        assert_eq!(ebg.conditional_restrictions[0].condition, "(Mo-Fr 07:00-19:00)");
    }

    #[test]
    fn dead_end_allows_a_u_turn() {
        let mut b = NetworkBuilder::new();
        b.node(1, 0.0, 0.0)
            .node(2, 0.001, 0.0)
            .node(3, 0.002, 0.0)
            .way(1, &[1, 2], bidirectional("Main"))
            .way(2, &[2, 3], bidirectional("Stub"));
        let ebg = expand_network(b.factory(), vec![], vec![]);
        // at the dead end (dense node 2) the only move is turning back
        assert!(ebg.turn_index.contains(&(1, 2, 1)));
    }

    #[test]
    fn barriers_allow_only_turning_back() {
        let mut b = NetworkBuilder::new();
        b.node(1, 0.0, 0.0)
            .barrier(2, 0.001, 0.0)
            .node(3, 0.002, 0.0)
            .way(1, &[1, 2, 3], bidirectional("Gated"));
        let ebg = expand_network(b.factory(), vec![], vec![]);
        // the way splits at the barrier into two edges; through movement is
        // blocked, turning back is kept
        assert!(!ebg.turn_index.contains(&(0, 1, 2)));
        assert!(!ebg.turn_index.contains(&(2, 1, 0)));
        assert!(ebg.turn_index.contains(&(0, 1, 0)));
        assert!(ebg.turn_index.contains(&(2, 1, 2)));
    }

    fn corridor_with_escape() -> NodeBasedGraphFactory {
        let mut b = NetworkBuilder::new();
        b.node(1, 0.0, 0.0)
            .node(2, 0.001, 0.0)
            .node(3, 0.002, 0.0)
            .node(4, 0.003, 0.0)
            .node(5, 0.002, 0.001)
            .node(6, 0.001, -0.001)
            .way(10, &[1, 2], bidirectional("From"))
            .way(20, &[2, 3], bidirectional("Via"))
            .way(30, &[3, 4], bidirectional("To"))
            .way(40, &[3, 5], bidirectional("Escape"))
            .way(50, &[6, 2], bidirectional("Other"));
        b.factory()
    }

    #[test]
    fn way_restriction_duplicates_the_via_path() {
        let factory = corridor_with_escape();
        let baseline = expand_network(corridor_with_escape(), vec![], vec![]);
        let restriction = TurnRestriction {
            kind: RestrictionKind::Way(WayRestriction { from: 0, via: vec![1, 2], to: 3 }),
            is_only: false,
            condition: None,
        };
        let ebg = expand_network(factory, vec![restriction], vec![]);

        // one duplicate node for the single via edge
        assert_eq!(ebg.num_nodes(), baseline.num_nodes() + 1);
        let duplicate = ebg.nodes.last().unwrap();
        assert!(duplicate.is_duplicate);
        assert_eq!((duplicate.source, duplicate.target), (1, 2));

        // the duplicate never reaches "To", but reaches "Escape"
        let duplicate_id = (ebg.num_nodes() - 1) as u32;
        let from_duplicate: Vec<_> =
            ebg.edges.iter().filter(|e| e.source == duplicate_id).collect();
        assert!(!from_duplicate.is_empty());
        let to_edge_ebn: Vec<u32> = ebg
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.source == 2 && n.target == 3 && !n.is_duplicate)
            .map(|(i, _)| i as u32)
            .collect();
        for edge in &from_duplicate {
            assert!(!to_edge_ebn.contains(&edge.target));
        }

        // the restricted entry turn targets the duplicate, other approaches
        // keep the free original
        let via_ebn: Vec<u32> = ebg
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.source == 1 && n.target == 2 && !n.is_duplicate)
            .map(|(i, _)| i as u32)
            .collect();
        assert_eq!(via_ebn.len(), 1);
        let entries: Vec<_> = ebg
            .edges
            .iter()
            .zip(&ebg.turn_index)
            .filter(|(_, &(_, via, to))| via == 1 && to == 2)
            .collect();
        assert!(entries
            .iter()
            .any(|(e, &(from, _, _))| from == 0 && e.target == duplicate_id));
        assert!(entries
            .iter()
            .any(|(e, &(from, _, _))| from != 0 && e.target == via_ebn[0]));
    }

    #[test]
    fn traffic_signals_feed_the_turn_penalty() {
        let plain = expand_network(t_intersection(), vec![], vec![]);
        let mut b = NetworkBuilder::new();
        b.node(1, 0.0, 0.0)
            .signal(2, 0.001, 0.0)
            .node(3, 0.001, 0.001)
            .way(1, &[1, 2], bidirectional("Main"))
            .way(2, &[2, 3], bidirectional("Side"));
        let signalled = expand_network(b.factory(), vec![], vec![]);

        let penalty_of = |ebg: &EdgeExpandedGraph| {
            ebg.turn_index
                .iter()
                .position(|&t| t == (0, 1, 2))
                .map(|i| ebg.turn_penalties[i].duration)
                .expect("the through turn exists")
        };
        assert!(penalty_of(&signalled) > penalty_of(&plain));
    }

    #[test]
    fn segment_count_follows_geometry() {
        let mut b = NetworkBuilder::new();
        b.node(1, 0.0, 0.0)
            .node(2, 0.001, 0.0)
            .node(3, 0.002, 0.0)
            .node(4, 0.003, 0.0)
            .way(1, &[1, 2, 3, 4], bidirectional("Long"));
        let ebg = expand_network(b.factory(), vec![], vec![]);
        // one compressed edge of three sub-segments
        assert_eq!(ebg.num_nodes(), 2);
        assert_eq!(ebg.segments.len(), 3);
        assert_eq!(ebg.node_is_startpoint.len(), 3);
    }

    #[test]
    fn intersection_classes_are_interned_per_node() {
        let ebg = expand_network(t_intersection(), vec![], vec![]);
        assert_eq!(ebg.node_classes.len(), ebg.num_nodes());
        // nodes entering the junction see a two-road bearing class
        let junction_class = ebg.node_classes
            [ebg.nodes.iter().position(|n| n.target == 1).unwrap()]
        .0;
        let bearings = &ebg.registry.bearing_class(junction_class).bearings;
        assert_eq!(bearings.len(), 2);
    }
}
