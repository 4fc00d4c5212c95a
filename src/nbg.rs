//! Node-based graph: the frozen CSR form of the compressed road network,
//! plus the geometry pool behind its edges.

use std::collections::HashSet;

use anyhow::Result;

use crate::classes::RoadPriorityClass;
use crate::containers::{AnnotationEntry, CompressedEdge, PreparedContainers};
use crate::error::ExtractionError;
use crate::geo::Coordinate;
use crate::lanes::{LaneDescriptionId, LaneDescriptionMap, INVALID_LANE_DESCRIPTION};
use crate::names::NameTable;
use crate::profile::ClassesMap;
use crate::restrictions::TurnRestriction;
use crate::{AnnotationId, EdgeId, NodeId};

#[derive(Debug, Clone, Copy)]
pub struct NbgEdgeData {
    /// This directed entry exists for adjacency only and cannot be driven.
    pub reversed: bool,
    /// Index into the compressed-geometry container.
    pub geometry_id: u32,
    /// Whether this entry runs along the stored geometry or against it.
    pub toward_target: bool,
    pub annotation_id: AnnotationId,
    pub priority_class: RoadPriorityClass,
    pub lane_description_id: LaneDescriptionId,
    pub weight: u32,
    pub duration: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct NbgEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub data: NbgEdgeData,
}

/// Directed multigraph in CSR form; one entry per direction of every
/// compressed edge, frozen after construction.
#[derive(Debug)]
pub struct NodeBasedGraph {
    offsets: Vec<u32>,
    edges: Vec<NbgEdge>,
}

impl NodeBasedGraph {
    pub fn num_nodes(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, id: EdgeId) -> &NbgEdge {
        &self.edges[id as usize]
    }

    pub fn edge_range(&self, node: NodeId) -> std::ops::Range<u32> {
        self.offsets[node as usize]..self.offsets[node as usize + 1]
    }

    pub fn edges_of(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &NbgEdge)> {
        self.edge_range(node).map(move |id| (id, &self.edges[id as usize]))
    }

    /// Number of roads meeting at a node: every incident compressed edge has
    /// exactly one entry in the node's adjacency.
    pub fn degree(&self, node: NodeId) -> usize {
        self.edge_range(node).len()
    }

    /// Count of traversable exits from a node.
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.edges_of(node).filter(|(_, e)| !e.data.reversed).count()
    }

    /// First traversable directed edge from `from` to `to`.
    pub fn find_directed_edge(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        self.edges_of(from)
            .find(|(_, e)| e.target == to && !e.data.reversed)
            .map(|(id, _)| id)
    }
}

/// Polyline pool shared by both directions of every edge. Offsets are
/// strictly non-decreasing; sub-segment cost arrays run in forward geometry
/// order.
#[derive(Debug)]
pub struct CompressedEdgeContainer {
    offsets: Vec<u32>,
    nodes: Vec<NodeId>,
    fwd_weights: Vec<u32>,
    fwd_durations: Vec<u32>,
    rev_weights: Vec<u32>,
    rev_durations: Vec<u32>,
    startpoints: Vec<bool>,
}

impl CompressedEdgeContainer {
    pub fn from_edges(edges: &[CompressedEdge]) -> Self {
        let mut container = Self {
            offsets: Vec::with_capacity(edges.len() + 1),
            nodes: Vec::new(),
            fwd_weights: Vec::new(),
            fwd_durations: Vec::new(),
            rev_weights: Vec::new(),
            rev_durations: Vec::new(),
            startpoints: Vec::with_capacity(edges.len()),
        };
        container.offsets.push(0);
        for edge in edges {
            debug_assert!(edge.geometry.len() >= 2);
            container.nodes.extend_from_slice(&edge.geometry);
            container.fwd_weights.extend_from_slice(&edge.fwd_weights);
            container.fwd_durations.extend_from_slice(&edge.fwd_durations);
            container.rev_weights.extend_from_slice(&edge.rev_weights);
            container.rev_durations.extend_from_slice(&edge.rev_durations);
            container.startpoints.push(edge.is_startpoint);
            container.offsets.push(container.nodes.len() as u32);
        }
        container
    }

    pub fn is_startpoint(&self, id: u32) -> bool {
        self.startpoints[id as usize]
    }

    pub fn num_edges(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn geometry(&self, id: u32) -> &[NodeId] {
        let start = self.offsets[id as usize] as usize;
        let end = self.offsets[id as usize + 1] as usize;
        &self.nodes[start..end]
    }

    fn segment_range(&self, id: u32) -> std::ops::Range<usize> {
        // Each edge stores one fewer cost entry than geometry nodes.
        let start = self.offsets[id as usize] as usize - id as usize;
        let end = self.offsets[id as usize + 1] as usize - (id as usize + 1);
        start..end
    }

    pub fn forward_weights(&self, id: u32) -> &[u32] {
        &self.fwd_weights[self.segment_range(id)]
    }

    pub fn forward_durations(&self, id: u32) -> &[u32] {
        &self.fwd_durations[self.segment_range(id)]
    }

    pub fn reverse_weights(&self, id: u32) -> &[u32] {
        &self.rev_weights[self.segment_range(id)]
    }

    pub fn reverse_durations(&self, id: u32) -> &[u32] {
        &self.rev_durations[self.segment_range(id)]
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }
}

/// Frozen outputs of the node-based graph build. Restriction lists ride
/// along so the driver can hand them to expansion after sanitation.
pub struct NodeBasedGraphFactory {
    pub graph: NodeBasedGraph,
    pub coordinates: Vec<Coordinate>,
    pub osm_node_ids: Vec<i64>,
    pub annotations: Vec<AnnotationEntry>,
    pub compressed: CompressedEdgeContainer,
    pub barriers: HashSet<NodeId>,
    pub traffic_signals: HashSet<NodeId>,
    pub name_table: NameTable,
    pub lane_map: LaneDescriptionMap,
    pub classes_map: ClassesMap,
    pub turn_restrictions: Vec<TurnRestriction>,
    pub conditional_turn_restrictions: Vec<TurnRestriction>,
}

impl NodeBasedGraphFactory {
    pub fn build(prepared: PreparedContainers) -> Result<Self> {
        let num_nodes = prepared.coordinates.len();
        let compressed = CompressedEdgeContainer::from_edges(&prepared.compressed_edges);
        let lane_map = prepared.lane_map;

        let sanitize_lane = |id: LaneDescriptionId| {
            if lane_map.is_valid(id) {
                id
            } else {
                INVALID_LANE_DESCRIPTION
            }
        };

        let mut entries = Vec::with_capacity(prepared.compressed_edges.len() * 2);
        for (i, edge) in prepared.compressed_edges.iter().enumerate() {
            if edge.source as usize >= num_nodes || edge.target as usize >= num_nodes {
                return Err(ExtractionError::InconsistentInput(format!(
                    "edge endpoint out of range: {} -> {} with {} nodes",
                    edge.source, edge.target, num_nodes
                ))
                .into());
            }
            entries.push(NbgEdge {
                source: edge.source,
                target: edge.target,
                data: NbgEdgeData {
                    reversed: !edge.forward,
                    geometry_id: i as u32,
                    toward_target: true,
                    annotation_id: edge.annotation_id,
                    priority_class: edge.priority_class,
                    lane_description_id: sanitize_lane(edge.lane_id_forward),
                    weight: edge.weight(true),
                    duration: edge.duration(true),
                },
            });
            entries.push(NbgEdge {
                source: edge.target,
                target: edge.source,
                data: NbgEdgeData {
                    reversed: !edge.backward,
                    geometry_id: i as u32,
                    toward_target: false,
                    annotation_id: edge.annotation_id,
                    priority_class: edge.priority_class,
                    lane_description_id: sanitize_lane(edge.lane_id_backward),
                    weight: edge.weight(false),
                    duration: edge.duration(false),
                },
            });
        }
        entries.sort_by_key(|e| (e.source, e.target, e.data.geometry_id));

        let mut offsets = vec![0u32; num_nodes + 1];
        for edge in &entries {
            offsets[edge.source as usize + 1] += 1;
        }
        for i in 0..num_nodes {
            offsets[i + 1] += offsets[i];
        }

        let graph = NodeBasedGraph { offsets, edges: entries };

        Ok(Self {
            graph,
            coordinates: prepared.coordinates,
            osm_node_ids: prepared.osm_node_ids,
            annotations: prepared.annotations,
            compressed,
            barriers: prepared.barriers,
            traffic_signals: prepared.traffic_signals,
            name_table: prepared.name_table,
            lane_map,
            classes_map: prepared.classes_map,
            turn_restrictions: prepared.turn_restrictions,
            conditional_turn_restrictions: prepared.conditional_turn_restrictions,
        })
    }

    /// Length in meters of a compressed edge's polyline.
    pub fn edge_length(&self, geometry_id: u32) -> f64 {
        let geometry = self.compressed.geometry(geometry_id);
        geometry
            .windows(2)
            .map(|w| {
                crate::geo::haversine(
                    self.coordinates[w[0] as usize],
                    self.coordinates[w[1] as usize],
                )
            })
            .sum()
    }
}
