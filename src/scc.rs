//! Strongly-connected-component labeling of the edge-based graph.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;

use crate::ebg::{EdgeBasedEdge, EdgeBasedNodeSegment};

/// Per-node component labels. Ids are `1 + component index` so 0 can mean
/// "unlabeled".
#[derive(Debug)]
pub struct ComponentLabels {
    pub component_id: Vec<u32>,
    pub is_tiny: Vec<bool>,
}

impl ComponentLabels {
    pub fn num_components(&self) -> usize {
        self.component_id.iter().copied().max().unwrap_or(0) as usize
    }
}

/// Run Tarjan over the edge-based graph. Besides the turn edges, every
/// segment with an enabled reverse contributes a mate-edge pair joining the
/// two directed siblings, which forces them into one component even where
/// the turn graph alone would separate them.
pub fn find_components(
    num_nodes: usize,
    edge_list: &[EdgeBasedEdge],
    segments: &[EdgeBasedNodeSegment],
    small_component_size: usize,
) -> ComponentLabels {
    let mut edges: Vec<(u32, u32)> =
        Vec::with_capacity(edge_list.len() * 2 + segments.len() * 2);
    for edge in edge_list {
        debug_assert!((edge.source as usize) < num_nodes);
        debug_assert!((edge.target as usize) < num_nodes);
        if edge.forward {
            edges.push((edge.source, edge.target));
        }
        if edge.backward {
            edges.push((edge.target, edge.source));
        }
    }
    for segment in segments {
        if segment.forward_segment_id.enabled && segment.reverse_segment_id.enabled {
            debug_assert!((segment.forward_segment_id.id as usize) < num_nodes);
            debug_assert!((segment.reverse_segment_id.id as usize) < num_nodes);
            edges.push((segment.forward_segment_id.id, segment.reverse_segment_id.id));
            edges.push((segment.reverse_segment_id.id, segment.forward_segment_id.id));
        }
    }
    edges.par_sort_unstable();
    edges.dedup();

    let mut graph: DiGraph<(), (), u32> =
        DiGraph::with_capacity(num_nodes, edges.len());
    for _ in 0..num_nodes {
        graph.add_node(());
    }
    for &(source, target) in &edges {
        graph.add_edge(NodeIndex::new(source as usize), NodeIndex::new(target as usize), ());
    }

    let mut component_id = vec![0u32; num_nodes];
    let mut is_tiny = vec![false; num_nodes];
    for (index, component) in tarjan_scc(&graph).into_iter().enumerate() {
        let tiny = component.len() < small_component_size;
        for node in component {
            component_id[node.index()] = 1 + index as u32;
            is_tiny[node.index()] = tiny;
        }
    }
    ComponentLabels { component_id, is_tiny }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebg::SegmentId;

    fn turn(source: u32, target: u32) -> EdgeBasedEdge {
        EdgeBasedEdge {
            source,
            target,
            weight: 1,
            duration: 1,
            forward: true,
            backward: false,
        }
    }

    fn mate_segment(forward: u32, reverse: u32) -> EdgeBasedNodeSegment {
        EdgeBasedNodeSegment {
            forward_segment_id: SegmentId { id: forward, enabled: true },
            reverse_segment_id: SegmentId { id: reverse, enabled: true },
            u: 0,
            v: 1,
            fwd_position: 0,
        }
    }

    #[test]
    fn mate_edges_join_directed_siblings() {
        // two sibling nodes with no turns at all
        let labels = find_components(2, &[], &[mate_segment(0, 1)], 10);
        assert_eq!(labels.component_id[0], labels.component_id[1]);
        assert!(labels.component_id[0] >= 1);
        assert!(labels.is_tiny[0] && labels.is_tiny[1]);
    }

    #[test]
    fn disconnected_nodes_get_distinct_components() {
        let labels = find_components(4, &[turn(0, 1), turn(1, 0)], &[], 1);
        assert_eq!(labels.component_id[0], labels.component_id[1]);
        assert_ne!(labels.component_id[2], labels.component_id[3]);
        assert_ne!(labels.component_id[0], labels.component_id[2]);
        // threshold 1: nothing is strictly smaller than 1 except nothing
        assert!(!labels.is_tiny[0]);
    }

    #[test]
    fn tiny_flag_follows_the_threshold() {
        // a 2-cycle and an isolated node
        let labels = find_components(3, &[turn(0, 1), turn(1, 0)], &[], 2);
        assert!(!labels.is_tiny[0]);
        assert!(!labels.is_tiny[1]);
        assert!(labels.is_tiny[2]);
    }

    #[test]
    fn component_ids_start_at_one() {
        let labels = find_components(1, &[], &[], 1);
        assert_eq!(labels.component_id[0], 1);
        assert_eq!(labels.num_components(), 1);
    }

    #[test]
    fn one_way_cycle_without_return_is_two_components() {
        // directed edge 0->1 only: not strongly connected
        let labels = find_components(2, &[turn(0, 1)], &[], 1);
        assert_ne!(labels.component_id[0], labels.component_id[1]);
        // adding the mate edges merges them
        let merged = find_components(2, &[turn(0, 1)], &[mate_segment(0, 1)], 1);
        assert_eq!(merged.component_id[0], merged.component_id[1]);
    }
}
