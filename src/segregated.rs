//! Divided-carriageway detection.
//!
//! A short edge joining the two halves of a divided road is marked
//! segregated so turn pricing does not read the crossing as two sharp
//! turns (or a u-turn) on the same street.

use std::collections::HashSet;

use crate::classes::{ClassData, RoadPriorityClass};
use crate::nbg::{NbgEdgeData, NodeBasedGraphFactory};
use crate::{EdgeId, NameId, NodeId, EMPTY_NAME};

#[derive(Debug, Clone, Copy)]
struct EdgeInfo {
    node: NodeId,
    name_id: NameId,
    /// 0 outgoing, 1 incoming, 2 both.
    direction: u8,
    classes: ClassData,
    priority: RoadPriorityClass,
}

fn length_threshold(priority: RoadPriorityClass) -> f64 {
    match priority {
        RoadPriorityClass::Motorway | RoadPriorityClass::Trunk => 30.0,
        RoadPriorityClass::Primary => 20.0,
        RoadPriorityClass::Secondary | RoadPriorityClass::Tertiary => 10.0,
        _ => 5.0,
    }
}

fn edge_info(factory: &NodeBasedGraphFactory, node: NodeId, data: &NbgEdgeData) -> EdgeInfo {
    let annotation = &factory.annotations[data.annotation_id as usize];
    EdgeInfo {
        node,
        name_id: annotation.name_id,
        direction: if data.reversed { 1 } else { 0 },
        classes: annotation.classes,
        priority: data.priority_class,
    }
}

/// Neighbors of `node` excluding `excluded`, one entry per target node.
/// Entries reached in both directions are merged with direction = both;
/// class masks of merged entries are combined.
fn collect_edge_info(
    factory: &NodeBasedGraphFactory,
    node: NodeId,
    excluded: NodeId,
) -> Vec<EdgeInfo> {
    let mut info: Vec<EdgeInfo> = Vec::new();
    for (_, edge) in factory.graph.edges_of(node) {
        if edge.target == excluded {
            continue;
        }
        info.push(edge_info(factory, edge.target, &edge.data));
    }
    if info.is_empty() {
        return info;
    }

    info.sort_by_key(|e| e.node);
    let mut merged: Vec<EdgeInfo> = Vec::with_capacity(info.len());
    for entry in info {
        match merged.last_mut() {
            Some(last) if last.node == entry.node => {
                if last.direction != entry.direction {
                    last.direction = 2;
                }
                last.classes |= entry.classes;
            }
            _ => merged.push(entry),
        }
    }
    merged
}

fn is_segregated(
    mut v1: Vec<EdgeInfo>,
    mut v2: Vec<EdgeInfo>,
    current: EdgeInfo,
    edge_length: f64,
) -> bool {
    if v1.len() < 2 || v2.len() < 2 {
        return false;
    }

    v1.sort_by_key(|e| e.name_id);
    v2.sort_by_key(|e| e.name_id);

    // An edge with a unique name cannot be the interior piece of a divided
    // road; it must continue under the same name on at least one side.
    if current.name_id != EMPTY_NAME {
        let has_name =
            |v: &[EdgeInfo]| v.binary_search_by_key(&current.name_id, |e| e.name_id).is_ok();
        if !has_name(&v1) && !has_name(&v2) {
            return false;
        }
    }

    // Sort-merge intersection on name.
    let mut commons: Vec<(EdgeInfo, EdgeInfo)> = Vec::new();
    let (mut i1, mut i2) = (0, 0);
    while i1 < v1.len() && i2 < v2.len() {
        if v1[i1].name_id == v2[i2].name_id {
            if v1[i1].name_id != EMPTY_NAME {
                commons.push((v1[i1], v2[i2]));
            }
            i1 += 1;
            i2 += 1;
        } else if v1[i1].name_id < v2[i2].name_id {
            i1 += 1;
        } else {
            i2 += 1;
        }
    }

    if commons.len() < 2 {
        return false;
    }

    let equal_class_count = commons.iter().filter(|(a, b)| a.classes == b.classes).count();
    if equal_class_count < 2 {
        return false;
    }

    let threshold = commons
        .iter()
        .map(|(a, b)| length_threshold(a.priority) + length_threshold(b.priority))
        .fold(f64::MAX, f64::min);

    edge_length <= threshold
}

/// Classify every non-reversed edge of the node-based graph.
pub fn find_segregated_edges(factory: &NodeBasedGraphFactory) -> HashSet<EdgeId> {
    let mut segregated = HashSet::new();
    for source in 0..factory.graph.num_nodes() as NodeId {
        for (edge_id, edge) in factory.graph.edges_of(source) {
            if edge.data.reversed {
                continue;
            }
            let target = edge.target;
            let length = factory.edge_length(edge.data.geometry_id);
            let v1 = collect_edge_info(factory, source, target);
            let v2 = collect_edge_info(factory, target, source);
            let current = edge_info(factory, source, &edge.data);
            if is_segregated(v1, v2, current, length) {
                segregated.insert(edge_id);
            }
        }
    }
    segregated
}
