//! Multi-via (way) restrictions.
//!
//! A way restriction constrains a whole path: from-edge, a via node
//! sequence, to-edge. Enforcement duplicates the edge-based nodes along the
//! via path: traffic entering from the restricted approach is routed onto
//! constrained copies, while every other approach keeps using the free
//! originals. The constrained chain omits (for `no_`) or mandates (for
//! `only_`) the final turn.

use std::collections::HashMap;

use log::warn;

use crate::nbg::NodeBasedGraph;
use crate::restrictions::{RestrictionKind, TurnRestriction};
use crate::{EdgeId, NodeId};

#[derive(Debug)]
pub struct ResolvedWayRestriction {
    pub is_only: bool,
    pub from: NodeId,
    pub via: Vec<NodeId>,
    pub to: NodeId,
    /// Directed node-based edges along the via path.
    pub via_edges: Vec<EdgeId>,
    /// Duplicate edge-based node ids, parallel to `via_edges`; assigned by
    /// `allocate_duplicates`.
    pub duplicates: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct WayRestrictionMap {
    restrictions: Vec<ResolvedWayRestriction>,
    /// (from, via[0], via[1]) -> restriction index: the turn that enters the
    /// constrained chain.
    starts: HashMap<(NodeId, NodeId, NodeId), usize>,
    /// (from, via[0]) -> mandatory exit for `only_` restrictions.
    only_exits: HashMap<(NodeId, NodeId), NodeId>,
    /// duplicate EBN -> (restriction index, chain position).
    positions: HashMap<u32, (usize, usize)>,
}

impl WayRestrictionMap {
    /// Index the unconditional way restrictions; conditional ones ride the
    /// sidecar instead of constraining the graph.
    pub fn new(restrictions: &[TurnRestriction], graph: &NodeBasedGraph) -> Self {
        let mut map = Self::default();
        for restriction in restrictions {
            if restriction.is_conditional() {
                continue;
            }
            let RestrictionKind::Way(way) = &restriction.kind else {
                continue;
            };
            let via_edges: Option<Vec<EdgeId>> = way
                .via
                .windows(2)
                .map(|w| graph.find_directed_edge(w[0], w[1]))
                .collect();
            let Some(via_edges) = via_edges else {
                warn!("way restriction via path is not traversable, skipping");
                continue;
            };
            let index = map.restrictions.len();
            let start_key = (way.from, way.via[0], way.via[1]);
            if map.starts.contains_key(&start_key) {
                warn!("overlapping way restrictions share an entry turn, keeping the first");
                continue;
            }
            map.starts.insert(start_key, index);
            if restriction.is_only {
                map.only_exits
                    .entry((way.from, way.via[0]))
                    .or_insert(way.via[1]);
            }
            map.restrictions.push(ResolvedWayRestriction {
                is_only: restriction.is_only,
                from: way.from,
                via: way.via.clone(),
                to: way.to,
                via_edges,
                duplicates: Vec::new(),
            });
        }
        map
    }

    /// Hand out duplicate EBN ids starting at `first_id`. Returns the
    /// directed node-based edge each duplicate copies, in id order.
    pub fn allocate_duplicates(&mut self, first_id: u32) -> Vec<EdgeId> {
        let mut copied = Vec::new();
        let mut next = first_id;
        for (index, restriction) in self.restrictions.iter_mut().enumerate() {
            for (position, &edge) in restriction.via_edges.iter().enumerate() {
                restriction.duplicates.push(next);
                self.positions.insert(next, (index, position));
                copied.push(edge);
                next += 1;
            }
        }
        copied
    }

    /// If turn (from, via0, via1) enters a constrained chain, the duplicate
    /// EBN the turn must target instead of the free original.
    pub fn start_duplicate(&self, from: NodeId, via0: NodeId, via1: NodeId) -> Option<u32> {
        self.starts
            .get(&(from, via0, via1))
            .map(|&i| self.restrictions[i].duplicates[0])
    }

    /// The single exit an `only_` way restriction permits for this approach,
    /// if one binds it.
    pub fn only_exit(&self, from: NodeId, via0: NodeId) -> Option<NodeId> {
        self.only_exits.get(&(from, via0)).copied()
    }

    pub fn position_of(&self, duplicate: u32) -> Option<(&ResolvedWayRestriction, usize)> {
        self.positions
            .get(&duplicate)
            .map(|&(index, position)| (&self.restrictions[index], position))
    }

    pub fn restrictions(&self) -> &[ResolvedWayRestriction] {
        &self.restrictions
    }

    pub fn num_duplicates(&self) -> usize {
        self.restrictions.iter().map(|r| r.via_edges.len()).sum()
    }
}
