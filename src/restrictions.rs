//! Turn restrictions: raw relation parsing, the resolved model in the
//! compact id space, and the lookup map used during turn enumeration.

use std::collections::{HashMap, HashSet};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::nbg::NodeBasedGraph;
use crate::reader::{MemberKind, RawRelation};
use crate::NodeId;

/// Via member of a raw restriction: a single node or an ordered way chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestrictionVia {
    Node(i64),
    Ways(Vec<i64>),
}

/// A restriction as parsed from a relation, still in OSM id space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRestriction {
    pub relation_id: i64,
    pub from_way: i64,
    pub via: RestrictionVia,
    pub to_way: i64,
    pub is_only: bool,
    pub condition: Option<String>,
}

/// Parses `type=restriction` relations against the profile's restriction
/// vocabulary.
#[derive(Debug)]
pub struct RestrictionParser {
    vocabulary: Vec<String>,
    parse_conditionals: bool,
}

impl RestrictionParser {
    pub fn new(vocabulary: Vec<String>, parse_conditionals: bool) -> Self {
        Self {
            vocabulary,
            parse_conditionals,
        }
    }

    pub fn parse(&self, relation: &RawRelation) -> Option<InputRestriction> {
        let rel_type = relation.tags.get("type")?;
        if !rel_type.starts_with("restriction") {
            return None;
        }

        // An except list naming anything from the vocabulary voids the
        // restriction for this profile.
        if let Some(except) = relation.tags.get("except") {
            if except
                .split(';')
                .any(|token| self.vocabulary.iter().any(|v| v == token.trim()))
            {
                return None;
            }
        }

        let (value, condition) = self.restriction_value(relation)?;
        let is_only = if value.starts_with("only_") {
            true
        } else if value.starts_with("no_") {
            false
        } else {
            return None;
        };

        let mut from_way = None;
        let mut to_way = None;
        let mut via_node = None;
        let mut via_ways = Vec::new();
        for member in &relation.members {
            match (member.role.as_str(), member.kind) {
                ("from", MemberKind::Way) => from_way = Some(member.id),
                ("to", MemberKind::Way) => to_way = Some(member.id),
                ("via", MemberKind::Node) => via_node = Some(member.id),
                ("via", MemberKind::Way) => via_ways.push(member.id),
                _ => {}
            }
        }

        let via = match (via_node, via_ways.is_empty()) {
            (Some(node), true) => RestrictionVia::Node(node),
            (None, false) => RestrictionVia::Ways(via_ways),
            _ => return None,
        };

        Some(InputRestriction {
            relation_id: relation.id,
            from_way: from_way?,
            via,
            to_way: to_way?,
            is_only,
            condition,
        })
    }

    /// Find the effective restriction value, preferring the plain tag over
    /// vocabulary-scoped ones, and falling back to conditional variants when
    /// enabled. Conditional values read `no_left_turn @ (Mo-Fr 07:00-19:00)`.
    fn restriction_value(&self, relation: &RawRelation) -> Option<(String, Option<String>)> {
        if let Some(value) = relation.tags.get("restriction") {
            return Some((value.to_owned(), None));
        }
        for vocab in &self.vocabulary {
            if let Some(value) = relation.tags.get(&format!("restriction:{vocab}")) {
                return Some((value.to_owned(), None));
            }
        }
        if self.parse_conditionals {
            let mut keys = vec!["restriction:conditional".to_owned()];
            keys.extend(
                self.vocabulary
                    .iter()
                    .map(|v| format!("restriction:{v}:conditional")),
            );
            for key in keys {
                if let Some(value) = relation.tags.get(&key) {
                    let (value, condition) = match value.split_once('@') {
                        Some((v, c)) => (v.trim().to_owned(), Some(c.trim().to_owned())),
                        None => (value.trim().to_owned(), None),
                    };
                    return Some((value, condition));
                }
            }
        }
        None
    }
}

/// `NODE_RESTRICTION(from_edge, via_node, to_edge)` with edges named by
/// their far endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRestriction {
    pub from: NodeId,
    pub via: NodeId,
    pub to: NodeId,
}

/// `WAY_RESTRICTION(from_edge, via_node_sequence, to_edge)`; the via
/// sequence has at least two nodes and each consecutive pair is an edge of
/// the node-based graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WayRestriction {
    pub from: NodeId,
    pub via: Vec<NodeId>,
    pub to: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestrictionKind {
    Node(NodeRestriction),
    Way(WayRestriction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRestriction {
    pub kind: RestrictionKind,
    pub is_only: bool,
    pub condition: Option<String>,
}

impl TurnRestriction {
    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

/// Node restrictions indexed by (from, via) for the turn enumeration loop.
/// `only_` restrictions ban every non-designated exit.
#[derive(Debug, Default)]
pub struct NodeRestrictionMap {
    forbidden: HashSet<(NodeId, NodeId, NodeId)>,
    only: HashMap<(NodeId, NodeId), Vec<NodeId>>,
}

impl NodeRestrictionMap {
    /// Index the unconditional node restrictions of the given list.
    pub fn new(restrictions: &[TurnRestriction]) -> Self {
        let mut map = Self::default();
        for restriction in restrictions {
            if restriction.is_conditional() {
                continue;
            }
            if let RestrictionKind::Node(node) = &restriction.kind {
                if restriction.is_only {
                    map.only
                        .entry((node.from, node.via))
                        .or_default()
                        .push(node.to);
                } else {
                    map.forbidden.insert((node.from, node.via, node.to));
                }
            }
        }
        map
    }

    pub fn is_forbidden(&self, from: NodeId, via: NodeId, to: NodeId) -> bool {
        if let Some(allowed) = self.only.get(&(from, via)) {
            if !allowed.contains(&to) {
                return true;
            }
        }
        self.forbidden.contains(&(from, via, to))
    }

    pub fn is_empty(&self) -> bool {
        self.forbidden.is_empty() && self.only.is_empty()
    }
}

/// Drop restrictions whose edges no longer exist in the frozen graph. Runs
/// after compression, before expansion, so the expansion loop can trust
/// every restriction it sees.
pub fn remove_invalid_restrictions(
    restrictions: Vec<TurnRestriction>,
    graph: &NodeBasedGraph,
) -> Vec<TurnRestriction> {
    let edge_exists = |from: NodeId, to: NodeId| graph.find_directed_edge(from, to).is_some();
    let before = restrictions.len();
    let kept: Vec<_> = restrictions
        .into_iter()
        .filter(|restriction| match &restriction.kind {
            RestrictionKind::Node(node) => {
                edge_exists(node.from, node.via) && edge_exists(node.via, node.to)
            }
            RestrictionKind::Way(way) => {
                edge_exists(way.from, way.via[0])
                    && way.via.windows(2).all(|w| edge_exists(w[0], w[1]))
                    && edge_exists(*way.via.last().expect("via sequence is non-empty"), way.to)
            }
        })
        .collect();
    if kept.len() != before {
        warn!("dropped {} restrictions referencing removed edges", before - kept.len());
    }
    kept
}
