//! Extraction containers: typed accumulators fed by the pipeline sink, and
//! the prepare step that turns them into the compact, compressed form the
//! graph factories consume.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::classes::{class_mask, is_valid_class_name, ClassData, RoadPriorityClass, MAX_CLASS_INDEX};
use crate::error::ExtractionError;
use crate::geo::{haversine, Coordinate};
use crate::lanes::{parse_lane_string, LaneDescriptionId, LaneDescriptionMap, INVALID_LANE_DESCRIPTION};
use crate::names::{NameTable, NameTableBuilder};
use crate::profile::{ClassesMap, ExtractedNode, ExtractedWay};
use crate::reader::{RawNode, RawWay};
use crate::restrictions::{
    InputRestriction, NodeRestriction, RestrictionKind, RestrictionVia, TurnRestriction,
    WayRestriction,
};
use crate::{AnnotationId, NameId, NodeId};

/// A node as seen during ingestion, still under its map id.
#[derive(Debug, Clone, Copy)]
pub struct QueryNode {
    pub osm_id: i64,
    pub coord: Coordinate,
    pub barrier: bool,
    pub traffic_signal: bool,
}

/// Side-table record shared by all edges of similar ways.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationEntry {
    pub name_id: NameId,
    pub classes: ClassData,
    pub travel_mode: u8,
    pub is_left_hand_driving: bool,
}

/// Way-level data shared by the raw segments a way emits.
#[derive(Debug, Clone)]
struct WayMeta {
    way_id: i64,
    annotation_id: AnnotationId,
    priority_class: RoadPriorityClass,
    forward: bool,
    backward: bool,
    forward_speed: f64,
    backward_speed: f64,
    forward_rate: Option<f64>,
    backward_rate: Option<f64>,
    lane_id_forward: LaneDescriptionId,
    lane_id_backward: LaneDescriptionId,
    is_startpoint: bool,
}

/// One record per consecutive node pair of a used way, in way order.
#[derive(Debug, Clone, Copy)]
struct RawSegment {
    source: i64,
    target: i64,
    meta: u32,
}

/// An ordered polyline of node ids between two endpoints, with per-segment
/// weight and duration for each traversable direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedEdge {
    pub source: NodeId,
    pub target: NodeId,
    /// At least two entries, endpoints included.
    pub geometry: Vec<NodeId>,
    pub forward: bool,
    pub backward: bool,
    /// Per sub-segment cost arrays in forward geometry order; all-zero when
    /// the direction is not traversable.
    pub fwd_weights: Vec<u32>,
    pub fwd_durations: Vec<u32>,
    pub rev_weights: Vec<u32>,
    pub rev_durations: Vec<u32>,
    pub annotation_id: AnnotationId,
    pub priority_class: RoadPriorityClass,
    pub lane_id_forward: LaneDescriptionId,
    pub lane_id_backward: LaneDescriptionId,
    pub is_startpoint: bool,
}

impl CompressedEdge {
    pub fn weight(&self, forward: bool) -> u32 {
        if forward {
            self.fwd_weights.iter().sum()
        } else {
            self.rev_weights.iter().sum()
        }
    }

    pub fn duration(&self, forward: bool) -> u32 {
        if forward {
            self.fwd_durations.iter().sum()
        } else {
            self.rev_durations.iter().sum()
        }
    }
}

/// Everything the graph factories need, in the dense id space.
#[derive(Debug)]
pub struct PreparedContainers {
    pub coordinates: Vec<Coordinate>,
    pub osm_node_ids: Vec<i64>,
    pub barriers: HashSet<NodeId>,
    pub traffic_signals: HashSet<NodeId>,
    pub compressed_edges: Vec<CompressedEdge>,
    pub annotations: Vec<AnnotationEntry>,
    pub name_table: NameTable,
    pub turn_restrictions: Vec<TurnRestriction>,
    pub conditional_turn_restrictions: Vec<TurnRestriction>,
    pub lane_map: LaneDescriptionMap,
    pub classes_map: ClassesMap,
}

/// Accumulates extraction results. Only the serial sink stage mutates it;
/// parallel stages hand over per-buffer private results.
pub struct ExtractionContainers {
    all_nodes: Vec<QueryNode>,
    node_index: HashMap<i64, usize>,
    way_meta: Vec<WayMeta>,
    raw_segments: Vec<RawSegment>,
    raw_restrictions: Vec<InputRestriction>,
    node_usage: HashMap<i64, u32>,
    annotation_entries: Vec<AnnotationEntry>,
    names: NameTableBuilder,
    pub classes_map: ClassesMap,
    pub lane_map: LaneDescriptionMap,
    /// Whether the profile declared a closed class list; undeclared class
    /// use is then an error instead of an implicit declaration.
    strict_classes: bool,
}

impl ExtractionContainers {
    pub fn new(classes_map: ClassesMap, strict_classes: bool) -> Self {
        Self {
            all_nodes: Vec::new(),
            node_index: HashMap::new(),
            way_meta: Vec::new(),
            raw_segments: Vec::new(),
            raw_restrictions: Vec::new(),
            node_usage: HashMap::new(),
            annotation_entries: Vec::new(),
            names: NameTableBuilder::new(),
            classes_map,
            lane_map: LaneDescriptionMap::new(),
            strict_classes,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.all_nodes.len()
    }

    pub fn num_raw_segments(&self) -> usize {
        self.raw_segments.len()
    }

    pub fn num_restrictions(&self) -> usize {
        self.raw_restrictions.len()
    }

    pub fn process_node(&mut self, node: &RawNode, extracted: &ExtractedNode) {
        let record = QueryNode {
            osm_id: node.id,
            coord: node.coord,
            barrier: extracted.barrier,
            traffic_signal: extracted.traffic_signal,
        };
        match self.node_index.get(&node.id) {
            Some(&i) => self.all_nodes[i] = record,
            None => {
                self.node_index.insert(node.id, self.all_nodes.len());
                self.all_nodes.push(record);
            }
        }
    }

    pub fn process_way(&mut self, way: &RawWay, extracted: &ExtractedWay) -> Result<()> {
        if way.node_ids.len() < 2 || !extracted.is_traversable() {
            return Ok(());
        }

        let name_id = self.names.intern(&extracted.name);
        let mut classes: ClassData = 0;
        for class in &extracted.classes {
            classes |= self.class_bit(class)?;
        }
        let annotation_id = self.intern_annotation(AnnotationEntry {
            name_id,
            classes,
            travel_mode: extracted.travel_mode,
            is_left_hand_driving: false,
        });

        let lane_id_forward = self.intern_lanes(extracted.turn_lanes_forward.as_deref());
        let lane_id_backward = self.intern_lanes(extracted.turn_lanes_backward.as_deref());

        let meta = self.way_meta.len() as u32;
        self.way_meta.push(WayMeta {
            way_id: way.id,
            annotation_id,
            priority_class: extracted.priority_class,
            forward: extracted.forward(),
            backward: extracted.backward(),
            forward_speed: extracted.forward_speed,
            backward_speed: extracted.backward_speed,
            forward_rate: extracted.forward_rate,
            backward_rate: extracted.backward_rate,
            lane_id_forward,
            lane_id_backward,
            is_startpoint: extracted.is_startpoint,
        });

        for pair in way.node_ids.windows(2) {
            self.raw_segments.push(RawSegment {
                source: pair[0],
                target: pair[1],
                meta,
            });
        }
        for &node_id in &way.node_ids {
            *self.node_usage.entry(node_id).or_insert(0) += 1;
        }
        Ok(())
    }

    pub fn process_restriction(&mut self, restriction: InputRestriction) {
        self.raw_restrictions.push(restriction);
    }

    fn class_bit(&mut self, name: &str) -> Result<ClassData> {
        if let Some(&mask) = self.classes_map.get(name) {
            return Ok(mask);
        }
        if self.strict_classes {
            return Err(ExtractionError::InvalidProfileDeclaration(format!(
                "profile used undeclared class name {name:?}"
            ))
            .into());
        }
        if !is_valid_class_name(name) {
            return Err(ExtractionError::InvalidProfileDeclaration(format!(
                "invalid class name {name:?}, only [A-Za-z0-9]+ allowed"
            ))
            .into());
        }
        let index = self.classes_map.len();
        if index > MAX_CLASS_INDEX {
            return Err(ExtractionError::InvalidProfileDeclaration(format!(
                "at most {} classes are allowed",
                MAX_CLASS_INDEX + 1
            ))
            .into());
        }
        let mask = class_mask(index);
        self.classes_map.insert(name.to_owned(), mask);
        Ok(mask)
    }

    /// Annotations are stored one per way here and deduplicated in
    /// `prepare()`, keeping the sink stage cheap.
    fn intern_annotation(&mut self, entry: AnnotationEntry) -> AnnotationId {
        let id = self.annotation_entries.len() as AnnotationId;
        self.annotation_entries.push(entry);
        id
    }

    fn intern_lanes(&mut self, lanes: Option<&str>) -> LaneDescriptionId {
        match lanes {
            Some(s) if !s.is_empty() => self.lane_map.intern(parse_lane_string(s)),
            _ => INVALID_LANE_DESCRIPTION,
        }
    }

    /// Compress, intern and deduplicate everything into the dense id space.
    pub fn prepare(mut self) -> Result<PreparedContainers> {
        // Drop segments referencing nodes we never saw.
        let node_index = &self.node_index;
        let before = self.raw_segments.len();
        self.raw_segments.retain(|segment| {
            node_index.contains_key(&segment.source) && node_index.contains_key(&segment.target)
        });
        if self.raw_segments.len() != before {
            warn!(
                "dropped {} raw edges referencing nodes without coordinates",
                before - self.raw_segments.len()
            );
        }

        // Dense node ids in first-seen order over the raw edges, and the
        // index-aligned coordinate array.
        let mut dense: HashMap<i64, NodeId> = HashMap::new();
        let mut coordinates = Vec::new();
        let mut osm_node_ids = Vec::new();
        for segment in &self.raw_segments {
            for osm_id in [segment.source, segment.target] {
                if !dense.contains_key(&osm_id) {
                    let id = coordinates.len() as NodeId;
                    dense.insert(osm_id, id);
                    let node = &self.all_nodes[self.node_index[&osm_id]];
                    coordinates.push(node.coord);
                    osm_node_ids.push(osm_id);
                }
            }
        }

        let mut barriers = HashSet::new();
        let mut traffic_signals = HashSet::new();
        for node in &self.all_nodes {
            if let Some(&id) = dense.get(&node.osm_id) {
                if node.barrier {
                    barriers.insert(id);
                }
                if node.traffic_signal {
                    traffic_signals.insert(id);
                }
            }
        }

        // A run of raw edges sharing a way is compressed into a single
        // polyline edge, broken wherever a turn decision can happen: at
        // junctions, barriers, traffic signals and restriction via nodes.
        let mut via_nodes: HashSet<i64> = HashSet::new();
        for restriction in &self.raw_restrictions {
            if let RestrictionVia::Node(v) = restriction.via {
                via_nodes.insert(v);
            }
        }
        let is_break = |osm_id: i64, containers: &Self| {
            containers.node_usage.get(&osm_id).copied().unwrap_or(0) >= 2
                || via_nodes.contains(&osm_id)
                || {
                    let node = &containers.all_nodes[containers.node_index[&osm_id]];
                    node.barrier || node.traffic_signal
                }
        };

        let restriction_ways: HashSet<i64> = self
            .raw_restrictions
            .iter()
            .flat_map(|r| {
                let mut ways = vec![r.from_way, r.to_way];
                if let RestrictionVia::Ways(ref via) = r.via {
                    ways.extend_from_slice(via);
                }
                ways
            })
            .collect();
        let mut edges_by_way: HashMap<i64, Vec<usize>> = HashMap::new();

        let mut compressed_edges: Vec<CompressedEdge> = Vec::new();
        let mut run_start = 0;
        while run_start < self.raw_segments.len() {
            let meta_idx = self.raw_segments[run_start].meta;
            let mut run_end = run_start + 1;
            while run_end < self.raw_segments.len() && self.raw_segments[run_end].meta == meta_idx {
                run_end += 1;
            }
            let meta = self.way_meta[meta_idx as usize].clone();

            let mut geometry_osm = vec![self.raw_segments[run_start].source];
            for i in run_start..run_end {
                let segment = &self.raw_segments[i];
                // A way split by dropped segments restarts its polyline.
                if *geometry_osm.last().expect("geometry is never empty") != segment.source {
                    if geometry_osm.len() >= 2 {
                        let edge = compress_run(&geometry_osm, &meta, &dense, &coordinates);
                        if restriction_ways.contains(&meta.way_id) {
                            edges_by_way
                                .entry(meta.way_id)
                                .or_default()
                                .push(compressed_edges.len());
                        }
                        compressed_edges.push(edge);
                    }
                    geometry_osm = vec![segment.source];
                }
                geometry_osm.push(segment.target);

                let at_run_end = i + 1 == run_end;
                if at_run_end || is_break(segment.target, &self) {
                    let edge = compress_run(&geometry_osm, &meta, &dense, &coordinates);
                    if restriction_ways.contains(&meta.way_id) {
                        edges_by_way
                            .entry(meta.way_id)
                            .or_default()
                            .push(compressed_edges.len());
                    }
                    compressed_edges.push(edge);
                    geometry_osm = vec![segment.target];
                }
            }
            run_start = run_end;
        }

        let (turn_restrictions, conditional_turn_restrictions) = resolve_restrictions(
            std::mem::take(&mut self.raw_restrictions),
            &dense,
            &edges_by_way,
            &compressed_edges,
        );

        let (annotations, remap) = self.dedup_annotations();
        for edge in &mut compressed_edges {
            edge.annotation_id = remap[edge.annotation_id as usize];
        }

        Ok(PreparedContainers {
            coordinates,
            osm_node_ids,
            barriers,
            traffic_signals,
            compressed_edges,
            annotations,
            name_table: self.names.build(),
            turn_restrictions,
            conditional_turn_restrictions,
            lane_map: self.lane_map,
            classes_map: self.classes_map,
        })
    }
}

impl ExtractionContainers {
    fn dedup_annotations(&mut self) -> (Vec<AnnotationEntry>, Vec<AnnotationId>) {
        let mut interned: HashMap<AnnotationEntry, AnnotationId> = HashMap::new();
        let mut annotations = Vec::new();
        let mut remap = Vec::with_capacity(self.annotation_entries.len());
        for entry in &self.annotation_entries {
            let id = *interned.entry(entry.clone()).or_insert_with(|| {
                annotations.push(entry.clone());
                (annotations.len() - 1) as AnnotationId
            });
            remap.push(id);
        }
        (annotations, remap)
    }
}

fn duration_deciseconds(distance_m: f64, speed_kmh: f64) -> u32 {
    ((distance_m / (speed_kmh / 3.6)) * 10.0).round().max(1.0) as u32
}

fn weight_deciseconds(distance_m: f64, speed_kmh: f64, rate: Option<f64>) -> u32 {
    match rate {
        Some(rate) if rate > 0.0 => ((distance_m / rate) * 10.0).round().max(1.0) as u32,
        _ => duration_deciseconds(distance_m, speed_kmh),
    }
}

fn compress_run(
    geometry_osm: &[i64],
    meta: &WayMeta,
    dense: &HashMap<i64, NodeId>,
    coordinates: &[Coordinate],
) -> CompressedEdge {
    let geometry: Vec<NodeId> = geometry_osm.iter().map(|id| dense[id]).collect();
    let n = geometry.len() - 1;
    let mut fwd_weights = vec![0; n];
    let mut fwd_durations = vec![0; n];
    let mut rev_weights = vec![0; n];
    let mut rev_durations = vec![0; n];
    for i in 0..n {
        let a = coordinates[geometry[i] as usize];
        let b = coordinates[geometry[i + 1] as usize];
        let distance = haversine(a, b);
        if meta.forward {
            fwd_durations[i] = duration_deciseconds(distance, meta.forward_speed);
            fwd_weights[i] = weight_deciseconds(distance, meta.forward_speed, meta.forward_rate);
        }
        if meta.backward {
            rev_durations[i] = duration_deciseconds(distance, meta.backward_speed);
            rev_weights[i] = weight_deciseconds(distance, meta.backward_speed, meta.backward_rate);
        }
    }
    CompressedEdge {
        source: geometry[0],
        target: geometry[n],
        geometry,
        forward: meta.forward,
        backward: meta.backward,
        fwd_weights,
        fwd_durations,
        rev_weights,
        rev_durations,
        annotation_id: meta.annotation_id,
        priority_class: meta.priority_class,
        lane_id_forward: meta.lane_id_forward,
        lane_id_backward: meta.lane_id_backward,
        is_startpoint: meta.is_startpoint,
    }
}

/// Rewrite raw restrictions into the compact id space, resolving way
/// references to the compressed edges incident to the via node. Restrictions
/// whose ids do not resolve are discarded.
fn resolve_restrictions(
    raw: Vec<InputRestriction>,
    dense: &HashMap<i64, NodeId>,
    edges_by_way: &HashMap<i64, Vec<usize>>,
    compressed_edges: &[CompressedEdge],
) -> (Vec<TurnRestriction>, Vec<TurnRestriction>) {
    let mut unconditional = Vec::new();
    let mut conditional = Vec::new();
    let mut dropped = 0usize;

    // The far endpoint of the way's compressed edge incident to `via`.
    let neighbor_along = |way_id: i64, via: NodeId| -> Option<NodeId> {
        edges_by_way.get(&way_id)?.iter().find_map(|&i| {
            let edge = &compressed_edges[i];
            if edge.target == via {
                Some(edge.source)
            } else if edge.source == via {
                Some(edge.target)
            } else {
                None
            }
        })
    };

    // Ordered endpoint path of a way's compressed edges.
    let way_path = |way_id: i64| -> Option<Vec<NodeId>> {
        let indices = edges_by_way.get(&way_id)?;
        let mut path = vec![compressed_edges[*indices.first()?].source];
        for &i in indices.iter() {
            let edge = &compressed_edges[i];
            if *path.last()? != edge.source {
                return None; // split way, no contiguous path
            }
            path.push(edge.target);
        }
        Some(path)
    };

    'outer: for restriction in raw {
        let resolved = match restriction.via {
            RestrictionVia::Node(via_osm) => {
                let Some(&via) = dense.get(&via_osm) else {
                    dropped += 1;
                    continue;
                };
                let (Some(from), Some(to)) = (
                    neighbor_along(restriction.from_way, via),
                    neighbor_along(restriction.to_way, via),
                ) else {
                    dropped += 1;
                    continue;
                };
                TurnRestriction {
                    kind: RestrictionKind::Node(NodeRestriction { from, via, to }),
                    is_only: restriction.is_only,
                    condition: restriction.condition,
                }
            }
            RestrictionVia::Ways(ref via_ways) => {
                let mut via: Vec<NodeId> = Vec::new();
                for &way_id in via_ways {
                    let Some(mut path) = way_path(way_id) else {
                        dropped += 1;
                        continue 'outer;
                    };
                    if via.is_empty() {
                        // Orient the first via way away from the from-way.
                        let starts_at_front =
                            neighbor_along(restriction.from_way, path[0]).is_some();
                        if !starts_at_front {
                            if neighbor_along(restriction.from_way, *path.last().unwrap())
                                .is_none()
                            {
                                dropped += 1;
                                continue 'outer;
                            }
                            path.reverse();
                        }
                        via = path;
                    } else {
                        let tail = *via.last().unwrap();
                        if path[0] != tail {
                            if *path.last().unwrap() != tail {
                                dropped += 1;
                                continue 'outer;
                            }
                            path.reverse();
                        }
                        via.extend_from_slice(&path[1..]);
                    }
                }
                if via.len() < 2 {
                    dropped += 1;
                    continue;
                }
                let (Some(from), Some(to)) = (
                    neighbor_along(restriction.from_way, via[0]),
                    neighbor_along(restriction.to_way, *via.last().unwrap()),
                ) else {
                    dropped += 1;
                    continue;
                };
                TurnRestriction {
                    kind: RestrictionKind::Way(WayRestriction { from, via, to }),
                    is_only: restriction.is_only,
                    condition: restriction.condition,
                }
            }
        };
        if resolved.is_conditional() {
            conditional.push(resolved);
        } else {
            unconditional.push(resolved);
        }
    }
    if dropped > 0 {
        warn!("discarded {dropped} turn restrictions with unresolvable member ids");
    }
    (unconditional, conditional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::TRAVEL_MODE_DRIVING;
    use crate::reader::TagMap;

    fn containers() -> ExtractionContainers {
        ExtractionContainers::new(ClassesMap::new(), false)
    }

    fn raw_node(id: i64, lon: f64, lat: f64) -> RawNode {
        RawNode {
            id,
            coord: Coordinate::from_degrees(lon, lat),
            tags: TagMap::default(),
        }
    }

    fn raw_way(id: i64, nodes: &[i64]) -> RawWay {
        RawWay {
            id,
            node_ids: nodes.to_vec(),
            node_locations: vec![None; nodes.len()],
            tags: TagMap::default(),
        }
    }

    fn bidirectional(name: &str) -> ExtractedWay {
        ExtractedWay {
            name: name.to_owned(),
            forward_speed: 36.0,
            backward_speed: 36.0,
            ..ExtractedWay::default()
        }
    }

    fn add_node(c: &mut ExtractionContainers, id: i64, lon: f64, lat: f64) {
        c.process_node(&raw_node(id, lon, lat), &ExtractedNode::default());
    }

    #[test]
    fn a_single_way_becomes_one_compressed_edge() {
        let mut c = containers();
        add_node(&mut c, 10, 0.0, 0.0);
        add_node(&mut c, 20, 0.001, 0.0);
        c.process_way(&raw_way(1, &[10, 20]), &bidirectional("Main")).unwrap();

        let prepared = c.prepare().unwrap();
        assert_eq!(prepared.compressed_edges.len(), 1);
        let edge = &prepared.compressed_edges[0];
        assert_eq!((edge.source, edge.target), (0, 1));
        assert_eq!(edge.geometry, vec![0, 1]);
        assert!(edge.forward && edge.backward);
        assert!(edge.weight(true) >= 1 && edge.weight(false) >= 1);
        assert_eq!(prepared.coordinates.len(), 2);
        assert_eq!(prepared.osm_node_ids, vec![10, 20]);
    }

    #[test]
    fn interior_nodes_compress_away_but_keep_coordinates() {
        let mut c = containers();
        for (i, id) in [100, 200, 300, 400].iter().enumerate() {
            add_node(&mut c, *id, i as f64 * 0.001, 0.0);
        }
        c.process_way(&raw_way(1, &[100, 200, 300, 400]), &bidirectional("Long"))
            .unwrap();

        let prepared = c.prepare().unwrap();
        assert_eq!(prepared.compressed_edges.len(), 1);
        let edge = &prepared.compressed_edges[0];
        assert_eq!(edge.geometry.len(), 4);
        assert_eq!(edge.fwd_weights.len(), 3);
        // every referenced map node has a coordinate
        assert_eq!(prepared.coordinates.len(), 4);
    }

    #[test]
    fn shared_nodes_split_the_run() {
        let mut c = containers();
        add_node(&mut c, 1, 0.0, 0.0);
        add_node(&mut c, 2, 0.001, 0.0);
        add_node(&mut c, 3, 0.002, 0.0);
        add_node(&mut c, 4, 0.001, 0.001);
        c.process_way(&raw_way(1, &[1, 2, 3]), &bidirectional("Main")).unwrap();
        c.process_way(&raw_way(2, &[2, 4]), &bidirectional("Side")).unwrap();

        let prepared = c.prepare().unwrap();
        // Main splits at the junction with Side
        assert_eq!(prepared.compressed_edges.len(), 3);
    }

    #[test]
    fn barrier_nodes_split_the_run_and_are_collected() {
        let mut c = containers();
        add_node(&mut c, 1, 0.0, 0.0);
        c.process_node(
            &raw_node(2, 0.001, 0.0),
            &ExtractedNode { barrier: true, traffic_signal: false },
        );
        add_node(&mut c, 3, 0.002, 0.0);
        c.process_way(&raw_way(1, &[1, 2, 3]), &bidirectional("Gated")).unwrap();

        let prepared = c.prepare().unwrap();
        assert_eq!(prepared.compressed_edges.len(), 2);
        assert_eq!(prepared.barriers.len(), 1);
        assert!(prepared.barriers.contains(&1)); // dense id of map node 2
    }

    #[test]
    fn segments_without_coordinates_are_dropped() {
        let mut c = containers();
        add_node(&mut c, 1, 0.0, 0.0);
        add_node(&mut c, 2, 0.001, 0.0);
        // node 3 is never seen
        c.process_way(&raw_way(1, &[1, 2, 3]), &bidirectional("Edgy")).unwrap();

        let prepared = c.prepare().unwrap();
        assert_eq!(prepared.compressed_edges.len(), 1);
        assert_eq!(prepared.coordinates.len(), 2);
    }

    #[test]
    fn node_restriction_is_rewritten_to_dense_ids() {
        let mut c = containers();
        add_node(&mut c, 1, 0.0, 0.0);
        add_node(&mut c, 2, 0.001, 0.0);
        add_node(&mut c, 3, 0.001, 0.001);
        c.process_way(&raw_way(10, &[1, 2]), &bidirectional("A")).unwrap();
        c.process_way(&raw_way(20, &[2, 3]), &bidirectional("B")).unwrap();
        c.process_restriction(InputRestriction {
            relation_id: 7,
            from_way: 10,
            via: RestrictionVia::Node(2),
            to_way: 20,
            is_only: false,
            condition: None,
        });

        let prepared = c.prepare().unwrap();
        assert_eq!(prepared.turn_restrictions.len(), 1);
        assert!(prepared.conditional_turn_restrictions.is_empty());
        match &prepared.turn_restrictions[0].kind {
            RestrictionKind::Node(node) => {
                assert_eq!((node.from, node.via, node.to), (0, 1, 2));
            }
            other => panic!("expected node restriction, got {other:?}"),
        }
    }

    #[test]
    fn via_way_restriction_resolves_to_a_node_sequence() {
        let mut c = containers();
        add_node(&mut c, 1, 0.0, 0.0);
        add_node(&mut c, 2, 0.001, 0.0);
        add_node(&mut c, 3, 0.002, 0.0);
        add_node(&mut c, 4, 0.003, 0.0);
        c.process_way(&raw_way(10, &[1, 2]), &bidirectional("From")).unwrap();
        c.process_way(&raw_way(20, &[2, 3]), &bidirectional("Via")).unwrap();
        c.process_way(&raw_way(30, &[3, 4]), &bidirectional("To")).unwrap();
        c.process_restriction(InputRestriction {
            relation_id: 8,
            from_way: 10,
            via: RestrictionVia::Ways(vec![20]),
            to_way: 30,
            is_only: false,
            condition: None,
        });

        let prepared = c.prepare().unwrap();
        assert_eq!(prepared.turn_restrictions.len(), 1);
        match &prepared.turn_restrictions[0].kind {
            RestrictionKind::Way(way) => {
                assert_eq!(way.from, 0);
                assert_eq!(way.via, vec![1, 2]);
                assert_eq!(way.to, 3);
            }
            other => panic!("expected way restriction, got {other:?}"),
        }
    }

    #[test]
    fn unresolvable_restrictions_are_discarded() {
        let mut c = containers();
        add_node(&mut c, 1, 0.0, 0.0);
        add_node(&mut c, 2, 0.001, 0.0);
        c.process_way(&raw_way(10, &[1, 2]), &bidirectional("A")).unwrap();
        c.process_restriction(InputRestriction {
            relation_id: 9,
            from_way: 10,
            via: RestrictionVia::Node(999),
            to_way: 555,
            is_only: false,
            condition: None,
        });

        let prepared = c.prepare().unwrap();
        assert!(prepared.turn_restrictions.is_empty());
        assert!(prepared.conditional_turn_restrictions.is_empty());
    }

    #[test]
    fn undeclared_class_fails_in_strict_mode() {
        let mut declared = ClassesMap::new();
        declared.insert("toll".to_owned(), 1);
        let mut c = ExtractionContainers::new(declared, true);
        add_node(&mut c, 1, 0.0, 0.0);
        add_node(&mut c, 2, 0.001, 0.0);
        let mut way = bidirectional("A");
        way.classes.push("ferry".to_owned());
        assert!(c.process_way(&raw_way(1, &[1, 2]), &way).is_err());
    }

    #[test]
    fn annotations_are_deduplicated() {
        let mut c = containers();
        for id in 1..=4 {
            add_node(&mut c, id, id as f64 * 0.001, 0.0);
        }
        c.process_way(&raw_way(1, &[1, 2]), &bidirectional("Same")).unwrap();
        c.process_way(&raw_way(2, &[3, 4]), &bidirectional("Same")).unwrap();

        let prepared = c.prepare().unwrap();
        assert_eq!(prepared.annotations.len(), 1);
        assert_eq!(prepared.compressed_edges[0].annotation_id, 0);
        assert_eq!(prepared.compressed_edges[1].annotation_id, 0);
        assert_eq!(prepared.annotations[0].travel_mode, TRAVEL_MODE_DRIVING);
    }
}
