//! Writers for every extraction artifact.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::containers::{AnnotationEntry, CompressedEdge};
use crate::ebg::intersection::IntersectionClassRegistry;
use crate::ebg::{ConditionalRestrictionRecord, EdgeBasedEdge, EdgeBasedNode, EdgeBasedNodeSegment};
use crate::geo::Coordinate;
use crate::names::NameTable;
use crate::nbg::CompressedEdgeContainer;
use crate::profile::{ProfileProperties, TurnPenalty};
use crate::restrictions::TurnRestriction;
use crate::scc::ComponentLabels;
use crate::NodeId;

use super::writer::{read_artifact, ArtifactWriter, BodyReader};

/// `.timestamp`: the dataset timestamp from the input header, or `n/a`.
pub fn write_timestamp(path: &Path, timestamp: &str) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_bytes(timestamp.as_bytes())?;
    writer.finish()
}

/// `.names`: prefix-sum offset table plus the concatenated UTF-8 pool.
pub fn write_names(path: &Path, table: &NameTable) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(table.len())?;
    for &offset in &table.offsets {
        writer.write_u32(offset)?;
    }
    writer.write_count(table.blob.len())?;
    writer.write_bytes(&table.blob)?;
    writer.finish()
}

pub fn read_names(path: &Path) -> Result<NameTable> {
    let body = read_artifact(path)?;
    let mut reader = BodyReader::new(&body);
    let count = reader.read_count()?;
    let mut offsets = Vec::with_capacity(count + 1);
    for _ in 0..=count {
        offsets.push(reader.read_u32()?);
    }
    let blob_len = reader.read_count()?;
    let blob = reader.take(blob_len)?.to_vec();
    Ok(NameTable { offsets, blob })
}

/// Body of the intermediate `.osrm` container file.
#[derive(Serialize)]
pub struct IntermediateDataRef<'a> {
    pub coordinates: &'a [Coordinate],
    pub osm_node_ids: &'a [i64],
    pub compressed_edges: &'a [CompressedEdge],
    pub turn_restrictions: &'a [TurnRestriction],
    pub conditional_turn_restrictions: &'a [TurnRestriction],
}

#[derive(Deserialize)]
pub struct IntermediateData {
    pub coordinates: Vec<Coordinate>,
    pub osm_node_ids: Vec<i64>,
    pub compressed_edges: Vec<CompressedEdge>,
    pub turn_restrictions: Vec<TurnRestriction>,
    pub conditional_turn_restrictions: Vec<TurnRestriction>,
}

/// `.osrm`: prepared edges, coordinates and restriction lists.
pub fn write_intermediate(path: &Path, data: &IntermediateDataRef) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    bincode::serialize_into(&mut writer, data).context("failed to serialize intermediate data")?;
    writer.finish()
}

pub fn read_intermediate(path: &Path) -> Result<IntermediateData> {
    let body = read_artifact(path)?;
    bincode::deserialize(&body).context("failed to deserialize intermediate data")
}

/// `.osrm.nbg_nodes`: coordinates aligned to node ids plus the map-id table.
pub fn write_nbg_nodes(path: &Path, coordinates: &[Coordinate], osm_node_ids: &[i64]) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(coordinates.len())?;
    for coordinate in coordinates {
        writer.write_i32(coordinate.lon)?;
        writer.write_i32(coordinate.lat)?;
    }
    writer.write_count(osm_node_ids.len())?;
    for &osm_id in osm_node_ids {
        writer.write_i64(osm_id)?;
    }
    writer.finish()
}

/// `.osrm.cnbg`: edge count, node count, (from, to) pairs, coordinates.
/// Takes flat pairs so the asynchronous writer can own its inputs.
pub fn write_compressed_node_based_graph(
    path: &Path,
    edges: &[(NodeId, NodeId)],
    coordinates: &[Coordinate],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(edges.len())?;
    writer.write_count(coordinates.len())?;
    for &(from, to) in edges {
        writer.write_u32(from)?;
        writer.write_u32(to)?;
    }
    for coordinate in coordinates {
        writer.write_i32(coordinate.lon)?;
        writer.write_i32(coordinate.lat)?;
    }
    writer.finish()
}

/// `.osrm.geometry`: polyline pool and per-segment cost arrays.
pub fn write_geometry(path: &Path, container: &CompressedEdgeContainer) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    let num_edges = container.num_edges();
    writer.write_count(num_edges)?;
    for &offset in container.offsets() {
        writer.write_u32(offset)?;
    }
    let node_count = *container.offsets().last().unwrap_or(&0) as usize;
    writer.write_count(node_count)?;
    for id in 0..num_edges as u32 {
        for &node in container.geometry(id) {
            writer.write_u32(node)?;
        }
    }
    let cost_arrays: [fn(&CompressedEdgeContainer, u32) -> &[u32]; 4] = [
        CompressedEdgeContainer::forward_weights,
        CompressedEdgeContainer::forward_durations,
        CompressedEdgeContainer::reverse_weights,
        CompressedEdgeContainer::reverse_durations,
    ];
    for accessor in cost_arrays {
        writer.write_count(node_count - num_edges)?;
        for id in 0..num_edges as u32 {
            for &value in accessor(container, id) {
                writer.write_u32(value)?;
            }
        }
    }
    writer.finish()
}

/// `.osrm.ebg_nodes`: per-node annotation references and component labels,
/// plus the annotation side table.
pub fn write_edge_based_nodes(
    path: &Path,
    nodes: &[EdgeBasedNode],
    annotations: &[AnnotationEntry],
    labels: &ComponentLabels,
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(nodes.len())?;
    for (index, node) in nodes.iter().enumerate() {
        writer.write_u32(node.geometry_id)?;
        writer.write_u32(node.annotation_id)?;
        writer.write_u32(labels.component_id[index])?;
        writer.write_u8(u8::from(labels.is_tiny[index]))?;
        writer.write_u8(u8::from(node.is_duplicate))?;
    }
    writer.write_count(annotations.len())?;
    for annotation in annotations {
        writer.write_u32(annotation.name_id)?;
        writer.write_u8(annotation.classes)?;
        writer.write_u8(annotation.travel_mode)?;
        writer.write_u8(u8::from(annotation.is_left_hand_driving))?;
    }
    writer.finish()
}

/// `.osrm.ebg`: node count plus packed edge records.
pub fn write_edge_based_graph(
    path: &Path,
    num_edge_based_nodes: usize,
    edges: &[EdgeBasedEdge],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(num_edge_based_nodes)?;
    writer.write_count(edges.len())?;
    for edge in edges {
        writer.write_u32(edge.source)?;
        writer.write_u32(edge.target)?;
        writer.write_u32(edge.weight)?;
        writer.write_u32(edge.duration)?;
        writer.write_u8(u8::from(edge.forward) | (u8::from(edge.backward) << 1))?;
    }
    writer.finish()
}

/// `.osrm.enw`: edge-based node weights.
pub fn write_node_weights(path: &Path, weights: &[u32]) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(weights.len())?;
    for &weight in weights {
        writer.write_u32(weight)?;
    }
    writer.finish()
}

/// `.osrm.icd`: interned bearing and entry classes plus per-node references.
pub fn write_intersection_classes(
    path: &Path,
    registry: &IntersectionClassRegistry,
    node_classes: &[(u32, u32)],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(registry.bearing_classes().len())?;
    for class in registry.bearing_classes() {
        writer.write_count(class.bearings.len())?;
        for &bearing in &class.bearings {
            writer.write_u16(bearing)?;
        }
    }
    writer.write_count(registry.entry_classes().len())?;
    for &mask in registry.entry_classes() {
        writer.write_u32(mask)?;
    }
    writer.write_count(node_classes.len())?;
    for &(bearing_class, entry_class) in node_classes {
        writer.write_u32(bearing_class)?;
        writer.write_u32(entry_class)?;
    }
    writer.finish()
}

/// `.osrm.restrictions`: conditional restrictions for the query engine,
/// condition strings preserved.
pub fn write_conditional_restrictions(
    path: &Path,
    records: &[ConditionalRestrictionRecord],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(records.len())?;
    for record in records {
        writer.write_u8(u8::from(record.is_only))?;
        writer.write_u32(record.from)?;
        writer.write_count(record.via.len())?;
        for &via in &record.via {
            writer.write_u32(via)?;
        }
        writer.write_u32(record.to)?;
        writer.write_count(record.condition.len())?;
        writer.write_bytes(record.condition.as_bytes())?;
    }
    writer.finish()
}

pub fn read_conditional_restrictions(path: &Path) -> Result<Vec<ConditionalRestrictionRecord>> {
    let body = read_artifact(path)?;
    let mut reader = BodyReader::new(&body);
    let count = reader.read_count()?;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let is_only = reader.read_u8()? != 0;
        let from = reader.read_u32()?;
        let via_len = reader.read_count()?;
        let mut via = Vec::with_capacity(via_len);
        for _ in 0..via_len {
            via.push(reader.read_u32()?);
        }
        let to = reader.read_u32()?;
        let condition_len = reader.read_count()?;
        let condition = String::from_utf8(reader.take(condition_len)?.to_vec())?;
        records.push(ConditionalRestrictionRecord { is_only, from, via, to, condition });
    }
    Ok(records)
}

/// The three turn-penalty side tables: weights, durations, and the
/// (from, via, to) map-id index.
pub fn write_turn_penalties(
    weight_path: &Path,
    duration_path: &Path,
    index_path: &Path,
    penalties: &[TurnPenalty],
    turn_index: &[(NodeId, NodeId, NodeId)],
    osm_node_ids: &[i64],
) -> Result<()> {
    let mut weights = ArtifactWriter::create(weight_path)?;
    weights.write_count(penalties.len())?;
    for penalty in penalties {
        weights.write_u32(penalty.weight)?;
    }
    weights.finish()?;

    let mut durations = ArtifactWriter::create(duration_path)?;
    durations.write_count(penalties.len())?;
    for penalty in penalties {
        durations.write_u32(penalty.duration)?;
    }
    durations.finish()?;

    let mut index = ArtifactWriter::create(index_path)?;
    index.write_count(turn_index.len())?;
    for &(from, via, to) in turn_index {
        index.write_i64(osm_node_ids[from as usize])?;
        index.write_i64(osm_node_ids[via as usize])?;
        index.write_i64(osm_node_ids[to as usize])?;
    }
    index.finish()
}

/// `.osrm.tls`: lane offset array plus mask array.
pub fn write_turn_lanes(path: &Path, offsets: &[u32], masks: &[u16]) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(offsets.len())?;
    for &offset in offsets {
        writer.write_u32(offset)?;
    }
    writer.write_count(masks.len())?;
    for &mask in masks {
        writer.write_u16(mask)?;
    }
    writer.finish()
}

/// `.osrm.properties`: profile properties, class names and excludable masks.
pub fn write_properties(path: &Path, properties: &ProfileProperties) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_count(properties.weight_name.len())?;
    writer.write_bytes(properties.weight_name.as_bytes())?;
    writer.write_u32(properties.u_turn_penalty_ds)?;
    writer.write_u32(properties.traffic_signal_penalty_ds)?;
    let flags = u8::from(properties.use_turn_restrictions)
        | (u8::from(properties.left_hand_driving) << 1)
        | (u8::from(properties.allow_u_turn_at_dead_end) << 2);
    writer.write_u8(flags)?;
    writer.write_count(properties.class_names().len())?;
    for name in properties.class_names() {
        writer.write_count(name.len())?;
        writer.write_bytes(name.as_bytes())?;
    }
    writer.write_count(properties.excludable().len())?;
    for &mask in properties.excludable() {
        writer.write_u8(mask)?;
    }
    writer.finish()
}

const RTREE_LEAF_PAGE_SIZE: usize = 64;

/// `.osrm.ramIndex` + `.osrm.fileIndex`: paged leaf records with an in-RAM
/// table of page bounding boxes.
pub fn write_rtree(
    ram_path: &Path,
    file_path: &Path,
    segments: &[EdgeBasedNodeSegment],
    coordinates: &[Coordinate],
) -> Result<()> {
    let mut leaves = ArtifactWriter::create(file_path)?;
    leaves.write_count(segments.len())?;
    for segment in segments {
        leaves.write_u32(segment.forward_segment_id.id)?;
        leaves.write_u8(u8::from(segment.forward_segment_id.enabled))?;
        leaves.write_u32(segment.reverse_segment_id.id)?;
        leaves.write_u8(u8::from(segment.reverse_segment_id.enabled))?;
        leaves.write_u32(segment.u)?;
        leaves.write_u32(segment.v)?;
        leaves.write_u16(segment.fwd_position)?;
    }
    leaves.finish()?;

    let mut upper = ArtifactWriter::create(ram_path)?;
    let pages = segments.chunks(RTREE_LEAF_PAGE_SIZE);
    upper.write_count(pages.len())?;
    for (page_index, page) in pages.enumerate() {
        let mut min_lon = i32::MAX;
        let mut min_lat = i32::MAX;
        let mut max_lon = i32::MIN;
        let mut max_lat = i32::MIN;
        for segment in page {
            for node in [segment.u, segment.v] {
                let coordinate = coordinates[node as usize];
                min_lon = min_lon.min(coordinate.lon);
                min_lat = min_lat.min(coordinate.lat);
                max_lon = max_lon.max(coordinate.lon);
                max_lat = max_lat.max(coordinate.lat);
            }
        }
        upper.write_i32(min_lon)?;
        upper.write_i32(min_lat)?;
        upper.write_i32(max_lon)?;
        upper.write_i32(max_lat)?;
        upper.write_u64((page_index * RTREE_LEAF_PAGE_SIZE) as u64)?;
        upper.write_u64(page.len() as u64)?;
    }
    upper.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameTableBuilder;

    #[test]
    fn names_survive_the_artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.names");
        let mut builder = NameTableBuilder::new();
        for name in ["Main Street", "Broadway", "Unter den Linden"] {
            builder.intern(name);
        }
        let table = builder.build();
        write_names(&path, &table).unwrap();
        let recovered = read_names(&path).unwrap();
        assert_eq!(recovered, table);
        assert_eq!(recovered.get(1), "Main Street");
    }

    #[test]
    fn rewriting_identical_data_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.names");
        let b = dir.path().join("b.names");
        let mut builder = NameTableBuilder::new();
        builder.intern("Ringstraße");
        let table = builder.build();
        write_names(&a, &table).unwrap();
        write_names(&b, &table).unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn conditional_restrictions_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.osrm.restrictions");
        let records = vec![ConditionalRestrictionRecord {
            is_only: false,
            from: 0,
            via: vec![1],
            to: 2,
            condition: "(Mo-Fr 07:00-19:00)".to_owned(),
        }];
        write_conditional_restrictions(&path, &records).unwrap();
        assert_eq!(read_conditional_restrictions(&path).unwrap(), records);
    }

    #[test]
    fn empty_restrictions_file_has_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.osrm.restrictions");
        write_conditional_restrictions(&path, &[]).unwrap();
        assert!(read_conditional_restrictions(&path).unwrap().is_empty());
        // fingerprint + u64 count + crc footer
        assert_eq!(
            std::fs::read(&path).unwrap().len(),
            super::super::FINGERPRINT_LENGTH + 8 + 8
        );
    }
}
