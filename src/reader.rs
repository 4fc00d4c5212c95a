//! The map-file reader collaborator: decodes each PBF blob into an owned
//! buffer of typed entities, in document order.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use osmpbf::{BlobDecode, BlobReader, Element};

use crate::geo::Coordinate;

/// Ordered tag list with linear lookup; OSM entities rarely carry more than
/// a handful of tags.
#[derive(Debug, Clone, Default)]
pub struct TagMap(Vec<(String, String)>);

impl TagMap {
    pub fn from_iter<'a>(iter: impl Iterator<Item = (&'a str, &'a str)>) -> Self {
        Self(iter.map(|(k, v)| (k.to_owned(), v.to_owned())).collect())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RawNode {
    pub id: i64,
    pub coord: Coordinate,
    pub tags: TagMap,
}

#[derive(Debug, Clone)]
pub struct RawWay {
    pub id: i64,
    pub node_ids: Vec<i64>,
    /// Filled by the location-cache stage for location-dependent profiles;
    /// `None` entries are nodes the cache has not seen.
    pub node_locations: Vec<Option<Coordinate>>,
    pub tags: TagMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone)]
pub struct RelationMember {
    pub kind: MemberKind,
    pub id: i64,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct RawRelation {
    pub id: i64,
    pub tags: TagMap,
    pub members: Vec<RelationMember>,
}

/// One decoded PBF blob worth of entities.
#[derive(Debug, Default)]
pub struct EntityBuffer {
    pub nodes: Vec<RawNode>,
    pub ways: Vec<RawWay>,
    pub relations: Vec<RawRelation>,
}

impl EntityBuffer {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty() && self.relations.is_empty()
    }
}

/// Streams `EntityBuffer`s out of a PBF file, one per data blob.
pub struct EntityBufferReader {
    blobs: BlobReader<BufReader<File>>,
}

impl EntityBufferReader {
    pub fn open(path: &Path) -> Result<Self> {
        let blobs = BlobReader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self { blobs })
    }
}

impl Iterator for EntityBufferReader {
    type Item = Result<EntityBuffer>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let blob = match self.blobs.next()? {
                Ok(blob) => blob,
                Err(e) => return Some(Err(e.into())),
            };
            match blob.decode() {
                Ok(BlobDecode::OsmData(block)) => {
                    let mut buffer = EntityBuffer::default();
                    for element in block.elements() {
                        match element {
                            Element::Node(node) => buffer.nodes.push(RawNode {
                                id: node.id(),
                                coord: Coordinate::from_degrees(node.lon(), node.lat()),
                                tags: TagMap::from_iter(node.tags()),
                            }),
                            Element::DenseNode(node) => buffer.nodes.push(RawNode {
                                id: node.id(),
                                coord: Coordinate::from_degrees(node.lon(), node.lat()),
                                tags: TagMap::from_iter(node.tags()),
                            }),
                            Element::Way(way) => {
                                let node_ids: Vec<i64> = way.refs().collect();
                                let node_locations = vec![None; node_ids.len()];
                                buffer.ways.push(RawWay {
                                    id: way.id(),
                                    node_ids,
                                    node_locations,
                                    tags: TagMap::from_iter(way.tags()),
                                });
                            }
                            Element::Relation(relation) => {
                                let members = relation
                                    .members()
                                    .map(|member| {
                                        let kind = match member.member_type {
                                            osmpbf::RelMemberType::Node => MemberKind::Node,
                                            osmpbf::RelMemberType::Way => MemberKind::Way,
                                            osmpbf::RelMemberType::Relation => {
                                                MemberKind::Relation
                                            }
                                        };
                                        RelationMember {
                                            kind,
                                            id: member.member_id,
                                            role: member.role().unwrap_or("").to_owned(),
                                        }
                                    })
                                    .collect();
                                buffer.relations.push(RawRelation {
                                    id: relation.id(),
                                    tags: TagMap::from_iter(relation.tags()),
                                    members,
                                });
                            }
                        }
                    }
                    return Some(Ok(buffer));
                }
                // Header blobs carry no entities; skip them.
                Ok(BlobDecode::OsmHeader(_)) | Ok(BlobDecode::Unknown(_)) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Read the dataset timestamp from the file header: the osmosis replication
/// timestamp, rendered the way planet dumps carry it. `None` when the header
/// does not carry one; callers fall back to `n/a`.
pub fn read_header_timestamp(path: &Path) -> Result<Option<String>> {
    let mut blobs =
        BlobReader::from_path(path).with_context(|| format!("failed to open {}", path.display()))?;
    while let Some(blob) = blobs.next() {
        match blob?.decode()? {
            BlobDecode::OsmHeader(header) => {
                return Ok(header
                    .osmosis_replication_timestamp()
                    .and_then(replication_timestamp_string));
            }
            // The header blob precedes all data blobs; hitting data first
            // means there is no header to read.
            BlobDecode::OsmData(_) => return Ok(None),
            BlobDecode::Unknown(_) => continue,
        }
    }
    Ok(None)
}

/// Replication timestamps are epoch seconds in the header; artifacts carry
/// them as ISO-8601 UTC strings.
fn replication_timestamp_string(seconds: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|timestamp| timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Node-location cache: indexes node coordinates as buffers stream by and
/// rewrites way entities to carry resolved locations. Only ever touched from
/// the serial-in-order prepare stage.
#[derive(Debug, Default)]
pub struct LocationCache {
    coords: HashMap<i64, Coordinate>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, buffer: &mut EntityBuffer) {
        for node in &buffer.nodes {
            self.coords.insert(node.id, node.coord);
        }
        for way in &mut buffer.ways {
            for (slot, id) in way.node_locations.iter_mut().zip(&way.node_ids) {
                *slot = self.coords.get(id).copied();
            }
        }
    }

    pub fn get(&self, id: i64) -> Option<Coordinate> {
        self.coords.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}
