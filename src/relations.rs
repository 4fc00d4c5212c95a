//! Relation pre-pass: routing-relevant relations are collected into a
//! membership index before ways are interpreted, so the profile can consult
//! e.g. route relations while processing a member way.

use std::collections::HashMap;

use crate::reader::{MemberKind, RawRelation, RelationMember};

#[derive(Debug, Clone)]
pub struct ExtractionRelation {
    pub id: i64,
    pub attributes: Vec<(String, String)>,
    pub members: Vec<RelationMember>,
}

impl ExtractionRelation {
    pub fn from_raw(raw: &RawRelation) -> Self {
        Self {
            id: raw.id,
            attributes: raw.tags.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
            members: raw.members.clone(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Role of a given member, if the entity is a member at all.
    pub fn role_of(&self, kind: MemberKind, id: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.kind == kind && m.id == id)
            .map(|m| m.role.as_str())
    }
}

/// Membership index over the collected relations. Built per-buffer by the
/// parallel extract stage, merged single-threaded, then read-only.
#[derive(Debug, Default)]
pub struct RelationContainer {
    relations: Vec<ExtractionRelation>,
    way_members: HashMap<i64, Vec<usize>>,
    node_members: HashMap<i64, Vec<usize>>,
}

impl RelationContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, relation: ExtractionRelation) {
        let index = self.relations.len();
        for member in &relation.members {
            match member.kind {
                MemberKind::Way => self.way_members.entry(member.id).or_default().push(index),
                MemberKind::Node => self.node_members.entry(member.id).or_default().push(index),
                MemberKind::Relation => {}
            }
        }
        self.relations.push(relation);
    }

    pub fn merge(&mut self, other: RelationContainer) {
        for relation in other.relations {
            self.add(relation);
        }
    }

    pub fn relations_for_way(&self, way_id: i64) -> impl Iterator<Item = &ExtractionRelation> {
        self.way_members
            .get(&way_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.relations[i])
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::TagMap;

    fn relation(id: i64, way: i64, role: &str) -> RawRelation {
        RawRelation {
            id,
            tags: TagMap::from_iter(vec![("type", "route"), ("route", "road")].into_iter()),
            members: vec![RelationMember {
                kind: MemberKind::Way,
                id: way,
                role: role.to_owned(),
            }],
        }
    }

    #[test]
    fn membership_survives_a_merge() {
        let mut left = RelationContainer::new();
        left.add(ExtractionRelation::from_raw(&relation(1, 100, "forward")));
        let mut right = RelationContainer::new();
        right.add(ExtractionRelation::from_raw(&relation(2, 100, "")));
        right.add(ExtractionRelation::from_raw(&relation(3, 200, "")));
        left.merge(right);

        assert_eq!(left.len(), 3);
        assert_eq!(left.relations_for_way(100).count(), 2);
        assert_eq!(left.relations_for_way(200).count(), 1);
        assert_eq!(left.relations_for_way(300).count(), 0);
        let first = left.relations_for_way(100).next().unwrap();
        assert_eq!(first.role_of(MemberKind::Way, 100), Some("forward"));
    }
}
