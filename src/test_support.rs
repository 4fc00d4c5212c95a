//! Shared helpers for unit tests: build small synthetic networks through
//! the same container API the pipeline sink uses.

use crate::containers::{ExtractionContainers, PreparedContainers};
use crate::geo::Coordinate;
use crate::nbg::NodeBasedGraphFactory;
use crate::profile::{ClassesMap, ExtractedNode, ExtractedWay};
use crate::reader::{RawNode, RawWay, TagMap};

pub(crate) fn raw_node(id: i64, lon: f64, lat: f64) -> RawNode {
    RawNode {
        id,
        coord: Coordinate::from_degrees(lon, lat),
        tags: TagMap::default(),
    }
}

pub(crate) fn raw_way(id: i64, nodes: &[i64]) -> RawWay {
    RawWay {
        id,
        node_ids: nodes.to_vec(),
        node_locations: vec![None; nodes.len()],
        tags: TagMap::default(),
    }
}

pub(crate) fn bidirectional(name: &str) -> ExtractedWay {
    ExtractedWay {
        name: name.to_owned(),
        forward_speed: 36.0,
        backward_speed: 36.0,
        ..ExtractedWay::default()
    }
}

pub(crate) fn oneway(name: &str) -> ExtractedWay {
    ExtractedWay {
        name: name.to_owned(),
        forward_speed: 36.0,
        backward_speed: 0.0,
        ..ExtractedWay::default()
    }
}

pub(crate) struct NetworkBuilder {
    containers: ExtractionContainers,
}

impl NetworkBuilder {
    pub(crate) fn new() -> Self {
        Self {
            containers: ExtractionContainers::new(ClassesMap::new(), false),
        }
    }

    pub(crate) fn node(&mut self, id: i64, lon: f64, lat: f64) -> &mut Self {
        self.containers
            .process_node(&raw_node(id, lon, lat), &ExtractedNode::default());
        self
    }

    pub(crate) fn barrier(&mut self, id: i64, lon: f64, lat: f64) -> &mut Self {
        self.containers.process_node(
            &raw_node(id, lon, lat),
            &ExtractedNode { barrier: true, traffic_signal: false },
        );
        self
    }

    pub(crate) fn signal(&mut self, id: i64, lon: f64, lat: f64) -> &mut Self {
        self.containers.process_node(
            &raw_node(id, lon, lat),
            &ExtractedNode { barrier: false, traffic_signal: true },
        );
        self
    }

    pub(crate) fn way(&mut self, id: i64, nodes: &[i64], extracted: ExtractedWay) -> &mut Self {
        self.containers
            .process_way(&raw_way(id, nodes), &extracted)
            .expect("test way is valid");
        self
    }

    pub(crate) fn prepare(self) -> PreparedContainers {
        self.containers.prepare().expect("prepare succeeds on test input")
    }

    pub(crate) fn factory(self) -> NodeBasedGraphFactory {
        NodeBasedGraphFactory::build(self.prepare()).expect("factory builds on test input")
    }
}
