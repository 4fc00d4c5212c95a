//! End-to-end scenarios: containers through preparation, graph building,
//! expansion, component labeling, spatial indexing and artifact writes.

use std::collections::HashSet;

use waymill::containers::{ExtractionContainers, PreparedContainers};
use waymill::ebg::{build_edge_expanded_graph, EdgeExpandedGraph};
use waymill::formats;
use waymill::geo::Coordinate;
use waymill::nbg::NodeBasedGraphFactory;
use waymill::profile::{ClassesMap, ExtractedNode, ExtractedWay, Profile};
use waymill::profiles::CarProfile;
use waymill::reader::{RawNode, RawWay, TagMap};
use waymill::restrictions::{remove_invalid_restrictions, InputRestriction, RestrictionVia};
use waymill::scc;
use waymill::segregated::find_segregated_edges;
use waymill::spatial;
use waymill::classes::RoadPriorityClass;

struct Network {
    containers: ExtractionContainers,
}

impl Network {
    fn new() -> Self {
        Self {
            containers: ExtractionContainers::new(ClassesMap::new(), false),
        }
    }

    fn node(&mut self, id: i64, lon: f64, lat: f64) -> &mut Self {
        self.raw_node(id, lon, lat, ExtractedNode::default())
    }

    fn raw_node(&mut self, id: i64, lon: f64, lat: f64, extracted: ExtractedNode) -> &mut Self {
        let node = RawNode {
            id,
            coord: Coordinate::from_degrees(lon, lat),
            tags: TagMap::default(),
        };
        self.containers.process_node(&node, &extracted);
        self
    }

    fn way(&mut self, id: i64, nodes: &[i64], extracted: ExtractedWay) -> &mut Self {
        let way = RawWay {
            id,
            node_ids: nodes.to_vec(),
            node_locations: vec![None; nodes.len()],
            tags: TagMap::default(),
        };
        self.containers.process_way(&way, &extracted).unwrap();
        self
    }

    fn restriction(&mut self, restriction: InputRestriction) -> &mut Self {
        self.containers.process_restriction(restriction);
        self
    }

    fn prepare(self) -> PreparedContainers {
        self.containers.prepare().unwrap()
    }
}

fn street(name: &str) -> ExtractedWay {
    ExtractedWay {
        name: name.to_owned(),
        forward_speed: 36.0,
        backward_speed: 36.0,
        ..ExtractedWay::default()
    }
}

fn oneway_primary(name: &str) -> ExtractedWay {
    ExtractedWay {
        name: name.to_owned(),
        forward_speed: 50.0,
        backward_speed: 0.0,
        priority_class: RoadPriorityClass::Primary,
        ..ExtractedWay::default()
    }
}

fn expand(prepared: PreparedContainers) -> (NodeBasedGraphFactory, EdgeExpandedGraph) {
    let profile = CarProfile;
    let properties = profile.base_properties();
    let mut factory = NodeBasedGraphFactory::build(prepared).unwrap();
    let segregated = find_segregated_edges(&factory);
    let restrictions = remove_invalid_restrictions(
        std::mem::take(&mut factory.turn_restrictions),
        &factory.graph,
    );
    let conditionals = remove_invalid_restrictions(
        std::mem::take(&mut factory.conditional_turn_restrictions),
        &factory.graph,
    );
    let ebg = build_edge_expanded_graph(
        &mut factory,
        &restrictions,
        &conditionals,
        &segregated,
        &profile,
        &properties,
    )
    .unwrap();
    (factory, ebg)
}

fn no_left_turn(from_way: i64, via_node: i64, to_way: i64) -> InputRestriction {
    InputRestriction {
        relation_id: 900,
        from_way,
        via: RestrictionVia::Node(via_node),
        to_way,
        is_only: false,
        condition: None,
    }
}

fn two_way_street() -> Network {
    let mut network = Network::new();
    network
        .node(1, 13.3880, 52.5170)
        .node(2, 13.3881, 52.5170)
        .way(1, &[1, 2], street("Main"));
    network
}

fn t_intersection() -> Network {
    let mut network = Network::new();
    network
        .node(1, 13.0, 52.0)
        .node(2, 13.001, 52.0)
        .node(3, 13.001, 52.001)
        .way(1, &[1, 2], street("Main"))
        .way(2, &[2, 3], street("Side"));
    network
}

#[test]
fn two_way_street_produces_one_compressed_edge_and_two_nodes() {
    let prepared = two_way_street().prepare();
    assert_eq!(prepared.compressed_edges.len(), 1);
    assert_eq!(prepared.coordinates.len(), 2);

    let (_, ebg) = expand(prepared);
    assert_eq!(ebg.num_nodes(), 2);
    assert_eq!(ebg.segments.len(), 1);
    assert!(ebg.segments[0].forward_segment_id.enabled);
    assert!(ebg.segments[0].reverse_segment_id.enabled);
    assert!(ebg.node_is_startpoint.iter().all(|&s| s));

    // both directed halves land in one component through the mate edge,
    // and the pair is tiny under a threshold of 3
    let labels = scc::find_components(ebg.num_nodes(), &ebg.edges, &ebg.segments, 3);
    assert_eq!(labels.component_id[0], labels.component_id[1]);
    assert!(labels.is_tiny.iter().all(|&t| t));
}

#[test]
fn t_intersection_without_restrictions_has_four_turns() {
    let (_, ebg) = expand(t_intersection().prepare());
    assert_eq!(ebg.num_nodes(), 4);
    assert_eq!(ebg.edges.len(), 4);
    for edge in &ebg.edges {
        assert!((edge.source as usize) < ebg.num_nodes());
        assert!((edge.target as usize) < ebg.num_nodes());
        assert!(edge.weight >= 1);
    }
    assert!(ebg.conditional_restrictions.is_empty());
}

#[test]
fn names_survive_into_the_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let prepared = t_intersection().prepare();
    let path = dir.path().join("map.names");
    formats::write_names(&path, &prepared.name_table).unwrap();
    let table = formats::read_names(&path).unwrap();
    let names: Vec<&str> = (0..table.len() as u32).map(|id| table.get(id)).collect();
    assert!(names.contains(&"Main"));
    assert!(names.contains(&"Side"));
}

#[test]
fn node_restriction_removes_exactly_the_forbidden_turn() {
    let baseline = expand(t_intersection().prepare()).1;

    let mut network = t_intersection();
    network.restriction(no_left_turn(1, 2, 2));
    let prepared = network.prepare();
    assert_eq!(prepared.turn_restrictions.len(), 1);
    let restricted = expand(prepared).1;

    assert_eq!(restricted.edges.len(), baseline.edges.len() - 1);
    let baseline_turns: HashSet<_> = baseline.turn_index.iter().copied().collect();
    let restricted_turns: HashSet<_> = restricted.turn_index.iter().copied().collect();
    let removed: Vec<_> = baseline_turns.difference(&restricted_turns).collect();
    assert_eq!(removed, vec![&(0, 1, 2)]);
}

#[test]
fn divided_carriageway_connector_is_segregated() {
    let mut network = Network::new();
    network
        .node(1, 13.0, 52.0005)
        .node(3, 13.001, 52.0005)
        .node(2, 13.002, 52.0005)
        .node(5, 13.002, 52.0004)
        .node(4, 13.001, 52.0004)
        .node(6, 13.0, 52.0004)
        .way(10, &[1, 3], oneway_primary("Broadway"))
        .way(11, &[3, 2], oneway_primary("Broadway"))
        .way(20, &[5, 4], oneway_primary("Broadway"))
        .way(21, &[4, 6], oneway_primary("Broadway"))
        .way(30, &[3, 4], {
            let mut connector = oneway_primary("Broadway");
            connector.backward_speed = 50.0;
            connector
        });
    let factory = NodeBasedGraphFactory::build(network.prepare()).unwrap();
    let segregated = find_segregated_edges(&factory);
    assert!(!segregated.is_empty());
    for &edge_id in &segregated {
        let edge = factory.graph.edge(edge_id);
        let length = factory.edge_length(edge.data.geometry_id);
        // about 11 m of connector, well under the primary/primary threshold
        // of 40
        assert!(length < 40.0);
    }
}

#[test]
fn isolated_ways_form_a_tiny_component() {
    let mut network = Network::new();
    network
        // a connected square
        .node(1, 13.0, 52.0)
        .node(2, 13.001, 52.0)
        .node(3, 13.001, 52.001)
        .node(4, 13.0, 52.001)
        .way(1, &[1, 2], street("A"))
        .way(2, &[2, 3], street("B"))
        .way(3, &[3, 4], street("C"))
        .way(4, &[4, 1], street("D"))
        // a far-away island of two stub ways
        .node(10, 14.0, 53.0)
        .node(11, 14.001, 53.0)
        .node(12, 14.002, 53.0)
        .way(30, &[10, 11], street("Island"))
        .way(31, &[11, 12], street("Island"));
    let (_, ebg) = expand(network.prepare());

    let labels = scc::find_components(ebg.num_nodes(), &ebg.edges, &ebg.segments, 5);
    let island_nodes: Vec<usize> = ebg
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.source >= 4 || n.target >= 4)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(island_nodes.len(), 4);
    let island_component = labels.component_id[island_nodes[0]];
    for &i in &island_nodes {
        assert_eq!(labels.component_id[i], island_component);
        assert!(labels.is_tiny[i]);
    }
    // the 8-node square is not tiny under the same threshold
    let mainland = ebg
        .nodes
        .iter()
        .enumerate()
        .find(|(_, n)| n.source < 4 && n.target < 4)
        .map(|(i, _)| i)
        .unwrap();
    assert!(!labels.is_tiny[mainland]);
    assert_ne!(labels.component_id[mainland], island_component);
}

#[test]
fn conditional_restriction_survives_with_its_condition() {
    let baseline = expand(t_intersection().prepare()).1;

    let mut network = t_intersection();
    let mut conditional = no_left_turn(1, 2, 2);
    conditional.condition = Some("(Mo-Fr 07:00-19:00)".to_owned());
    network.restriction(conditional);
    let prepared = network.prepare();
    assert!(prepared.turn_restrictions.is_empty());
    assert_eq!(prepared.conditional_turn_restrictions.len(), 1);

    let (_, ebg) = expand(prepared);
    // the unconditional turn set is unchanged
    assert_eq!(ebg.edges.len(), baseline.edges.len());
    assert_eq!(ebg.conditional_restrictions.len(), 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.osrm.restrictions");
    formats::write_conditional_restrictions(&path, &ebg.conditional_restrictions).unwrap();
    let records = formats::read_conditional_restrictions(&path).unwrap();
    assert_eq!(records[0].condition, "(Mo-Fr 07:00-19:00)");
}

#[test]
fn empty_relations_still_produce_a_restrictions_header() {
    let dir = tempfile::tempdir().unwrap();
    let (_, ebg) = expand(t_intersection().prepare());
    let path = dir.path().join("map.osrm.restrictions");
    formats::write_conditional_restrictions(&path, &ebg.conditional_restrictions).unwrap();
    assert!(formats::read_conditional_restrictions(&path).unwrap().is_empty());
}

#[test]
fn spatial_index_covers_startpoint_segments() {
    let (factory, ebg) = expand(t_intersection().prepare());
    let mut segments = ebg.segments.clone();
    let rtree = spatial::filter_and_build_rtree(
        &mut segments,
        &ebg.node_is_startpoint,
        &factory.coordinates,
    )
    .unwrap();
    assert_eq!(rtree.size(), 2);

    let dir = tempfile::tempdir().unwrap();
    let ram = dir.path().join("map.osrm.ramIndex");
    let file = dir.path().join("map.osrm.fileIndex");
    formats::write_rtree(&ram, &file, &segments, &factory.coordinates).unwrap();
    assert!(ram.exists() && file.exists());
}

#[test]
fn artifact_writes_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let write_all = |tag: &str| {
        let prepared = t_intersection().prepare();
        let names_path = dir.path().join(format!("{tag}.names"));
        formats::write_names(&names_path, &prepared.name_table).unwrap();
        let intermediate_path = dir.path().join(format!("{tag}.osrm"));
        formats::write_intermediate(
            &intermediate_path,
            &formats::IntermediateDataRef {
                coordinates: &prepared.coordinates,
                osm_node_ids: &prepared.osm_node_ids,
                compressed_edges: &prepared.compressed_edges,
                turn_restrictions: &prepared.turn_restrictions,
                conditional_turn_restrictions: &prepared.conditional_turn_restrictions,
            },
        )
        .unwrap();
        let (factory, ebg) = expand(prepared);
        let ebg_path = dir.path().join(format!("{tag}.osrm.ebg"));
        formats::write_edge_based_graph(&ebg_path, ebg.num_nodes(), &ebg.edges).unwrap();
        let geometry_path = dir.path().join(format!("{tag}.osrm.geometry"));
        formats::write_geometry(&geometry_path, &factory.compressed).unwrap();
        (names_path, intermediate_path, ebg_path, geometry_path)
    };
    let first = write_all("a");
    let second = write_all("b");
    for (a, b) in [
        (&first.0, &second.0),
        (&first.1, &second.1),
        (&first.2, &second.2),
        (&first.3, &second.3),
    ] {
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }
}

#[test]
fn intermediate_artifact_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let prepared = t_intersection().prepare();
    let path = dir.path().join("map.osrm");
    formats::write_intermediate(
        &path,
        &formats::IntermediateDataRef {
            coordinates: &prepared.coordinates,
            osm_node_ids: &prepared.osm_node_ids,
            compressed_edges: &prepared.compressed_edges,
            turn_restrictions: &prepared.turn_restrictions,
            conditional_turn_restrictions: &prepared.conditional_turn_restrictions,
        },
    )
    .unwrap();
    let recovered = formats::read_intermediate(&path).unwrap();
    assert_eq!(recovered.coordinates, prepared.coordinates);
    assert_eq!(recovered.osm_node_ids, prepared.osm_node_ids);
    assert_eq!(recovered.compressed_edges.len(), prepared.compressed_edges.len());
}

#[test]
fn profile_properties_artifact_reserves_exclude_index_zero() {
    let dir = tempfile::tempdir().unwrap();
    let properties = CarProfile.base_properties();
    let path = dir.path().join("map.osrm.properties");
    formats::write_properties(&path, &properties).unwrap();
    assert!(path.exists());
    assert_eq!(properties.excludable()[0], 0);
}
