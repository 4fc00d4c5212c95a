//! The extraction driver: parse, prepare, build, expand, label, index.

use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::ExtractorConfig;
use crate::containers::{ExtractionContainers, PreparedContainers};
use crate::ebg::build_edge_expanded_graph;
use crate::error::ExtractionError;
use crate::formats;
use crate::nbg::NodeBasedGraphFactory;
use crate::pipeline::{self, SinkOrdering};
use crate::profile::{
    assign_class_names, assign_excludable_classes, ClassesMap, ExtractedNode, ExtractedWay,
    Profile,
};
use crate::reader::{self, EntityBuffer, EntityBufferReader, LocationCache};
use crate::relations::{ExtractionRelation, RelationContainer};
use crate::restrictions::{remove_invalid_restrictions, InputRestriction, RestrictionParser};
use crate::scc;
use crate::segregated::find_segregated_edges;
use crate::spatial;

#[derive(Debug, Default)]
pub struct ExtractionSummary {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
    pub restrictions: u64,
    pub edge_based_nodes: usize,
    pub edge_based_edges: usize,
    pub components: usize,
    pub segments: usize,
}

/// Joins a writer thread at scope exit; success still requires an explicit
/// `join` so write failures surface after the main pipeline completes.
struct JoinOnDrop {
    handle: Option<JoinHandle<Result<()>>>,
    label: &'static str,
}

impl JoinOnDrop {
    fn spawn(label: &'static str, task: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            handle: Some(std::thread::spawn(task)),
            label,
        }
    }

    fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("{} writer panicked", self.label)),
            },
            None => Ok(()),
        }
    }
}

impl Drop for JoinOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Err(e)) => warn!("{} writer failed: {e:#}", self.label),
                Err(_) => warn!("{} writer panicked", self.label),
                Ok(Ok(())) => {}
            }
        }
    }
}

pub struct Extractor {
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Run the whole extraction: filter and convert the map geometry into
    /// the edge-expanded graph and its sidecar artifacts.
    pub fn run(&self, profile: &dyn Profile) -> Result<ExtractionSummary> {
        let threads = self.config.thread_count();
        info!("input: {}", self.config.input_path.display());
        info!("profile: {}, threads: {}", profile.name(), threads);

        // Validate profile declarations before touching the input.
        let mut properties = profile.base_properties();
        let declared = profile.class_names();
        let mut classes_map = ClassesMap::new();
        assign_class_names(&declared, &mut classes_map, &mut properties)?;

        let total = Instant::now();
        let (prepared, mut summary) = self.parse_osm_data(profile, threads, classes_map)?;

        // Classes discovered on ways (open declaration) get names too.
        if declared.is_empty() {
            for (name, mask) in &prepared.classes_map {
                properties.set_class_name(mask.trailing_zeros() as usize, name);
            }
        }
        assign_excludable_classes(&prepared.classes_map, &profile.excludable_classes(), &mut properties)?;
        formats::write_properties(&self.config.path(".osrm.properties"), &properties)?;

        formats::write_names(&self.config.path(".names"), &prepared.name_table)?;
        formats::write_intermediate(
            &self.config.path(".osrm"),
            &formats::IntermediateDataRef {
                coordinates: &prepared.coordinates,
                osm_node_ids: &prepared.osm_node_ids,
                compressed_edges: &prepared.compressed_edges,
                turn_restrictions: &prepared.turn_restrictions,
                conditional_turn_restrictions: &prepared.conditional_turn_restrictions,
            },
        )?;

        println!("Generating edge-expanded graph representation");
        let expansion = Instant::now();

        let mut factory = NodeBasedGraphFactory::build(prepared)?;

        let segregated_timer = Instant::now();
        let segregated_edges = find_segregated_edges(&factory);
        println!(
            "Segregated edges count = {} ({:.2}s)",
            segregated_edges.len(),
            segregated_timer.elapsed().as_secs_f64()
        );

        formats::write_nbg_nodes(
            &self.config.path(".osrm.nbg_nodes"),
            &factory.coordinates,
            &factory.osm_node_ids,
        )?;

        // The compressed node-based graph dumps to file asynchronously; the
        // guard makes sure we wait for its completion.
        let cnbg_path = self.config.path(".osrm.cnbg");
        let cnbg_edges: Vec<(u32, u32)> = (0..factory.graph.num_edges() as u32)
            .map(|id| {
                let edge = factory.graph.edge(id);
                (edge.source, edge.target)
            })
            .collect();
        let cnbg_coordinates = factory.coordinates.clone();
        let mut cnbg_writer = JoinOnDrop::spawn("compressed node-based graph", move || {
            formats::write_compressed_node_based_graph(&cnbg_path, &cnbg_edges, &cnbg_coordinates)
        });

        let turn_restrictions = remove_invalid_restrictions(
            std::mem::take(&mut factory.turn_restrictions),
            &factory.graph,
        );
        let conditional_restrictions = remove_invalid_restrictions(
            std::mem::take(&mut factory.conditional_turn_restrictions),
            &factory.graph,
        );

        let ebg = build_edge_expanded_graph(
            &mut factory,
            &turn_restrictions,
            &conditional_restrictions,
            &segregated_edges,
            profile,
            &properties,
        )?;
        println!(
            "Expansion: {} nodes, {} edges ({:.2}s)",
            ebg.num_nodes(),
            ebg.edges.len(),
            expansion.elapsed().as_secs_f64()
        );

        formats::write_geometry(&self.config.path(".osrm.geometry"), &factory.compressed)?;
        formats::write_node_weights(&self.config.path(".osrm.enw"), &ebg.node_weights)?;

        let (lane_offsets, lane_masks) = factory.lane_map.to_arrays();
        formats::write_turn_lanes(&self.config.path(".osrm.tls"), &lane_offsets, &lane_masks)?;
        formats::write_turn_penalties(
            &self.config.path(".osrm.turn_weight_penalties"),
            &self.config.path(".osrm.turn_duration_penalties"),
            &self.config.path(".osrm.turn_penalties_index"),
            &ebg.turn_penalties,
            &ebg.turn_index,
            &factory.osm_node_ids,
        )?;
        formats::write_conditional_restrictions(
            &self.config.path(".osrm.restrictions"),
            &ebg.conditional_restrictions,
        )?;
        formats::write_intersection_classes(
            &self.config.path(".osrm.icd"),
            &ebg.registry,
            &ebg.node_classes,
        )?;

        println!("Computing strictly connected components");
        let labels = scc::find_components(
            ebg.num_nodes(),
            &ebg.edges,
            &ebg.segments,
            self.config.small_component_size,
        );

        formats::write_edge_based_nodes(
            &self.config.path(".osrm.ebg_nodes"),
            &ebg.nodes,
            &factory.annotations,
            &labels,
        )?;
        formats::write_edge_based_graph(
            &self.config.path(".osrm.ebg"),
            ebg.num_nodes(),
            &ebg.edges,
        )?;

        println!("Building r-tree over {} segments", ebg.segments.len());
        let mut segments = ebg.segments;
        let rtree = spatial::filter_and_build_rtree(
            &mut segments,
            &ebg.node_is_startpoint,
            &factory.coordinates,
        )?;
        formats::write_rtree(
            &self.config.path(".osrm.ramIndex"),
            &self.config.path(".osrm.fileIndex"),
            &segments,
            &factory.coordinates,
        )?;

        // The asynchronous writer must have finished before we can report
        // success.
        cnbg_writer.join()?;

        summary.edge_based_nodes = ebg.nodes.len();
        summary.edge_based_edges = ebg.edges.len();
        summary.components = labels.num_components();
        summary.segments = rtree.size();
        println!(
            "Extraction finished after {:.2}s",
            total.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Phase 1 and Phase 2 of ingestion, then container preparation.
    fn parse_osm_data(
        &self,
        profile: &dyn Profile,
        threads: usize,
        classes_map: ClassesMap,
    ) -> Result<(PreparedContainers, ExtractionSummary)> {
        let timestamp = reader::read_header_timestamp(&self.config.input_path)?
            .unwrap_or_else(|| "n/a".to_owned());
        formats::write_timestamp(&self.config.path(".timestamp"), &timestamp)?;

        let mut summary = ExtractionSummary::default();

        // Phase 1: relation pre-pass.
        let mut relations = RelationContainer::new();
        let relation_types = {
            let mut types = profile.relation_types();
            types.sort();
            types
        };
        if !relation_types.is_empty() {
            println!("Parse relations");
            let source = EntityBufferReader::open(&self.config.input_path)?;
            let relation_types = &relation_types;
            pipeline::run(
                source,
                Ok,
                move |buffer: EntityBuffer| -> Result<RelationContainer> {
                    let mut fragment = RelationContainer::new();
                    for relation in &buffer.relations {
                        let matches = relation
                            .tags
                            .get("type")
                            .map(|t| relation_types.binary_search(&t.to_owned()).is_ok())
                            .unwrap_or(false);
                        if matches {
                            fragment.add(ExtractionRelation::from_raw(relation));
                        }
                    }
                    Ok(fragment)
                },
                |fragment: RelationContainer| {
                    summary.relations += fragment.len() as u64;
                    relations.merge(fragment);
                    Ok(())
                },
                threads,
                SinkOrdering::InOrder,
            )
            .context("relation pre-pass failed")?;
        }

        // Phase 2: nodes and ways.
        println!("Parse ways and nodes");
        let parser = RestrictionParser::new(
            profile.restriction_vocabulary(),
            self.config.parse_conditionals,
        );
        let strict_classes = !profile.class_names().is_empty();
        let mut containers = ExtractionContainers::new(classes_map, strict_classes);

        struct ParsedBuffer {
            buffer: EntityBuffer,
            nodes: Vec<(usize, ExtractedNode)>,
            ways: Vec<(usize, ExtractedWay)>,
            restrictions: Vec<InputRestriction>,
        }

        let use_cache =
            profile.has_location_dependent_data() && self.config.use_locations_cache;
        let mut location_cache = LocationCache::new();
        let prepare = move |mut buffer: EntityBuffer| -> Result<EntityBuffer> {
            if use_cache {
                location_cache.apply(&mut buffer);
            }
            Ok(buffer)
        };

        let relations = &relations;
        let parser = &parser;
        let transform = move |buffer: EntityBuffer| -> Result<ParsedBuffer> {
            let profile_error =
                |e: anyhow::Error| ExtractionError::ProfileRuntimeError(format!("{e:#}"));
            let mut nodes = Vec::with_capacity(buffer.nodes.len());
            for (index, node) in buffer.nodes.iter().enumerate() {
                nodes.push((index, profile.process_node(node).map_err(profile_error)?));
            }
            let mut ways = Vec::new();
            for (index, way) in buffer.ways.iter().enumerate() {
                if let Some(extracted) =
                    profile.process_way(way, relations).map_err(profile_error)?
                {
                    ways.push((index, extracted));
                }
            }
            let restrictions = buffer
                .relations
                .iter()
                .filter_map(|relation| parser.parse(relation))
                .collect();
            Ok(ParsedBuffer { buffer, nodes, ways, restrictions })
        };

        let sink = |parsed: ParsedBuffer| -> Result<()> {
            summary.nodes += parsed.buffer.nodes.len() as u64;
            summary.ways += parsed.ways.len() as u64;
            summary.restrictions += parsed.restrictions.len() as u64;
            for (index, extracted) in &parsed.nodes {
                containers.process_node(&parsed.buffer.nodes[*index], extracted);
            }
            for (index, extracted) in &parsed.ways {
                containers.process_way(&parsed.buffer.ways[*index], extracted)?;
            }
            for restriction in parsed.restrictions {
                containers.process_restriction(restriction);
            }
            Ok(())
        };

        let source = EntityBufferReader::open(&self.config.input_path)?;
        pipeline::run(source, prepare, transform, sink, threads, SinkOrdering::InOrder)
            .context("node and way parsing failed")?;

        println!(
            "Raw input contains {} nodes, {} ways, {} relations, {} restrictions",
            summary.nodes, summary.ways, summary.relations, summary.restrictions
        );

        if containers.num_raw_segments() == 0 {
            return Err(ExtractionError::InputExhaustedEmpty.into());
        }

        let prepared = containers.prepare()?;
        Ok((prepared, summary))
    }
}
