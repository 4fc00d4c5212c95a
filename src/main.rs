use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use waymill::{profiles, Extractor, ExtractorConfig};

#[derive(Parser)]
#[command(name = "waymill")]
#[command(about = "OSM to edge-expanded routing graph extractor", long_about = None)]
struct Cli {
    /// Input OSM PBF file
    input: PathBuf,

    /// Output base path; artifact suffixes like .osrm.ebg are appended
    #[arg(short, long)]
    output: PathBuf,

    /// Compiled-in profile name
    #[arg(long, default_value = "car")]
    profile: String,

    /// Worker threads (0 = all cores)
    #[arg(short, long, default_value = "0")]
    threads: usize,

    /// Parse conditional turn restrictions into the sidecar
    #[arg(long)]
    parse_conditionals: bool,

    /// Skip the node-location cache stage even for location-dependent
    /// profiles
    #[arg(long)]
    no_locations_cache: bool,

    /// Components strictly smaller than this are flagged tiny
    #[arg(long, default_value = "1000")]
    small_component_size: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = ExtractorConfig::new(cli.input, cli.output);
    config.profile = cli.profile;
    config.requested_num_threads = cli.threads;
    config.parse_conditionals = cli.parse_conditionals;
    config.use_locations_cache = !cli.no_locations_cache;
    config.small_component_size = cli.small_component_size;

    let profile = profiles::by_name(&config.profile)
        .ok_or_else(|| anyhow!("unknown profile {:?}", config.profile))?;

    let summary = Extractor::new(config).run(profile.as_ref())?;

    println!();
    println!("Nodes: {}", summary.nodes);
    println!("Ways: {}", summary.ways);
    println!("Relations: {}", summary.relations);
    println!("Restrictions: {}", summary.restrictions);
    println!("Edge-based nodes: {}", summary.edge_based_nodes);
    println!("Edge-based edges: {}", summary.edge_based_edges);
    println!("Components: {}", summary.components);
    println!("Indexed segments: {}", summary.segments);
    Ok(())
}
