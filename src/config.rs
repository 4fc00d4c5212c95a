//! Extractor run configuration.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Input PBF file.
    pub input_path: PathBuf,
    /// Base path for every artifact; suffixes like `.osrm.ebg` are appended.
    pub output_base: PathBuf,
    /// Name of a compiled-in profile.
    pub profile: String,
    /// 0 means use the machine's parallelism.
    pub requested_num_threads: usize,
    /// Parse `restriction:conditional` tags into the conditional sidecar.
    pub parse_conditionals: bool,
    /// Run the node-location cache stage when the profile wants geometry.
    pub use_locations_cache: bool,
    /// Components strictly smaller than this are flagged tiny.
    pub small_component_size: usize,
}

impl ExtractorConfig {
    pub fn new(input_path: PathBuf, output_base: PathBuf) -> Self {
        Self {
            input_path,
            output_base,
            profile: "car".to_owned(),
            requested_num_threads: 0,
            parse_conditionals: false,
            use_locations_cache: true,
            small_component_size: 1000,
        }
    }

    /// Artifact path for a suffix, e.g. `path(".osrm.ebg")`.
    pub fn path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .output_base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(suffix);
        self.output_base.with_file_name(name)
    }

    /// Worker count: the minimum of the machine's parallelism and the
    /// requested value (0 = automatic).
    pub fn thread_count(&self) -> usize {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if self.requested_num_threads == 0 {
            hardware
        } else {
            hardware.min(self.requested_num_threads)
        }
    }
}
