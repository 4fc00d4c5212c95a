//! On-disk artifacts. Every file starts with the 16-byte fingerprint and
//! ends with a CRC-64 footer over everything in between.

pub mod artifacts;
pub mod fingerprint;
pub mod writer;

pub use artifacts::*;
pub use fingerprint::{fingerprint, FINGERPRINT_LENGTH};
pub use writer::{read_artifact, ArtifactWriter};
