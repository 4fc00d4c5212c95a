//! Fatal error kinds surfaced to the user.

use thiserror::Error;

/// Errors that abort an extraction run. Everything else travels as plain
/// `anyhow` context on the failing operation.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The profile declared an illegal class list or used an undeclared
    /// class on a way. Detected before or during ingestion.
    #[error("invalid profile declaration: {0}")]
    InvalidProfileDeclaration(String),

    /// No edges survived parsing; the input or the profile filters
    /// everything away.
    #[error("there are no edges remaining after parsing")]
    InputExhaustedEmpty,

    /// The spatial index builder found no start-point-eligible segments.
    /// Usually a profile that never sets `is_startpoint`.
    #[error("there are no snappable edges left after processing")]
    NoSnappableEdges,

    /// Graph, coordinate array or segment id ranges disagree.
    #[error("inconsistent input: {0}")]
    InconsistentInput(String),

    /// The tag-interpretation collaborator failed.
    #[error("profile runtime error: {0}")]
    ProfileRuntimeError(String),
}
