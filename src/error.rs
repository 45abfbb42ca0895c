//! Error types for the training toolchain.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing the annotation manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("cannot read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The XML itself is malformed.
    #[error("malformed manifest XML: {0}")]
    Xml(String),

    /// An entry node is missing its sample-name attribute.
    #[error("manifest entry {index} has no sample-name attribute")]
    MissingSampleName { index: usize },

    /// An entry has fewer numeric fields than expected.
    #[error("manifest entry '{sample}' is missing field {field}")]
    MissingField { sample: String, field: &'static str },

    /// A numeric field failed to parse even after normalization.
    #[error("manifest entry '{sample}': field {field} has invalid number '{value}'")]
    InvalidNumber {
        sample: String,
        field: &'static str,
        value: String,
    },
}

/// Errors raised while scanning or ingesting the image directory.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The image directory could not be enumerated.
    #[error("cannot read image directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An image file could not be read or decoded. Ingestion is
    /// fail-fast: the first decode failure aborts the whole batch.
    #[error("cannot load image {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    /// The engine rejected a sample registration.
    #[error("engine rejected image {name}: {source}")]
    Register { name: String, source: EngineError },
}

/// Errors reported by a training engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A tool handle does not name a live tool.
    #[error("unknown tool handle {0}")]
    UnknownTool(usize),

    /// A sample name does not exist in the database.
    #[error("unknown sample '{0}'")]
    UnknownSample(String),

    /// The requested operation is invalid in the tool's current state.
    #[error("invalid operation on tool {tool}: {message}")]
    InvalidOperation { tool: usize, message: String },

    /// A failure surfaced by the vendor engine itself.
    #[error("engine error: {0}")]
    Vendor(String),
}

impl EngineError {
    pub fn vendor(message: impl Into<String>) -> Self {
        Self::Vendor(message.into())
    }
}

/// Errors raised while exporting the runtime workspace.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The output location could not be written.
    #[error("cannot write runtime workspace to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The engine failed to serialize the workspace.
    #[error("runtime export failed: {0}")]
    Engine(#[from] EngineError),
}

/// Top-level pipeline failure. Per-item recoverable conditions (lenient
/// lookup misses, individual mask failures) never surface here; they are
/// logged and counted at the loop that encounters them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// A structural engine call failed while running the named stage.
    #[error("stage '{stage}' failed during {operation}: {source}")]
    Stage {
        stage: String,
        operation: &'static str,
        source: EngineError,
    },

    /// Strict lookup policy: a manifest entry had no matching sample.
    #[error("stage '{stage}': manifest entry '{sample}' has no ingested counterpart")]
    LookupMiss { stage: String, sample: String },

    #[error(transparent)]
    Export(#[from] ExportError),

    /// The cancellation token was set while waiting on the engine.
    #[error("cancelled while {0}")]
    Cancelled(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
