//! Capability interface for the training engine.
//!
//! Everything the pipeline needs from the vendor engine is expressed here
//! as a single trait keyed by opaque tool handles. The driver depends only
//! on this trait, so a real vendor adapter and the in-memory engine are
//! interchangeable.

pub mod memory;

use std::io::Write;
use std::time::Duration;

use image::DynamicImage;

use crate::error::EngineError;
use crate::models::{Point, Size, StageConfig};

pub use memory::MemoryEngine;

/// Kind of tool a stage wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Feature localization.
    Locate,
    /// Defect analysis over localized features.
    Analyze,
    /// Category tagging.
    Classify,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Locate => "locate",
            ToolKind::Analyze => "analyze",
            ToolKind::Classify => "classify",
        }
    }
}

/// Opaque handle to a tool owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolId(pub(crate) usize);

impl ToolId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Snapshot of a long-running operation's progress.
#[derive(Debug, Clone)]
pub struct TrainingProgress {
    pub description: String,
    pub eta: Option<Duration>,
}

/// The port through which the pipeline drives training.
///
/// `process` and `train` start asynchronous operations; completion is
/// observed exclusively through `wait`, which blocks for at most `timeout`
/// and returns true once the pending operation has finished. Filter
/// strings use the engine's query syntax: `""` selects every sample,
/// `'text'` selects samples whose name contains `text` or whose label or
/// tag equals it, and `not labeled` selects unlabeled samples.
pub trait TrainingEngine {
    /// Register a decoded image in the shared database under `name`
    /// (filename, extension included).
    fn add_image(&mut self, name: &str, image: &DynamicImage) -> Result<(), EngineError>;

    /// Create a tool, optionally chained under a parent tool. A chained
    /// tool sees its parent's dataset filtered by the parent's output.
    fn add_tool(
        &mut self,
        parent: Option<ToolId>,
        name: &str,
        kind: ToolKind,
    ) -> Result<ToolId, EngineError>;

    /// Apply a stage's parameter bundle. Called once per stage, before
    /// training starts.
    fn configure(&mut self, tool: ToolId, config: &StageConfig) -> Result<(), EngineError>;

    /// Start recomputing derived features for the tool's dataset.
    fn process(&mut self, tool: ToolId) -> Result<(), EngineError>;

    /// Start fitting the tool's model from flagged training samples.
    fn train(&mut self, tool: ToolId) -> Result<(), EngineError>;

    /// Block up to `timeout` for the pending operation; true = complete.
    fn wait(&mut self, tool: ToolId, timeout: Duration) -> Result<bool, EngineError>;

    /// Progress of the pending operation, for reporting between polls.
    fn progress(&self, tool: ToolId) -> Result<TrainingProgress, EngineError>;

    /// Sample names visible to the tool, restricted by `filter`.
    fn list_samples(&self, tool: ToolId, filter: &str) -> Result<Vec<String>, EngineError>;

    /// Add or overwrite a named feature annotation on a sample.
    fn set_feature(
        &mut self,
        tool: ToolId,
        sample: &str,
        feature: &str,
        position: Point,
        angle: f64,
        size: Size,
    ) -> Result<(), EngineError>;

    /// Label every sample matching `filter`.
    fn label_samples(&mut self, tool: ToolId, filter: &str, label: &str)
    -> Result<(), EngineError>;

    /// Tag every sample matching `filter`.
    fn tag_samples(&mut self, tool: ToolId, filter: &str, tag: &str) -> Result<(), EngineError>;

    /// Move a fraction of the matching samples into the training set.
    fn select_training_set(
        &mut self,
        tool: ToolId,
        filter: &str,
        fraction: f64,
    ) -> Result<(), EngineError>;

    /// Mark matching samples as eligible for training.
    fn set_train_flag(
        &mut self,
        tool: ToolId,
        filter: &str,
        enabled: bool,
    ) -> Result<(), EngineError>;

    /// Attach a region mask image to a labeled sample.
    fn set_region_mask(
        &mut self,
        tool: ToolId,
        sample: &str,
        region: &str,
        mask: &DynamicImage,
    ) -> Result<(), EngineError>;

    /// Persist the accumulated workspace state.
    fn save_workspace(&mut self) -> Result<(), EngineError>;

    /// Serialize the runtime variant of the workspace into `out`,
    /// returning the number of bytes written.
    fn export_runtime(&mut self, out: &mut dyn Write) -> Result<u64, EngineError>;
}
