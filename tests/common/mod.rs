mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from visiontrain for tests
pub use visiontrain::{
    CancelToken, EngineError, ExportError, IngestError, LookupPolicy, ManifestEntry,
    ManifestError, MemoryEngine, PipelineDriver, PipelineError, Stage, ToolKind, TrainingEngine,
    TrainingPlan,
};
