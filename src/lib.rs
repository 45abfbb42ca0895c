pub mod engine;
pub mod error;
pub mod export;
pub mod ingest;
pub mod manifest;
pub mod masks;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod stages;

pub use engine::{MemoryEngine, ToolId, ToolKind, TrainingEngine, TrainingProgress};
pub use error::{EngineError, ExportError, IngestError, ManifestError, PipelineError, Result};
pub use export::{ExportSummary, export_runtime};
pub use ingest::{ImageScan, ingest_directory};
pub use manifest::{load_manifest, parse_manifest_str};
pub use masks::{MaskPlan, MaskReport};
pub use models::{Interval, ManifestEntry, Point, Size, StageConfig};
pub use pipeline::{
    CancelToken, IMAGE_EXTENSIONS, LookupPolicy, PipelineDriver, PipelineReport, Stage,
    StageReport, StageState, TrainingPlan,
};
pub use progress::{ChannelSink, ConsoleSink, NullSink, ProgressEvent, ProgressSink};
pub use stages::standard_cascade;
