//! Region mask application.
//!
//! Mask files are matched to labeled samples by verbatim filename. The
//! batch is partial-failure tolerant: an unmatched file is skipped
//! silently and a mask the engine rejects is logged and skipped, so one
//! bad mask never aborts the rest.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use tracing::warn;

use crate::engine::{ToolId, TrainingEngine};
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressSink};

/// Where the masks live and which samples may receive one.
#[derive(Debug, Clone)]
pub struct MaskPlan {
    pub directory: PathBuf,
    /// Region name the masks are attached under.
    pub region: String,
    /// Engine filter selecting the eligible (defect-labeled) samples.
    pub eligible: String,
}

impl MaskPlan {
    pub fn new(
        directory: impl Into<PathBuf>,
        region: impl Into<String>,
        eligible: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            region: region.into(),
            eligible: eligible.into(),
        }
    }
}

/// Per-batch outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskReport {
    pub applied: usize,
    pub unmatched: usize,
    pub failed: usize,
}

/// Apply every mask under `plan.directory` to its matching eligible
/// sample. `eligible` is the engine's listing for the plan's filter,
/// resolved by the caller.
pub fn apply_region_masks(
    engine: &mut dyn TrainingEngine,
    tool: ToolId,
    plan: &MaskPlan,
    eligible: &[String],
    sink: &dyn ProgressSink,
) -> Result<MaskReport, IngestError> {
    let eligible: HashSet<&str> = eligible.iter().map(String::as_str).collect();
    let entries = fs::read_dir(&plan.directory).map_err(|source| IngestError::ReadDir {
        path: plan.directory.clone(),
        source,
    })?;

    let mut report = MaskReport::default();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            continue;
        };

        if !eligible.contains(name.as_str()) {
            report.unmatched += 1;
            sink.on_event(&ProgressEvent::MaskUnmatched { file: name });
            continue;
        }

        let mask = match load_mask(&path) {
            Ok(mask) => mask,
            Err(message) => {
                warn!(file = %name, error = %message, "mask image unreadable");
                report.failed += 1;
                sink.on_event(&ProgressEvent::MaskFailed {
                    sample: name,
                    message,
                });
                continue;
            }
        };

        match engine.set_region_mask(tool, &name, &plan.region, &mask) {
            Ok(()) => {
                report.applied += 1;
                sink.on_event(&ProgressEvent::MaskApplied { sample: name });
            }
            Err(e) => {
                warn!(sample = %name, error = %e, "engine rejected region mask");
                report.failed += 1;
                sink.on_event(&ProgressEvent::MaskFailed {
                    sample: name,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

fn load_mask(path: &Path) -> Result<DynamicImage, String> {
    let reader = ImageReader::open(path).map_err(|e| e.to_string())?;
    reader.decode().map_err(|e| e.to_string())
}
