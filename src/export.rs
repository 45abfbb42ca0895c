//! Runtime workspace export.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::engine::TrainingEngine;
use crate::error::ExportError;

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Persist the workspace, then serialize the deployable runtime variant
/// to `path`. The artifact is streamed into a sibling temp file and
/// renamed into place, so a failed export never leaves a truncated file
/// at the target path.
pub fn export_runtime(
    engine: &mut dyn TrainingEngine,
    path: &Path,
) -> Result<ExportSummary, ExportError> {
    engine.save_workspace()?;

    let tmp = temp_path(path);
    match write_artifact(engine, &tmp) {
        Ok(bytes) => {
            fs::rename(&tmp, path).map_err(|source| ExportError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(ExportSummary {
                path: path.to_path_buf(),
                bytes,
            })
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn write_artifact(engine: &mut dyn TrainingEngine, tmp: &Path) -> Result<u64, ExportError> {
    let mut file = File::create(tmp).map_err(|source| ExportError::Write {
        path: tmp.to_path_buf(),
        source,
    })?;
    let bytes = engine.export_runtime(&mut file)?;
    file.sync_all().map_err(|source| ExportError::Write {
        path: tmp.to_path_buf(),
        source,
    })?;
    Ok(bytes)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "runtime".into());
    name.push(".tmp");
    path.with_file_name(name)
}
