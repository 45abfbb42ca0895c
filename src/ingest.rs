//! Dataset ingestion.
//!
//! Scans a flat directory for image files by extension and registers each
//! decoded image in the engine's database, keyed by filename (extension
//! included). Ingestion is fail-fast: a partial dataset would silently
//! degrade downstream training, so the first unreadable image aborts the
//! whole batch.

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageReader;

use crate::engine::TrainingEngine;
use crate::error::IngestError;

/// Lazy, restartable, non-recursive scan of a directory.
///
/// Matching is a case-sensitive suffix test against the accepted
/// extensions; order is directory-enumeration order. Each call to
/// [`ImageScan::iter`] starts a fresh traversal.
pub struct ImageScan {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl ImageScan {
    pub fn new(dir: impl Into<PathBuf>, extensions: &[&str]) -> Self {
        Self {
            dir: dir.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn iter(&self) -> Result<impl Iterator<Item = PathBuf> + '_, IngestError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| IngestError::ReadDir {
            path: self.dir.clone(),
            source,
        })?;
        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| self.accepts(path)))
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|ext| name.ends_with(ext))
    }
}

/// Decode and register every matching image under `dir`. Returns the
/// number of samples added.
pub fn ingest_directory(
    engine: &mut dyn TrainingEngine,
    dir: &Path,
    extensions: &[&str],
) -> Result<usize, IngestError> {
    let scan = ImageScan::new(dir, extensions);
    let mut count = 0;
    for path in scan.iter()? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let image = ImageReader::open(&path)
            .map_err(|e| IngestError::Decode {
                path: path.clone(),
                message: e.to_string(),
            })?
            .decode()
            .map_err(|e| IngestError::Decode {
                path: path.clone(),
                message: e.to_string(),
            })?;
        engine
            .add_image(&name, &image)
            .map_err(|source| IngestError::Register { name, source })?;
        count += 1;
    }
    Ok(count)
}
