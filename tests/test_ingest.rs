//! Dataset ingestion: extension filtering, fail-fast decoding, and
//! registration keyed by filename.

mod common;

use std::fs;

use common::*;
use visiontrain::IMAGE_EXTENSIONS;
use visiontrain::ingest::{ImageScan, ingest_directory};

#[test]
fn five_mixed_extension_files_yield_three_matches() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "a.jpg");
    write_image(dir.path(), "b.bmp");
    write_image(dir.path(), "c.png");
    fs::write(dir.path().join("d.txt"), "notes")?;
    fs::write(dir.path().join("e.tiff"), "not scanned")?;

    let scan = ImageScan::new(dir.path(), &IMAGE_EXTENSIONS);
    let names: Vec<String> = scan
        .iter()?
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();

    assert_eq!(names.len(), 3);
    for expected in ["a.jpg", "b.bmp", "c.png"] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
    Ok(())
}

#[test]
fn suffix_match_is_case_sensitive() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    fs::write(dir.path().join("shouty.PNG"), "upper case extension")?;

    let scan = ImageScan::new(dir.path(), &IMAGE_EXTENSIONS);
    assert_eq!(scan.iter()?.count(), 0);
    Ok(())
}

#[test]
fn scan_is_restartable() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "a.png");
    write_image(dir.path(), "b.png");

    let scan = ImageScan::new(dir.path(), &IMAGE_EXTENSIONS);
    assert_eq!(scan.iter()?.count(), 2);
    assert_eq!(scan.iter()?.count(), 2);
    Ok(())
}

#[test]
fn ingestion_registers_samples_by_filename() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "good (1).png");
    write_image(dir.path(), "bad_defect (1).png");

    let mut engine = MemoryEngine::new("test");
    let count = ingest_directory(&mut engine, dir.path(), &IMAGE_EXTENSIONS)?;

    assert_eq!(count, 2);
    let sample = engine.sample("good (1).png").expect("sample registered");
    assert_eq!((sample.width, sample.height), (16, 16));
    assert!(engine.sample("bad_defect (1).png").is_some());
    Ok(())
}

#[test]
fn corrupt_image_aborts_ingestion() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "fine.png");
    write_corrupt_image(dir.path(), "broken.png");

    let mut engine = MemoryEngine::new("test");
    let result = ingest_directory(&mut engine, dir.path(), &IMAGE_EXTENSIONS);

    assert!(matches!(result, Err(IngestError::Decode { .. })));
    Ok(())
}

#[test]
fn missing_directory_is_reported() {
    let mut engine = MemoryEngine::new("test");
    let result = ingest_directory(
        &mut engine,
        std::path::Path::new("/definitely/not/here"),
        &IMAGE_EXTENSIONS,
    );
    assert!(matches!(result, Err(IngestError::ReadDir { .. })));
}
