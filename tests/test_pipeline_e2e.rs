//! Whole-pipeline run: standard cascade over a real temp dataset,
//! manifest, and mask directory, ending in a runtime export.

mod common;

use std::fs;
use std::time::Duration;

use common::*;
use visiontrain::export::export_runtime;
use visiontrain::progress::NullSink;
use visiontrain::{load_manifest, standard_cascade};

#[test]
fn standard_cascade_trains_and_exports() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;

    let images = dir.path().join("images");
    fs::create_dir(&images)?;
    write_image(&images, "good (1).png");
    write_image(&images, "good (2).png");
    write_image(&images, "bad_defect (1).png");

    let regions = dir.path().join("regions");
    fs::create_dir(&regions)?;
    write_image(&regions, "bad_defect (1).png");

    let manifest_path = dir.path().join("labels.xml");
    write_manifest(
        &manifest_path,
        &[
            ("bad_defect (1).png", ["8,0", "8,5", "0,25", "4,0", "4,0"]),
            ("good (1).png", ["7,5", "7,5", "0,0", "4,0", "4,0"]),
        ],
    );

    let entries = load_manifest(&manifest_path)?;
    let plan = TrainingPlan::new(&images, standard_cascade(entries, Some(&regions)));

    let mut engine = MemoryEngine::new("toolchain");
    engine.polls_per_operation = 2;
    let sink = NullSink;
    let report = PipelineDriver::new(&mut engine, &sink)
        .with_poll_interval(Duration::from_millis(1))
        .run(&plan)?;

    assert_eq!(report.images, 3);
    let names: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Locate", "Analyze", "Classify"]);

    assert_eq!(report.stages[0].annotations_applied, 2);
    assert_eq!(report.stages[0].annotations_skipped, 0);

    let masks = report.stages[1].masks.expect("analyze stage applies masks");
    assert_eq!((masks.applied, masks.unmatched, masks.failed), (1, 0, 0));

    for tool in engine.tool_records() {
        assert!(tool.trained, "tool {} not trained", tool.name);
        assert!(tool.config.is_some(), "tool {} not configured", tool.name);
    }

    let bad = engine.sample("bad_defect (1).png").unwrap();
    assert!(bad.features.contains_key("object"));
    assert!(bad.masks.contains_key("defect"));
    assert_eq!(bad.tag.as_deref(), Some("Defect"));
    assert_eq!(
        engine.sample("good (1).png").unwrap().tag.as_deref(),
        Some("Good")
    );

    let out = dir.path().join("runtime.vrws");
    let summary = export_runtime(&mut engine, &out)?;
    assert!(summary.bytes > 0);
    assert!(fs::metadata(&out)?.len() > 0);
    Ok(())
}
