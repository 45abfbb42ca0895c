//! Standard three-stage cascade and its per-stage parameter defaults.
//!
//! The constants mirror the production toolchain this crate drives:
//! a localization stage finds the oriented feature, an analysis stage
//! scores defects inside it, and a classification stage tags the result
//! categories.

use std::f64::consts::PI;
use std::path::Path;

use crate::engine::ToolKind;
use crate::masks::MaskPlan;
use crate::models::{Interval, ManifestEntry, StageConfig};
use crate::pipeline::Stage;

/// Feature name manifest annotations are stored under.
pub const FEATURE_NAME: &str = "object";

/// Region name defect masks are attached under.
pub const DEFECT_REGION: &str = "defect";

pub fn locate_config() -> StageConfig {
    StageConfig {
        scaled_features: true,
        oriented_features: true,
        ..StageConfig::default()
    }
    .with_feature_size(185.0, 225.0)
    .with_rotation(Interval::full_turn())
    .with_epochs(5)
}

pub fn analyze_config() -> StageConfig {
    StageConfig {
        color_channels: Some(1),
        sampling_density: Some(4.0),
        auto_threshold: true,
        ..StageConfig::default()
    }
    .with_feature_size(25.0, 25.0)
    .with_epochs(40)
    .with_network_model("supervised/small")
    .with_region_threshold(DEFECT_REGION, 0.4)
}

pub fn classify_config() -> StageConfig {
    StageConfig::default()
        .with_feature_size(15.0, 15.0)
        .with_rotation(Interval::new(-0.25 * PI, 0.25 * PI))
        .with_epochs(50)
}

/// Assemble the standard Locate → Analyze → Classify cascade.
///
/// The manifest annotates the localization stage; masks, when a
/// directory is given, attach defect regions to the analysis stage's
/// bad-labeled samples. Each stage's selection filters read the labels
/// its parent produced.
pub fn standard_cascade(manifest: Vec<ManifestEntry>, masks_dir: Option<&Path>) -> Stage {
    let mut analyze = Stage::new("Analyze", ToolKind::Analyze, analyze_config())
        .with_label("'good'", "")
        .with_label("'bad'", DEFECT_REGION)
        .with_training_fraction(0.5);
    if let Some(dir) = masks_dir {
        analyze = analyze.with_masks(MaskPlan::new(dir, DEFECT_REGION, "'bad'"));
    }

    let classify = Stage::new("Classify", ToolKind::Classify, classify_config())
        .with_tag("'defect'", "Defect")
        .with_tag("'trace'", "Trace")
        .with_tag("not labeled", "Good")
        .with_training_fraction(0.6);

    Stage::new("Locate", ToolKind::Locate, locate_config())
        .with_annotations(manifest, FEATURE_NAME)
        .add_child(analyze.add_child(classify))
}
