use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageBuffer, Rgb};
use visiontrain::engine::memory::MemoryEngine;
use visiontrain::engine::{ToolKind, TrainingEngine};
use visiontrain::pipeline::Stage;
use visiontrain::stages;

/// A small decoded test image.
pub fn test_image() -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(16, 16, |_, _| Rgb([200u8, 30u8, 30u8])))
}

/// Writes a 16x16 image into `dir` under `name`; the encoding follows
/// the file extension.
pub fn write_image(dir: &Path, name: &str) -> PathBuf {
    let img = ImageBuffer::from_fn(16, 16, |_, _| Rgb([200u8, 30u8, 30u8]));
    let path = dir.join(name);
    img.save(&path).expect("Failed to save test image");
    path
}

/// Writes a file that carries an image extension but is not an image.
pub fn write_corrupt_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"definitely not image data").expect("Failed to write corrupt file");
    path
}

/// Writes a manifest in the production format: one View per entry, with
/// the five geometry fields as comma-decimal text.
pub fn write_manifest(path: &Path, views: &[(&str, [&str; 5])]) {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<Views>\n");
    for (id, fields) in views {
        xml.push_str(&format!(
            "  <View view_id=\"{id}\">\n    <Pos_x>{}</Pos_x>\n    <Pos_y>{}</Pos_y>\n    \
             <Angle>{}</Angle>\n    <Width>{}</Width>\n    <Height>{}</Height>\n  </View>\n",
            fields[0], fields[1], fields[2], fields[3], fields[4]
        ));
    }
    xml.push_str("</Views>\n");
    fs::write(path, xml).expect("Failed to write manifest");
}

/// A MemoryEngine preloaded with the given sample names.
pub fn engine_with_samples(names: &[&str]) -> MemoryEngine {
    let mut engine = MemoryEngine::new("test");
    let img = test_image();
    for name in names {
        engine.add_image(name, &img).expect("Failed to add sample");
    }
    engine
}

/// A single localization stage annotated from `entries`, with no
/// children. The smallest plan the driver will run.
pub fn locate_stage(entries: Vec<visiontrain::ManifestEntry>) -> Stage {
    Stage::new("Locate", ToolKind::Locate, stages::locate_config())
        .with_annotations(entries, stages::FEATURE_NAME)
}

/// A manifest entry with plain geometry for `sample`.
pub fn entry(sample: &str) -> visiontrain::ManifestEntry {
    visiontrain::ManifestEntry {
        sample: sample.to_string(),
        position: visiontrain::Point::new(8.0, 8.0),
        angle: 0.0,
        size: visiontrain::Size::new(4.0, 4.0),
    }
}
