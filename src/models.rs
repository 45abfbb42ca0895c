use serde::Serialize;

/// Position of a feature center, in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width/height pair, used both for feature sizes and bounding sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Closed rotation interval in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Full-turn interval, 0..2π.
    pub fn full_turn() -> Self {
        Self::new(0.0, 2.0 * std::f64::consts::PI)
    }
}

/// One ground-truth annotation from the manifest file.
///
/// `sample` must match an ingested image's filename (extension included)
/// for the annotation to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub sample: String,
    pub position: Point,
    pub angle: f64,
    pub size: Size,
}

/// Parameter bundle applied to a tool once, before training.
///
/// Not every knob is meaningful for every tool kind; the engine ignores
/// the ones that do not apply. Optional fields are left unset rather than
/// given a placeholder value.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub feature_size: Size,
    pub rotation: Vec<Interval>,
    pub scaled_features: bool,
    pub oriented_features: bool,
    pub luminance: f64,
    pub contrast: f64,
    pub epochs: u32,
    pub network_model: Option<String>,
    pub color_channels: Option<u32>,
    pub sampling_density: Option<f64>,
    pub auto_threshold: bool,
    /// Per-region score thresholds, e.g. ("defect", 0.4).
    pub region_thresholds: Vec<(String, f64)>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            feature_size: Size::new(50.0, 50.0),
            rotation: Vec::new(),
            scaled_features: false,
            oriented_features: false,
            luminance: 0.05,
            contrast: 0.05,
            epochs: 10,
            network_model: None,
            color_channels: None,
            sampling_density: None,
            auto_threshold: false,
            region_thresholds: Vec::new(),
        }
    }
}

impl StageConfig {
    pub fn with_feature_size(mut self, width: f64, height: f64) -> Self {
        self.feature_size = Size::new(width, height);
        self
    }

    pub fn with_rotation(mut self, interval: Interval) -> Self {
        self.rotation.push(interval);
        self
    }

    pub fn with_epochs(mut self, epochs: u32) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_network_model(mut self, model: impl Into<String>) -> Self {
        self.network_model = Some(model.into());
        self
    }

    pub fn with_region_threshold(mut self, region: impl Into<String>, threshold: f64) -> Self {
        self.region_thresholds.push((region.into(), threshold));
        self
    }
}
