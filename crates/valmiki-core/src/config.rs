//! Tunable pipeline parameters.
//!
//! Defaults reproduce the reference networks' training setup; every value can
//! be overridden from the daemon configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

// --- Face detector (ResNet-10 SSD, Caffe export) ---
pub const DETECTOR_INPUT_SIZE: u32 = 300;
/// Per-channel mean in B, G, R order.
pub const DETECTOR_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];
pub const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_FACE_PADDING_PX: u32 = 20;

// --- Age / gender classifiers (Levi & Hassner CaffeNet) ---
pub const CLASSIFIER_INPUT_SIZE: u32 = 227;
/// Per-channel mean in B, G, R order.
pub const CLASSIFIER_MEAN_BGR: [f32; 3] = [78.426_34, 87.768_91, 114.895_85];

pub const DEFAULT_INTRA_THREADS: usize = 2;

/// Which candidate wins when the detector reports several faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Highest confidence; equal confidence goes to the larger box.
    #[default]
    HighestConfidence,
    /// Largest box; equal area goes to the higher confidence.
    LargestArea,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "confidence" | "highest_confidence" => Ok(SelectionPolicy::HighestConfidence),
            "area" | "largest_area" => Ok(SelectionPolicy::LargestArea),
            other => Err(format!("unknown selection policy '{other}' (expected 'confidence' or 'area')")),
        }
    }
}

/// Context margin added around the selected face before classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    None,
    /// Fixed margin in pixels on every side.
    Pixels(u32),
    /// Margin as a fraction of the box width (horizontal) and height (vertical).
    Relative(f32),
}

impl Default for Padding {
    fn default() -> Self {
        Padding::Pixels(DEFAULT_FACE_PADDING_PX)
    }
}

impl Padding {
    /// Horizontal and vertical margin for a box of the given size.
    pub fn margins(&self, box_width: u32, box_height: u32) -> (u32, u32) {
        match *self {
            Padding::None => (0, 0),
            Padding::Pixels(px) => (px, px),
            Padding::Relative(ratio) => {
                let ratio = ratio.max(0.0);
                (
                    (box_width as f32 * ratio).round() as u32,
                    (box_height as f32 * ratio).round() as u32,
                )
            }
        }
    }
}

impl FromStr for Padding {
    type Err = String;

    /// Accepts `"none"`, `"20"`, `"20px"` or `"15%"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(Padding::None);
        }
        if let Some(pct) = s.strip_suffix('%') {
            let pct: f32 = pct.trim().parse().map_err(|e| format!("bad padding '{s}': {e}"))?;
            if !(pct.is_finite() && pct >= 0.0) {
                return Err(format!("bad padding '{s}': must be a non-negative percentage"));
            }
            return Ok(Padding::Relative(pct / 100.0));
        }
        let px = s.strip_suffix("px").unwrap_or(s).trim();
        px.parse::<u32>()
            .map(Padding::Pixels)
            .map_err(|e| format!("bad padding '{s}': {e}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub input_size: u32,
    pub mean_bgr: [f32; 3],
    /// Candidates must score strictly above this value.
    pub confidence_threshold: f32,
    pub selection: SelectionPolicy,
    pub padding: Padding,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: DETECTOR_INPUT_SIZE,
            mean_bgr: DETECTOR_MEAN_BGR,
            confidence_threshold: DETECTOR_CONFIDENCE_THRESHOLD,
            selection: SelectionPolicy::default(),
            padding: Padding::default(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("confidence threshold must be a finite value in [0, 1), got {0}")]
    ConfidenceThreshold(f32),
    #[error("relative padding must be finite and non-negative, got {0}")]
    RelativePadding(f32),
    #[error("{0} input size must be non-zero")]
    InputSize(&'static str),
}

impl DetectorConfig {
    /// Reject settings that would silently disable or corrupt detection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.confidence_threshold;
        if !(t.is_finite() && (0.0..1.0).contains(&t)) {
            return Err(ConfigError::ConfidenceThreshold(t));
        }
        if let Padding::Relative(ratio) = self.padding {
            if !(ratio.is_finite() && ratio >= 0.0) {
                return Err(ConfigError::RelativePadding(ratio));
            }
        }
        if self.input_size == 0 {
            return Err(ConfigError::InputSize("detector"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub input_size: u32,
    pub mean_bgr: [f32; 3],
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            input_size: CLASSIFIER_INPUT_SIZE,
            mean_bgr: CLASSIFIER_MEAN_BGR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        if self.classifier.input_size == 0 {
            return Err(ConfigError::InputSize("classifier"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            classifier: ClassifierConfig::default(),
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}
