//! Face localization with the ResNet-10 SSD detector.
//!
//! The detector emits a `[1, 1, N, 7]` tensor; each row is
//! `[image_id, class_id, confidence, x1, y1, x2, y2]` with corners normalized
//! to [0, 1], so mapping back to the original image is a plain rescale.

use crate::config::{DetectorConfig, SelectionPolicy};
use crate::network::{Network, NetworkError};
use crate::preprocess::blob_from_image;
use crate::types::{BoundingBox, Detection};
use image::RgbImage;
use parking_lot::Mutex;
use std::cmp::Ordering;
use thiserror::Error;

const SSD_ROW_LEN: usize = 7;
const SSD_CONFIDENCE_COL: usize = 2;
const SSD_BOX_COL: usize = 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("malformed detector output: {0}")]
    MalformedOutput(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Finds the single most plausible face in an image.
pub struct FaceLocator {
    network: Mutex<Box<dyn Network>>,
    config: DetectorConfig,
}

impl FaceLocator {
    pub fn new(network: Box<dyn Network>, config: DetectorConfig) -> Self {
        Self {
            network: Mutex::new(network),
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run the detector and return every candidate above the confidence
    /// threshold, best first according to the selection policy.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (width, height) = image.dimensions();
        let blob = blob_from_image(image, self.config.input_size, self.config.mean_bgr);

        let raw = self.network.lock().forward(blob)?;

        let mut candidates = decode_detections(&raw, width, height, self.config.confidence_threshold)?;
        candidates.sort_by(|a, b| rank(b, a, self.config.selection));

        tracing::debug!(
            raw_rows = raw.len() / SSD_ROW_LEN,
            candidates = candidates.len(),
            "face detector pass"
        );

        Ok(candidates)
    }

    /// Select the best face and pad it for the classifiers.
    ///
    /// `Ok(None)` means no candidate passed the threshold.
    pub fn locate(&self, image: &RgbImage) -> Result<Option<Detection>, DetectorError> {
        let (width, height) = image.dimensions();
        let Some(best) = self.detect(image)?.into_iter().next() else {
            tracing::warn!("no face detected above the confidence threshold");
            return Ok(None);
        };

        let (dx, dy) = self.config.padding.margins(best.bbox.width(), best.bbox.height());
        let bbox = best.bbox.expand(dx, dy, width, height);

        tracing::info!(
            confidence = best.confidence,
            left = bbox.left,
            top = bbox.top,
            right = bbox.right,
            bottom = bbox.bottom,
            "face detected"
        );

        Ok(Some(Detection {
            bbox,
            confidence: best.confidence,
        }))
    }
}

/// Turn raw SSD rows into clamped detections above `threshold`.
///
/// Rows whose box collapses after clamping to the image are dropped.
fn decode_detections(
    raw: &[f32],
    width: u32,
    height: u32,
    threshold: f32,
) -> Result<Vec<Detection>, DetectorError> {
    if raw.len() % SSD_ROW_LEN != 0 {
        return Err(DetectorError::MalformedOutput(format!(
            "expected rows of {SSD_ROW_LEN} values, got {} values",
            raw.len()
        )));
    }

    let (w, h) = (width as f32, height as f32);
    let detections = raw
        .chunks_exact(SSD_ROW_LEN)
        .filter(|row| row[SSD_CONFIDENCE_COL] > threshold)
        .filter_map(|row| {
            let b = &row[SSD_BOX_COL..SSD_ROW_LEN];
            let bbox = BoundingBox::from_corners(b[0] * w, b[1] * h, b[2] * w, b[3] * h, width, height)?;
            Some(Detection {
                bbox,
                confidence: row[SSD_CONFIDENCE_COL].clamp(0.0, 1.0),
            })
        })
        .collect();

    Ok(detections)
}

/// Order two candidates; `Greater` means `a` is the better face.
fn rank(a: &Detection, b: &Detection, policy: SelectionPolicy) -> Ordering {
    let by_confidence = a.confidence.total_cmp(&b.confidence);
    let by_area = a.bbox.area().cmp(&b.bbox.area());
    match policy {
        SelectionPolicy::HighestConfidence => by_confidence.then(by_area),
        SelectionPolicy::LargestArea => by_area.then(by_confidence),
    }
}
