//! Age-bucket and gender classification over a face crop.
//!
//! Both networks take the same 227×227 mean-subtracted BGR blob and run
//! independent forward passes.

use crate::config::ClassifierConfig;
use crate::network::{Network, NetworkError};
use crate::preprocess::blob_from_image;
use crate::types::{AgeBucket, AttributePrediction, FaceAttributes, Gender};
use image::RgbImage;
use parking_lot::Mutex;
use thiserror::Error;

/// Tolerance for treating a network output as an already-normalized distribution.
const DISTRIBUTION_EPSILON: f32 = 1e-3;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("{network} network returned {actual} scores, expected {expected}")]
    UnexpectedOutputLen {
        network: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{0} network returned non-finite scores")]
    NonFinite(&'static str),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Runs the age and gender networks over a face crop.
pub struct AttributeClassifier {
    age: Mutex<Box<dyn Network>>,
    gender: Mutex<Box<dyn Network>>,
    config: ClassifierConfig,
}

impl AttributeClassifier {
    pub fn new(age: Box<dyn Network>, gender: Box<dyn Network>, config: ClassifierConfig) -> Self {
        Self {
            age: Mutex::new(age),
            gender: Mutex::new(gender),
            config,
        }
    }

    pub fn classify(&self, face: &RgbImage) -> Result<FaceAttributes, ClassifierError> {
        let blob = blob_from_image(face, self.config.input_size, self.config.mean_bgr);

        let gender_scores = self.gender.lock().forward(blob.clone())?;
        let (idx, confidence) = argmax("gender", &gender_scores, Gender::ALL.len())?;
        let gender = AttributePrediction {
            label: Gender::ALL[idx],
            confidence,
        };
        tracing::debug!(raw = ?gender_scores, chosen = %gender.label, "gender prediction");

        let age_scores = self.age.lock().forward(blob)?;
        let (idx, confidence) = argmax("age", &age_scores, AgeBucket::ALL.len())?;
        let age = AttributePrediction {
            label: AgeBucket::ALL[idx],
            confidence,
        };
        tracing::debug!(raw = ?age_scores, chosen = %age.label, "age prediction");

        Ok(FaceAttributes { age, gender })
    }
}

/// Index and probability of the most likely class.
fn argmax(network: &'static str, scores: &[f32], classes: usize) -> Result<(usize, f32), ClassifierError> {
    if scores.len() != classes {
        return Err(ClassifierError::UnexpectedOutputLen {
            network,
            expected: classes,
            actual: scores.len(),
        });
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ClassifierError::NonFinite(network));
    }

    let probs = to_distribution(scores);
    // First maximum wins on ties.
    let mut idx = 0;
    for (i, p) in probs.iter().enumerate().skip(1) {
        if *p > probs[idx] {
            idx = i;
        }
    }

    Ok((idx, probs[idx].clamp(0.0, 1.0)))
}

/// Pass probabilities through untouched; softmax anything else (raw logits).
fn to_distribution(scores: &[f32]) -> Vec<f32> {
    let in_range = scores.iter().all(|s| (0.0..=1.0).contains(s));
    let sum: f32 = scores.iter().sum();
    if in_range && (sum - 1.0).abs() <= DISTRIBUTION_EPSILON {
        return scores.to_vec();
    }
    softmax(scores)
}

fn softmax(x: &[f32]) -> Vec<f32> {
    let max_val = x.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_vals: Vec<f32> = x.iter().map(|v| (v - max_val).exp()).collect();
    let sum: f32 = exp_vals.iter().sum();
    exp_vals.iter().map(|v| v / sum).collect()
}
