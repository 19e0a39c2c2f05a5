//! Engine fixtures backed by scripted networks.

use crate::engine::{spawn_engine, EngineHandle};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use valmiki_core::network::{Network, NetworkError};
use valmiki_core::{InferenceService, ModelKind, ModelRegistry, Padding, PipelineConfig};

/// Detector row covering the white square drawn by [`face_png`].
pub const FACE_ROW: [f32; 7] = [0.0, 1.0, 0.96875, 0.25, 0.25, 0.75, 0.75];

/// Replays fixed SSD rows; panics on the zero-based pass number `panic_on`.
struct Rows {
    rows: Vec<[f32; 7]>,
    calls: Arc<AtomicUsize>,
    panic_on: Option<usize>,
}

impl Network for Rows {
    fn forward(&mut self, _input: Array4<f32>) -> Result<Vec<f32>, NetworkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on == Some(call) {
            panic!("detector blew up on call {call}");
        }
        Ok(self.rows.iter().flatten().copied().collect())
    }
}

/// Bright crops score the first class, dark crops the last.
struct Brightness {
    classes: usize,
    delay: Duration,
}

impl Network for Brightness {
    fn forward(&mut self, input: Array4<f32>) -> Result<Vec<f32>, NetworkError> {
        std::thread::sleep(self.delay);
        let winner = if input.mean().unwrap_or(0.0) > 0.0 { 0 } else { self.classes - 1 };
        let rest = 0.25 / (self.classes - 1) as f32;
        Ok((0..self.classes).map(|i| if i == winner { 0.75 } else { rest }).collect())
    }
}

/// An engine plus the number of detector passes it has run.
pub struct Fixture {
    pub engine: EngineHandle,
    pub detector_calls: Arc<AtomicUsize>,
}

struct Options {
    rows: Vec<[f32; 7]>,
    delay: Duration,
    timeout: Duration,
    workers: usize,
    panic_on: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            rows: vec![FACE_ROW],
            delay: Duration::ZERO,
            timeout: Duration::from_secs(10),
            workers: 2,
            panic_on: None,
        }
    }
}

fn build(opts: Options) -> Fixture {
    let mut config = PipelineConfig::default();
    config.detector.padding = Padding::None;

    let detector_calls = Arc::new(AtomicUsize::new(0));
    let registry = ModelRegistry::new();
    registry
        .initialize_with(&config, |kind| {
            let network: Box<dyn Network> = match kind {
                ModelKind::FaceDetector => Box::new(Rows {
                    rows: opts.rows.clone(),
                    calls: detector_calls.clone(),
                    panic_on: opts.panic_on,
                }),
                ModelKind::AgeClassifier => Box::new(Brightness { classes: 8, delay: opts.delay }),
                ModelKind::GenderClassifier => Box::new(Brightness { classes: 2, delay: opts.delay }),
            };
            Ok(network)
        })
        .unwrap();

    let engine = spawn_engine(InferenceService::new(Arc::new(registry)), opts.workers, opts.timeout).unwrap();
    Fixture { engine, detector_calls }
}

/// Ready engine whose detector always reports `rows`.
pub fn engine(rows: Vec<[f32; 7]>) -> EngineHandle {
    build(Options { rows, ..Options::default() }).engine
}

/// Ready engine whose classifiers take `delay` per pass.
pub fn slow_engine(delay: Duration, timeout: Duration) -> EngineHandle {
    build(Options { delay, timeout, ..Options::default() }).engine
}

/// Single-worker slow engine that counts detector passes.
pub fn counted_slow_engine(delay: Duration, timeout: Duration) -> Fixture {
    build(Options {
        delay,
        timeout,
        workers: 1,
        ..Options::default()
    })
}

/// Single-worker engine whose detector panics on its first pass only.
pub fn panics_once_engine() -> Fixture {
    build(Options {
        workers: 1,
        panic_on: Some(0),
        ..Options::default()
    })
}

/// Engine over a registry whose gender model failed to load.
pub fn unready_engine() -> EngineHandle {
    let registry = ModelRegistry::new();
    let _ = registry.initialize_with(&PipelineConfig::default(), |kind| {
        if kind == ModelKind::GenderClassifier {
            return Err(NetworkError::ModelNotFound("models/gender_net.onnx".into()));
        }
        Ok(Box::new(Brightness { classes: 2, delay: Duration::ZERO }) as Box<dyn Network>)
    });
    spawn_engine(InferenceService::new(Arc::new(registry)), 1, Duration::from_secs(10)).unwrap()
}

/// 128x128 black PNG with a white 64x64 square in the middle.
pub fn face_png() -> Vec<u8> {
    let mut img = RgbImage::from_pixel(128, 128, Rgb([0, 0, 0]));
    for y in 32..96 {
        for x in 32..96 {
            img.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    buf
}
