use anyhow::Context;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use valmiki_core::{ModelPaths, PipelineConfig};

pub const DEFAULT_REST_PORT: u16 = 8000;
pub const DEFAULT_GRPC_PORT: u16 = 50052;
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Daemon configuration.
///
/// Built from defaults, then an optional TOML file named by `VALMIKI_CONFIG`,
/// then environment variables. Later layers win.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address both listeners bind to.
    pub bind: IpAddr,
    pub rest_port: u16,
    pub grpc_port: u16,
    /// Directory containing the three ONNX model files.
    pub model_dir: PathBuf,
    /// Number of inference worker threads.
    pub workers: usize,
    /// Upper bound on queueing plus inference for one request.
    pub request_timeout_secs: u64,
    /// Largest accepted REST request body.
    pub max_upload_bytes: usize,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            rest_port: DEFAULT_REST_PORT,
            grpc_port: DEFAULT_GRPC_PORT,
            model_dir: valmiki_core::default_model_dir(),
            workers: DEFAULT_WORKERS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    /// Load the file named by `VALMIKI_CONFIG` (if any), then apply the
    /// process environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os("VALMIKI_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values in the merged configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline.validate().context("invalid pipeline configuration")?;
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request timeout must be at least one second");
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Override fields from environment variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        if let Some(v) = env.parse("PORT") {
            self.rest_port = v;
        }
        if let Some(v) = env.parse("GRPC_PORT") {
            self.grpc_port = v;
        }
        if let Some(v) = env.parse("VALMIKI_BIND") {
            self.bind = v;
        }
        if let Some(v) = env.get("VALMIKI_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = env.parse("VALMIKI_WORKERS") {
            self.workers = v;
        }
        if let Some(v) = env.parse("VALMIKI_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v;
        }
        if let Some(v) = env.parse("VALMIKI_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = v;
        }
        if let Some(v) = env.parse("VALMIKI_INTRA_THREADS") {
            self.pipeline.intra_threads = v;
        }

        let detector = &mut self.pipeline.detector;
        if let Some(v) = env.parse("VALMIKI_CONFIDENCE_THRESHOLD") {
            detector.confidence_threshold = v;
        }
        if let Some(v) = env.parse("VALMIKI_FACE_PADDING") {
            detector.padding = v;
        }
        if let Some(v) = env.parse("VALMIKI_SELECTION") {
            detector.selection = v;
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    pub fn rest_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.rest_port)
    }

    pub fn grpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.grpc_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(key)?;
        match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "ignoring invalid environment value");
                None
            }
        }
    }
}
