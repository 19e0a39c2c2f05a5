use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use valmiki_core::{InferenceService, PredictError, Prediction, RegistryStatus};

/// Queued requests allowed per worker before senders wait.
const QUEUE_DEPTH_PER_WORKER: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Predict(#[from] PredictError),
    #[error("prediction timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// A prediction request handed from an async handler to a worker thread.
struct PredictJob {
    image: Vec<u8>,
    reply: oneshot::Sender<Result<Prediction, PredictError>>,
}

/// Clone-safe handle to the inference workers.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<PredictJob>,
    service: InferenceService,
    timeout: Duration,
}

impl EngineHandle {
    pub fn is_ready(&self) -> bool {
        self.service.is_ready()
    }

    pub fn status(&self) -> RegistryStatus {
        self.service.registry().status()
    }

    /// Run the pipeline on a worker thread, bounded by the request timeout.
    pub async fn predict(&self, image: Vec<u8>) -> Result<Prediction, EngineError> {
        let job = async {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.tx
                .send(PredictJob {
                    image,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            let prediction = reply_rx.await.map_err(|_| EngineError::ChannelClosed)??;
            Ok::<_, EngineError>(prediction)
        };

        tokio::time::timeout(self.timeout, job)
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
    }
}

/// Spawn `workers` dedicated OS threads that share one request queue.
///
/// Workers exit once every [`EngineHandle`] has been dropped.
pub fn spawn_engine(
    service: InferenceService,
    workers: usize,
    timeout: Duration,
) -> std::io::Result<EngineHandle> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<PredictJob>(workers * QUEUE_DEPTH_PER_WORKER);
    let rx = Arc::new(Mutex::new(rx));

    for id in 0..workers {
        let rx = Arc::clone(&rx);
        let service = service.clone();
        std::thread::Builder::new()
            .name(format!("valmiki-engine-{id}"))
            .spawn(move || {
                tracing::info!(worker = id, "engine thread started");
                loop {
                    let job = rx.lock().blocking_recv();
                    let Some(job) = job else { break };

                    if job.reply.is_closed() {
                        tracing::debug!(worker = id, "caller went away; skipping queued request");
                        continue;
                    }

                    let result = panic::catch_unwind(AssertUnwindSafe(|| service.predict(&job.image)))
                        .unwrap_or_else(|_| {
                            tracing::error!(worker = id, "prediction panicked; worker continues");
                            Err(PredictError::InferenceError("panic in engine worker".into()))
                        });
                    let _ = job.reply.send(result);
                }
                tracing::info!(worker = id, "engine thread exiting");
            })?;
    }

    tracing::info!(workers, timeout = ?timeout, "inference engine started");

    Ok(EngineHandle {
        tx,
        service,
        timeout,
    })
}
