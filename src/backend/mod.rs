//! Scoring backends and their load lifecycle
//!
//! A backend turns an encoded sequence into P(phishing). Backends are built
//! by loaders, and each channel owns one `ModelSlot` that keeps the first
//! backend its loader produces. Concurrent requests share the same load, and
//! a failed load is retried by the next request.

pub mod artifact;
pub mod linear;
#[cfg(feature = "onnx")]
pub mod onnx;

use crate::channel::Channel;
use crate::encoder::{EncodedInput, Vocabulary};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell};

/// A trained classifier for one channel.
///
/// Implementations must be safe to call concurrently; every call receives
/// its own encoded buffer.
pub trait ScoringBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Sigmoid output, interpreted as phishing probability
    fn score(&self, input: &EncodedInput) -> PipelineResult<f64>;

    /// Token table for text models. Character models have none.
    fn vocabulary(&self) -> Option<&Vocabulary> {
        None
    }
}

#[async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self, channel: Channel) -> PipelineResult<Arc<dyn ScoringBackend>>;
}

/// Hands out a backend constructed by the caller.
pub struct StaticLoader {
    backend: Arc<dyn ScoringBackend>,
}

impl StaticLoader {
    pub fn new(backend: Arc<dyn ScoringBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl BackendLoader for StaticLoader {
    async fn load(&self, _channel: Channel) -> PipelineResult<Arc<dyn ScoringBackend>> {
        Ok(self.backend.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    Unconfigured,
    Uninitialized,
    Loading,
    Ready,
    LoadFailed,
}

const STATE_UNINITIALIZED: u8 = 0;
const STATE_LOADING: u8 = 1;
const STATE_READY: u8 = 2;
const STATE_FAILED: u8 = 3;

type LoadOutcome = PipelineResult<Arc<dyn ScoringBackend>>;

/// Lazily loaded backend handle for one channel.
///
/// The first caller of `ready` runs the loader; everyone arriving while it
/// runs awaits the same result. Only a loaded backend is kept. After a
/// failure the next caller starts a fresh attempt.
pub struct ModelSlot {
    channel: Channel,
    loader: Option<Arc<dyn BackendLoader>>,
    cell: OnceCell<Arc<dyn ScoringBackend>>,
    /// Serializes attempts and holds the error of the latest failed one.
    attempt: Mutex<Option<PipelineError>>,
    /// Number of attempts that have finished without a backend.
    failures: AtomicU64,
    state: AtomicU8,
}

impl ModelSlot {
    pub fn new(channel: Channel, loader: Arc<dyn BackendLoader>) -> Self {
        Self {
            channel,
            loader: Some(loader),
            cell: OnceCell::new(),
            attempt: Mutex::new(None),
            failures: AtomicU64::new(0),
            state: AtomicU8::new(STATE_UNINITIALIZED),
        }
    }

    /// A slot for a channel that runs on rules alone.
    pub fn unconfigured(channel: Channel) -> Self {
        Self {
            channel,
            loader: None,
            cell: OnceCell::new(),
            attempt: Mutex::new(None),
            failures: AtomicU64::new(0),
            state: AtomicU8::new(STATE_UNINITIALIZED),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn is_configured(&self) -> bool {
        self.loader.is_some()
    }

    pub fn state(&self) -> LoadState {
        if self.loader.is_none() {
            return LoadState::Unconfigured;
        }
        match self.state.load(Ordering::Acquire) {
            STATE_LOADING => LoadState::Loading,
            STATE_READY => LoadState::Ready,
            STATE_FAILED => LoadState::LoadFailed,
            _ => LoadState::Uninitialized,
        }
    }

    pub async fn ready(&self) -> PipelineResult<Arc<dyn ScoringBackend>> {
        if let Some(backend) = self.cell.get() {
            return Ok(backend.clone());
        }

        let seen_failures = self.failures.load(Ordering::Acquire);
        let mut last_error = self.attempt.lock().await;

        if let Some(backend) = self.cell.get() {
            return Ok(backend.clone());
        }
        // An attempt finished while we waited for the lock; share its error.
        if self.failures.load(Ordering::Acquire) != seen_failures {
            if let Some(e) = last_error.as_ref() {
                return Err(e.clone());
            }
        }

        match self.run_loader().await {
            Ok(backend) => {
                *last_error = None;
                Ok(self.cell.get_or_init(|| async { backend }).await.clone())
            }
            Err(e) => {
                *last_error = Some(e.clone());
                self.failures.fetch_add(1, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn run_loader(&self) -> LoadOutcome {
        let Some(loader) = &self.loader else {
            return Err(PipelineError::model_load(
                self.channel,
                "no model configured",
            ));
        };

        self.state.store(STATE_LOADING, Ordering::Release);
        let start = Instant::now();
        let outcome = loader.load(self.channel).await;

        match &outcome {
            Ok(backend) => {
                log::info!(
                    "Loaded {} model '{}' in {} ms",
                    self.channel,
                    backend.name(),
                    start.elapsed().as_millis()
                );
                self.state.store(STATE_READY, Ordering::Release);
            }
            Err(e) => {
                log::error!("{}", e);
                self.state.store(STATE_FAILED, Ordering::Release);
            }
        }

        outcome
    }
}

/// Reject scores a sigmoid could not have produced.
pub(crate) fn check_probability(channel: Channel, score: f64) -> PipelineResult<f64> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(PipelineError::scoring(
            channel,
            format!("score {} is not a probability", score),
        ))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Fixed-output backend that counts calls.
    pub struct FixedBackend {
        pub score: f64,
        pub calls: AtomicUsize,
    }

    impl FixedBackend {
        pub fn new(score: f64) -> Arc<Self> {
            Arc::new(Self {
                score,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ScoringBackend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        fn score(&self, _input: &EncodedInput) -> PipelineResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.score)
        }
    }

    /// Backend that loads fine but fails every inference.
    pub struct BrokenBackend;

    impl ScoringBackend for BrokenBackend {
        fn name(&self) -> &str {
            "broken"
        }

        fn score(&self, input: &EncodedInput) -> PipelineResult<f64> {
            Err(PipelineError::scoring(input.channel(), "tensor shape mismatch"))
        }
    }

    /// Loader that always fails and counts attempts.
    #[derive(Default)]
    pub struct FailingLoader {
        pub attempts: AtomicUsize,
    }

    #[async_trait]
    impl BackendLoader for FailingLoader {
        async fn load(&self, channel: Channel) -> PipelineResult<Arc<dyn ScoringBackend>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::model_load(channel, "weights unreachable"))
        }
    }

    /// Slow loader that fails its first `failures` attempts, then succeeds.
    pub struct FlakyLoader {
        pub backend: Arc<dyn ScoringBackend>,
        pub failures: usize,
        pub attempts: AtomicUsize,
    }

    impl FlakyLoader {
        pub fn new(backend: Arc<dyn ScoringBackend>, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                backend,
                failures,
                attempts: AtomicUsize::new(0),
            })
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendLoader for FlakyLoader {
        async fn load(&self, channel: Channel) -> PipelineResult<Arc<dyn ScoringBackend>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if attempt < self.failures {
                Err(PipelineError::model_load(channel, "connection reset"))
            } else {
                Ok(self.backend.clone())
            }
        }
    }

    /// Loader that takes a while, so concurrent callers overlap.
    pub struct SlowLoader {
        pub backend: Arc<dyn ScoringBackend>,
        pub loads: AtomicUsize,
    }

    #[async_trait]
    impl BackendLoader for SlowLoader {
        async fn load(&self, _channel: Channel) -> PipelineResult<Arc<dyn ScoringBackend>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.backend.clone())
        }
    }
}
