pub mod backend;
pub mod calibration;
pub mod channel;
pub mod config;
pub mod detection;
pub mod domain_utils;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod history;
pub mod orchestrator;
pub mod qr;
pub mod verdict;

pub use backend::{BackendLoader, LoadState, ScoringBackend};
pub use channel::{Channel, ScanRequest};
pub use config::Config;
pub use error::{PipelineError, PipelineResult};
pub use history::{JsonlHistory, ScanRecord, ScanSink};
pub use orchestrator::{Pipeline, StartupReport};
pub use verdict::{ModelUsed, ThreatLevel, Verdict};
