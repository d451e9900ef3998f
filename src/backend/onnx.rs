//! ONNX Runtime backend for exported channel models
//!
//! The exported graphs take a `(1, 200)` float tensor of indices and return a
//! single sigmoid output.

use super::artifact::ModelMetadata;
use super::{check_probability, ScoringBackend};
use crate::channel::Channel;
use crate::encoder::{EncodedInput, Vocabulary};
use crate::error::{PipelineError, PipelineResult};
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;

pub struct OnnxBackend {
    name: String,
    channel: Channel,
    // Session::run needs exclusive access
    session: Mutex<Session>,
    output_name: String,
    vocabulary: Option<Vocabulary>,
}

impl OnnxBackend {
    pub fn from_bytes(
        channel: Channel,
        metadata: &ModelMetadata,
        model_bytes: &[u8],
        vocabulary: Option<Vocabulary>,
    ) -> PipelineResult<Self> {
        log::info!(
            "Loading ONNX {} model from memory ({} bytes)",
            channel,
            model_bytes.len()
        );

        let load_err = |e: ort::Error| PipelineError::model_load(channel, e.to_string());

        let session = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .commit_from_memory(model_bytes)
            .map_err(load_err)?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| PipelineError::model_load(channel, "model defines no output"))?;

        Ok(Self {
            name: metadata.display_name(),
            channel,
            session: Mutex::new(session),
            output_name,
            vocabulary,
        })
    }
}

impl ScoringBackend for OnnxBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, input: &EncodedInput) -> PipelineResult<f64> {
        let scoring_err = |reason: String| PipelineError::scoring(self.channel, reason);

        let data: Vec<f32> = input.values().iter().map(|&v| v as f32).collect();
        let array = Array2::<f32>::from_shape_vec((1, data.len()), data)
            .map_err(|e| scoring_err(format!("Array error: {}", e)))?;
        let tensor =
            Value::from_array(array).map_err(|e| scoring_err(format!("Tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| scoring_err(format!("Inference failed: {}", e)))?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| scoring_err("No output".to_string()))?;
        let (_, values) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| scoring_err(format!("Extract error: {}", e)))?;

        let score = values
            .first()
            .copied()
            .ok_or_else(|| scoring_err("Empty output tensor".to_string()))?;
        check_probability(self.channel, score as f64)
    }

    fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }
}
