//! Bag-of-tokens logistic scorer
//!
//! A single weight per input index; the logit is the bias plus the mean
//! weight over non-padding positions. Runs without any native runtime.

use super::artifact::ModelMetadata;
use super::{check_probability, ScoringBackend};
use crate::channel::Channel;
use crate::encoder::{EncodedInput, Vocabulary, PAD_INDEX};
use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct LinearWeights {
    bias: f64,
    weights: Vec<f64>,
}

pub struct LinearBackend {
    name: String,
    channel: Channel,
    bias: f64,
    weights: Vec<f64>,
    vocabulary: Option<Vocabulary>,
}

impl LinearBackend {
    pub fn new(
        name: impl Into<String>,
        channel: Channel,
        bias: f64,
        weights: Vec<f64>,
        vocabulary: Option<Vocabulary>,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            bias,
            weights,
            vocabulary,
        }
    }

    pub fn from_json(
        channel: Channel,
        metadata: &ModelMetadata,
        bytes: &[u8],
        vocabulary: Option<Vocabulary>,
    ) -> PipelineResult<Self> {
        let parsed: LinearWeights = serde_json::from_slice(bytes).map_err(|e| {
            PipelineError::model_load(channel, format!("{}: {}", metadata.weights_file(), e))
        })?;

        if let Some(expected) = metadata.vocab_size {
            if parsed.weights.len() != expected {
                return Err(PipelineError::model_load(
                    channel,
                    format!(
                        "weights cover {} indices, metadata declares {}",
                        parsed.weights.len(),
                        expected
                    ),
                ));
            }
        }

        Ok(Self::new(
            metadata.display_name(),
            channel,
            parsed.bias,
            parsed.weights,
            vocabulary,
        ))
    }
}

impl ScoringBackend for LinearBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, input: &EncodedInput) -> PipelineResult<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;

        for &index in input.values().iter().filter(|&&v| v != PAD_INDEX) {
            let weight = self.weights.get(index as usize).ok_or_else(|| {
                PipelineError::scoring(
                    self.channel,
                    format!("index {} outside {} weights", index, self.weights.len()),
                )
            })?;
            sum += weight;
            count += 1;
        }

        let mean = if count > 0 { sum / count as f64 } else { 0.0 };
        let probability = 1.0 / (1.0 + (-(self.bias + mean)).exp());
        check_probability(self.channel, probability)
    }

    fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }
}
