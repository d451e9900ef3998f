//! Model artifacts on disk or behind HTTP
//!
//! A model directory holds `metadata.json`, the weights file it names and,
//! for text models, `vocabulary.json`.

use super::linear::LinearBackend;
use super::{BackendLoader, ScoringBackend};
use crate::channel::Channel;
use crate::encoder::{Vocabulary, SEQUENCE_LENGTH};
use crate::error::{PipelineError, PipelineResult};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const METADATA_FILE: &str = "metadata.json";
pub const VOCABULARY_FILE: &str = "vocabulary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Onnx,
    Linear,
}

impl ModelFormat {
    fn default_weights_file(&self) -> &'static str {
        match self {
            ModelFormat::Onnx => "model.onnx",
            ModelFormat::Linear => "weights.json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    #[serde(default)]
    pub version: Option<String>,
    pub format: ModelFormat,
    pub max_length: usize,
    #[serde(default)]
    pub vocab_size: Option<usize>,
    #[serde(default)]
    pub weights: Option<String>,
}

impl ModelMetadata {
    pub fn weights_file(&self) -> &str {
        self.weights
            .as_deref()
            .unwrap_or_else(|| self.format.default_weights_file())
    }

    pub fn display_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{} v{}", self.model_type, version),
            None => self.model_type.clone(),
        }
    }
}

/// Where a model directory lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Path(PathBuf),
    Http(String),
}

impl ModelSource {
    pub fn parse(source: &str) -> Self {
        let lower = source.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ModelSource::Http(source.trim_end_matches('/').to_string())
        } else {
            ModelSource::Path(PathBuf::from(source))
        }
    }

    fn describe(&self, file: &str) -> String {
        match self {
            ModelSource::Path(dir) => dir.join(file).display().to_string(),
            ModelSource::Http(base) => format!("{}/{}", base, file),
        }
    }
}

/// Loads a model directory from a `ModelSource`.
pub struct ArtifactLoader {
    source: ModelSource,
    client: Client,
}

impl ArtifactLoader {
    pub fn new(source: ModelSource, timeout_seconds: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("phishguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build model download client")?;

        Ok(Self { source, client })
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    async fn fetch(&self, channel: Channel, file: &str) -> PipelineResult<Vec<u8>> {
        let location = self.source.describe(file);
        log::debug!("Fetching {} model artifact {}", channel, location);

        let fail = |reason: String| {
            PipelineError::model_load(channel, format!("{}: {}", location, reason))
        };

        match &self.source {
            ModelSource::Path(dir) => tokio::fs::read(dir.join(file))
                .await
                .map_err(|e| fail(e.to_string())),
            ModelSource::Http(_) => {
                let response = self
                    .client
                    .get(&location)
                    .send()
                    .await
                    .map_err(|e| fail(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(fail(format!("HTTP {}", response.status())));
                }
                let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;
                Ok(bytes.to_vec())
            }
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        channel: Channel,
        file: &str,
    ) -> PipelineResult<T> {
        let bytes = self.fetch(channel, file).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::model_load(channel, format!("{}: {}", file, e)))
    }

    async fn load_metadata(&self, channel: Channel) -> PipelineResult<ModelMetadata> {
        let metadata: ModelMetadata = self.fetch_json(channel, METADATA_FILE).await?;
        if metadata.max_length != SEQUENCE_LENGTH {
            return Err(PipelineError::model_load(
                channel,
                format!(
                    "model expects sequences of {} but inputs are encoded to {}",
                    metadata.max_length, SEQUENCE_LENGTH
                ),
            ));
        }
        Ok(metadata)
    }

    async fn load_vocabulary(&self, channel: Channel) -> PipelineResult<Option<Vocabulary>> {
        if channel.scoring_channel() == Channel::Url {
            return Ok(None);
        }
        let tokens: Vec<String> = self.fetch_json(channel, VOCABULARY_FILE).await?;
        Ok(Some(Vocabulary::from_tokens(tokens)))
    }
}

#[async_trait]
impl BackendLoader for ArtifactLoader {
    async fn load(&self, channel: Channel) -> PipelineResult<Arc<dyn ScoringBackend>> {
        let metadata = self.load_metadata(channel).await?;
        let vocabulary = self.load_vocabulary(channel).await?;
        let weights = self.fetch(channel, metadata.weights_file()).await?;

        match metadata.format {
            ModelFormat::Linear => {
                let backend = LinearBackend::from_json(channel, &metadata, &weights, vocabulary)?;
                Ok(Arc::new(backend))
            }
            #[cfg(feature = "onnx")]
            ModelFormat::Onnx => {
                let backend =
                    super::onnx::OnnxBackend::from_bytes(channel, &metadata, &weights, vocabulary)?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "onnx"))]
            ModelFormat::Onnx => Err(PipelineError::model_load(
                channel,
                "ONNX models need the `onnx` feature",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_with_vocabulary;
    use std::fs;

    fn write_linear_model(dir: &std::path::Path, max_length: usize, with_vocab: bool) {
        fs::write(
            dir.join(METADATA_FILE),
            format!(
                r#"{{"model_type": "email_bilstm", "version": "1.0", "format": "linear", "max_length": {}, "vocab_size": 4}}"#,
                max_length
            ),
        )
        .unwrap();
        fs::write(
            dir.join("weights.json"),
            r#"{"bias": 0.0, "weights": [0.0, 0.0, 4.0, -4.0]}"#,
        )
        .unwrap();
        if with_vocab {
            fs::write(dir.join(VOCABULARY_FILE), r#"["", "[UNK]", "verify", "lunch"]"#).unwrap();
        }
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!(
            ModelSource::parse("https://models.example.com/url/"),
            ModelSource::Http("https://models.example.com/url".to_string())
        );
        assert_eq!(
            ModelSource::parse("/var/lib/phishguard/models/url"),
            ModelSource::Path(PathBuf::from("/var/lib/phishguard/models/url"))
        );
    }

    #[test]
    fn test_weights_file_defaults() {
        let metadata: ModelMetadata = serde_json::from_str(
            r#"{"model_type": "url_cnn", "format": "onnx", "max_length": 200}"#,
        )
        .unwrap();
        assert_eq!(metadata.weights_file(), "model.onnx");
        assert_eq!(metadata.display_name(), "url_cnn");
    }

    #[tokio::test]
    async fn test_load_linear_model_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_linear_model(dir.path(), SEQUENCE_LENGTH, true);

        let loader = ArtifactLoader::new(ModelSource::Path(dir.path().to_path_buf()), 5).unwrap();
        let backend = loader.load(Channel::Email).await.unwrap();
        assert_eq!(backend.name(), "email_bilstm v1.0");

        let vocabulary = backend.vocabulary().unwrap();
        let risky = encode_with_vocabulary("verify", Channel::Email, Some(vocabulary));
        let benign = encode_with_vocabulary("lunch", Channel::Email, Some(vocabulary));
        assert!(backend.score(&risky).unwrap() > 0.9);
        assert!(backend.score(&benign).unwrap() < 0.1);
    }

    #[tokio::test]
    async fn test_wrong_sequence_length_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        write_linear_model(dir.path(), 160, true);

        let loader = ArtifactLoader::new(ModelSource::Path(dir.path().to_path_buf()), 5).unwrap();
        let err = loader.load(Channel::Sms).await.err().unwrap();
        assert!(matches!(err, PipelineError::ModelLoad { channel: Channel::Sms, .. }));
    }

    #[tokio::test]
    async fn test_missing_vocabulary_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        write_linear_model(dir.path(), SEQUENCE_LENGTH, false);

        let loader = ArtifactLoader::new(ModelSource::Path(dir.path().to_path_buf()), 5).unwrap();
        assert!(loader.load(Channel::Email).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_directory_is_load_error() {
        let loader =
            ArtifactLoader::new(ModelSource::Path(PathBuf::from("/nonexistent/model")), 5).unwrap();
        let err = loader.load(Channel::Url).await.err().unwrap();
        assert!(err.is_backend_failure());
        assert!(err.to_string().contains("metadata.json"));
    }
}
