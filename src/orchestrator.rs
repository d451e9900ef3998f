//! The content-to-verdict pipeline
//!
//! `Pipeline` owns one model slot per scored channel and decides, per
//! request, whether the verdict comes from the trusted-domain list, the
//! model, or the rule tables alone. What happens when a model is missing or
//! broken is looked up in `fallback_policy` rather than decided ad hoc.

use crate::backend::artifact::{ArtifactLoader, ModelSource};
use crate::backend::{
    check_probability, BackendLoader, LoadState, ModelSlot, ScoringBackend, StaticLoader,
};
use crate::calibration::{
    calibrate_text_score, calibrate_url_score, confidence, final_risk, heuristic_risk,
    CALIBRATED_BANDS, HEURISTIC_BANDS, TRUSTED_DOMAIN_RISK,
};
use crate::channel::{Channel, ScanRequest};
use crate::config::Config;
use crate::detection::{self, Indicator};
use crate::domain_utils::{DomainUtils, DEFAULT_TRUSTED_DOMAINS};
use crate::encoder::encode_with_vocabulary;
use crate::error::{PipelineError, PipelineResult};
use crate::history::{ScanRecord, ScanSink};
use crate::qr;
use crate::verdict::{assemble, Assessment, ModelUsed, Verdict};
use serde::Serialize;
use std::sync::Arc;

/// What a channel does when its model cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// The request fails
    None,
    /// Answer from the channel's rule table with heuristic banding
    Heuristic,
}

pub fn fallback_policy(channel: Channel) -> Fallback {
    match channel {
        Channel::Url => Fallback::None,
        Channel::Email | Channel::Sms | Channel::Qr => Fallback::Heuristic,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupEntry {
    pub channel: Channel,
    pub state: LoadState,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub entries: Vec<StartupEntry>,
}

impl StartupReport {
    pub fn failures(&self) -> impl Iterator<Item = &StartupEntry> {
        self.entries
            .iter()
            .filter(|e| e.state == LoadState::LoadFailed)
    }

    /// True when no configured model failed to load.
    pub fn is_healthy(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn state(&self, channel: Channel) -> Option<LoadState> {
        self.entries
            .iter()
            .find(|e| e.channel == channel.scoring_channel())
            .map(|e| e.state)
    }
}

pub struct Pipeline {
    url: ModelSlot,
    email: ModelSlot,
    sms: ModelSlot,
    trusted_domains: Vec<String>,
    sink: Option<Arc<dyn ScanSink>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// No models, built-in allowlist, no history.
    pub fn new() -> Self {
        Self {
            url: ModelSlot::unconfigured(Channel::Url),
            email: ModelSlot::unconfigured(Channel::Email),
            sms: ModelSlot::unconfigured(Channel::Sms),
            trusted_domains: DEFAULT_TRUSTED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            sink: None,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut pipeline = Self::new().with_trusted_domains(config.trusted_domains());

        for channel in [Channel::Url, Channel::Email, Channel::Sms] {
            if let Some(model) = config.models.for_channel(channel) {
                let source = ModelSource::parse(&model.source);
                log::info!("{} model source: {:?}", channel, source);
                let loader = ArtifactLoader::new(source, config.model_fetch_timeout_seconds)?;
                pipeline = pipeline.with_loader(channel, Arc::new(loader));
            }
        }

        Ok(pipeline)
    }

    /// Attach a loader to a channel. QR shares the URL slot.
    pub fn with_loader(mut self, channel: Channel, loader: Arc<dyn BackendLoader>) -> Self {
        let channel = channel.scoring_channel();
        *self.slot_mut(channel) = ModelSlot::new(channel, loader);
        self
    }

    pub fn with_backend(self, channel: Channel, backend: Arc<dyn ScoringBackend>) -> Self {
        self.with_loader(channel, Arc::new(StaticLoader::new(backend)))
    }

    pub fn with_trusted_domains(mut self, domains: Vec<String>) -> Self {
        self.trusted_domains = domains;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ScanSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn slot(&self, channel: Channel) -> &ModelSlot {
        match channel.scoring_channel() {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            _ => &self.url,
        }
    }

    fn slot_mut(&mut self, channel: Channel) -> &mut ModelSlot {
        match channel.scoring_channel() {
            Channel::Email => &mut self.email,
            Channel::Sms => &mut self.sms,
            _ => &mut self.url,
        }
    }

    /// Load every configured model now instead of on first request.
    pub async fn startup(&self) -> StartupReport {
        async fn settle(slot: &ModelSlot) -> StartupEntry {
            let error = if slot.is_configured() {
                slot.ready().await.err().map(|e| e.to_string())
            } else {
                None
            };
            StartupEntry {
                channel: slot.channel(),
                state: slot.state(),
                error,
            }
        }

        let (url, email, sms) =
            tokio::join!(settle(&self.url), settle(&self.email), settle(&self.sms));
        let report = StartupReport {
            entries: vec![url, email, sms],
        };

        for entry in &report.entries {
            match &entry.error {
                Some(error) => log::info!("Startup: {} model failed: {}", entry.channel, error),
                None => log::info!("Startup: {} model {:?}", entry.channel, entry.state),
            }
        }

        report
    }

    /// Analyze text content. For `Channel::Qr` the content is taken to be an
    /// already-decoded payload.
    pub async fn analyze(&self, content: &str, channel: Channel) -> PipelineResult<Verdict> {
        let decoded = (channel == Channel::Qr).then(|| content.trim().to_string());
        self.analyze_content(content, channel, decoded).await
    }

    /// Decode a QR image and analyze its payload as a link.
    pub async fn analyze_image(&self, image_bytes: &[u8]) -> PipelineResult<Verdict> {
        let payload = qr::decode_qr(image_bytes)?;
        log::debug!("Decoded QR payload: {}", payload);
        self.analyze_content(&payload, Channel::Qr, Some(payload.clone()))
            .await
    }

    /// Analyze a request and hand the verdict to the history sink.
    pub async fn scan(
        &self,
        request: &ScanRequest,
        user_id: Option<&str>,
    ) -> PipelineResult<Verdict> {
        let verdict = match request.raw_image() {
            Some(bytes) => self.analyze_image(bytes).await?,
            None => self.analyze(request.content(), request.channel()).await?,
        };

        if let Some(sink) = &self.sink {
            let content = verdict
                .decoded_content
                .as_deref()
                .filter(|_| request.raw_image().is_some())
                .unwrap_or(request.content());
            sink.record(ScanRecord::new(user_id, content, &verdict));
        }

        Ok(verdict)
    }

    async fn analyze_content(
        &self,
        content: &str,
        channel: Channel,
        decoded_content: Option<String>,
    ) -> PipelineResult<Verdict> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PipelineError::Validation(
                "content is empty or whitespace".to_string(),
            ));
        }

        let assessment = self.assess(content, channel).await?;
        let verdict = assemble(assessment, decoded_content);
        verdict.validate()?;

        log::debug!(
            "{} verdict: {} (risk {}, confidence {}, {})",
            channel,
            verdict.threat_level,
            verdict.risk_score,
            verdict.confidence,
            verdict.model_used
        );
        Ok(verdict)
    }

    async fn assess(&self, content: &str, channel: Channel) -> PipelineResult<Assessment> {
        let is_link = channel.scoring_channel() == Channel::Url;

        if is_link {
            if let Some(assessment) = self.trusted_domain(content, channel) {
                return Ok(assessment);
            }
        }

        let slot = self.slot(channel);
        let policy = fallback_policy(channel);

        if !slot.is_configured() {
            return match policy {
                Fallback::None => Err(PipelineError::model_load(
                    channel,
                    "no model configured",
                )),
                Fallback::Heuristic => Ok(rules_only(content, channel, ModelUsed::RuleBased)),
            };
        }

        match self.score(slot, content, channel).await {
            Ok(raw) => Ok(model_backed(content, channel, raw)),
            Err(e) if e.is_backend_failure() && policy == Fallback::Heuristic => {
                log::warn!("{}; answering {} scan from heuristics", e, channel);
                Ok(rules_only(content, channel, ModelUsed::Heuristic))
            }
            Err(e) => Err(e),
        }
    }

    fn trusted_domain(&self, content: &str, channel: Channel) -> Option<Assessment> {
        let host = DomainUtils::extract_host(content)?;
        let entry = DomainUtils::find_in_domain_list(&host, &self.trusted_domains)?;
        log::debug!("{} is under trusted domain {}, skipping scoring", host, entry);

        let level = CALIBRATED_BANDS.classify(TRUSTED_DOMAIN_RISK);
        Some(Assessment {
            channel,
            threat_level: level,
            confidence: confidence(level, TRUSTED_DOMAIN_RISK),
            risk_score: TRUSTED_DOMAIN_RISK,
            model_used: ModelUsed::Allowlist,
            indicators: vec![Indicator::new(format!("Trusted domain: {}", entry))],
            subject: Some(DomainUtils::canonicalize_domain(&host)),
        })
    }

    async fn score(&self, slot: &ModelSlot, content: &str, channel: Channel) -> PipelineResult<f64> {
        let backend = slot.ready().await?;
        let encoded = encode_with_vocabulary(content, channel, backend.vocabulary());
        let raw = backend.score(&encoded)?;
        check_probability(channel, raw)
    }
}

fn link_subject(content: &str, channel: Channel) -> Option<String> {
    if channel.scoring_channel() != Channel::Url {
        return None;
    }
    DomainUtils::extract_host(content).map(|host| DomainUtils::canonicalize_domain(&host))
}

fn model_backed(content: &str, channel: Channel, raw: f64) -> Assessment {
    let calibrated = match channel.scoring_channel() {
        Channel::Url => calibrate_url_score(raw, content),
        _ => calibrate_text_score(raw),
    };
    let detection = detection::extract(content, channel, Some(raw));
    let risk = final_risk(calibrated, detection.total_points());
    let level = CALIBRATED_BANDS.classify(risk);

    log::debug!(
        "{} raw {:.3} calibrated {:.3} + {} points = risk {}",
        channel,
        raw,
        calibrated,
        detection.total_points(),
        risk
    );

    Assessment {
        channel,
        threat_level: level,
        confidence: confidence(level, risk),
        risk_score: risk,
        model_used: ModelUsed::Ml,
        indicators: detection.indicators(),
        subject: link_subject(content, channel),
    }
}

fn rules_only(content: &str, channel: Channel, model_used: ModelUsed) -> Assessment {
    let detection = detection::extract(content, channel, None);
    let risk = heuristic_risk(detection.total_points());
    let level = HEURISTIC_BANDS.classify(risk);

    Assessment {
        channel,
        threat_level: level,
        confidence: confidence(level, risk),
        risk_score: risk,
        model_used,
        indicators: detection.indicators(),
        subject: link_subject(content, channel),
    }
}
