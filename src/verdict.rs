//! Verdict assembly
//!
//! The verdict is the only thing callers see. Every field is always present;
//! `decoded_content` is the one nullable field and is set only for QR scans.

use crate::calibration::{MAX_CONFIDENCE, MIN_CONFIDENCE};
use crate::channel::Channel;
use crate::detection::Indicator;
use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Safe,
    Suspicious,
    Dangerous,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Safe => "safe",
            ThreatLevel::Suspicious => "suspicious",
            ThreatLevel::Dangerous => "dangerous",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelUsed {
    /// Model score plus heuristic points
    Ml,
    /// Channel has no model configured; rules only
    RuleBased,
    /// A configured model failed; degraded rules-only answer
    Heuristic,
    /// Trusted-domain short-circuit, nothing was scored
    Allowlist,
}

impl ModelUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelUsed::Ml => "ml",
            ModelUsed::RuleBased => "rule-based",
            ModelUsed::Heuristic => "heuristic",
            ModelUsed::Allowlist => "allowlist",
        }
    }
}

impl fmt::Display for ModelUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub threat_level: ThreatLevel,
    pub confidence: u8,
    pub indicators: Vec<String>,
    pub analysis: String,
    pub recommendations: Vec<String>,
    pub risk_score: u8,
    pub channel: Channel,
    pub model_used: ModelUsed,
    pub decoded_content: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl Verdict {
    /// Boundary check applied before a verdict leaves the pipeline.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&self.confidence) {
            return Err(PipelineError::InvalidVerdict(format!(
                "confidence {} outside {}..={}",
                self.confidence, MIN_CONFIDENCE, MAX_CONFIDENCE
            )));
        }
        if self.risk_score > 100 {
            return Err(PipelineError::InvalidVerdict(format!(
                "risk score {} above 100",
                self.risk_score
            )));
        }
        if self.analysis.is_empty() || self.recommendations.is_empty() {
            return Err(PipelineError::InvalidVerdict(
                "analysis and recommendations are required".to_string(),
            ));
        }
        if self.decoded_content.is_some() != (self.channel == Channel::Qr) {
            return Err(PipelineError::InvalidVerdict(
                "decoded content is present exactly for QR scans".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_threat(&self) -> bool {
        self.threat_level != ThreatLevel::Safe
    }
}

/// Everything the assembler needs from the scoring stage.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub channel: Channel,
    pub threat_level: ThreatLevel,
    pub confidence: u8,
    pub risk_score: u8,
    pub model_used: ModelUsed,
    pub indicators: Vec<Indicator>,
    pub subject: Option<String>,
}

pub fn assemble(assessment: Assessment, decoded_content: Option<String>) -> Verdict {
    let analysis = build_analysis(&assessment);
    let recommendations = build_recommendations(assessment.threat_level, assessment.channel);

    Verdict {
        threat_level: assessment.threat_level,
        confidence: assessment.confidence,
        indicators: assessment.indicators.into_iter().map(|i| i.label).collect(),
        analysis,
        recommendations,
        risk_score: assessment.risk_score,
        channel: assessment.channel,
        model_used: assessment.model_used,
        decoded_content,
        analyzed_at: Utc::now(),
    }
}

fn build_analysis(a: &Assessment) -> String {
    let what = match a.channel {
        Channel::Url => "This URL",
        Channel::Email => "This email",
        Channel::Sms => "This message",
        Channel::Qr => "The link in this QR code",
    };

    let method = match a.model_used {
        ModelUsed::Ml => "machine learning analysis combined with pattern checks",
        ModelUsed::RuleBased => "pattern-based analysis",
        ModelUsed::Heuristic => "pattern-based analysis (machine learning model unavailable)",
        ModelUsed::Allowlist => "the trusted domain list",
    };

    let outcome = match a.threat_level {
        ThreatLevel::Safe => "appears safe",
        ThreatLevel::Suspicious => "looks suspicious",
        ThreatLevel::Dangerous => "is very likely a phishing attempt",
    };

    let mut analysis = format!(
        "{} {} according to {}. Phishing risk: {}% (confidence {}%).",
        what, outcome, method, a.risk_score, a.confidence
    );

    if let Some(subject) = &a.subject {
        analysis.push_str(&format!(" Domain: {}.", subject));
    }

    match a.indicators.len() {
        0 => analysis.push_str(" No suspicious patterns were found."),
        1 => analysis.push_str(" 1 suspicious pattern was found."),
        n => analysis.push_str(&format!(" {} suspicious patterns were found.", n)),
    }

    analysis
}

fn build_recommendations(level: ThreatLevel, channel: Channel) -> Vec<String> {
    let mut recommendations: Vec<&str> = match level {
        ThreatLevel::Dangerous => vec![
            "Do not click any links or enter any information",
            "Do not share passwords, codes or payment details",
            "Report this to your security team or the impersonated organization",
            "Delete it or close the page",
        ],
        ThreatLevel::Suspicious => vec![
            "Verify the sender through an official channel before acting",
            "Check where links really go before opening them",
            "Avoid entering sensitive information until it is verified",
        ],
        ThreatLevel::Safe => vec![
            "No obvious threats detected, but stay vigilant",
            "Keep your browser and security software up to date",
        ],
    };

    if level != ThreatLevel::Safe {
        match channel {
            Channel::Email => recommendations.push("Do not open attachments from this email"),
            Channel::Sms => recommendations.push("Do not reply or call back the number"),
            Channel::Qr => recommendations.push("Do not open the link decoded from this QR code"),
            Channel::Url => {}
        }
    }

    recommendations.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(level: ThreatLevel, risk: u8, confidence: u8) -> Assessment {
        Assessment {
            channel: Channel::Url,
            threat_level: level,
            confidence,
            risk_score: risk,
            model_used: ModelUsed::Ml,
            indicators: vec![Indicator::new("Uses insecure HTTP connection")],
            subject: Some("paypa1-verify.tk".to_string()),
        }
    }

    #[test]
    fn test_analysis_mentions_risk_percentage() {
        let verdict = assemble(assessment(ThreatLevel::Dangerous, 97, 97), None);
        assert!(verdict.analysis.contains("97%"));
        assert!(verdict.analysis.contains("paypa1-verify.tk"));
        assert!(verdict.analysis.contains("1 suspicious pattern"));
        assert!(verdict.validate().is_ok());
    }

    #[test]
    fn test_recommendation_tone_follows_level() {
        let dangerous = build_recommendations(ThreatLevel::Dangerous, Channel::Sms);
        assert!(dangerous.iter().any(|r| r.starts_with("Do not click")));
        assert!(dangerous.iter().any(|r| r.contains("call back")));

        let safe = build_recommendations(ThreatLevel::Safe, Channel::Sms);
        assert!(safe[0].starts_with("No obvious threats"));
        assert!(!safe.iter().any(|r| r.contains("call back")));
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let mut verdict = assemble(assessment(ThreatLevel::Safe, 0, 99), None);
        assert!(verdict.validate().is_ok());
        verdict.confidence = 100;
        assert!(matches!(
            verdict.validate(),
            Err(PipelineError::InvalidVerdict(_))
        ));
    }

    #[test]
    fn test_decoded_content_only_for_qr() {
        let verdict = assemble(assessment(ThreatLevel::Safe, 5, 95), Some("x".to_string()));
        assert!(verdict.validate().is_err());

        let mut qr = assessment(ThreatLevel::Safe, 5, 95);
        qr.channel = Channel::Qr;
        assert!(assemble(qr, Some("https://example.org".to_string()))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_serialized_shape() {
        let verdict = assemble(assessment(ThreatLevel::Suspicious, 60, 60), None);
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["threatLevel"], "suspicious");
        assert_eq!(json["confidence"], 60);
        assert_eq!(json["modelUsed"], "ml");
        assert_eq!(json["channel"], "url");
        assert!(json["decodedContent"].is_null());
        assert_eq!(json["indicators"][0], "Uses insecure HTTP connection");
    }

    #[test]
    fn test_model_used_tags() {
        assert_eq!(
            serde_json::to_value(ModelUsed::RuleBased).unwrap(),
            "rule-based"
        );
        assert_eq!(ModelUsed::Heuristic.to_string(), "heuristic");
    }
}
