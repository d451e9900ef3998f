//! Score calibration and threat banding
//!
//! Turns a raw model probability plus heuristic points into a 0-100 risk,
//! then into a threat level and a bounded confidence. Two banding tables
//! exist: one for model-backed risk and one for rule-only risk. They were
//! tuned on different score distributions and stay separate.

use crate::verdict::ThreatLevel;

/// Risk assigned to a trusted-domain match without scoring.
pub const TRUSTED_DOMAIN_RISK: u8 = 5;

/// URL content shorter than this is dampened toward safe.
pub const SHORT_INPUT_LENGTH: usize = 20;
pub const SHORT_INPUT_FACTOR: f64 = 0.3;

/// Affine stretch applied to the URL model's sigmoid output.
pub const URL_CENTER: f64 = 0.5;
pub const URL_STRETCH: f64 = 1.8;

pub const MIN_CONFIDENCE: u8 = 1;
pub const MAX_CONFIDENCE: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdBands {
    pub dangerous: u8,
    pub suspicious: u8,
}

/// Model-backed paths.
pub const CALIBRATED_BANDS: ThresholdBands = ThresholdBands {
    dangerous: 80,
    suspicious: 45,
};

/// Rule-only paths.
pub const HEURISTIC_BANDS: ThresholdBands = ThresholdBands {
    dangerous: 75,
    suspicious: 50,
};

impl ThresholdBands {
    pub fn classify(&self, risk: u8) -> ThreatLevel {
        if risk >= self.dangerous {
            ThreatLevel::Dangerous
        } else if risk >= self.suspicious {
            ThreatLevel::Suspicious
        } else {
            ThreatLevel::Safe
        }
    }
}

/// Stretch a URL probability away from 0.5 and dampen short inputs.
pub fn calibrate_url_score(raw_score: f64, content: &str) -> f64 {
    let mut calibrated = ((raw_score - URL_CENTER) * URL_STRETCH).clamp(0.0, 1.0);
    if content.chars().count() < SHORT_INPUT_LENGTH {
        calibrated *= SHORT_INPUT_FACTOR;
    }
    calibrated
}

/// Text models are used as-is.
pub fn calibrate_text_score(raw_score: f64) -> f64 {
    raw_score.clamp(0.0, 1.0)
}

/// `min(100, round(score * 100) + points)`
pub fn final_risk(calibrated_score: f64, heuristic_points: u32) -> u8 {
    let base = (calibrated_score.clamp(0.0, 1.0) * 100.0).round() as u32;
    base.saturating_add(heuristic_points).min(100) as u8
}

/// Rule-only risk has no model term.
pub fn heuristic_risk(heuristic_points: u32) -> u8 {
    heuristic_points.min(100) as u8
}

/// Confidence in the stated verdict: certainty of safety for Safe, certainty
/// of the phishing call otherwise.
pub fn confidence(level: ThreatLevel, risk: u8) -> u8 {
    let raw = match level {
        ThreatLevel::Safe => 100u8.saturating_sub(risk),
        ThreatLevel::Suspicious | ThreatLevel::Dangerous => risk,
    };
    raw.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}
