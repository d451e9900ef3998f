//! Heuristic indicator extraction
//!
//! Each channel owns a fixed, ordered rule table. A rule either fires or it
//! doesn't; firing contributes a fixed number of risk points and one
//! human-readable indicator. Evaluation order is table order, so the
//! indicator sequence for a given input never changes.

pub mod email_rules;
pub mod sms_rules;
pub mod url_rules;

use crate::channel::Channel;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Raw model probability at which the model's opinion is itself reported.
pub const ML_FLAG_THRESHOLD: f64 = 0.7;

lazy_static! {
    pub(crate) static ref URGENCY: Regex = Regex::new(
        r"(?i)\b(urgent|urgently|immediately|immediate action|act now|right away|asap|within (24|48|72) hours|expires?|expiring|suspended|suspension|locked|deactivat\w*|final notice|last chance|limited time)\b"
    )
    .unwrap();
    pub(crate) static ref REWARD: Regex = Regex::new(
        r"(?i)\b(you('ve| have)? won|winner|congratulations|prize|reward|gift ?card|lottery|claim your|free gift|selected to receive|cash bonus)\b"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub label: String,
}

impl Indicator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// One entry of a channel rule table.
pub struct Rule {
    pub name: &'static str,
    pub points: u32,
    pub label: &'static str,
    pub check: fn(&str) -> bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub rule_name: &'static str,
    pub points: u32,
    pub indicator: Indicator,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    pub hits: Vec<RuleHit>,
}

impl DetectionResult {
    pub fn total_points(&self) -> u32 {
        self.hits.iter().map(|h| h.points).sum()
    }

    pub fn indicators(&self) -> Vec<Indicator> {
        self.hits.iter().map(|h| h.indicator.clone()).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.indicator.label.clone()).collect()
    }

    pub fn matched(&self, rule_name: &str) -> bool {
        self.hits.iter().any(|h| h.rule_name == rule_name)
    }
}

pub fn rules_for(channel: Channel) -> &'static [Rule] {
    match channel.scoring_channel() {
        Channel::Email => email_rules::RULES,
        Channel::Sms => sms_rules::RULES,
        _ => url_rules::RULES,
    }
}

/// Run the channel's rule table over raw content.
///
/// `score` is the raw model probability when one exists; a high score adds a
/// zero-point indicator so the explanation mentions the model's opinion.
pub fn extract(content: &str, channel: Channel, score: Option<f64>) -> DetectionResult {
    let mut hits: Vec<RuleHit> = rules_for(channel)
        .iter()
        .filter(|rule| (rule.check)(content))
        .map(|rule| {
            log::debug!("Rule {} matched (+{})", rule.name, rule.points);
            RuleHit {
                rule_name: rule.name,
                points: rule.points,
                indicator: Indicator::new(rule.label),
            }
        })
        .collect();

    if let Some(score) = score.filter(|s| *s >= ML_FLAG_THRESHOLD) {
        hits.push(RuleHit {
            rule_name: "ml_flag",
            points: 0,
            indicator: Indicator::new(format!(
                "Machine learning model flagged content ({:.0}% phishing probability)",
                score * 100.0
            )),
        });
    }

    DetectionResult { hits }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_is_idempotent() {
        let content = "URGENT: you have won a prize, reply YES to claim your reward";
        let first = extract(content, Channel::Sms, None);
        let second = extract(content, Channel::Sms, None);
        assert_eq!(first, second);
        assert!(first.total_points() > 0);
    }

    #[test]
    fn test_ml_flag_is_last_and_free() {
        let result = extract("http://paypa1-verify.tk/login?id=1", Channel::Url, Some(0.9));
        let last = result.hits.last().unwrap();
        assert_eq!(last.rule_name, "ml_flag");
        assert_eq!(last.points, 0);
        assert_eq!(
            last.indicator.label,
            "Machine learning model flagged content (90% phishing probability)"
        );
        assert_eq!(result.total_points(), 25);
    }

    #[test]
    fn test_ml_flag_needs_high_score() {
        let result = extract("https://example.org/", Channel::Url, Some(0.6));
        assert!(!result.matched("ml_flag"));
    }

    #[test]
    fn test_qr_uses_url_rules() {
        let url = extract("http://192.168.0.7/login", Channel::Url, None);
        let qr = extract("http://192.168.0.7/login", Channel::Qr, None);
        assert_eq!(url, qr);
    }

    #[test]
    fn test_shared_patterns() {
        assert!(URGENCY.is_match("Your account will be SUSPENDED"));
        assert!(URGENCY.is_match("respond within 24 hours"));
        assert!(!URGENCY.is_match("see you at lunch"));
        assert!(REWARD.is_match("Congratulations, you've won"));
        assert!(REWARD.is_match("Amazon giftcard inside"));
        assert!(!REWARD.is_match("meeting notes attached"));
    }
}
