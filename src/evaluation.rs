//! Labeled dataset evaluation
//!
//! Reads `label,content` rows, runs each through the pipeline and scores the
//! predictions. A Suspicious or Dangerous verdict counts as a positive.

use crate::channel::Channel;
use crate::orchestrator::Pipeline;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSample {
    pub line: usize,
    pub is_phishing: bool,
    pub content: String,
}

/// Map a dataset label to phishing (true) or legitimate (false).
pub fn parse_label(label: &str) -> Option<bool> {
    match label.trim().trim_matches('"').to_lowercase().as_str() {
        "0" | "ham" | "legitimate" | "safe" | "normal" => Some(false),
        "1" | "spam" | "phishing" | "phish" | "malicious" | "smishing" => Some(true),
        _ => None,
    }
}

/// Split one CSV line into label and content. The content column may be
/// double-quoted with `""` escapes; anything after it is ignored.
fn split_row(line: &str) -> Option<(&str, String)> {
    let (label, rest) = line.split_once(',')?;
    let rest = rest.trim_start();

    let content = if let Some(quoted) = rest.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    out.push('"');
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        rest.trim_end().to_string()
    };

    Some((label, content))
}

#[derive(Debug, Default)]
pub struct Dataset {
    pub samples: Vec<LabeledSample>,
    /// Lines that were neither a header nor a usable row
    pub malformed: usize,
}

pub fn parse_dataset(text: &str) -> Dataset {
    let mut dataset = Dataset::default();

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let parsed = split_row(line).and_then(|(label, content)| {
            parse_label(label).map(|is_phishing| (is_phishing, content))
        });

        match parsed {
            Some((is_phishing, content)) if !content.trim().is_empty() => {
                dataset.samples.push(LabeledSample {
                    line: line_number,
                    is_phishing,
                    content,
                });
            }
            // Header
            _ if line_number == 1 => {}
            _ => {
                log::debug!("Skipping malformed dataset line {}", line_number);
                dataset.malformed += 1;
            }
        }
    }

    dataset
}

pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
    Ok(parse_dataset(&text))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub channel: Option<Channel>,
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
    pub errors: u64,
    pub malformed: u64,
}

impl EvaluationReport {
    pub fn record(&mut self, is_phishing: bool, predicted_phishing: bool) {
        match (is_phishing, predicted_phishing) {
            (true, true) => self.true_positives += 1,
            (false, true) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (true, false) => self.false_negatives += 1,
        }
    }

    pub fn predictions(&self) -> u64 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.predictions())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Run every sample through `pipeline.analyze`. Failed scans are counted as
/// errors and left out of the metrics.
pub async fn evaluate(pipeline: &Pipeline, dataset: &Dataset, channel: Channel) -> EvaluationReport {
    let mut report = EvaluationReport {
        channel: Some(channel),
        malformed: dataset.malformed as u64,
        ..EvaluationReport::default()
    };

    for sample in &dataset.samples {
        match pipeline.analyze(&sample.content, channel).await {
            Ok(verdict) => report.record(sample.is_phishing, verdict.is_threat()),
            Err(e) => {
                log::warn!("Dataset line {}: {}", sample.line, e);
                report.errors += 1;
            }
        }
    }

    log::info!(
        "Evaluated {} {} samples: accuracy {:.3}, {} errors",
        report.predictions(),
        channel,
        report.accuracy(),
        report.errors
    );

    report
}
