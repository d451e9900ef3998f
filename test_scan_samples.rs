#![allow(clippy::uninlined_format_args)]

use phishguard::backend::linear::LinearBackend;
use phishguard::encoder::MAX_CHAR_CODE;
use phishguard::{Channel, Pipeline, ThreatLevel};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Scanning sample content with a toy URL model and rule-based email/SMS...");

    // Digits and '@' push the toy URL model toward phishing
    let mut weights = vec![0.0; MAX_CHAR_CODE as usize + 1];
    for c in b'0'..=b'9' {
        weights[c as usize] = 6.0;
    }
    weights[b'@' as usize] = 8.0;
    let url_model = LinearBackend::new("toy_url", Channel::Url, -1.0, weights, None);

    let pipeline = Pipeline::new().with_backend(Channel::Url, Arc::new(url_model));
    let report = pipeline.startup().await;
    for entry in &report.entries {
        println!("  {} model: {:?}", entry.channel, entry.state);
    }

    let samples = [
        ("https://www.google.com/search?q=weather", Channel::Url, ThreatLevel::Safe),
        (
            "http://192.168.10.45/paypa1/login@secure",
            Channel::Url,
            ThreatLevel::Dangerous,
        ),
        (
            "Dear customer, URGENT: your account has been suspended. Verify your password now, click here: http://10.0.0.7/login",
            Channel::Email,
            ThreatLevel::Dangerous,
        ),
        ("Hi Sam, the meeting moved to 3pm. See you there.", Channel::Email, ThreatLevel::Safe),
        (
            "Congratulations! You won a $1000 gift card. Claim it now at http://bit.ly/3xYz and reply YES",
            Channel::Sms,
            ThreatLevel::Suspicious,
        ),
        ("Running ten minutes late, order me a coffee", Channel::Sms, ThreatLevel::Safe),
    ];

    let mut mismatches = 0;
    for (content, channel, expected) in samples {
        let verdict = pipeline.analyze(content, channel).await?;
        let mark = if verdict.threat_level == expected {
            "✅"
        } else {
            mismatches += 1;
            "❌"
        };
        println!();
        println!("{} [{}] {}", mark, channel, content);
        println!(
            "   {} (risk {}, confidence {}, {}), expected {}",
            verdict.threat_level,
            verdict.risk_score,
            verdict.confidence,
            verdict.model_used,
            expected
        );
        for indicator in &verdict.indicators {
            println!("   • {}", indicator);
        }
    }

    println!();
    if mismatches == 0 {
        println!("All samples classified as expected");
    } else {
        println!("{} samples classified differently than expected", mismatches);
    }

    Ok(())
}
