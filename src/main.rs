use clap::{Arg, ArgMatches, Command};
use log::LevelFilter;
use phishguard::config::DEFAULT_CONFIG_PATH;
use phishguard::evaluation::{self, EvaluationReport};
use phishguard::history::{self, HistorySummary};
use phishguard::qr;
use phishguard::{Channel, Config, JsonlHistory, Pipeline, ScanRequest, StartupReport, Verdict};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("phishguard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing detection for URLs, emails, SMS and QR codes")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and try loading every model")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .value_name("CHANNEL")
                .help("Content channel: url, email, sms or qr")
                .default_value("url"),
        )
        .arg(
            Arg::new("content")
                .long("content")
                .value_name("TEXT")
                .help("Content to analyze")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("image")
                .long("image")
                .value_name("FILE|DATA_URL")
                .help("QR code image to decode and analyze: an image file, a file holding a data: URL or base64, or a data: URL")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .value_name("ID")
                .help("User id recorded with the scan")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the verdict as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Summarize the scan history")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("evaluate")
                .long("evaluate")
                .value_name("FILE")
                .help("Evaluate a labeled CSV dataset (label,content) on --channel")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("stats") {
        show_stats(&config);
        return;
    }

    let pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error building pipeline: {e:#}");
            process::exit(1);
        }
    };

    let report = pipeline.startup().await;
    print_startup_report(&report);

    if matches.get_flag("test-config") {
        println!("Trusted domains: {}", config.trusted_domains().len());
        if report.is_healthy() {
            println!("✅ Configuration is valid");
            return;
        }
        println!("❌ Configuration loaded but some models failed");
        process::exit(1);
    }

    let channel = match parse_channel(&matches) {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    if let Some(dataset_path) = matches.get_one::<String>("evaluate") {
        run_evaluation(&pipeline, dataset_path, channel).await;
        return;
    }

    let request = match build_request(&matches, channel) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    let history = if config.history.enabled {
        match JsonlHistory::new(&config.history.path, config.history.flush_interval_seconds) {
            Ok(history) => Some(Arc::new(history)),
            Err(e) => {
                log::warn!("Scan history disabled: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let pipeline = match &history {
        Some(history) => pipeline.with_sink(history.clone()),
        None => pipeline,
    };

    let user = matches.get_one::<String>("user").map(String::as_str);
    let result = pipeline.scan(&request, user).await;

    drop(pipeline);
    if let Some(history) = history.and_then(|h| Arc::try_unwrap(h).ok()) {
        history.close().await;
    }

    match result {
        Ok(verdict) => {
            if matches.get_flag("json") {
                match serde_json::to_string_pretty(&verdict) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Failed to serialize verdict: {e}");
                        process::exit(1);
                    }
                }
            } else {
                print_verdict(&verdict);
            }
            if verdict.is_threat() {
                process::exit(3);
            }
        }
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    }
}

fn parse_channel(matches: &ArgMatches) -> Result<Channel, String> {
    if matches.get_one::<String>("image").is_some() {
        return Ok(Channel::Qr);
    }
    matches
        .get_one::<String>("channel")
        .map(String::as_str)
        .unwrap_or("url")
        .parse::<Channel>()
        .map_err(|e| e.to_string())
}

fn build_request(matches: &ArgMatches, channel: Channel) -> Result<ScanRequest, String> {
    if let Some(image) = matches.get_one::<String>("image") {
        let upload = if image.starts_with("data:") {
            image.clone().into_bytes()
        } else {
            std::fs::read(image).map_err(|e| format!("Failed to read image {image}: {e}"))?
        };
        let bytes = qr::image_bytes(upload).map_err(|e| e.to_string())?;
        return Ok(ScanRequest::image(bytes));
    }
    match matches.get_one::<String>("content") {
        Some(content) => Ok(ScanRequest::new(content.clone(), channel)),
        None => Err("Nothing to analyze: pass --content or --image".to_string()),
    }
}

fn generate_default_config(path: &str) {
    match Config::default().to_file(path) {
        Ok(()) => println!("Default configuration written to: {path}"),
        Err(e) => {
            eprintln!("Error generating config: {e:#}");
            process::exit(1);
        }
    }
}

fn print_startup_report(report: &StartupReport) {
    for entry in &report.entries {
        match &entry.error {
            Some(error) => println!("  {:<6} {:?}: {}", entry.channel.as_str(), entry.state, error),
            None => println!("  {:<6} {:?}", entry.channel.as_str(), entry.state),
        }
    }
}

fn print_verdict(verdict: &Verdict) {
    let badge = match verdict.threat_level {
        phishguard::ThreatLevel::Safe => "✅",
        phishguard::ThreatLevel::Suspicious => "⚠️",
        phishguard::ThreatLevel::Dangerous => "🚨",
    };

    println!(
        "{} {} (confidence {}%, risk {}%, {})",
        badge,
        verdict.threat_level.as_str().to_uppercase(),
        verdict.confidence,
        verdict.risk_score,
        verdict.model_used
    );
    if let Some(decoded) = &verdict.decoded_content {
        println!("Decoded QR content: {decoded}");
    }
    println!();
    println!("{}", verdict.analysis);

    if !verdict.indicators.is_empty() {
        println!();
        println!("Indicators:");
        for indicator in &verdict.indicators {
            println!("  • {indicator}");
        }
    }

    println!();
    println!("Recommendations:");
    for recommendation in &verdict.recommendations {
        println!("  • {recommendation}");
    }
}

fn show_stats(config: &Config) {
    if !config.history.enabled {
        println!("❌ Scan history is not enabled in configuration");
        process::exit(1);
    }

    let summary: HistorySummary = match history::summarize(&config.history.path) {
        Ok(summary) => summary,
        Err(e) => {
            println!("❌ Failed to read scan history: {e:#}");
            process::exit(1);
        }
    };

    println!("📊 Scan History");
    println!("═══════════════════════════════════════");
    println!("  Total scans: {}", summary.total);
    if summary.total == 0 {
        println!("📭 No scans recorded yet");
        return;
    }
    println!("  Flagged: {:.1}%", summary.threat_rate());

    for (title, counts) in [
        ("By channel", &summary.by_channel),
        ("By threat level", &summary.by_level),
        ("By model", &summary.by_model),
    ] {
        println!();
        println!("  {title}:");
        for (key, count) in counts {
            let pct = *count as f64 / summary.total as f64 * 100.0;
            println!("    {key:<12} {count:>6} ({pct:.1}%)");
        }
    }

    if let (Some(first), Some(last)) = (summary.first_scan, summary.last_scan) {
        println!();
        println!("  First scan: {}", first.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("  Last scan:  {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if summary.skipped_lines > 0 {
        println!("  Unreadable lines skipped: {}", summary.skipped_lines);
    }
}

async fn run_evaluation(pipeline: &Pipeline, path: &str, channel: Channel) {
    let dataset = match evaluation::load_dataset(path) {
        Ok(dataset) => dataset,
        Err(e) => {
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    };

    let report: EvaluationReport = evaluation::evaluate(pipeline, &dataset, channel).await;

    println!("📊 Evaluation on {} ({})", path, channel);
    println!("═══════════════════════════════════════");
    println!("  Samples evaluated: {}", report.predictions());
    println!("  Errors:            {}", report.errors);
    println!("  Malformed lines:   {}", report.malformed);
    println!();
    println!("  Accuracy:  {:.4}", report.accuracy());
    println!("  Precision: {:.4}", report.precision());
    println!("  Recall:    {:.4}", report.recall());
    println!("  F1:        {:.4}", report.f1());
    println!();
    println!("  Confusion matrix (rows = actual):");
    println!("                 pred safe  pred phish");
    println!(
        "    actual safe  {:>9}  {:>10}",
        report.true_negatives, report.false_positives
    );
    println!(
        "    actual phish {:>9}  {:>10}",
        report.false_negatives, report.true_positives
    );
}
