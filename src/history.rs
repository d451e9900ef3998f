use crate::channel::Channel;
use crate::verdict::Verdict;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::interval;

/// One completed scan, as handed to persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub channel: Channel,
    pub content: String,
    pub verdict: Verdict,
}

impl ScanRecord {
    pub fn new(user_id: Option<&str>, content: &str, verdict: &Verdict) -> Self {
        Self {
            timestamp: verdict.analyzed_at,
            user_id: user_id.map(str::to_string),
            channel: verdict.channel,
            content: content.to_string(),
            verdict: verdict.clone(),
        }
    }
}

/// Receives every verdict produced by `Pipeline::scan`.
pub trait ScanSink: Send + Sync {
    fn record(&self, record: ScanRecord);
}

/// Append-only JSON-lines history written by a background task.
pub struct JsonlHistory {
    path: PathBuf,
    sender: mpsc::UnboundedSender<ScanRecord>,
    handle: tokio::task::JoinHandle<()>,
}

impl JsonlHistory {
    /// Must be called inside a tokio runtime.
    pub fn new(path: impl Into<PathBuf>, flush_interval_seconds: u64) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }

        let (sender, receiver) = mpsc::unbounded_channel();

        let worker_path = path.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = Self::history_worker(worker_path, receiver, flush_interval_seconds).await
            {
                log::error!("History worker error: {e}");
            }
        });

        Ok(Self {
            path,
            sender,
            handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting records and wait until everything queued is on disk.
    pub async fn close(self) {
        drop(self.sender);
        if let Err(e) = self.handle.await {
            log::error!("History worker did not shut down cleanly: {e}");
        }
    }

    async fn history_worker(
        path: PathBuf,
        mut receiver: mpsc::UnboundedReceiver<ScanRecord>,
        flush_interval_seconds: u64,
    ) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open history file: {}", path.display()))?;

        let mut buffer: Vec<String> = Vec::new();
        let mut flush_timer = interval(Duration::from_secs(flush_interval_seconds.max(1)));

        loop {
            tokio::select! {
                record = receiver.recv() => {
                    match record {
                        Some(record) => match serde_json::to_string(&record) {
                            Ok(line) => buffer.push(line),
                            Err(e) => log::warn!("Dropping unserializable scan record: {e}"),
                        },
                        None => {
                            // Channel closed, flush and exit
                            Self::flush(&mut file, &mut buffer).await?;
                            break;
                        }
                    }
                }
                _ = flush_timer.tick() => {
                    if let Err(e) = Self::flush(&mut file, &mut buffer).await {
                        log::error!("Failed to flush scan history: {e:#}");
                    }
                }
            }
        }

        Ok(())
    }

    /// Write out the buffered lines. The buffer is emptied even when the
    /// write fails, so a broken file never replays the same records.
    async fn flush<W: AsyncWrite + Unpin>(file: &mut W, buffer: &mut Vec<String>) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(buffer);
        let mut chunk = pending.join("\n");
        chunk.push('\n');

        let written = async {
            file.write_all(chunk.as_bytes()).await?;
            file.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                log::debug!("Flushed {} scan records", pending.len());
                Ok(())
            }
            Err(e) => Err(e).with_context(|| {
                format!("Dropped {} scan records after a failed write", pending.len())
            }),
        }
    }
}

impl ScanSink for JsonlHistory {
    fn record(&self, record: ScanRecord) {
        if let Err(e) = self.sender.send(record) {
            log::warn!("Failed to queue scan record: {e}");
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistorySummary {
    pub total: u64,
    pub by_channel: BTreeMap<String, u64>,
    pub by_level: BTreeMap<String, u64>,
    pub by_model: BTreeMap<String, u64>,
    pub skipped_lines: u64,
    pub first_scan: Option<DateTime<Utc>>,
    pub last_scan: Option<DateTime<Utc>>,
}

impl HistorySummary {
    pub fn threat_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let threats = self.by_level.get("suspicious").copied().unwrap_or(0)
            + self.by_level.get("dangerous").copied().unwrap_or(0);
        threats as f64 / self.total as f64 * 100.0
    }
}

/// Read a history file back into per-channel, per-level and per-model counts.
pub fn summarize(path: impl AsRef<Path>) -> Result<HistorySummary> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;

    let mut summary = HistorySummary::default();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: ScanRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping history line {}: {}", number + 1, e);
                summary.skipped_lines += 1;
                continue;
            }
        };

        summary.total += 1;
        *summary
            .by_channel
            .entry(record.channel.to_string())
            .or_insert(0) += 1;
        *summary
            .by_level
            .entry(record.verdict.threat_level.to_string())
            .or_insert(0) += 1;
        *summary
            .by_model
            .entry(record.verdict.model_used.to_string())
            .or_insert(0) += 1;

        summary.first_scan = Some(match summary.first_scan {
            Some(first) => first.min(record.timestamp),
            None => record.timestamp,
        });
        summary.last_scan = Some(match summary.last_scan {
            Some(last) => last.max(record.timestamp),
            None => record.timestamp,
        });
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::{assemble, Assessment, ModelUsed, ThreatLevel};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};

    /// Writer whose writes always fail, counting how many were attempted.
    #[derive(Default)]
    struct FullDisk {
        writes: usize,
    }

    impl AsyncWrite for FullDisk {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.writes += 1;
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "no space left")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn verdict(channel: Channel, level: ThreatLevel, model_used: ModelUsed) -> Verdict {
        let decoded = (channel == Channel::Qr).then(|| "https://example.org".to_string());
        assemble(
            Assessment {
                channel,
                threat_level: level,
                confidence: 60,
                risk_score: 60,
                model_used,
                indicators: Vec::new(),
                subject: None,
            },
            decoded,
        )
    }

    #[tokio::test]
    async fn test_records_are_written_and_summarized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");

        let history = JsonlHistory::new(&path, 60).unwrap();
        let sms = verdict(Channel::Sms, ThreatLevel::Dangerous, ModelUsed::RuleBased);
        let url = verdict(Channel::Url, ThreatLevel::Safe, ModelUsed::Allowlist);
        history.record(ScanRecord::new(Some("user-7"), "You won a prize", &sms));
        history.record(ScanRecord::new(None, "https://google.com", &url));
        history.record(ScanRecord::new(None, "https://google.com/maps", &url));
        history.close().await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("\"userId\":\"user-7\""));

        let summary = summarize(&path).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_channel["url"], 2);
        assert_eq!(summary.by_level["dangerous"], 1);
        assert_eq!(summary.by_model["allowlist"], 2);
        assert!((summary.threat_rate() - 100.0 / 3.0).abs() < 1e-9);
        assert!(summary.first_scan <= summary.last_scan);
    }

    #[tokio::test]
    async fn test_failed_flush_drops_buffer() {
        let mut disk = FullDisk::default();
        let mut buffer = vec!["{\"a\":1}".to_string(), "{\"a\":2}".to_string()];

        let err = JsonlHistory::flush(&mut disk, &mut buffer).await.unwrap_err();
        assert!(format!("{err:#}").contains("Dropped 2 scan records"));
        assert!(buffer.is_empty());
        assert_eq!(disk.writes, 1);

        // The next tick has nothing left to replay
        JsonlHistory::flush(&mut disk, &mut buffer).await.unwrap();
        assert_eq!(disk.writes, 1);

        buffer.push("{\"a\":3}".to_string());
        assert!(JsonlHistory::flush(&mut disk, &mut buffer).await.is_err());
        assert_eq!(disk.writes, 2);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_history_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let v = verdict(Channel::Email, ThreatLevel::Suspicious, ModelUsed::Ml);

        for _ in 0..2 {
            let history = JsonlHistory::new(&path, 60).unwrap();
            history.record(ScanRecord::new(None, "Please verify", &v));
            history.close().await;
        }

        assert_eq!(summarize(&path).unwrap().total, 2);
    }

    #[test]
    fn test_summarize_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let v = verdict(Channel::Qr, ThreatLevel::Safe, ModelUsed::Ml);
        let line = serde_json::to_string(&ScanRecord::new(None, "qr", &v)).unwrap();
        std::fs::write(&path, format!("{}\n{{not json\n\n", line)).unwrap();

        let summary = summarize(&path).unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.skipped_lines, 1);
        assert_eq!(summary.by_channel["qr"], 1);
    }

    #[test]
    fn test_summarize_missing_file() {
        assert!(summarize("/nonexistent/history.jsonl").is_err());
    }
}
