use crate::channel::Channel;
use crate::domain_utils::DEFAULT_TRUSTED_DOMAINS;
use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/phishguard.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub models: ModelsConfig,
    #[serde(default = "default_fetch_timeout")]
    pub model_fetch_timeout_seconds: u64,
    /// Appended to the built-in allowlist unless `replace_default_trusted_domains` is set
    #[serde(default)]
    pub trusted_domains: Vec<String>,
    #[serde(default)]
    pub replace_default_trusted_domains: bool,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// One optional model directory per scored channel. QR reuses `url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub url: Option<ModelConfig>,
    #[serde(default)]
    pub email: Option<ModelConfig>,
    #[serde(default)]
    pub sms: Option<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Local directory or http(s) base URL
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub path: String,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_history_path() -> String {
    "/var/lib/phishguard/history.jsonl".to_string()
}

fn default_flush_interval() -> u64 {
    5
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            enabled: false,
            path: default_history_path(),
            flush_interval_seconds: default_flush_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            models: ModelsConfig {
                url: Some(ModelConfig {
                    source: "/var/lib/phishguard/models/url".to_string(),
                }),
                email: Some(ModelConfig {
                    source: "/var/lib/phishguard/models/email".to_string(),
                }),
                sms: None,
            },
            model_fetch_timeout_seconds: default_fetch_timeout(),
            trusted_domains: Vec::new(),
            replace_default_trusted_domains: false,
            history: HistoryConfig {
                enabled: true,
                ..HistoryConfig::default()
            },
        }
    }
}

impl ModelsConfig {
    pub fn for_channel(&self, channel: Channel) -> Option<&ModelConfig> {
        match channel.scoring_channel() {
            Channel::Url => self.url.as_ref(),
            Channel::Email => self.email.as_ref(),
            Channel::Sms => self.sms.as_ref(),
            Channel::Qr => None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model_fetch_timeout_seconds == 0 {
            anyhow::bail!("model_fetch_timeout_seconds must be greater than zero");
        }
        if self.history.enabled && self.history.flush_interval_seconds == 0 {
            anyhow::bail!("history.flush_interval_seconds must be greater than zero");
        }
        for (name, model) in [
            ("url", &self.models.url),
            ("email", &self.models.email),
            ("sms", &self.models.sms),
        ] {
            if let Some(model) = model {
                if model.source.trim().is_empty() {
                    anyhow::bail!("models.{}.source is empty", name);
                }
            }
        }
        if let Some(bad) = self.trusted_domains.iter().find(|d| d.trim().is_empty()) {
            anyhow::bail!("trusted_domains contains an empty entry: {:?}", bad);
        }
        Ok(())
    }

    /// Effective allowlist, lowercased.
    pub fn trusted_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = if self.replace_default_trusted_domains {
            Vec::new()
        } else {
            DEFAULT_TRUSTED_DOMAINS.iter().map(|d| d.to_string()).collect()
        };
        for domain in &self.trusted_domains {
            let domain = domain.trim().trim_start_matches("*.").to_lowercase();
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("models:\n  url:\n    source: /tmp/url\n").unwrap();
        assert_eq!(config.model_fetch_timeout_seconds, 30);
        assert!(!config.history.enabled);
        assert_eq!(config.history.flush_interval_seconds, 5);
        assert!(config.models.sms.is_none());
        assert_eq!(
            config.models.for_channel(Channel::Qr).map(|m| m.source.as_str()),
            Some("/tmp/url")
        );
    }

    #[test]
    fn test_trusted_domains_extend_defaults() {
        let mut config = Config::default();
        config.trusted_domains = vec!["*.Example.org".to_string(), "google.com".to_string()];
        let domains = config.trusted_domains();
        assert!(domains.contains(&"example.org".to_string()));
        assert_eq!(domains.iter().filter(|d| *d == "google.com").count(), 1);

        config.replace_default_trusted_domains = true;
        assert_eq!(config.trusted_domains(), vec!["example.org", "google.com"]);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phishguard.yaml");
        let path = path.to_str().unwrap();

        Config::default().to_file(path).unwrap();
        let loaded = Config::from_file(path).unwrap();
        assert!(loaded.history.enabled);
        assert!(loaded.models.email.is_some());
        assert!(loaded.models.sms.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "models:\n  sms:\n    source: \"\"").unwrap();
        let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("models.sms.source"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = Config::from_file("/nonexistent/phishguard.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/phishguard.yaml"));
    }
}
