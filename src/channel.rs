use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Url,
    Email,
    Sms,
    Qr,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Url, Channel::Email, Channel::Sms, Channel::Qr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Url => "url",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Qr => "qr",
        }
    }

    /// Channel whose model and rule table actually score this channel's content.
    /// QR payloads are judged as URLs.
    pub fn scoring_channel(&self) -> Channel {
        match self {
            Channel::Qr => Channel::Url,
            other => *other,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "url" => Ok(Channel::Url),
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "qr" => Ok(Channel::Qr),
            other => Err(PipelineError::Encoding(format!(
                "unknown channel tag '{}'",
                other
            ))),
        }
    }
}

/// A single submission, fixed at the boundary.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    content: String,
    channel: Channel,
    raw_image: Option<Vec<u8>>,
}

impl ScanRequest {
    pub fn new(content: impl Into<String>, channel: Channel) -> Self {
        Self {
            content: content.into(),
            channel,
            raw_image: None,
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            content: String::new(),
            channel: Channel::Qr,
            raw_image: Some(bytes),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn raw_image(&self) -> Option<&[u8]> {
        self.raw_image.as_deref()
    }
}
