//! Input encoding for the channel models
//!
//! URL models read raw character codes, text models read vocabulary indices.
//! Both produce a fixed-length, zero-padded sequence.

use crate::channel::Channel;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

/// Sequence length every channel model was exported with.
pub const SEQUENCE_LENGTH: usize = 200;

/// Highest character code the URL model's embedding table covers.
pub const MAX_CHAR_CODE: u32 = 127;

pub const PAD_INDEX: u32 = 0;
pub const UNK_INDEX: u32 = 1;

lazy_static! {
    static ref SMS_URL: Regex = Regex::new(r"http\S+|www\.\S+").unwrap();
    static ref SMS_PHONE: Regex = Regex::new(r"\b\d{10,}\b").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    channel: Channel,
    values: Vec<u32>,
}

impl EncodedInput {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when no position carries a character or token.
    pub fn is_all_padding(&self) -> bool {
        self.values.iter().all(|&v| v == PAD_INDEX)
    }
}

/// Word to index table shipped next to a text model.
///
/// Built from the exported token list where the array position is the index,
/// so position 0 is padding and position 1 is the unknown token.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    index: HashMap<String, u32>,
}

impl Vocabulary {
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(tokens.len());
        for (position, token) in tokens.into_iter().enumerate() {
            if position <= UNK_INDEX as usize || token.is_empty() {
                continue;
            }
            index.entry(token).or_insert(position as u32);
        }
        Self { index }
    }

    pub fn lookup(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or(UNK_INDEX)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Encode with no vocabulary; every text token maps to the unknown index.
pub fn encode(content: &str, channel: Channel) -> EncodedInput {
    encode_with_vocabulary(content, channel, None)
}

pub fn encode_with_vocabulary(
    content: &str,
    channel: Channel,
    vocabulary: Option<&Vocabulary>,
) -> EncodedInput {
    let mut values = match channel.scoring_channel() {
        Channel::Url => encode_characters(content),
        Channel::Sms => encode_tokens(&normalize_sms(content), vocabulary),
        _ => encode_tokens(&standardize_email(content), vocabulary),
    };
    values.resize(SEQUENCE_LENGTH, PAD_INDEX);

    EncodedInput { channel, values }
}

fn encode_characters(content: &str) -> Vec<u32> {
    content
        .chars()
        .take(SEQUENCE_LENGTH)
        .map(|c| (c as u32).min(MAX_CHAR_CODE))
        .collect()
}

fn encode_tokens(content: &str, vocabulary: Option<&Vocabulary>) -> Vec<u32> {
    tokenize(content)
        .take(SEQUENCE_LENGTH)
        .map(|token| vocabulary.map_or(UNK_INDEX, |v| v.lookup(&token)))
        .collect()
}

/// Lowercased whitespace tokens; `split_whitespace` already collapses runs.
pub fn tokenize(content: &str) -> impl Iterator<Item = String> + '_ {
    content.split_whitespace().map(|t| t.to_lowercase())
}

/// Lowercases and drops ASCII punctuation, matching the standardization the
/// email vocabulary was adapted with. Non-ASCII symbols are kept.
pub fn standardize_email(content: &str) -> String {
    content
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .to_lowercase()
}

/// The SMS vocabulary was built with links and long digit runs replaced by
/// placeholder tokens.
pub fn normalize_sms(content: &str) -> String {
    let lowered = content.to_lowercase();
    let without_links = SMS_URL.replace_all(&lowered, " url ");
    SMS_PHONE
        .replace_all(&without_links, " phonenumber ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
