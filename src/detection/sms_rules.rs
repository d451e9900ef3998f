use super::{Rule, REWARD, URGENCY};
use crate::domain_utils::DomainUtils;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LINK: Regex = Regex::new(
        r"(?i)(https?://\S+|www\.\S+|\b[a-z0-9-]+\.(com|net|org|info|biz|xyz|top|tk|ml|ga|cf|gq|ly|co|io|me|link|click)\b(/\S*)?)"
    )
    .unwrap();
    static ref ACCOUNT_REQUEST: Regex = Regex::new(
        r"(?i)\b(bank|banking|account|pin|otp|one-time|verification code|security code|card|ssn|password)\b"
    )
    .unwrap();
    static ref REPLY_REQUEST: Regex = Regex::new(
        r"(?i)\b(reply (yes|y|stop|now|with)|text (back|yes|stop)|call (now|us|this number|back)|ring us)\b"
    )
    .unwrap();
}

pub static RULES: &[Rule] = &[
    Rule {
        name: "urgency",
        points: 15,
        label: "Urgent or threatening language",
        check: has_urgency,
    },
    Rule {
        name: "reward",
        points: 20,
        label: "Prize or reward language",
        check: has_reward_language,
    },
    Rule {
        name: "contains_link",
        points: 10,
        label: "Contains a link",
        check: contains_link,
    },
    Rule {
        name: "shortened_link",
        points: 15,
        label: "Shortened link hides the real destination",
        check: contains_shortened_link,
    },
    Rule {
        name: "account_request",
        points: 15,
        label: "Asks for banking, account or one-time codes",
        check: requests_account_details,
    },
    Rule {
        name: "reply_request",
        points: 10,
        label: "Asks you to reply or call back",
        check: requests_reply,
    },
];

fn has_urgency(content: &str) -> bool {
    URGENCY.is_match(content)
}

fn has_reward_language(content: &str) -> bool {
    REWARD.is_match(content)
}

fn contains_link(content: &str) -> bool {
    LINK.is_match(content)
}

fn contains_shortened_link(content: &str) -> bool {
    LINK.find_iter(content).any(|m| {
        let candidate = m
            .as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ')'));
        DomainUtils::extract_host(candidate)
            .map(|host| DomainUtils::is_shortener_host(&host))
            .unwrap_or(false)
    })
}

fn requests_account_details(content: &str) -> bool {
    ACCOUNT_REQUEST.is_match(content)
}

fn requests_reply(content: &str) -> bool {
    REPLY_REQUEST.is_match(content)
}
