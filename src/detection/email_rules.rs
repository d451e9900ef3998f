use super::{Rule, REWARD, URGENCY};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CREDENTIAL_REQUEST: Regex = Regex::new(
        r"(?i)\b(verify|confirm|validate|update|reactivate)\s+(your\s+)?(account|identity|information|details|password|login|credentials)\b|\b(password|passcode|login credentials|username and password|social security|ssn)\b"
    )
    .unwrap();
    static ref FINANCIAL_REQUEST: Regex = Regex::new(
        r"(?i)\b(credit card|debit card|card number|bank account|account number|routing number|wire transfer|billing information|payment details|payment information|cvv|pin number)\b"
    )
    .unwrap();
    static ref GENERIC_GREETING: Regex = Regex::new(
        r"(?i)\b(dear (valued )?(customer|user|client|member|account holder|sir|madam)|hello (customer|user)|greetings,? (customer|user))\b"
    )
    .unwrap();
    static ref NO_REPLY_SENDER: Regex =
        Regex::new(r"(?i)\b(no-?reply|do-?not-?reply)@").unwrap();
    static ref CALL_TO_ACTION: Regex = Regex::new(
        r"(?i)\b(click (here|below|the link|this link|now)|follow the link|tap here|log ?in here)\b"
    )
    .unwrap();
    static ref IP_LINK: Regex = Regex::new(r"(?i)https?://\d{1,3}(\.\d{1,3}){3}").unwrap();
}

pub static RULES: &[Rule] = &[
    Rule {
        name: "urgency",
        points: 15,
        label: "Urgent or threatening language",
        check: has_urgency,
    },
    Rule {
        name: "credential_request",
        points: 20,
        label: "Requests account verification or credentials",
        check: requests_credentials,
    },
    Rule {
        name: "financial_request",
        points: 20,
        label: "Requests financial information",
        check: requests_financial_info,
    },
    Rule {
        name: "generic_greeting",
        points: 10,
        label: "Generic greeting instead of your name",
        check: has_generic_greeting,
    },
    Rule {
        name: "reward",
        points: 15,
        label: "Prize or reward language",
        check: has_reward_language,
    },
    Rule {
        name: "no_reply_sender",
        points: 5,
        label: "Sent from a no-reply address",
        check: has_no_reply_sender,
    },
    Rule {
        name: "call_to_action",
        points: 10,
        label: "Pushes you to click a link",
        check: has_call_to_action,
    },
    Rule {
        name: "ip_link",
        points: 20,
        label: "Link points to a raw IP address",
        check: has_ip_link,
    },
];

fn has_urgency(content: &str) -> bool {
    URGENCY.is_match(content)
}

fn requests_credentials(content: &str) -> bool {
    CREDENTIAL_REQUEST.is_match(content)
}

fn requests_financial_info(content: &str) -> bool {
    FINANCIAL_REQUEST.is_match(content)
}

fn has_generic_greeting(content: &str) -> bool {
    GENERIC_GREETING.is_match(content)
}

fn has_reward_language(content: &str) -> bool {
    REWARD.is_match(content)
}

fn has_no_reply_sender(content: &str) -> bool {
    NO_REPLY_SENDER.is_match(content)
}

fn has_call_to_action(content: &str) -> bool {
    CALL_TO_ACTION.is_match(content)
}

fn has_ip_link(content: &str) -> bool {
    IP_LINK.is_match(content)
}

#[cfg(test)]
mod tests {
    use super::super::{extract, Channel};

    #[test]
    fn test_urgent_verification_request() {
        let result = extract(
            "URGENT: verify your account now, click here",
            Channel::Email,
            None,
        );
        assert_eq!(
            result.labels(),
            vec![
                "Urgent or threatening language".to_string(),
                "Requests account verification or credentials".to_string(),
                "Pushes you to click a link".to_string(),
            ]
        );
        assert_eq!(result.total_points(), 45);
    }

    #[test]
    fn test_classic_bank_lure() {
        let content = "From: no-reply@secure-bank.example\n\
                       Dear valued customer, we need your card number and CVV to \
                       restore access. Visit http://198.51.100.4/restore";
        let result = extract(content, Channel::Email, None);
        assert!(result.matched("generic_greeting"));
        assert!(result.matched("financial_request"));
        assert!(result.matched("no_reply_sender"));
        assert!(result.matched("ip_link"));
        assert!(!result.matched("reward"));
    }

    #[test]
    fn test_prize_email() {
        let result = extract(
            "Congratulations! You have been selected to receive a $500 gift card.",
            Channel::Email,
            None,
        );
        assert!(result.matched("reward"));
    }

    #[test]
    fn test_ordinary_email_is_clean() {
        let result = extract(
            "Hi Sam, attaching the notes from Tuesday's planning meeting. Talk soon.",
            Channel::Email,
            None,
        );
        assert!(result.hits.is_empty());
    }
}
