use super::Rule;
use crate::domain_utils::DomainUtils;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SPECIAL_CHARS: Regex = Regex::new(r"[_\\%@#$]").unwrap();
    // Character-substituted spellings of frequently impersonated brands
    static ref TYPOSQUAT: Regex = Regex::new(
        r"(?i)(amaz0n|arnazon|amazom|g00gle|go0gle|g0ogle|gooogle|paypa1|paypai|paypall|micros0ft|microsft|rnicrosoft|app1e|faceb00k|facebo0k|netf1ix|netfl1x|linkedln|yah00|0utlook|instagrarn|twltter|dropb0x|wellsfarg0|chase-0nline)"
    )
    .unwrap();
}

pub static RULES: &[Rule] = &[
    Rule {
        name: "http_scheme",
        points: 10,
        label: "Uses insecure HTTP connection",
        check: uses_http,
    },
    Rule {
        name: "special_characters",
        points: 10,
        label: "Contains suspicious special characters",
        check: has_special_characters,
    },
    Rule {
        name: "typosquatting",
        points: 15,
        label: "Possible typosquatting of a known brand",
        check: has_typosquatting,
    },
    Rule {
        name: "ip_address_host",
        points: 20,
        label: "IP address used instead of domain",
        check: DomainUtils::host_is_ipv4,
    },
    Rule {
        name: "url_shortener",
        points: 15,
        label: "URL shortener hides the real destination",
        check: uses_shortener,
    },
    Rule {
        name: "excessive_subdomains",
        points: 10,
        label: "Excessive number of subdomains",
        check: has_excessive_dots,
    },
];

fn uses_http(content: &str) -> bool {
    content.trim_start().to_lowercase().starts_with("http://")
}

fn has_special_characters(content: &str) -> bool {
    SPECIAL_CHARS.is_match(content)
}

fn has_typosquatting(content: &str) -> bool {
    TYPOSQUAT.is_match(content)
}

fn uses_shortener(content: &str) -> bool {
    DomainUtils::extract_host(content)
        .map(|host| DomainUtils::is_shortener_host(&host))
        .unwrap_or(false)
}

fn has_excessive_dots(content: &str) -> bool {
    content.matches('.').count() > 3
}
