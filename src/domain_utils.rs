use url::{Host, Url};

/// Hostnames that skip scoring entirely. Subdomains match too.
pub const DEFAULT_TRUSTED_DOMAINS: &[&str] = &[
    "google.com",
    "youtube.com",
    "gmail.com",
    "facebook.com",
    "instagram.com",
    "whatsapp.com",
    "amazon.com",
    "apple.com",
    "icloud.com",
    "microsoft.com",
    "live.com",
    "office.com",
    "outlook.com",
    "bing.com",
    "linkedin.com",
    "github.com",
    "wikipedia.org",
    "twitter.com",
    "x.com",
    "reddit.com",
    "stackoverflow.com",
    "yahoo.com",
    "netflix.com",
    "paypal.com",
    "dropbox.com",
    "zoom.us",
    "adobe.com",
];

pub const URL_SHORTENERS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "ow.ly",
    "short.link",
    "is.gd",
    "v.gd",
    "tiny.cc",
    "rb.gy",
    "cutt.ly",
    "shorturl.at",
    "buff.ly",
    "rebrand.ly",
    "u.to",
];

/// Minimal domain hierarchy utilities
pub struct DomainUtils;

impl DomainUtils {
    /// Parse content as a URL, retrying with an assumed `https://` scheme.
    /// Content that still yields no host is not a URL for our purposes.
    pub fn parse_url(content: &str) -> Option<Url> {
        let trimmed = content.trim();
        if let Ok(parsed) = Url::parse(trimmed) {
            if parsed.host().is_some() {
                return Some(parsed);
            }
        }

        Url::parse(&format!("https://{}", trimmed))
            .ok()
            .filter(|parsed| parsed.host().is_some())
    }

    /// Lowercased hostname of a URL-ish string
    pub fn extract_host(content: &str) -> Option<String> {
        Self::parse_url(content)?
            .host_str()
            .map(|h| h.trim_end_matches('.').to_lowercase())
    }

    pub fn host_is_ipv4(content: &str) -> bool {
        Self::parse_url(content)
            .map(|parsed| matches!(parsed.host(), Some(Host::Ipv4(_))))
            .unwrap_or(false)
    }

    /// Check if domain matches any in list (with hierarchy support)
    pub fn matches_domain_list<S: AsRef<str>>(domain: &str, domain_list: &[S]) -> bool {
        Self::find_in_domain_list(domain, domain_list).is_some()
    }

    /// The list entry `domain` equals or sits under, if any
    pub fn find_in_domain_list<'a, S: AsRef<str>>(
        domain: &str,
        domain_list: &'a [S],
    ) -> Option<&'a str> {
        let domain_lower = domain.to_lowercase();

        domain_list.iter().map(|p| p.as_ref()).find(|pattern| {
            let pattern_lower = pattern.to_lowercase();

            // Exact match, or subdomain match (domain ends with .pattern)
            domain_lower == pattern_lower || domain_lower.ends_with(&format!(".{}", pattern_lower))
        })
    }

    /// Canonicalize domain (remove www prefix)
    pub fn canonicalize_domain(domain: &str) -> String {
        let domain_lower = domain.to_lowercase();
        if let Some(stripped) = domain_lower.strip_prefix("www.") {
            stripped.to_string()
        } else {
            domain_lower
        }
    }

    pub fn is_shortener_host(host: &str) -> bool {
        Self::matches_domain_list(host, URL_SHORTENERS)
    }
}
