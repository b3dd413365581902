// Error classification - maps opaque upstream failures to response classes
//
// Patterns are checked in order, first match wins:
// 1. page parsing / signature extraction failures -> PageStructureChanged
// 2. abort / timeout                                -> UpstreamTimeout
// 3. everything else                                -> Unknown
//
// InvalidInput never comes out of here; URLs are validated before any
// upstream call.

use lazy_static::lazy_static;
use regex::RegexSet;

lazy_static! {
    static ref PAGE_STRUCTURE_PATTERNS: RegexSet = RegexSet::new([
        r"(?i)could not extract",
        r"(?i)could not parse",
        r"(?i)unable to (parse|retrieve|extract)",
        r"(?i)error when parsing",
        r"(?i)(decipher|signature|\bn ?transform)",
        r"(?i)player (config|response|script)",
        r"(?i)watch\.html",
        r"(?i)confirm you.re not a bot",
        r"(?i)sign in to confirm",
    ])
    .unwrap();
    static ref TIMEOUT_PATTERNS: RegexSet = RegexSet::new([
        r"(?i)\babort(ed)?\b",
        r"(?i)time(d)? ?out",
        r"(?i)etimedout",
        r"(?i)deadline exceeded",
    ])
    .unwrap();
    static ref AUTH_CHALLENGE_PATTERNS: RegexSet = RegexSet::new([
        r"(?i)confirm you.re not a bot",
        r"(?i)sign in to confirm",
        r"(?i)\bhttp 429\b",
    ])
    .unwrap();
}

/// Response class of an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Upstream changed its page/player layout; retry later (503)
    PageStructureChanged,
    /// The attempt was aborted on its time budget (504)
    UpstreamTimeout,
    /// Malformed or non-matching URL (400)
    InvalidInput,
    /// Anything else (500)
    Unknown,
}

impl ErrorClass {
    /// Message safe to show to a client
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::PageStructureChanged => {
                "The video site changed its page structure or is challenging requests. Please try again later."
            }
            Self::UpstreamTimeout => "The video site did not respond in time. Please try again.",
            Self::InvalidInput => "Invalid video URL",
            Self::Unknown => "Failed to process the video",
        }
    }
}

/// Classify an upstream failure by its message text
pub fn classify(message: &str) -> ErrorClass {
    if PAGE_STRUCTURE_PATTERNS.is_match(message) {
        return ErrorClass::PageStructureChanged;
    }
    if TIMEOUT_PATTERNS.is_match(message) {
        return ErrorClass::UpstreamTimeout;
    }
    ErrorClass::Unknown
}

/// Whether the failure is the bot-detection challenge that warrants a
/// backoff before the next attempt
pub fn is_auth_challenge(message: &str) -> bool {
    AUTH_CHALLENGE_PATTERNS.is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_failures_detection() {
        for msg in [
            "Could not extract functions",
            "Could not parse decipher function",
            "Error when parsing watch.html, maybe YouTube made a change.",
            "Could not extract signature deciphering functions: all ciphered",
            "Unable to retrieve video metadata",
            "Could not parse player response: missing streamingData",
        ] {
            assert_eq!(classify(msg), ErrorClass::PageStructureChanged, "{}", msg);
        }
    }

    #[test]
    fn test_bot_challenge_detection() {
        let msg = "Video unplayable: Sign in to confirm you're not a bot";
        assert_eq!(classify(msg), ErrorClass::PageStructureChanged);
        assert!(is_auth_challenge(msg));
        assert!(is_auth_challenge("HTTP 429 from upstream while requesting player"));
        assert!(!is_auth_challenge("Timed out after 12000ms"));
    }

    #[test]
    fn test_timeout_detection() {
        for msg in [
            "Timed out after 12000ms (request aborted)",
            "The operation was aborted",
            "connect ETIMEDOUT 142.250.1.1:443",
            "Transport error: operation timed out",
        ] {
            assert_eq!(classify(msg), ErrorClass::UpstreamTimeout, "{}", msg);
        }
    }

    #[test]
    fn test_page_patterns_win_over_timeout() {
        let msg = "Could not extract functions (request aborted)";
        assert_eq!(classify(msg), ErrorClass::PageStructureChanged);
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(classify("Video unplayable: Video unavailable"), ErrorClass::Unknown);
        assert_eq!(classify("HTTP 500 from upstream while requesting player"), ErrorClass::Unknown);
        assert_eq!(classify(""), ErrorClass::Unknown);
    }
}
