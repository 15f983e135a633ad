//! Confidence-scored classification of SMTP response text: is this a
//! greylist defer, and if not, what kind of permanent error is it?

const GREYLIST_HIGH: &[&str] = &["greylist", "graylist", "silverlisting"];
const GREYLIST_MEDIUM: &[&str] = &["temporarily", "temporary", "deferred", "try again", "retry later"];
const GREYLIST_LOW: &[&str] = &["delay", "retry", "service refuse", "relay access denied"];
const GREYLIST_ANTI_PATTERNS: &[&str] = &[
    "storage", "full", "quota", "space", "disk", "mailbox full", "over quota", "insufficient storage",
];

const BLACKLIST_KEYWORDS: &[&str] = &[
    "spamhaus", "proofpoint", "cloudmark", "banned", "blacklisted", "block", "poor reputation",
    "junkmail", "spam", "prohibit", "forbid", "disallow", "score too low", "connection rejected",
    "connection refused", "dnsbl", "rbl", "rtbl", "rpbl", "snbl", "sbrs", "senderscore",
    "not allowed", "relay access denied",
];

const INVALID_RECIPIENT_KEYWORDS: &[&str] = &[
    "undeliverable", "does not exist", "user unknown", "user not found", "invalid address",
    "invalid recipient", "recipient rejected", "no mailbox", "unknown recipient", "no such user",
    "address not found", "mailbox not found", "non-existent user", "mailbox unavailable",
    "cannot deliver to", "no such recipient", "no such address",
];

/// Outcome of [`analyze_greylist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreylistVerdict {
    pub is_greylisted: bool,
    pub confidence: u8,
    pub should_retry: bool,
}

/// Server-specific greylist phrasing that doesn't fit the generic catalog.
fn server_pattern_hit(body: &str) -> Option<u8> {
    let b = body.to_ascii_lowercase();
    let gmail = b.contains("temporarily_rejected")
        || b.contains("rate limit")
        || b.contains("ratelimit")
        || b.contains("receiving mail at a rate")
        || b.contains("rate") && b.contains("prevent");
    let outlook = b.contains("server busy") || b.contains("server_busy") || b.contains("throttl");
    let yahoo = b.contains("rate limit") || b.contains("ratelimit") || b.contains("defer");
    if gmail || outlook || yahoo {
        Some(85)
    } else {
        None
    }
}

/// Scores `status`/`body` against the greylisting keyword catalog.
///
/// Only statuses 421/450/451 are eligible for the medium/low buckets; a
/// high-confidence keyword hit overrides the status code entirely.
#[must_use]
pub fn analyze_greylist(status: u16, body: &str) -> GreylistVerdict {
    let lower = body.to_ascii_lowercase();

    if GREYLIST_ANTI_PATTERNS.iter().any(|kw| lower.contains(kw)) {
        return GreylistVerdict { is_greylisted: false, confidence: 0, should_retry: false };
    }

    if GREYLIST_HIGH.iter().any(|kw| lower.contains(kw)) {
        return GreylistVerdict { is_greylisted: true, confidence: 95, should_retry: true };
    }

    if let Some(confidence) = server_pattern_hit(&lower) {
        return GreylistVerdict { is_greylisted: true, confidence, should_retry: true };
    }

    let greylist_status = matches!(status, 421 | 450 | 451);

    if greylist_status && GREYLIST_MEDIUM.iter().any(|kw| lower.contains(kw)) {
        return GreylistVerdict { is_greylisted: true, confidence: 75, should_retry: true };
    }

    if greylist_status && GREYLIST_LOW.iter().any(|kw| lower.contains(kw)) {
        return GreylistVerdict { is_greylisted: true, confidence: 55, should_retry: true };
    }

    GreylistVerdict { is_greylisted: false, confidence: 0, should_retry: false }
}

/// Classification returned by [`classify_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Permanent,
    Temporary,
    Unknown,
}

/// The bucket a permanent (5xx) error falls into, per §4.4's verdict table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorBucket {
    FullInbox,
    Blocked,
    NotAllowed,
    ServerUnavailable,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorVerdict {
    pub classification: ErrorClass,
    pub bucket: ErrorBucket,
    pub should_retry: bool,
}

/// Classifies a non-2xx SMTP response body using the blacklist /
/// invalid-recipient keyword catalogs.
#[must_use]
pub fn classify_error(status: u16, body: &str) -> ErrorVerdict {
    let lower = body.to_ascii_lowercase();

    if lower.contains("full") || lower.contains("quota") || lower.contains("over quota") {
        return ErrorVerdict {
            classification: ErrorClass::Permanent,
            bucket: ErrorBucket::FullInbox,
            should_retry: false,
        };
    }

    if BLACKLIST_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return ErrorVerdict {
            classification: ErrorClass::Permanent,
            bucket: ErrorBucket::Blocked,
            should_retry: false,
        };
    }

    if status >= 500 && INVALID_RECIPIENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return ErrorVerdict {
            classification: ErrorClass::Permanent,
            bucket: ErrorBucket::NotAllowed,
            should_retry: false,
        };
    }

    if (400..500).contains(&status) {
        return ErrorVerdict {
            classification: ErrorClass::Temporary,
            bucket: ErrorBucket::ServerUnavailable,
            should_retry: true,
        };
    }

    if status >= 500 {
        return ErrorVerdict {
            classification: ErrorClass::Permanent,
            bucket: ErrorBucket::Unknown,
            should_retry: false,
        };
    }

    ErrorVerdict {
        classification: ErrorClass::Unknown,
        bucket: ErrorBucket::Unknown,
        should_retry: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_confidence_greylist_ignores_status() {
        let verdict = analyze_greylist(250, "421 greylisted, please retry");
        assert!(verdict.is_greylisted);
        assert_eq!(verdict.confidence, 95);
    }

    #[test]
    fn test_anti_pattern_suppresses_greylist() {
        let verdict = analyze_greylist(452, "mailbox full, over quota");
        assert!(!verdict.is_greylisted);
    }

    #[test]
    fn test_medium_keyword_requires_greylist_status() {
        let hit = analyze_greylist(451, "temporarily deferred, try again later");
        assert!(hit.is_greylisted);
        assert_eq!(hit.confidence, 75);

        let miss = analyze_greylist(250, "temporarily deferred, try again later");
        assert!(!miss.is_greylisted);
    }

    #[test]
    fn test_blacklist_keyword_detected() {
        let verdict = classify_error(554, "Rejected - spamhaus listed");
        assert_eq!(verdict.bucket, ErrorBucket::Blocked);
        assert!(!verdict.should_retry);
    }

    #[test]
    fn test_invalid_recipient_keyword_detected() {
        let verdict = classify_error(550, "550 5.1.1 user unknown");
        assert_eq!(verdict.bucket, ErrorBucket::NotAllowed);
    }

    #[test]
    fn test_full_inbox_detected_before_blacklist() {
        let verdict = classify_error(552, "mailbox full, quota exceeded");
        assert_eq!(verdict.bucket, ErrorBucket::FullInbox);
    }

    #[test]
    fn test_temporary_unclassified_error_is_server_unavailable() {
        let verdict = classify_error(450, "mailbox temporarily unavailable");
        assert_eq!(verdict.classification, ErrorClass::Temporary);
        assert_eq!(verdict.bucket, ErrorBucket::ServerUnavailable);
    }
}
