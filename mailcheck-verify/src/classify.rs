//! MX-organization classification and the per-organization processing
//! profiles that drive batching, rate limiting, and probe method selection.

use serde::{Deserialize, Serialize};

/// The organization label an MX host's hostname is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MxOrg {
    Google,
    Microsoft,
    Yahoo,
    Apple,
    ProtonMail,
    Fastmail,
    Zoho,
    Yandex,
    MailRu,
    Gmx,
    Mailgun,
    SendGrid,
    AmazonSes,
    BusinessSmtpStandard,
    Standard,
    UnknownMxConservative,
    UnknownMxUltraConservative,
}

/// How to group emails whose lowest-`pref` MX shares this organization, and
/// how to throttle the probe against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupBy {
    Organization,
    MxDomain,
    Domain,
}

/// The probe method a given organization's path should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeMethod {
    SmtpVerification,
    MicrosoftLoginVerification,
    YahooAlternateVerification,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub requests_per_second: u32,
    pub burst_limit: u32,
}

/// Batching, concurrency, and retry knobs for one organization label.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingProfile {
    pub batch_size: usize,
    pub parallel_connections: usize,
    pub delay_between_batches_ms: u64,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub rate_limit: RateLimit,
    pub group_by: GroupBy,
    pub method: ProbeMethod,
}

/// MX hostnames matching one of these substrings force a single-recipient-
/// per-session grouping, regardless of the organization's own profile
/// batch size.
const SINGLE_RECIPIENT_PER_SESSION: &[&str] = &["google.com", ".protection.outlook.com", "icloud.com"];

#[must_use]
pub fn requires_single_recipient_per_session(mx_host: &str) -> bool {
    let host = mx_host.to_ascii_lowercase();
    SINGLE_RECIPIENT_PER_SESSION.iter().any(|pattern| host.contains(pattern))
}

/// Classifies an MX hostname (e.g. `aspmx.l.google.com`) into an
/// organization label by substring match, falling back to the two
/// "unknown" conservative labels.
#[must_use]
pub fn classify_mx_host(mx_host: &str) -> MxOrg {
    let host = mx_host.to_ascii_lowercase();

    const RULES: &[(&str, MxOrg)] = &[
        ("google.com", MxOrg::Google),
        ("googlemail.com", MxOrg::Google),
        ("outlook.com", MxOrg::Microsoft),
        ("protection.outlook.com", MxOrg::Microsoft),
        ("hotmail.com", MxOrg::Microsoft),
        ("yahoodns.net", MxOrg::Yahoo),
        ("yahoo.com", MxOrg::Yahoo),
        ("icloud.com", MxOrg::Apple),
        ("apple.com", MxOrg::Apple),
        ("protonmail.ch", MxOrg::ProtonMail),
        ("proton.me", MxOrg::ProtonMail),
        ("fastmail.com", MxOrg::Fastmail),
        ("zoho.com", MxOrg::Zoho),
        ("yandex.net", MxOrg::Yandex),
        ("yandex.ru", MxOrg::Yandex),
        ("mail.ru", MxOrg::MailRu),
        ("gmx.net", MxOrg::Gmx),
        ("gmx.com", MxOrg::Gmx),
        ("mailgun.org", MxOrg::Mailgun),
        ("sendgrid.net", MxOrg::SendGrid),
        ("amazonses.com", MxOrg::AmazonSes),
    ];

    for (pattern, org) in RULES {
        if host.contains(pattern) {
            return *org;
        }
    }

    if looks_like_business_smtp(&host) {
        MxOrg::BusinessSmtpStandard
    } else if host.is_empty() {
        MxOrg::UnknownMxUltraConservative
    } else {
        MxOrg::Standard
    }
}

/// Heuristic for hosted-business-mail MX patterns that aren't one of the
/// named consumer providers but still look like a dedicated mail platform
/// (as opposed to a single self-hosted server with no pattern at all).
fn looks_like_business_smtp(host: &str) -> bool {
    const BUSINESS_HINTS: &[&str] = &["mx.", "mail.protection.", "secureserver.net", "mimecast.com", "barracudanetworks.com"];
    BUSINESS_HINTS.iter().any(|hint| host.contains(hint)) || host.matches('.').count() >= 3
}

#[must_use]
pub const fn profile_for(org: MxOrg) -> ProcessingProfile {
    match org {
        MxOrg::Google => ProcessingProfile {
            batch_size: 1,
            parallel_connections: 4,
            delay_between_batches_ms: 500,
            max_retries: 2,
            timeout_ms: 15_000,
            rate_limit: RateLimit { requests_per_second: 5, burst_limit: 10 },
            group_by: GroupBy::Domain,
            method: ProbeMethod::SmtpVerification,
        },
        MxOrg::Microsoft => ProcessingProfile {
            batch_size: 1,
            parallel_connections: 2,
            delay_between_batches_ms: 1000,
            max_retries: 2,
            timeout_ms: 15_000,
            rate_limit: RateLimit { requests_per_second: 2, burst_limit: 4 },
            group_by: GroupBy::Domain,
            method: ProbeMethod::MicrosoftLoginVerification,
        },
        MxOrg::Yahoo => ProcessingProfile {
            batch_size: 1,
            parallel_connections: 2,
            delay_between_batches_ms: 1000,
            max_retries: 2,
            timeout_ms: 15_000,
            rate_limit: RateLimit { requests_per_second: 2, burst_limit: 4 },
            group_by: GroupBy::Domain,
            method: ProbeMethod::YahooAlternateVerification,
        },
        MxOrg::Apple => ProcessingProfile {
            batch_size: 1,
            parallel_connections: 2,
            delay_between_batches_ms: 750,
            max_retries: 2,
            timeout_ms: 15_000,
            rate_limit: RateLimit { requests_per_second: 3, burst_limit: 6 },
            group_by: GroupBy::Domain,
            method: ProbeMethod::SmtpVerification,
        },
        MxOrg::ProtonMail | MxOrg::Fastmail | MxOrg::Zoho => ProcessingProfile {
            batch_size: 10,
            parallel_connections: 3,
            delay_between_batches_ms: 500,
            max_retries: 2,
            timeout_ms: 15_000,
            rate_limit: RateLimit { requests_per_second: 5, burst_limit: 10 },
            group_by: GroupBy::MxDomain,
            method: ProbeMethod::SmtpVerification,
        },
        MxOrg::Yandex | MxOrg::MailRu | MxOrg::Gmx => ProcessingProfile {
            batch_size: 10,
            parallel_connections: 2,
            delay_between_batches_ms: 750,
            max_retries: 2,
            timeout_ms: 15_000,
            rate_limit: RateLimit { requests_per_second: 3, burst_limit: 6 },
            group_by: GroupBy::MxDomain,
            method: ProbeMethod::SmtpVerification,
        },
        MxOrg::Mailgun | MxOrg::SendGrid | MxOrg::AmazonSes => ProcessingProfile {
            batch_size: 20,
            parallel_connections: 4,
            delay_between_batches_ms: 250,
            max_retries: 1,
            timeout_ms: 10_000,
            rate_limit: RateLimit { requests_per_second: 10, burst_limit: 20 },
            group_by: GroupBy::Organization,
            method: ProbeMethod::SmtpVerification,
        },
        MxOrg::BusinessSmtpStandard => ProcessingProfile {
            batch_size: 15,
            parallel_connections: 3,
            delay_between_batches_ms: 500,
            max_retries: 2,
            timeout_ms: 15_000,
            rate_limit: RateLimit { requests_per_second: 5, burst_limit: 10 },
            group_by: GroupBy::MxDomain,
            method: ProbeMethod::SmtpVerification,
        },
        MxOrg::Standard => ProcessingProfile {
            batch_size: 20,
            parallel_connections: 4,
            delay_between_batches_ms: 500,
            max_retries: 2,
            timeout_ms: 15_000,
            rate_limit: RateLimit { requests_per_second: 5, burst_limit: 10 },
            group_by: GroupBy::MxDomain,
            method: ProbeMethod::SmtpVerification,
        },
        MxOrg::UnknownMxConservative => ProcessingProfile {
            batch_size: 5,
            parallel_connections: 2,
            delay_between_batches_ms: 1500,
            max_retries: 1,
            timeout_ms: 20_000,
            rate_limit: RateLimit { requests_per_second: 1, burst_limit: 2 },
            group_by: GroupBy::MxDomain,
            method: ProbeMethod::SmtpVerification,
        },
        MxOrg::UnknownMxUltraConservative => ProcessingProfile {
            batch_size: 1,
            parallel_connections: 1,
            delay_between_batches_ms: 3000,
            max_retries: 0,
            timeout_ms: 20_000,
            rate_limit: RateLimit { requests_per_second: 1, burst_limit: 1 },
            group_by: GroupBy::Domain,
            method: ProbeMethod::SmtpVerification,
        },
    }
}

/// Splits `items` into chunks of at most `batch_size`.
pub fn batch<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    if batch_size == 0 {
        return vec![items.to_vec()];
    }
    items.chunks(batch_size).map(<[T]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_google_mx() {
        assert_eq!(classify_mx_host("aspmx.l.google.com"), MxOrg::Google);
    }

    #[test]
    fn test_classify_microsoft_mx() {
        assert_eq!(classify_mx_host("example-com.mail.protection.outlook.com"), MxOrg::Microsoft);
    }

    #[test]
    fn test_classify_unknown_host_is_standard_or_business() {
        let org = classify_mx_host("mail.somecompany.io");
        assert!(matches!(org, MxOrg::Standard | MxOrg::BusinessSmtpStandard));
    }

    #[test]
    fn test_classify_empty_host_is_ultra_conservative() {
        assert_eq!(classify_mx_host(""), MxOrg::UnknownMxUltraConservative);
    }

    #[test]
    fn test_single_recipient_per_session_matches() {
        assert!(requires_single_recipient_per_session("aspmx.l.google.com"));
        assert!(requires_single_recipient_per_session("foo.mail.protection.outlook.com"));
        assert!(requires_single_recipient_per_session("mx01.mail.icloud.com"));
        assert!(!requires_single_recipient_per_session("mx.fastmail.com"));
    }

    #[test]
    fn test_batch_splits_evenly() {
        let items: Vec<u32> = (0..21).collect();
        let batches = batch(&items, 20);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 20);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn test_batch_exact_multiple_has_no_empty_tail() {
        let items: Vec<u32> = (0..20).collect();
        let batches = batch(&items, 20);
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_google_profile_is_single_recipient() {
        let profile = profile_for(MxOrg::Google);
        assert_eq!(profile.batch_size, 1);
        assert_eq!(profile.method, ProbeMethod::SmtpVerification);
    }
}
