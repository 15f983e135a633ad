//! The SMTP probe itself: one connection to one MX host, driving
//! EHLO → MAIL FROM → an interleaved RCPT TO sequence, applying the
//! catch-all shortcut and per-email/per-domain retry budgets along the way.

use mailcheck_common::config::ProbeTimeouts;
use mailcheck_common::tracing;
use rand::Rng;

use crate::classify::{self, ErrorBucket};
use crate::client::SmtpClient;
use crate::error::Result;
use crate::response::Response;

const RECONNECTS_PER_MX: u32 = 3;
const RETRIES_PER_EMAIL: u32 = 2;
const RELAY_BLOCKS_BEFORE_DOMAIN_SKIP: u32 = 2;

/// Per-recipient outcome of a probe run, folded into `SmtpFindings` by the
/// caller (the verifier worker).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailOutcome {
    pub done: bool,
    pub deliverable: bool,
    pub disabled: bool,
    pub full_inbox: bool,
    pub catch_all: bool,
    pub catch_all_blocked: bool,
    pub greylisted: bool,
    pub requires_recheck: bool,
    pub error: bool,
    pub error_msg: Option<String>,
}

/// A single probe target: a real recipient address paired with a freshly
/// generated random-local-part address on the same domain used to test for
/// a catch-all mailbox policy.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub email: String,
    pub domain: String,
}

fn random_local_part() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..16)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Looks up a cached catch-all verdict for `domain`. Implemented as a trait
/// so the probe doesn't depend on `mailcheck-store` directly.
pub trait CatchAllCache: Send + Sync {
    fn check(&self, domain: &str) -> Option<bool>;
    fn record(&self, domain: &str, catch_all: bool, confidence: u8);
}

/// A cache that never has anything cached and discards writes — useful for
/// standalone tests of the probe loop.
pub struct NoCatchAllCache;

impl CatchAllCache for NoCatchAllCache {
    fn check(&self, _domain: &str) -> Option<bool> {
        None
    }
    fn record(&self, _domain: &str, _catch_all: bool, _confidence: u8) {}
}

pub struct ProbeConfig<'a> {
    pub em_domain: &'a str,
    pub mx_domain: &'a str,
    pub timeouts: ProbeTimeouts,
}

/// What the random-address RCPT response tells us about the domain.
enum RandomProbeVerdict {
    /// Confirmed (or strongly inferred) catch-all; `confidence` is what
    /// gets cached.
    CatchAll { confidence: u8 },
    /// The domain is blocking relay attempts outright — disable it and
    /// don't fall through to probe the real recipient.
    Blocked,
    /// Not a catch-all signal; fall through to probe the real recipient.
    /// `cache_confidence` is `Some` only when the signal is strong enough
    /// to be worth memoizing off a single observation.
    NotCatchAll { cache_confidence: Option<u8> },
}

/// Classifies the random-address RCPT response in isolation from the probe
/// loop, so every branch the loop can take is unit-testable without a
/// socket.
fn classify_random_probe(resp: &Response) -> RandomProbeVerdict {
    if resp.is_success() {
        return RandomProbeVerdict::CatchAll { confidence: 95 };
    }

    if resp.is_permanent_error() {
        let verdict = classify::classify_error(resp.code, &resp.message());
        return if verdict.bucket == ErrorBucket::Blocked {
            RandomProbeVerdict::Blocked
        } else {
            RandomProbeVerdict::NotCatchAll { cache_confidence: Some(95) }
        };
    }

    let verdict = classify::analyze_greylist(resp.code, &resp.message());
    if verdict.is_greylisted {
        RandomProbeVerdict::CatchAll { confidence: 75 }
    } else {
        RandomProbeVerdict::NotCatchAll { cache_confidence: None }
    }
}

/// Runs the probe against MX hosts `hosts`, in preference order, for the
/// batch of `targets` on a single domain, consulting and updating `cache`
/// for the catch-all shortcut.
///
/// # Errors
///
/// Returns an error only when every MX host is exhausted without a usable
/// connection; per-recipient failures are folded into the returned outcomes
/// instead of surfaced as errors.
pub async fn check(
    hosts: &[String],
    targets: &[ProbeTarget],
    config: &ProbeConfig<'_>,
    cache: &dyn CatchAllCache,
) -> Result<Vec<(String, EmailOutcome)>> {
    let mut outcomes: Vec<(String, EmailOutcome)> =
        targets.iter().map(|t| (t.email.clone(), EmailOutcome::default())).collect();
    let mut retries_used = vec![0u32; targets.len()];
    let mut relay_blocks_by_domain: std::collections::HashMap<String, u32> = std::collections::HashMap::new();

    'hosts: for host in hosts {
        let mut reconnects = 0;

        'reconnect: loop {
            let mut client = match SmtpClient::connect(
                &format!("{host}:25"),
                host.clone(),
                config.timeouts.connect_timeout(),
            )
            .await
            {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(%host, error = %e, "connect failed");
                    reconnects += 1;
                    if reconnects >= RECONNECTS_PER_MX {
                        continue 'hosts;
                    }
                    continue 'reconnect;
                }
            };

            if client.read_greeting(config.timeouts.connect_timeout()).await.is_err() {
                reconnects += 1;
                if reconnects >= RECONNECTS_PER_MX {
                    continue 'hosts;
                }
                continue 'reconnect;
            }

            let ehlo = client.ehlo(config.mx_domain, config.timeouts.ehlo_timeout()).await?;
            if ehlo.code == 500 || ehlo.code == 502 {
                let _ = client.helo(config.mx_domain, config.timeouts.ehlo_timeout()).await;
            } else if classify::classify_error(ehlo.code, &ehlo.message()).bucket == ErrorBucket::Blocked {
                for (_, outcome) in &mut outcomes {
                    outcome.disabled = true;
                    outcome.catch_all = false;
                    outcome.done = true;
                }
                break 'hosts;
            } else if ehlo.supports_extension("STARTTLS") {
                // A fresh connection starts the command state over, so the
                // server must be re-greeted with EHLO after the TLS upgrade.
                match client.starttls(config.timeouts.ehlo_timeout()).await {
                    Ok(resp) if resp.is_success() => {
                        let _ = client.ehlo(config.mx_domain, config.timeouts.ehlo_timeout()).await?;
                    }
                    _ => {
                        tracing::debug!(%host, "STARTTLS advertised but upgrade failed, continuing in plaintext");
                    }
                }
            }

            let mail_from = format!("contact@{}", config.em_domain);
            let mail_from_resp = client
                .mail_from(&mail_from, config.timeouts.mail_from_timeout())
                .await?;
            if !mail_from_resp.is_success() {
                reconnects += 1;
                if reconnects >= RECONNECTS_PER_MX {
                    continue 'hosts;
                }
                continue 'reconnect;
            }
            for (_, outcome) in &mut outcomes {
                outcome.catch_all = true;
            }

            let mut i = 0;
            while i < targets.len() {
                if outcomes[i].1.done {
                    i += 1;
                    continue;
                }

                let domain = &targets[i].domain;
                if relay_blocks_by_domain.get(domain).copied().unwrap_or(0)
                    >= RELAY_BLOCKS_BEFORE_DOMAIN_SKIP
                {
                    outcomes[i].1 = EmailOutcome {
                        done: true,
                        error: true,
                        error_msg: Some("Domain relay blocked".to_string()),
                        ..Default::default()
                    };
                    i += 1;
                    continue;
                }

                if let Some(cached) = cache.check(domain) {
                    outcomes[i].1.catch_all = cached;
                    outcomes[i].1.done = true;
                    i += 1;
                    continue;
                }

                let rand_addr = format!("{}@{domain}", random_local_part());
                let rand_resp = client
                    .rcpt_to(&rand_addr, config.timeouts.rcpt_to_timeout())
                    .await?;

                let domain_is_catch_all = match classify_random_probe(&rand_resp) {
                    RandomProbeVerdict::CatchAll { confidence } => {
                        cache.record(domain, true, confidence);
                        true
                    }
                    RandomProbeVerdict::Blocked => {
                        outcomes[i].1.disabled = true;
                        outcomes[i].1.catch_all = false;
                        outcomes[i].1.catch_all_blocked = true;
                        outcomes[i].1.done = true;
                        i += 1;
                        continue;
                    }
                    RandomProbeVerdict::NotCatchAll { cache_confidence } => {
                        if let Some(confidence) = cache_confidence {
                            cache.record(domain, false, confidence);
                        }
                        false
                    }
                };

                if domain_is_catch_all {
                    outcomes[i].1.catch_all = true;
                    outcomes[i].1.done = true;
                    i += 1;
                    continue;
                }

                let real_resp = client
                    .rcpt_to(&targets[i].email, config.timeouts.rcpt_to_timeout())
                    .await?;

                if real_resp.is_success() {
                    outcomes[i].1 = EmailOutcome {
                        done: true,
                        deliverable: true,
                        catch_all: false,
                        ..Default::default()
                    };
                } else if real_resp.is_permanent_error() {
                    let verdict = classify::classify_error(real_resp.code, &real_resp.message());
                    apply_bucket(&mut outcomes[i].1, verdict.bucket);
                    if verdict.bucket == ErrorBucket::Blocked {
                        *relay_blocks_by_domain.entry(domain.clone()).or_insert(0) += 1;
                    }
                } else {
                    let greylist = classify::analyze_greylist(real_resp.code, &real_resp.message());
                    if greylist.is_greylisted {
                        outcomes[i].1.greylisted = true;
                        outcomes[i].1.requires_recheck = greylist.confidence >= 75;
                    } else if retries_used[i] < RETRIES_PER_EMAIL {
                        retries_used[i] += 1;
                        continue;
                    } else {
                        outcomes[i].1 = EmailOutcome {
                            done: true,
                            error: true,
                            error_msg: Some("exhausted retries".to_string()),
                            ..Default::default()
                        };
                    }
                }

                i += 1;
            }

            let _ = client.quit(config.timeouts.quit_timeout()).await;
            break 'hosts;
        }
    }

    Ok(outcomes)
}

fn apply_bucket(outcome: &mut EmailOutcome, bucket: ErrorBucket) {
    match bucket {
        ErrorBucket::FullInbox => {
            outcome.full_inbox = true;
            outcome.done = true;
        }
        ErrorBucket::Blocked => {
            outcome.disabled = true;
            outcome.catch_all = false;
            outcome.done = true;
        }
        ErrorBucket::NotAllowed => {
            outcome.disabled = true;
            outcome.catch_all = false;
            outcome.done = true;
        }
        ErrorBucket::ServerUnavailable => {
            outcome.catch_all = false;
            outcome.deliverable = false;
            outcome.done = true;
        }
        ErrorBucket::Unknown => {
            outcome.requires_recheck = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_local_part_is_nonempty_and_ascii() {
        let part = random_local_part();
        assert_eq!(part.len(), 16);
        assert!(part.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_classify_random_probe_success_is_catch_all() {
        let resp = Response::new(250, vec!["OK".to_string()]);
        assert!(matches!(
            classify_random_probe(&resp),
            RandomProbeVerdict::CatchAll { confidence: 95 }
        ));
    }

    #[test]
    fn test_classify_random_probe_blacklisted_is_blocked() {
        let resp = Response::new(550, vec!["blocked, spamhaus listed".to_string()]);
        assert!(matches!(classify_random_probe(&resp), RandomProbeVerdict::Blocked));
    }

    #[test]
    fn test_classify_random_probe_permanent_non_blocked_is_not_catch_all_and_cached() {
        let resp = Response::new(550, vec!["no such user".to_string()]);
        assert!(matches!(
            classify_random_probe(&resp),
            RandomProbeVerdict::NotCatchAll { cache_confidence: Some(95) }
        ));
    }

    #[test]
    fn test_classify_random_probe_greylist_signal_is_catch_all() {
        let resp = Response::new(451, vec!["please try again later".to_string()]);
        assert!(matches!(
            classify_random_probe(&resp),
            RandomProbeVerdict::CatchAll { confidence: 75 }
        ));
    }

    /// The regression this guards: an ambiguous 4xx on the random probe
    /// that isn't a greylist signal either must not be treated as a reason
    /// to stop — the real recipient still needs to be probed.
    #[test]
    fn test_classify_random_probe_ambiguous_temporary_falls_through_uncached() {
        let resp = Response::new(450, vec!["4.2.2 mailbox full".to_string()]);
        assert!(matches!(
            classify_random_probe(&resp),
            RandomProbeVerdict::NotCatchAll { cache_confidence: None }
        ));
    }

    #[test]
    fn test_apply_bucket_full_inbox() {
        let mut outcome = EmailOutcome::default();
        apply_bucket(&mut outcome, ErrorBucket::FullInbox);
        assert!(outcome.full_inbox);
        assert!(outcome.done);
    }

    #[test]
    fn test_apply_bucket_blocked_clears_catch_all() {
        let mut outcome = EmailOutcome { catch_all: true, ..Default::default() };
        apply_bucket(&mut outcome, ErrorBucket::Blocked);
        assert!(outcome.disabled);
        assert!(!outcome.catch_all);
    }

    #[test]
    fn test_no_catch_all_cache_always_misses() {
        let cache = NoCatchAllCache;
        assert_eq!(cache.check("example.com"), None);
        cache.record("example.com", true, 95);
        assert_eq!(cache.check("example.com"), None);
    }
}
