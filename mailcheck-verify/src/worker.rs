//! The verifier worker: turns one `Request` into a per-email result map
//! plus the greylisted/blacklisted/recheck-required tagging sets the
//! controller needs to decide what happens next.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use mailcheck_common::config::AppConfig;
use mailcheck_common::email::ParsedEmail;
use mailcheck_common::Domain;
use mailcheck_enrich::{Event, Registry};
use mailcheck_smtp::probe::{self, EmailOutcome, ProbeConfig, ProbeTarget};
use mailcheck_store::{MxRecord, Reachable, Request, SmtpFindings, Store, SyntaxInfo, VerificationObj};
use tokio::sync::mpsc;

use crate::cache::WorkerCatchAllCache;
use crate::classify::{self, GroupBy, MxOrg, ProcessingProfile};
use crate::dns::{self, DnsResolver};
use crate::lists::{self, DisposableDomains};

const QUICK_VERIFY_BATCH: usize = 20;
const DNS_BUDGET: Duration = Duration::from_secs(10);

/// The partial result a worker hands back to the controller for one
/// completed (or abandoned) request.
#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    pub request_id: String,
    pub result_map: HashMap<String, VerificationObj>,
    pub greylisted: HashSet<String>,
    pub blacklisted: HashSet<String>,
    pub recheck_required: HashSet<String>,
}

/// Messages a worker sends to the controller.
pub enum WorkerMessage {
    Ping { worker_index: u32 },
    Report { worker_index: u32, report: WorkerReport },
    Failed { worker_index: u32, request_id: String, error: String },
}

/// Messages the controller sends to a worker.
pub enum ControllerMessage {
    Assign(Request),
    Shutdown,
}

/// Shared, read-mostly collaborators every worker needs. Cloned cheaply
/// (all fields are `Arc`) and handed to each spawned worker task.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<Store>,
    pub dns: Arc<dyn DnsResolver>,
    pub enrich: Arc<Registry>,
    pub disposable: Arc<DisposableDomains>,
    pub config: Arc<AppConfig>,
}

pub struct Worker {
    pub index: u32,
    deps: WorkerDeps,
    to_controller: mpsc::Sender<WorkerMessage>,
    from_controller: mpsc::Receiver<ControllerMessage>,
}

impl Worker {
    #[must_use]
    pub fn new(
        index: u32,
        deps: WorkerDeps,
        to_controller: mpsc::Sender<WorkerMessage>,
    ) -> (Self, mpsc::Sender<ControllerMessage>) {
        let (tx, rx) = mpsc::channel(4);
        (Self { index, deps, to_controller, from_controller: rx }, tx)
    }

    /// Drives this worker's message loop until told to shut down or its
    /// channel to the controller closes.
    pub async fn run(mut self) {
        let ping_freq = Duration::from_secs(self.deps.config.ping_freq_secs);
        let mut heartbeat = tokio::time::interval(ping_freq);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if self.to_controller.send(WorkerMessage::Ping { worker_index: self.index }).await.is_err() {
                        return;
                    }
                }
                msg = self.from_controller.recv() => {
                    match msg {
                        Some(ControllerMessage::Assign(request)) => {
                            let request_id = request.request_id.clone();
                            let report = verify_request(&request, &self.deps).await;
                            let outcome = match report {
                                Ok(report) => WorkerMessage::Report { worker_index: self.index, report },
                                Err(e) => WorkerMessage::Failed {
                                    worker_index: self.index,
                                    request_id,
                                    error: e.to_string(),
                                },
                            };
                            if self.to_controller.send(outcome).await.is_err() {
                                return;
                            }
                        }
                        Some(ControllerMessage::Shutdown) | None => return,
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Domain(String),
    MxHost(String),
    Org(MxOrg),
}

#[derive(Clone)]
struct Pending {
    email: String,
    domain: String,
    mx: Vec<MxRecord>,
}

/// Verifies every email in `request`, returning the report the worker
/// sends back to the controller.
///
/// # Errors
///
/// Returns an error only if the durable store itself is unreachable;
/// per-email failures are folded into the returned report instead.
pub async fn verify_request(
    request: &Request,
    deps: &WorkerDeps,
) -> Result<WorkerReport, mailcheck_store::StoreError> {
    let mut results = HashMap::with_capacity(request.emails.len());
    let mut greylisted = HashSet::new();
    let mut blacklisted = HashSet::new();
    let mut recheck_required = HashSet::new();
    let mut pending: Vec<Pending> = Vec::new();

    for batch in request.emails.chunks(QUICK_VERIFY_BATCH) {
        let quick = futures_util::future::join_all(
            batch.iter().map(|email| quick_verify(email, deps)),
        )
        .await;

        for (email, outcome) in batch.iter().zip(quick) {
            match outcome {
                QuickOutcome::Settled(obj) => {
                    if !obj.has_mx_records && !obj.disposable && obj.syntax.valid {
                        recheck_required.insert(email.clone());
                    }
                    results.insert(email.clone(), obj);
                }
                QuickOutcome::NeedsProbe { obj, mx } => {
                    let domain = obj.syntax.domain.clone();
                    results.insert(email.clone(), obj);
                    pending.push(Pending { email: email.clone(), domain, mx });
                }
            }
        }
    }

    run_specialized_paths(&mut pending, &mut results, deps).await;

    run_probe_groups(pending, &mut results, &mut greylisted, &mut blacklisted, &mut recheck_required, deps)
        .await?;

    Ok(WorkerReport {
        request_id: request.request_id.clone(),
        result_map: results,
        greylisted,
        blacklisted,
        recheck_required,
    })
}

enum QuickOutcome {
    Settled(VerificationObj),
    NeedsProbe { obj: VerificationObj, mx: Vec<MxRecord> },
}

async fn quick_verify(email: &str, deps: &WorkerDeps) -> QuickOutcome {
    let parsed = match ParsedEmail::parse(email) {
        Ok(p) => p,
        Err(e) => {
            let syntax = SyntaxInfo { username: String::new(), domain: String::new(), valid: false };
            let mut obj = VerificationObj::unverified(email, syntax);
            obj.error = true;
            obj.error_msg = Some(e.to_string());
            obj.reachable = Reachable::No;
            return QuickOutcome::Settled(obj);
        }
    };

    let syntax = SyntaxInfo { username: parsed.username.clone(), domain: parsed.domain.to_string(), valid: true };
    let mut obj = VerificationObj::unverified(email, syntax);
    obj.role_account = lists::is_role_account(&parsed.username);
    obj.free = lists::is_free_domain(parsed.domain.as_str());
    obj.disposable = deps.disposable.contains(parsed.domain.as_str());

    if obj.disposable {
        return QuickOutcome::Settled(obj);
    }

    match dns::resolve_with_timeout(deps.dns.as_ref(), parsed.domain.as_str(), DNS_BUDGET).await {
        Ok(mut mx) => {
            mx.sort_by_key(|r| r.pref);
            obj.has_mx_records = !mx.is_empty();
            obj.mx = mx.clone();
            if mx.is_empty() {
                QuickOutcome::Settled(obj)
            } else {
                QuickOutcome::NeedsProbe { obj, mx }
            }
        }
        Err(e) => {
            obj.has_mx_records = false;
            obj.error = true;
            obj.error_msg = Some(e.to_string());
            QuickOutcome::Settled(obj)
        }
    }
}

/// Diverts Microsoft- and Yahoo-owned domains through the enrichment
/// dispatch interface instead of the generic SMTP probe group, removing
/// whatever it settles from `pending`.
async fn run_specialized_paths(
    pending: &mut Vec<Pending>,
    results: &mut HashMap<String, VerificationObj>,
    deps: &WorkerDeps,
) {
    let mut remaining = Vec::with_capacity(pending.len());

    for item in pending.drain(..) {
        let lowest_pref_host = item.mx.first().map_or("", |r| r.host.as_str());
        let org = classify::classify_mx_host(lowest_pref_host);

        let event = match org {
            MxOrg::Microsoft => Some(Event::MicrosoftLoginProbe { email: item.email.clone() }),
            MxOrg::Yahoo => Some(Event::YahooProbe { email: item.email.clone() }),
            _ => None,
        };

        let Some(event) = event else {
            remaining.push(item);
            continue;
        };

        let delta = deps
            .enrich
            .dispatch(&event)
            .await
            .unwrap_or_else(|_| mailcheck_enrich::EnrichmentDelta::empty());
        if let Some(obj) = results.get_mut(&item.email) {
            apply_delta(obj, delta);
        }
    }

    *pending = remaining;
}

fn apply_delta(obj: &mut VerificationObj, delta: mailcheck_enrich::EnrichmentDelta) {
    if let Some(smtp) = delta.smtp {
        obj.smtp = smtp;
    }
    if let Some(reachable) = delta.reachable {
        obj.reachable = reachable;
    }
    if let Some(gravatar) = delta.gravatar {
        obj.gravatar = Some(gravatar);
    }
    if let Some(suggestion) = delta.suggestion {
        obj.suggestion = Some(suggestion);
    }
    if let Some(disposable) = delta.disposable {
        obj.disposable = disposable;
    }
    if let Some(error) = delta.error {
        obj.error = error;
    }
    if let Some(error_msg) = delta.error_msg {
        obj.error_msg = Some(error_msg);
    }
}

async fn run_probe_groups(
    pending: Vec<Pending>,
    results: &mut HashMap<String, VerificationObj>,
    greylisted: &mut HashSet<String>,
    blacklisted: &mut HashSet<String>,
    recheck_required: &mut HashSet<String>,
    deps: &WorkerDeps,
) -> Result<(), mailcheck_store::StoreError> {
    let mut groups: HashMap<GroupKey, (ProcessingProfile, Vec<Pending>)> = HashMap::new();

    for item in pending {
        let lowest_pref_host = item.mx.first().map_or("", |r| r.host.as_str());
        let org = classify::classify_mx_host(lowest_pref_host);
        let profile = classify::profile_for(org);

        let key = if classify::requires_single_recipient_per_session(lowest_pref_host) {
            GroupKey::Domain(item.domain.clone())
        } else {
            match profile.group_by {
                GroupBy::Domain => GroupKey::Domain(item.domain.clone()),
                GroupBy::MxDomain => GroupKey::MxHost(lowest_pref_host.to_string()),
                GroupBy::Organization => GroupKey::Org(org),
            }
        };

        groups.entry(key).or_insert_with(|| (profile, Vec::new())).1.push(item);
    }

    let cache = WorkerCatchAllCache::new();
    let distinct_domains: HashSet<String> =
        groups.values().flat_map(|(_, items)| items.iter().map(|i| i.domain.clone())).collect();
    for domain in distinct_domains {
        if let Ok(Some(verdict)) = deps.store.catchall_check(&Domain::new(domain.clone())).await {
            cache.seed(domain, verdict, 100);
        }
    }

    for (_, (profile, items)) in groups {
        let hosts: Vec<String> = items
            .first()
            .map(|i| i.mx.iter().map(|r| r.host.clone()).collect())
            .unwrap_or_default();

        for sub_batch in classify::batch(&items, profile.batch_size.max(1)) {
            let targets: Vec<ProbeTarget> = sub_batch
                .iter()
                .map(|i| ProbeTarget { email: i.email.clone(), domain: i.domain.clone() })
                .collect();

            let probe_config = ProbeConfig {
                em_domain: &deps.config.em_domain,
                mx_domain: &deps.config.mx_domain,
                timeouts: deps.config.probe_timeouts(),
            };

            let outcomes = probe::check(&hosts, &targets, &probe_config, &cache)
                .await
                .unwrap_or_default();

            for (email, outcome) in outcomes {
                apply_outcome(results, &mut *greylisted, &mut *blacklisted, &mut *recheck_required, &email, &outcome);
            }

            if profile.delay_between_batches_ms > 0 {
                tokio::time::sleep(Duration::from_millis(profile.delay_between_batches_ms)).await;
            }
        }
    }

    for (domain, catch_all, confidence) in cache.drain_fresh() {
        deps.store.catchall_cache(&Domain::new(domain), catch_all, confidence, 1).await?;
    }

    Ok(())
}

fn apply_outcome(
    results: &mut HashMap<String, VerificationObj>,
    greylisted: &mut HashSet<String>,
    blacklisted: &mut HashSet<String>,
    recheck_required: &mut HashSet<String>,
    email: &str,
    outcome: &EmailOutcome,
) {
    let Some(obj) = results.get_mut(email) else { return };

    obj.smtp = SmtpFindings {
        host_exists: true,
        full_inbox: outcome.full_inbox,
        catch_all: outcome.catch_all,
        catch_all_blocked: outcome.catch_all_blocked,
        deliverable: outcome.deliverable,
        disabled: outcome.disabled,
        greylisted: outcome.greylisted,
        requires_recheck: outcome.requires_recheck,
    };
    obj.error = outcome.error;
    obj.error_msg.clone_from(&outcome.error_msg);
    obj.reachable = reachable_from(outcome);

    if outcome.greylisted {
        greylisted.insert(email.to_string());
    }
    if outcome.disabled {
        blacklisted.insert(email.to_string());
    }
    if outcome.requires_recheck {
        recheck_required.insert(email.to_string());
    }
}

fn reachable_from(outcome: &EmailOutcome) -> Reachable {
    if outcome.deliverable {
        Reachable::Yes
    } else if outcome.disabled || outcome.full_inbox || outcome.error {
        Reachable::No
    } else {
        Reachable::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailcheck_common::config::AppConfig;
    use mailcheck_store::Store;

    fn test_config() -> Arc<AppConfig> {
        Arc::new(
            AppConfig::from_toml_str("mx_domain = \"mx.example.com\"\nem_domain = \"example.com\"\n")
                .unwrap(),
        )
    }

    async fn test_deps() -> WorkerDeps {
        WorkerDeps {
            store: Arc::new(Store::open_in_memory().await.unwrap()),
            dns: Arc::new(dns::MockDnsResolver::new()),
            enrich: Arc::new(Registry::new()),
            disposable: Arc::new(DisposableDomains::new()),
            config: test_config(),
        }
    }

    #[tokio::test]
    async fn test_malformed_email_settles_without_probe() {
        let deps = test_deps().await;
        let request = Request { request_id: "r1".into(), emails: vec!["not-an-email".into()], response_url: None };

        let report = verify_request(&request, &deps).await.unwrap();
        let obj = &report.result_map["not-an-email"];
        assert!(obj.error);
        assert_eq!(obj.reachable, Reachable::No);
    }

    #[tokio::test]
    async fn test_disposable_email_settles_without_mx_lookup() {
        let deps = test_deps().await;
        deps.disposable.replace(HashSet::from(["mailinator.com".to_string()]));
        let request =
            Request { request_id: "r1".into(), emails: vec!["a@mailinator.com".into()], response_url: None };

        let report = verify_request(&request, &deps).await.unwrap();
        let obj = &report.result_map["a@mailinator.com"];
        assert!(obj.disposable);
        assert!(!obj.has_mx_records);
    }

    #[tokio::test]
    async fn test_missing_mx_marks_recheck_required() {
        let deps = test_deps().await;
        let request = Request { request_id: "r1".into(), emails: vec!["a@nomx.test".into()], response_url: None };

        let report = verify_request(&request, &deps).await.unwrap();
        assert!(report.recheck_required.contains("a@nomx.test"));
    }
}
