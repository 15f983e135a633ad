//! Startup reconciliation: a process that crashed mid-verification leaves
//! `results` rows stuck at `queued`/`processing`, assignment rows pointing
//! at workers that no longer exist, and archive entries nobody will ever
//! finish merging. This module walks all three and either settles, requeues,
//! or gives up on each one, then signals that recovery has finished so the
//! rest of the process can start taking new work.

use std::collections::HashSet;
use std::sync::Arc;

use mailcheck_common::Signal;
use mailcheck_store::{ArchiveEntry, Request, Store, VerificationObj};
use tokio::sync::broadcast;

use crate::error::RecoveryError;

/// Tally of what startup recovery did with each orphan it found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub completed: u32,
    pub requeued: u32,
    pub waiting: u32,
    pub failed: u32,
}

enum Decision {
    Completed,
    Requeued,
    Failed,
}

fn is_settled(entry: &ArchiveEntry) -> bool {
    entry.emails.iter().all(|email| entry.partial_result.contains_key(email))
}

/// Settles an orphaned request from its archive entry if every email in it
/// already has a verdict, requeues the unsettled remainder otherwise, and
/// falls back to `emails_hint` (the original request, when known from an
/// assignment) when there is no archive entry to work from at all.
async fn settle_or_requeue(
    store: &Store,
    request_id: &str,
    emails_hint: Option<Vec<String>>,
    response_url_hint: Option<String>,
) -> Result<Decision, RecoveryError> {
    match store.archive_get(request_id).await? {
        Some(entry) if is_settled(&entry) => {
            let mut results: Vec<VerificationObj> = entry.partial_result.into_values().collect();
            results.sort_by(|a, b| a.email.cmp(&b.email));
            store.results_complete(request_id, &results).await?;
            store.archive_delete(request_id).await?;
            Ok(Decision::Completed)
        }
        Some(entry) => {
            let remaining: Vec<String> =
                entry.emails.iter().filter(|e| !entry.partial_result.contains_key(*e)).cloned().collect();
            if remaining.is_empty() {
                store.results_mark_failed(request_id).await?;
                return Ok(Decision::Failed);
            }
            store.results_reset_queued(request_id, remaining.len() as u32).await?;
            store
                .queue_add(Request {
                    request_id: request_id.to_string(),
                    emails: remaining,
                    response_url: entry.response_url,
                })
                .await?;
            Ok(Decision::Requeued)
        }
        None => match emails_hint.filter(|e| !e.is_empty()) {
            Some(emails) => {
                store.results_reset_queued(request_id, emails.len() as u32).await?;
                store
                    .queue_add(Request {
                        request_id: request_id.to_string(),
                        emails,
                        response_url: response_url_hint,
                    })
                    .await?;
                Ok(Decision::Requeued)
            }
            None => {
                store.results_mark_failed(request_id).await?;
                Ok(Decision::Failed)
            }
        },
    }
}

fn tally(report: &mut RecoveryReport, decision: Decision) {
    match decision {
        Decision::Completed => report.completed += 1,
        Decision::Requeued => report.requeued += 1,
        Decision::Failed => report.failed += 1,
    }
}

async fn recover(store: &Store) -> Result<RecoveryReport, RecoveryError> {
    let mut report = RecoveryReport::default();

    // Assignments are exactly the requests a prior process's now-dead
    // workers had in flight: always an orphan, always carrying the full
    // original email list.
    let assignments = store.assignment_all().await?;
    let handled: HashSet<String> =
        assignments.iter().map(|a| a.request.request_id.clone()).collect();

    for assignment in assignments {
        let request = assignment.request;
        let outcome = settle_or_requeue(
            store,
            &request.request_id,
            Some(request.emails.clone()),
            request.response_url.clone(),
        )
        .await?;
        tally(&mut report, outcome);
        store.assignment_clear(assignment.worker_index).await?;
    }

    // `queued`/`processing` results rows not already accounted for above.
    // Anything still physically in the queue, or already being retried via
    // the anti-greylist schedule, is left alone — another part of the
    // system already owns it.
    for request_id in store.results_orphan_candidates().await? {
        if handled.contains(&request_id) {
            continue;
        }
        if store.queue_has_request_id(&request_id).await? || store.antigreylist_exists(&request_id).await? {
            report.waiting += 1;
            continue;
        }

        let outcome = settle_or_requeue(store, &request_id, None, None).await?;
        tally(&mut report, outcome);
    }

    // Defensive: an archive entry with no results row at all would mean a
    // crash landed between `archive_merge` and `results_init`/`results_complete`.
    for entry in store.archive_all().await? {
        if store.results_get(&entry.request_id).await?.is_some() {
            continue;
        }
        store.results_init(&entry.request_id, entry.emails.len() as u32, entry.response_url.clone()).await?;
        let outcome = settle_or_requeue(store, &entry.request_id, None, None).await?;
        tally(&mut report, outcome);
    }

    Ok(report)
}

/// Runs startup recovery and signals completion on `signal` unconditionally,
/// including when recovery itself fails — a stalled recovery must never
/// silently block the rest of the process from starting.
pub async fn run_recovery(store: &Arc<Store>, signal: &broadcast::Sender<Signal>) -> RecoveryReport {
    let report = match recover(store).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "startup recovery failed");
            RecoveryReport::default()
        }
    };

    let _ = signal.send(Signal::Finalised);
    report
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use mailcheck_store::{Reachable, SyntaxInfo};

    use super::*;

    fn obj(email: &str, reachable: Reachable) -> VerificationObj {
        let mut v = VerificationObj::unverified(
            email,
            SyntaxInfo { username: "u".into(), domain: "d".into(), valid: true },
        );
        v.reachable = reachable;
        v
    }

    #[tokio::test]
    async fn test_assignment_orphan_with_fully_settled_archive_completes() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 1, None).await.unwrap();
        store.results_mark_processing("r1").await.unwrap();
        store
            .assignment_put(
                0,
                &Request { request_id: "r1".into(), emails: vec!["a@d".into()], response_url: None },
            )
            .await
            .unwrap();
        store
            .archive_merge(
                "r1",
                &["a@d".to_string()],
                None,
                HashMap::from([("a@d".to_string(), obj("a@d", Reachable::Yes))]),
                false,
            )
            .await
            .unwrap();

        let (tx, _rx) = broadcast::channel(1);
        let store = Arc::new(store);
        let report = run_recovery(&store, &tx).await;

        assert_eq!(report.completed, 1);
        assert!(store.archive_get("r1").await.unwrap().is_none());
        assert!(store.assignment_get(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assignment_orphan_with_partial_archive_requeues_remainder() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 2, None).await.unwrap();
        store.results_mark_processing("r1").await.unwrap();
        store
            .assignment_put(
                0,
                &Request {
                    request_id: "r1".into(),
                    emails: vec!["a@d".into(), "b@d".into()],
                    response_url: None,
                },
            )
            .await
            .unwrap();
        store
            .archive_merge(
                "r1",
                &["a@d".to_string(), "b@d".to_string()],
                None,
                HashMap::from([("a@d".to_string(), obj("a@d", Reachable::Yes))]),
                false,
            )
            .await
            .unwrap();

        let (tx, _rx) = broadcast::channel(1);
        let store = Arc::new(store);
        let report = run_recovery(&store, &tx).await;

        assert_eq!(report.requeued, 1);
        let requeued = store.queue_current().await.unwrap().unwrap();
        assert_eq!(requeued.emails, vec!["b@d".to_string()]);
    }

    #[tokio::test]
    async fn test_orphan_without_archive_or_assignment_fails() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 1, None).await.unwrap();
        store.results_mark_processing("r1").await.unwrap();

        let (tx, _rx) = broadcast::channel(1);
        let store = Arc::new(store);
        let report = run_recovery(&store, &tx).await;

        assert_eq!(report.failed, 1);
        let row = store.results_get("r1").await.unwrap().unwrap();
        assert_eq!(row.status, mailcheck_store::RequestStatus::Failed);
    }

    #[tokio::test]
    async fn test_candidate_still_in_queue_is_left_waiting() {
        let store = Store::open_in_memory().await.unwrap();
        store.results_init("r1", 1, None).await.unwrap();
        store
            .queue_add(Request { request_id: "r1".into(), emails: vec!["a@d".into()], response_url: None })
            .await
            .unwrap();

        let (tx, _rx) = broadcast::channel(1);
        let store = Arc::new(store);
        let report = run_recovery(&store, &tx).await;

        assert_eq!(report.waiting, 1);
        assert_eq!(report.completed + report.requeued + report.failed, 0);
    }

    #[tokio::test]
    async fn test_finalised_signal_fires_even_with_no_orphans() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let (tx, mut rx) = broadcast::channel(1);

        run_recovery(&store, &tx).await;
        assert_eq!(rx.try_recv().unwrap(), Signal::Finalised);
    }
}
