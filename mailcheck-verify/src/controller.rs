//! Fixed worker-slot pool plus the dispatch loop that feeds it from the
//! queue, folds back partial results, and drives the anti-greylist retry
//! and archive/catch-all cleanup schedules.

use std::time::{Duration, Instant};

use mailcheck_common::config::AppConfig;
use mailcheck_store::VerificationObj;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::antigreylist::AntiGreylistStore;
use crate::webhook;
use crate::worker::{ControllerMessage, Worker, WorkerDeps, WorkerMessage, WorkerReport};

const ASSIGN_POLL: Duration = Duration::from_millis(500);
const GREYLIST_POLL: Duration = Duration::from_secs(30);
const ARCHIVE_CLEANUP: Duration = Duration::from_secs(3600);
const CATCHALL_CLEANUP: Duration = Duration::from_secs(900);

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub worker_count: usize,
    pub restart_after: Duration,
}

impl ControllerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            worker_count: config.thread_num,
            restart_after: Duration::from_millis(config.restart_after_ms),
        }
    }
}

struct WorkerSlot {
    index: u32,
    tx: mpsc::Sender<ControllerMessage>,
    handle: JoinHandle<()>,
    busy: bool,
    last_activity: Instant,
    response_url: Option<String>,
}

fn spawn_worker(index: u32, deps: WorkerDeps, report_tx: mpsc::Sender<WorkerMessage>) -> WorkerSlot {
    let (worker, tx) = Worker::new(index, deps, report_tx);
    let handle = tokio::spawn(worker.run());
    WorkerSlot { index, tx, handle, busy: false, last_activity: Instant::now(), response_url: None }
}

/// Owns the worker pool and the loop that keeps it fed from the durable
/// queue, reconciling every worker report back into the archive and,
/// on terminal completion, into `results` and the completion webhook.
pub struct Controller {
    config: ControllerConfig,
    deps: WorkerDeps,
    slots: Vec<WorkerSlot>,
    report_tx: mpsc::Sender<WorkerMessage>,
    report_rx: mpsc::Receiver<WorkerMessage>,
    antigreylist: AntiGreylistStore,
    http: reqwest::Client,
}

impl Controller {
    #[must_use]
    pub fn new(deps: WorkerDeps, config: ControllerConfig) -> Self {
        let (report_tx, report_rx) = mpsc::channel(config.worker_count.max(1) * 4);
        let slots = (0..config.worker_count as u32)
            .map(|i| spawn_worker(i, deps.clone(), report_tx.clone()))
            .collect();
        let antigreylist = AntiGreylistStore::new(deps.store.clone());

        Self { config, deps, slots, report_tx, report_rx, antigreylist, http: reqwest::Client::new() }
    }

    /// Runs the dispatch loop forever. Intended to be spawned as its own
    /// task; there is no clean-shutdown path yet beyond process exit.
    pub async fn run(mut self) {
        let mut assign_tick = tokio::time::interval(ASSIGN_POLL);
        let mut greylist_tick = tokio::time::interval(GREYLIST_POLL);
        let mut archive_tick = tokio::time::interval(ARCHIVE_CLEANUP);
        let mut catchall_tick = tokio::time::interval(CATCHALL_CLEANUP);

        loop {
            tokio::select! {
                Some(msg) = self.report_rx.recv() => {
                    self.handle_worker_message(msg).await;
                }
                _ = assign_tick.tick() => {
                    self.assign_idle_workers().await;
                    self.recycle_stale_workers().await;
                }
                _ = greylist_tick.tick() => {
                    self.requeue_ready_greylisted().await;
                }
                _ = archive_tick.tick() => {
                    if let Err(e) = self.deps.store.archive_cleanup().await {
                        tracing::warn!(error = %e, "archive cleanup failed");
                    }
                }
                _ = catchall_tick.tick() => {
                    if let Err(e) = self.deps.store.catchall_cleanup().await {
                        tracing::warn!(error = %e, "catch-all cache cleanup failed");
                    }
                }
            }
        }
    }

    async fn handle_worker_message(&mut self, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Ping { worker_index } => {
                if let Some(slot) = self.slots.get_mut(worker_index as usize) {
                    slot.last_activity = Instant::now();
                }
            }
            WorkerMessage::Report { worker_index, report } => {
                self.handle_report(worker_index, report).await;
                self.free_slot(worker_index);
            }
            WorkerMessage::Failed { worker_index, request_id, error } => {
                tracing::warn!(worker_index, request_id, error, "worker failed to complete assignment");
                if let Err(e) = self.deps.store.results_mark_failed(&request_id).await {
                    tracing::warn!(request_id, error = %e, "failed to record failed request");
                }
                if let Err(e) = self.deps.store.assignment_clear(worker_index).await {
                    tracing::warn!(worker_index, error = %e, "failed to clear assignment");
                }
                self.free_slot(worker_index);
            }
        }
    }

    fn free_slot(&mut self, worker_index: u32) {
        if let Some(slot) = self.slots.get_mut(worker_index as usize) {
            slot.busy = false;
            slot.response_url = None;
            slot.last_activity = Instant::now();
        }
    }

    /// Folds one completed (or partially completed) request back into the
    /// archive. A request is terminally done iff nothing was greylisted and
    /// nothing needs an MX recheck; anything short of that is a deferral,
    /// merged with fresh data winning so the next pass's findings are not
    /// shadowed by the stale ones already on file.
    async fn handle_report(&mut self, worker_index: u32, report: WorkerReport) {
        let request_id = report.request_id.clone();
        let response_url =
            self.slots.get(worker_index as usize).and_then(|slot| slot.response_url.clone());
        let emails: Vec<String> = report.result_map.keys().cloned().collect();
        let deferred = !report.greylisted.is_empty() || !report.recheck_required.is_empty();

        if !report.greylisted.is_empty() {
            if let Err(e) = self.deps.store.results_mark_greylist_found(&request_id).await {
                tracing::warn!(request_id, error = %e, "failed to record greylist found");
            }
        }
        if !report.blacklisted.is_empty() {
            if let Err(e) = self.deps.store.results_mark_blacklist_found(&request_id).await {
                tracing::warn!(request_id, error = %e, "failed to record blacklist found");
            }
        }

        let archive_wins = !deferred;
        if let Err(e) = self
            .deps
            .store
            .archive_merge(&request_id, &emails, response_url.clone(), report.result_map, archive_wins)
            .await
        {
            tracing::warn!(request_id, error = %e, "failed to merge partial results into archive");
            return;
        }

        if deferred {
            if !report.greylisted.is_empty() {
                if let Err(e) =
                    self.antigreylist.add(&request_id, &report.greylisted, response_url.clone()).await
                {
                    tracing::warn!(request_id, error = %e, "failed to register greylist deferral");
                }
            }
            if !report.recheck_required.is_empty() {
                if let Err(e) = self
                    .antigreylist
                    .add(&request_id, &report.recheck_required, response_url)
                    .await
                {
                    tracing::warn!(request_id, error = %e, "failed to register MX recheck deferral");
                }
            }
            return;
        }

        self.complete_request(&request_id).await;
    }

    /// Pulls the now-authoritative merged archive entry and settles the
    /// request: persists final results, fires the completion webhook, and
    /// drops the archive and any leftover anti-greylist bookkeeping.
    async fn complete_request(&self, request_id: &str) {
        let entry = match self.deps.store.archive_get(request_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::warn!(request_id, "request completed with no archive entry to settle");
                return;
            }
            Err(e) => {
                tracing::warn!(request_id, error = %e, "failed to load archive entry");
                return;
            }
        };

        let mut results: Vec<VerificationObj> = entry.partial_result.into_values().collect();
        results.sort_by(|a, b| a.email.cmp(&b.email));

        if let Err(e) = self.deps.store.results_complete(request_id, &results).await {
            tracing::warn!(request_id, error = %e, "failed to persist completed results");
        }

        webhook::deliver(
            &self.http,
            &self.deps.store,
            request_id,
            entry.response_url.as_deref(),
            results.len() as u32,
            &results,
        )
        .await;

        if let Err(e) = self.deps.store.archive_delete(request_id).await {
            tracing::warn!(request_id, error = %e, "failed to delete settled archive entry");
        }
        if let Err(e) = self.antigreylist.clear_for_request(request_id).await {
            tracing::warn!(request_id, error = %e, "failed to clear anti-greylist entry");
        }
    }

    /// Hands the head of the queue to every idle slot, in order, until
    /// either runs out.
    async fn assign_idle_workers(&mut self) {
        for slot in &mut self.slots {
            if slot.busy {
                continue;
            }

            let request = match self.deps.store.queue_current().await {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read queue head");
                    break;
                }
            };

            if let Err(e) = self.deps.store.queue_done(&request.request_id).await {
                tracing::warn!(request_id = %request.request_id, error = %e, "failed to dequeue request");
                continue;
            }
            if let Err(e) = self.deps.store.assignment_put(slot.index, &request).await {
                tracing::warn!(request_id = %request.request_id, error = %e, "failed to record assignment");
            }
            if let Err(e) = self.deps.store.results_mark_processing(&request.request_id).await {
                tracing::warn!(request_id = %request.request_id, error = %e, "failed to mark processing");
            }

            slot.response_url = request.response_url.clone();
            slot.last_activity = Instant::now();

            if slot.tx.send(ControllerMessage::Assign(request)).await.is_err() {
                slot.response_url = None;
                continue;
            }
            slot.busy = true;
        }
    }

    /// Requests whose greylist (or MX-recheck) retry window has arrived go
    /// back onto the main queue for a fresh probe pass.
    async fn requeue_ready_greylisted(&mut self) {
        let ready = match self.antigreylist.try_greylisted().await {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll anti-greylist retries");
                return;
            }
        };

        for request in ready {
            if let Err(e) = self.deps.store.queue_add(request.clone()).await {
                tracing::warn!(request_id = %request.request_id, error = %e, "failed to requeue deferred request");
            }
        }
    }

    /// Recycles any worker idle or stuck for longer than `restart_after`.
    /// A stuck (busy) worker's in-flight request is requeued before its
    /// task is aborted; an idle one is simply given a fresh task.
    async fn recycle_stale_workers(&mut self) {
        let restart_after = self.config.restart_after;

        for i in 0..self.slots.len() {
            if self.slots[i].last_activity.elapsed() < restart_after {
                continue;
            }

            let index = self.slots[i].index;
            let was_busy = self.slots[i].busy;

            if was_busy {
                if let Ok(Some(assignment)) = self.deps.store.assignment_get(index).await {
                    if let Err(e) = self.deps.store.queue_add(assignment.request).await {
                        tracing::warn!(worker_index = index, error = %e, "failed to requeue stuck worker's request");
                    }
                }
                if let Err(e) = self.deps.store.assignment_clear(index).await {
                    tracing::warn!(worker_index = index, error = %e, "failed to clear stuck assignment");
                }
            }

            tracing::debug!(worker_index = index, was_busy, "recycling idle/stuck worker");
            self.slots[i].handle.abort();
            self.slots[i] = spawn_worker(index, self.deps.clone(), self.report_tx.clone());
        }
    }
}
