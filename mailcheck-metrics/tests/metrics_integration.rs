//! Integration tests for metrics collection, exercising each collector's
//! public API end to end.

use std::sync::Arc;

use mailcheck_metrics::{DnsMetrics, ProbeMetrics, QueueMetrics, WebhookMetrics, WorkerMetrics};

#[test]
fn test_worker_slots_busy_accuracy() {
    let metrics = WorkerMetrics::new().expect("failed to create worker metrics");

    for _ in 0..10 {
        metrics.record_assigned();
    }
    assert_eq!(metrics.busy_slots(), 10);

    for _ in 0..3 {
        metrics.record_freed(1.5);
    }
    assert_eq!(metrics.busy_slots(), 7);

    for _ in 0..7 {
        metrics.record_freed(2.0);
    }
    assert_eq!(metrics.busy_slots(), 0);
}

#[test]
fn test_worker_restart_recording_does_not_panic() {
    let metrics = WorkerMetrics::new().expect("failed to create worker metrics");
    for _ in 0..5 {
        metrics.record_restart();
    }
}

#[test]
fn test_probe_outcome_recording_with_domain_overflow() {
    let metrics = ProbeMetrics::new(2, vec!["gmail.com".to_string()]).expect("failed to create probe metrics");

    metrics.record_outcome("gmail.com", "deliverable");
    metrics.record_outcome("a.example", "undeliverable");
    metrics.record_outcome("b.example", "deliverable");
    metrics.record_outcome("c.example", "catch_all");

    assert_eq!(metrics.overflowed_domain_observations(), 1);
}

#[test]
fn test_probe_catch_all_cache_hit_and_miss() {
    let metrics = ProbeMetrics::new(100, vec![]).expect("failed to create probe metrics");
    metrics.record_catch_all_cache(true);
    metrics.record_catch_all_cache(false);
    metrics.record_catch_all_cache(true);
}

#[test]
fn test_probe_duration_and_reconnect_recording() {
    let metrics = ProbeMetrics::new(100, vec![]).expect("failed to create probe metrics");
    metrics.record_duration("mx1.example.com", 1.25);
    metrics.record_reconnect("mx1.example.com");
    metrics.record_relay_block("example.com");
}

#[test]
fn test_dns_metrics_creation_and_recording() {
    let metrics = DnsMetrics::new().expect("failed to create DNS metrics");

    metrics.record_lookup("mx", 0.050);
    metrics.record_lookup("a_fallback", 0.025);
    metrics.record_cache_hit();
    metrics.record_cache_miss();
    metrics.record_error("timeout");
}

#[test]
fn test_queue_depth_setters_do_not_panic() {
    let metrics = QueueMetrics::new().expect("failed to create queue metrics");

    metrics.set_queued(10);
    metrics.set_processing(4);
    metrics.set_greylist_deferred(2);
    metrics.set_anti_greylist_backlog(1);

    metrics.set_queued(5);
    metrics.set_processing(0);
}

#[test]
fn test_queue_terminal_recording() {
    let metrics = QueueMetrics::new().expect("failed to create queue metrics");
    metrics.record_terminal("completed", 12.5);
    metrics.record_terminal("failed", 3.0);
}

#[test]
fn test_webhook_settled_and_skipped_recording() {
    let metrics = WebhookMetrics::new().expect("failed to create webhook metrics");
    metrics.record_settled("delivered", 1);
    metrics.record_settled("exhausted", 5);
    metrics.record_skipped();
}

#[test]
fn test_concurrent_worker_slot_updates() {
    use std::thread;

    let metrics = Arc::new(WorkerMetrics::new().expect("failed to create worker metrics"));
    let mut handles = vec![];

    for _ in 0..10 {
        let metrics = Arc::clone(&metrics);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                metrics.record_assigned();
            }
        }));
    }

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(metrics.busy_slots(), 1000);
}
