//! Registry bookkeeping: per-uid queues, deferred commits, and culling.

use std::time::{Duration, Instant};

use monitored_cluster::models::command::Command;
use monitored_cluster::models::status::StatusReport;
use monitored_cluster::server::registry::Registry;

const CULL: Duration = Duration::from_secs(20);

fn report(uid: &str, host: &str) -> StatusReport {
    StatusReport::dead(uid, host)
}

#[test]
fn first_report_registers_worker_with_empty_queue() {
    let mut registry = Registry::new();
    let exchange = registry.handle_worker_status(report("w1", "node1"), Instant::now());

    assert!(exchange.commands.is_empty());
    assert_eq!(exchange.commit.uid(), "w1");
    assert_eq!(exchange.commit.delivered(), 0);
    assert_eq!(registry.worker_count(), 1);
    assert_eq!(registry.pending("w1"), Some(Vec::new()));
}

#[test]
fn commands_are_delivered_in_enqueue_order() {
    let mut registry = Registry::new();
    let now = Instant::now();
    let first = registry_exchange(&mut registry, "w1", now);
    registry.commit(first);

    registry.enqueue("w1", Command::Restart);
    registry.enqueue("w1", Command::Exit);

    let exchange = registry.handle_worker_status(report("w1", "node1"), now);
    assert_eq!(exchange.commands, vec![Command::Restart, Command::Exit]);
}

fn registry_exchange(
    registry: &mut Registry,
    uid: &str,
    now: Instant,
) -> monitored_cluster::server::registry::QueueCommit {
    registry.handle_worker_status(report(uid, "node1"), now).commit
}

#[test]
fn queue_survives_until_commit() {
    let mut registry = Registry::new();
    let now = Instant::now();
    let first = registry_exchange(&mut registry, "w1", now);
    registry.commit(first);
    registry.enqueue("w1", Command::Restart);

    // Reply never confirmed: the commit is dropped.
    let unconfirmed = registry.handle_worker_status(report("w1", "node1"), now);
    assert_eq!(unconfirmed.commands, vec![Command::Restart]);
    drop(unconfirmed);

    let retried = registry.handle_worker_status(report("w1", "node1"), now);
    assert_eq!(retried.commands, vec![Command::Restart]);
    registry.commit(retried.commit);

    assert_eq!(registry.pending("w1"), Some(Vec::new()));
}

#[test]
fn commit_keeps_commands_enqueued_after_the_reply() {
    let mut registry = Registry::new();
    let now = Instant::now();
    let first = registry_exchange(&mut registry, "w1", now);
    registry.commit(first);
    registry.enqueue("w1", Command::Restart);

    let exchange = registry.handle_worker_status(report("w1", "node1"), now);
    registry.enqueue("w1", Command::Exit);
    registry.commit(exchange.commit);

    assert_eq!(registry.pending("w1"), Some(vec![Command::Exit]));
}

#[test]
fn enqueue_workers_targets_every_worker_but_not_the_scheduler() {
    let mut registry = Registry::new();
    let now = Instant::now();
    registry.handle_worker_status(report("w1", "a"), now);
    registry.handle_worker_status(report("w2", "b"), now);
    registry.handle_scheduler_status(report("s1", "head"), now);

    assert_eq!(registry.enqueue_workers(Command::Restart), 2);
    assert_eq!(registry.pending("w1"), Some(vec![Command::Restart]));
    assert_eq!(registry.pending("w2"), Some(vec![Command::Restart]));
    assert_eq!(registry.pending("s1"), Some(Vec::new()));
}

#[test]
fn enqueue_scheduler_without_scheduler_is_noop() {
    let mut registry = Registry::new();
    assert_eq!(registry.enqueue_scheduler(Command::Restart), 0);
    assert!(registry.scheduler().is_none());
}

#[test]
fn repeated_reports_update_the_record() {
    let mut registry = Registry::new();
    let now = Instant::now();
    registry.handle_worker_status(report("w1", "node1"), now);

    let mut update = report("w1", "node1");
    update.pid = Some(99);
    update.cpu = 42.0;
    registry.handle_worker_status(update, now + Duration::from_secs(5));

    let record = registry.record("w1").expect("worker registered");
    assert_eq!(record.pid, Some(99));
    assert!((record.stats.cpu - 42.0).abs() < f64::EPSILON);
    assert_eq!(registry.worker_count(), 1);
}

#[test]
fn new_scheduler_replaces_old_one_and_its_queue() {
    let mut registry = Registry::new();
    let now = Instant::now();
    registry.handle_scheduler_status(report("s1", "head1"), now);
    registry.enqueue_scheduler(Command::Restart);

    let exchange = registry.handle_scheduler_status(report("s2", "head2"), now);

    assert!(exchange.commands.is_empty());
    assert_eq!(registry.scheduler().map(|s| s.uid.as_str()), Some("s2"));
    assert_eq!(registry.pending("s1"), None);
    assert!(registry.record("s1").is_none());
}

#[test]
fn cull_removes_silent_agents_and_their_queues() {
    let mut registry = Registry::new();
    let start = Instant::now();
    registry.handle_worker_status(report("old", "a"), start);
    registry.handle_scheduler_status(report("sched", "head"), start);
    registry.handle_worker_status(report("fresh", "b"), start + Duration::from_secs(15));
    registry.enqueue_workers(Command::Restart);

    let mut culled = registry.cull_inactive(CULL, start + Duration::from_secs(21));
    culled.sort();

    assert_eq!(culled, vec!["old".to_owned(), "sched".to_owned()]);
    assert!(registry.record("old").is_none());
    assert_eq!(registry.pending("old"), None);
    assert!(registry.scheduler().is_none());
    assert_eq!(registry.pending("fresh"), Some(vec![Command::Restart]));
}

#[test]
fn cull_at_exact_timeout_keeps_agent() {
    let mut registry = Registry::new();
    let start = Instant::now();
    registry.handle_worker_status(report("w1", "a"), start);

    assert!(registry.cull_inactive(CULL, start + CULL).is_empty());
    assert_eq!(registry.worker_count(), 1);
}

#[test]
fn commit_after_cull_is_ignored() {
    let mut registry = Registry::new();
    let start = Instant::now();
    let first = registry_exchange(&mut registry, "w1", start);
    registry.commit(first);
    registry.enqueue("w1", Command::Restart);
    let exchange = registry.handle_worker_status(report("w1", "a"), start);

    registry.cull_inactive(CULL, start + Duration::from_secs(60));
    registry.commit(exchange.commit);

    assert_eq!(registry.pending("w1"), None);
    assert!(registry.cull_inactive(CULL, start + Duration::from_secs(120)).is_empty());
}

#[test]
fn culled_worker_rejoins_as_new() {
    let mut registry = Registry::new();
    let start = Instant::now();
    registry.handle_worker_status(report("w1", "a"), start);
    registry.enqueue_workers(Command::Exit);
    registry.cull_inactive(CULL, start + Duration::from_secs(30));

    let exchange =
        registry.handle_worker_status(report("w1", "a"), start + Duration::from_secs(31));
    assert!(exchange.commands.is_empty());
}
