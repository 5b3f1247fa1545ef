//! Shared agent context and the local command queue.

use std::time::Duration;

use monitored_cluster::agent::context::{LocalCommand, QueueWait, SharedControlContext};
use monitored_cluster::models::command::Command;

const WAIT: Duration = Duration::from_millis(50);

#[test]
fn new_context_is_running_with_no_process() {
    let (ctx, _queue) = SharedControlContext::new(true);
    assert!(ctx.is_running());
    assert!(ctx.auto_restart());
    assert_eq!(ctx.pid(), None);
    assert_eq!(ctx.return_code(), None);
}

#[test]
fn pid_and_return_code_cells_round_trip() {
    let (ctx, _queue) = SharedControlContext::new(false);
    ctx.set_pid(Some(1234));
    ctx.set_return_code(Some(-9));
    assert_eq!(ctx.pid(), Some(1234));
    assert_eq!(ctx.return_code(), Some(-9));

    ctx.set_pid(None);
    ctx.set_return_code(None);
    assert_eq!(ctx.pid(), None);
    assert_eq!(ctx.return_code(), None);

    ctx.set_return_code(Some(0));
    assert_eq!(ctx.return_code(), Some(0));
}

#[tokio::test]
async fn queue_is_fifo() {
    let (ctx, mut queue) = SharedControlContext::new(true);
    ctx.push(LocalCommand::Apply(Command::Restart));
    ctx.push(LocalCommand::Apply(Command::Exit));

    assert_eq!(
        queue.next(WAIT).await,
        QueueWait::Received(LocalCommand::Apply(Command::Restart))
    );
    assert_eq!(
        queue.next(WAIT).await,
        QueueWait::Received(LocalCommand::Apply(Command::Exit))
    );
    assert_eq!(queue.next(WAIT).await, QueueWait::Idle);
}

#[tokio::test]
async fn closed_queue_drops_pushes() {
    let (ctx, mut queue) = SharedControlContext::new(true);
    ctx.push(LocalCommand::Stop);
    queue.close();
    ctx.push(LocalCommand::Apply(Command::Start));

    assert_eq!(queue.next(WAIT).await, QueueWait::Closed);
}

#[tokio::test]
async fn queue_reports_closed_when_context_dropped() {
    let (ctx, mut queue) = SharedControlContext::new(true);
    drop(ctx);
    assert_eq!(queue.next(WAIT).await, QueueWait::Closed);
}

#[test]
fn clear_discards_everything() {
    let (ctx, mut queue) = SharedControlContext::new(true);
    for _ in 0..3 {
        ctx.push(LocalCommand::Apply(Command::Continue));
    }
    assert_eq!(queue.clear(), 3);
    assert_eq!(queue.clear(), 0);
}

#[tokio::test]
async fn stop_running_wakes_waiters() {
    let (ctx, _queue) = SharedControlContext::new(true);
    let waiter = {
        let ctx = std::sync::Arc::clone(&ctx);
        tokio::spawn(async move { ctx.stopped().await })
    };
    ctx.stop_running();

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter woke up")
        .expect("waiter task");
    assert!(!ctx.is_running());
}
