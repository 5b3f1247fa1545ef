//! At-least-once delivery through the event loop's deferred commits.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use monitored_cluster::models::command::Command;
use monitored_cluster::models::workload::WorkloadSnapshot;
use monitored_cluster::server::event_loop::{Channel, EventLoop, Exchange, LoopTimings, Outgoing};

const WORKER: &str = r#"{"type":"worker","uid":"w1","host":"node1"}"#;
const RESTART: &str = r#"{"type":"command","cmd":"restart"}"#;

struct Harness {
    inbox: mpsc::Sender<Exchange>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<monitored_cluster::server::registry::Registry>,
    _slot: watch::Sender<WorkloadSnapshot>,
}

fn harness() -> Harness {
    let (slot, slot_rx) = watch::channel(WorkloadSnapshot::default());
    let timings = LoopTimings {
        poll_interval: Duration::from_millis(20),
        reply_timeout: Duration::from_millis(100),
        cull_timeout: Duration::from_secs(20),
    };
    let (inbox, inbox_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(EventLoop::new("control".into(), slot_rx, timings).run(inbox_rx, cancel.clone()));
    Harness {
        inbox,
        cancel,
        task,
        _slot: slot,
    }
}

impl Harness {
    async fn send(&self, request: &str) -> Outgoing {
        let (reply, reply_rx) = oneshot::channel();
        self.inbox
            .send(Exchange {
                channel: Channel::Agent,
                request: request.to_owned(),
                reply,
            })
            .await
            .expect("loop alive");
        reply_rx.await.expect("reply produced")
    }

    /// Exchange a line and confirm the write.
    async fn confirmed(&self, request: &str) -> String {
        let outgoing = self.send(request).await;
        outgoing.delivered.send(()).expect("loop waits for ack");
        outgoing.payload
    }
}

#[tokio::test]
async fn unconfirmed_reply_is_redelivered() {
    let loop_ = harness();

    assert_eq!(loop_.confirmed(WORKER).await, "[]");
    assert_eq!(loop_.confirmed(RESTART).await, r#"{"status":"ok"}"#);

    // The write of this reply is never confirmed.
    let lost = loop_.send(WORKER).await;
    assert_eq!(lost.payload, r#"["restart"]"#);
    drop(lost.delivered);

    assert_eq!(loop_.confirmed(WORKER).await, r#"["restart"]"#);
    assert_eq!(loop_.confirmed(WORKER).await, "[]");

    loop_.cancel.cancel();
    let registry = loop_.task.await.expect("loop joins");
    assert_eq!(registry.pending("w1"), Some(Vec::new()));
}

#[tokio::test]
async fn late_confirmation_leaves_queue_intact() {
    let loop_ = harness();
    loop_.confirmed(WORKER).await;
    loop_.confirmed(RESTART).await;

    let slow = loop_.send(WORKER).await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    // The loop stopped waiting; the ack lands nowhere.
    let _ = slow.delivered.send(());

    assert_eq!(loop_.confirmed(WORKER).await, r#"["restart"]"#);

    loop_.cancel.cancel();
    let registry = loop_.task.await.expect("loop joins");
    assert_eq!(registry.pending("w1"), Some(Vec::new()));
}

#[tokio::test]
async fn loop_stops_when_listeners_go_away() {
    let loop_ = harness();
    loop_.confirmed(WORKER).await;
    loop_.confirmed(RESTART).await;

    drop(loop_.inbox);
    let registry = tokio::time::timeout(Duration::from_secs(1), loop_.task)
        .await
        .expect("loop stops")
        .expect("loop joins");
    assert_eq!(registry.pending("w1"), Some(vec![Command::Restart]));
}
