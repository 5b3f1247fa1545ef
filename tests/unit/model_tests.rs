//! Wire shapes of agent reports, admin requests, and replies.

use std::time::{Duration, Instant};

use serde_json::json;

use monitored_cluster::models::command::{AdminCommand, Command};
use monitored_cluster::models::message::{
    AdminRequest, Inbound, Reply, ReplyStatus, StatusReply, FAIL_REPLY,
};
use monitored_cluster::models::record::AgentRecord;
use monitored_cluster::models::status::{AgentKind, ProcessState, ResourceStats, StatusReport};
use monitored_cluster::models::workload::{WorkloadSnapshot, WorkloadState, WorkloadStatus};
use monitored_cluster::protocol;

#[test]
fn worker_report_parses_with_type_tag() {
    let line = json!({
        "type": "worker",
        "uid": "w-1",
        "host": "node1",
        "pid": 4242,
        "status": "running",
        "returncode": null,
        "cpu": 12.5,
        "mem": 1024.0,
        "net": 3.0,
        "disk_io": 4.0
    })
    .to_string();

    let message: Inbound = protocol::decode(&line).expect("worker report parses");
    let Inbound::Worker(report) = message else {
        panic!("expected worker report");
    };
    assert_eq!(report.uid, "w-1");
    assert_eq!(report.pid, Some(4242));
    assert_eq!(report.status, ProcessState::Running);
    assert!((report.cpu - 12.5).abs() < f64::EPSILON);
}

#[test]
fn sparse_report_fills_defaults() {
    let message: Inbound =
        protocol::decode(r#"{"type":"scheduler","uid":"s-1"}"#).expect("sparse report parses");
    let Inbound::Scheduler(report) = message else {
        panic!("expected scheduler report");
    };
    assert_eq!(report, StatusReport::dead("s-1", ""));
}

#[test]
fn admin_command_parses() {
    let message: Inbound =
        protocol::decode(r#"{"type":"command","cmd":"reset"}"#).expect("admin command parses");
    assert_eq!(
        message,
        Inbound::Command(AdminRequest {
            cmd: AdminCommand::Reset
        })
    );
}

#[test]
fn unknown_admin_verb_is_captured() {
    let message: Inbound =
        protocol::decode(r#"{"type":"command","cmd":"reboot"}"#).expect("unknown verb parses");
    assert_eq!(
        message,
        Inbound::Command(AdminRequest {
            cmd: AdminCommand::Unknown
        })
    );
}

#[test]
fn unknown_type_is_rejected() {
    let result = protocol::decode::<Inbound>(r#"{"type":"observer","uid":"x"}"#);
    assert!(result.is_err());
}

#[test]
fn status_helper_tags_by_kind() {
    let report = StatusReport::dead("a", "h");
    let encoded = protocol::encode(&Inbound::status(AgentKind::Scheduler, report))
        .expect("encode scheduler report");
    let value: serde_json::Value = serde_json::from_str(&encoded).expect("valid json");
    assert_eq!(value["type"], "scheduler");
    assert_eq!(value["status"], "dead");
}

#[test]
fn command_list_reply_is_bare_array() {
    let reply = Reply::Commands(vec![Command::Restart, Command::Exit]);
    assert_eq!(
        protocol::encode(&reply).expect("encode"),
        r#"["restart","exit"]"#
    );
    assert_eq!(protocol::encode(&Reply::Commands(Vec::new())).expect("encode"), "[]");
}

#[test]
fn status_replies_serialize() {
    assert_eq!(
        protocol::encode(&Reply::Status(StatusReply::ok())).expect("encode"),
        r#"{"status":"ok"}"#
    );
    assert_eq!(
        protocol::encode(&Reply::Status(StatusReply::unknown_command())).expect("encode"),
        r#"{"status":"failed","reason":"Unknown command"}"#
    );
    let parsed: StatusReply = protocol::decode(r#"{"status":"fail"}"#).expect("decode");
    assert_eq!(parsed.status, ReplyStatus::Fail);
}

#[test]
fn fallback_reply_matches_fail_status() {
    assert_eq!(
        protocol::encode(&Reply::Status(StatusReply::fail())).expect("encode"),
        FAIL_REPLY
    );
}

#[test]
fn command_tokens_round_trip_through_display() {
    for command in [Command::Continue, Command::Start, Command::Restart, Command::Exit] {
        let parsed: Command =
            protocol::decode(&format!("\"{command}\"")).expect("token parses");
        assert_eq!(parsed, command);
    }
}

#[test]
fn record_flattens_stats_and_hides_monotonic_clock() {
    let mut report = StatusReport::dead("w-1", "node1");
    report.set_stats(ResourceStats {
        cpu: 50.0,
        mem: 2048.0,
        net: 1.0,
        disk_io: 2.0,
    });
    let record = AgentRecord::from_report(AgentKind::Worker, report, Instant::now());
    let value = serde_json::to_value(&record).expect("record serializes");

    assert_eq!(value["cpu"], 50.0);
    assert_eq!(value["kind"], "worker");
    assert!(value.get("stats").is_none());
    assert!(value.get("last_contact").is_none());
    assert!(value.get("last_seen").is_some());
}

#[test]
fn record_staleness_is_strictly_greater_than_timeout() {
    let start = Instant::now();
    let record = AgentRecord::from_report(AgentKind::Worker, StatusReport::dead("w", "h"), start);
    let timeout = Duration::from_secs(20);

    assert!(!record.is_stale(start + timeout, timeout));
    assert!(record.is_stale(start + timeout + Duration::from_millis(1), timeout));
    assert_eq!(record.idle_for(start + Duration::from_secs(3)), Duration::from_secs(3));
}

#[test]
fn failed_workload_snapshot_keeps_last_counts() {
    let connected = WorkloadSnapshot::connected(WorkloadStatus {
        n_workers: 4,
        n_pending: 10,
        n_working: 3,
    });
    let failed = connected.failed("connection refused");

    assert_eq!(failed.status, WorkloadState::Error);
    assert_eq!(failed.n_pending, 10);
    assert_eq!(failed.reason.as_deref(), Some("connection refused"));
    assert_eq!(WorkloadSnapshot::default().status, WorkloadState::Unknown);
}
