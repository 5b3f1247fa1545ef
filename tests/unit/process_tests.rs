//! Supervised process lifecycle and the escalating stop schedule.

use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use monitored_cluster::agent::process::{ProcessPhase, StopSchedule, StopTier, SupervisedProcess};

const SHORT: StopSchedule = StopSchedule {
    interrupt_grace: Duration::from_millis(300),
    terminate_grace: Duration::from_millis(300),
};

async fn wait_dead(process: &mut SupervisedProcess) {
    assert!(
        process.wait_timeout(Duration::from_secs(5)).await,
        "process did not exit"
    );
}

#[tokio::test]
async fn start_is_idempotent_while_running() {
    let mut process = SupervisedProcess::new("sleep 30");
    assert_eq!(process.phase(), ProcessPhase::NotStarted);

    assert!(process.start().expect("first start"));
    let pid = process.pid().expect("pid while running");
    assert!(!process.start().expect("second start"));

    assert_eq!(process.pid(), Some(pid));
    assert_eq!(process.starts(), 1);
    assert_eq!(process.phase(), ProcessPhase::Running);

    process.graceful_stop(SHORT).await;
}

#[tokio::test]
async fn exit_code_is_recorded() {
    let mut process = SupervisedProcess::new("exit 3");
    process.start().expect("start");
    wait_dead(&mut process).await;

    assert_eq!(process.return_code(), Some(3));
    assert_eq!(process.pid(), None);
    assert_eq!(process.phase(), ProcessPhase::Dead);
}

#[tokio::test]
async fn death_by_signal_is_negative() {
    let mut process = SupervisedProcess::new("exec sleep 30");
    process.start().expect("start");
    process.signal(Signal::SIGKILL).expect("kill delivered");
    wait_dead(&mut process).await;

    assert_eq!(process.return_code(), Some(-9));
}

#[tokio::test]
async fn cooperative_process_stops_on_interrupt() {
    let mut process = SupervisedProcess::new("exec sleep 30");
    process.start().expect("start");

    let report = process.graceful_stop(SHORT).await;

    assert_eq!(report.tiers, vec![StopTier::Interrupt]);
    assert_eq!(report.returncode, Some(-2));
    assert_eq!(process.phase(), ProcessPhase::Dead);
}

#[tokio::test]
#[serial_test::serial]
async fn stubborn_process_escalates_to_kill() {
    let mut process = SupervisedProcess::new("trap '' INT TERM; exec sleep 30");
    process.start().expect("start");
    // Give the shell time to install its traps.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let report = process.graceful_stop(SHORT).await;
    let elapsed = started.elapsed();

    assert_eq!(
        report.tiers,
        vec![StopTier::Interrupt, StopTier::Terminate, StopTier::Kill]
    );
    assert_eq!(report.returncode, Some(-9));
    assert!(elapsed >= Duration::from_millis(600), "stopped too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "stop blocked too long: {elapsed:?}");
}

#[tokio::test]
#[serial_test::serial]
async fn terminate_tier_stops_process_ignoring_interrupt() {
    let mut process = SupervisedProcess::new("trap '' INT; exec sleep 30");
    process.start().expect("start");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = process.graceful_stop(SHORT).await;

    assert_eq!(report.tiers, vec![StopTier::Interrupt, StopTier::Terminate]);
    assert_eq!(report.returncode, Some(-15));
}

#[tokio::test]
async fn stopping_dead_process_is_noop() {
    let mut process = SupervisedProcess::new("true");
    let report = process.graceful_stop(SHORT).await;
    assert!(report.tiers.is_empty());

    process.start().expect("start");
    wait_dead(&mut process).await;
    let report = process.graceful_stop(SHORT).await;
    assert!(report.tiers.is_empty());
    assert_eq!(report.returncode, Some(0));
}

#[test]
fn signalling_without_process_fails() {
    let process = SupervisedProcess::new("true");
    assert!(process.signal(Signal::SIGTERM).is_err());
}
