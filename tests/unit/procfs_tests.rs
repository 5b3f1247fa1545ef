use std::time::Duration;

use monitored_cluster::providers::procfs::ProcfsStatsProvider;
use monitored_cluster::providers::ProcessStatsProvider;

#[tokio::test]
async fn samples_live_process_tree() {
    let provider = ProcfsStatsProvider::new(Duration::from_millis(100), 2);
    let stats = provider
        .sample(std::process::id())
        .await
        .expect("own process is sampled");

    assert!(stats.mem > 0.0, "resident memory reported");
    assert!(stats.cpu >= 0.0);
    assert!(stats.net >= 0.0);
    assert!(stats.disk_io >= 0.0);
}

#[tokio::test]
async fn vanished_process_is_unavailable() {
    let mut child = std::process::Command::new("true").spawn().expect("spawn");
    let pid = child.id();
    child.wait().expect("reap");

    let provider = ProcfsStatsProvider::new(Duration::from_millis(20), 1);
    assert!(provider.sample(pid).await.is_none());
}
