use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uvcprobe::Result;
use uvcprobe::camera::{Discovery, DiscoveryOptions};
use uvcprobe::tools::{CommandOutput, CommandRunner};

/// Fails every invocation and counts them
#[derive(Default)]
struct CountingRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl CommandRunner for CountingRunner {
    async fn run(&self, _program: &str, _args: &[String]) -> Result<CommandOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CommandOutput::failed(1, "no such device"))
    }
}

fn discovery(runner: Arc<CountingRunner>, dev_dir: std::path::PathBuf) -> Discovery {
    Discovery::with_runner(
        runner,
        "v4l2-ctl",
        "udevadm",
        DiscoveryOptions {
            dev_dir,
            driver: "uvcvideo".to_string(),
            check_open: true,
        },
    )
}

#[tokio::test]
async fn empty_device_directory_yields_no_cameras() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("null"), b"").unwrap();
    std::fs::write(dir.path().join("media0"), b"").unwrap();

    let runner = Arc::new(CountingRunner::default());
    let cameras = discovery(runner.clone(), dir.path().to_path_buf())
        .discover()
        .await
        .unwrap();
    assert!(cameras.is_empty());
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_device_directory_yields_no_cameras() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(CountingRunner::default());
    let cameras = discovery(runner, dir.path().join("absent"))
        .discover()
        .await
        .unwrap();
    assert!(cameras.is_empty());
}

#[tokio::test]
async fn unreadable_nodes_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("video0"), b"").unwrap();
    std::fs::write(dir.path().join("video1"), b"").unwrap();

    let runner = Arc::new(CountingRunner::default());
    let cameras = discovery(runner.clone(), dir.path().to_path_buf())
        .discover()
        .await
        .unwrap();
    assert!(cameras.is_empty());
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
}
