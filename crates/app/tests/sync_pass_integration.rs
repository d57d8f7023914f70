//! Integration tests for one sync pass against the fake server and a real mirror directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use switch_sync_adapters::LocalMirrorStore;
use switch_sync_app::{SyncPassDeps, run_sync_pass};
use switch_sync_domain::{
    ChangeKind, DEFAULT_SCREENSHOT_PATTERN, FileTimestamp, RemotePath, SyncTarget,
};
use switch_sync_shared::{ErrorEnvelope, RequestContext};
use switch_sync_testkit::in_memory::{MemoryLogger, RecordingNotifier};
use switch_sync_testkit::remote::{FakeConnector, FakeRemoteTree};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const CAPTURE: &str = "/Nintendo/Album/2024/01/02/20240102030405123456-0001.jpg";
const CAPTURE_MDTM: &str = "20240102030405";
const CAPTURE_EPOCH: i64 = 1_704_164_645;

struct Harness {
    _temp: tempfile::TempDir,
    mirror: PathBuf,
    tree: FakeRemoteTree,
    notifier: RecordingNotifier,
    logger: MemoryLogger,
    deps: SyncPassDeps,
}

impl Harness {
    fn new(connector: impl FnOnce(FakeRemoteTree) -> FakeConnector) -> std::io::Result<Self> {
        let temp = tempfile::tempdir()?;
        let scratch = temp.path().join("scratch");
        std::fs::create_dir_all(&scratch)?;
        let mirror = temp.path().join("mirror");
        let tree = FakeRemoteTree::new();
        let notifier = RecordingNotifier::new();
        let logger = MemoryLogger::new();
        let deps = SyncPassDeps {
            connector: Arc::new(connector(tree.clone())),
            store: Arc::new(LocalMirrorStore::new(scratch)),
            notifier: Arc::new(notifier.clone()),
            logger: Some(Arc::new(logger.clone())),
            transfer_timeout: Some(Duration::from_secs(30)),
        };
        Ok(Self {
            _temp: temp,
            mirror,
            tree,
            notifier,
            logger,
            deps,
        })
    }

    fn screenshots(&self) -> SyncTarget {
        SyncTarget::screenshots(
            self.mirror.clone(),
            DEFAULT_SCREENSHOT_PATTERN.to_owned(),
            Duration::from_secs(15),
        )
    }

    fn file_sync(&self, root: &str) -> Result<SyncTarget, ErrorEnvelope> {
        Ok(SyncTarget::file_sync(
            1,
            RemotePath::parse(root)?,
            self.mirror.clone(),
            Duration::from_secs(15),
        ))
    }
}

fn mtime_of(path: &Path) -> std::io::Result<FileTimestamp> {
    Ok(FileTimestamp::from_system_time(std::fs::metadata(path)?.modified()?))
}

#[tokio::test]
async fn screenshots_are_renamed_flattened_and_announced() -> TestResult {
    let harness = Harness::new(FakeConnector::new)?;
    harness.tree.add_file(CAPTURE, b"jpeg-bytes", CAPTURE_MDTM);
    harness
        .tree
        .add_file("/Nintendo/Album/2024/01/02/2024-01-02_03-04-05-0002.bmp", b"bmp", CAPTURE_MDTM);
    let ctx = RequestContext::new_run();

    let report = run_sync_pass(&ctx, &harness.deps, &harness.screenshots()).await?;

    assert_eq!(report.new, 2);
    assert_eq!(report.failed, 0);
    // The emuMMC album root does not exist on this fake server.
    assert_eq!(report.skipped_dirs, 1);

    let jpg = harness.mirror.join("2024-01-02_03-04-05.jpg");
    assert_eq!(std::fs::read(&jpg)?, b"jpeg-bytes");
    assert_eq!(mtime_of(&jpg)?, FileTimestamp::from_unix_seconds(CAPTURE_EPOCH));
    assert!(harness.mirror.join("2024-01-02_03-04-05.bmp").is_file());

    let notifications = harness.notifier.notifications();
    assert_eq!(notifications.len(), 2);
    let jpg_notice = notifications
        .iter()
        .find(|notification| notification.display_name.as_ref() == "2024-01-02_03-04-05.jpg")
        .ok_or("missing jpg notification")?;
    assert_eq!(jpg_notice.kind, ChangeKind::New);
    assert_eq!(jpg_notice.local_path, jpg);
    assert_eq!(jpg_notice.message(), "New image 2024-01-02_03-04-05.jpg has been added.");
    assert_eq!(harness.logger.count("sync.root.skipped"), 1);
    Ok(())
}

#[tokio::test]
async fn unchanged_remote_performs_zero_fetches() -> TestResult {
    let harness = Harness::new(FakeConnector::new)?;
    harness.tree.add_file(CAPTURE, b"jpeg-bytes", CAPTURE_MDTM);
    let ctx = RequestContext::new_run();
    let target = harness.screenshots();

    run_sync_pass(&ctx, &harness.deps, &target).await?;
    let second = run_sync_pass(&ctx, &harness.deps, &target).await?;

    assert_eq!(second.fetched(), 0);
    assert_eq!(second.unchanged, 1);
    assert_eq!(harness.tree.retrieve_count(), 1);
    assert_eq!(harness.notifier.notifications().len(), 1);
    Ok(())
}

#[tokio::test]
async fn newer_remote_copy_is_fetched_as_update() -> TestResult {
    let harness = Harness::new(FakeConnector::new)?;
    harness.tree.add_file("/switch/saves/zelda/slot1.bin", b"v1", "20240101000000");
    let ctx = RequestContext::new_run();
    let target = harness.file_sync("/switch/saves/")?;

    run_sync_pass(&ctx, &harness.deps, &target).await?;
    harness.tree.add_file("/switch/saves/zelda/slot1.bin", b"v2", "20240101000100");
    let report = run_sync_pass(&ctx, &harness.deps, &target).await?;

    assert_eq!(report.updated, 1);
    let local = harness.mirror.join("zelda").join("slot1.bin");
    assert_eq!(std::fs::read(&local)?, b"v2");

    let kinds: Vec<ChangeKind> = harness
        .notifier
        .notifications()
        .iter()
        .map(|notification| notification.kind)
        .collect();
    assert_eq!(kinds, vec![ChangeKind::New, ChangeKind::Updated]);
    assert_eq!(harness.notifier.display_names(), vec!["slot1.bin", "slot1.bin"]);
    Ok(())
}

#[tokio::test]
async fn per_file_failures_do_not_abort_the_pass() -> TestResult {
    let harness = Harness::new(FakeConnector::new)?;
    harness.tree.add_file_without_mdtm("/data/a_no_time.bin", b"?");
    harness.tree.add_file("/data/b_broken.bin", b"broken", "20240101000000");
    harness.tree.add_file("/data/c_fine.bin", b"fine", "20240101000000");
    harness.tree.fail_retrieve("/data/b_broken.bin");
    let ctx = RequestContext::new_run();
    let target = harness.file_sync("/data")?;

    let report = run_sync_pass(&ctx, &harness.deps, &target).await?;
    assert_eq!(report.discovered, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.new, 1);
    assert!(!harness.mirror.join("b_broken.bin").exists());
    assert_eq!(harness.logger.count("sync.file.failed"), 2);

    harness.tree.heal();
    let retry = run_sync_pass(&ctx, &harness.deps, &target).await?;
    assert_eq!(retry.new, 1);
    assert_eq!(std::fs::read(harness.mirror.join("b_broken.bin"))?, b"broken");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timed_out_transfer_reopens_the_session_for_later_files() -> TestResult {
    let mut harness = Harness::new(FakeConnector::new)?;
    harness.deps.transfer_timeout = Some(Duration::from_secs(1));
    harness.tree.add_file("/saves/a_stuck.bin", b"stuck", "20240101000000");
    harness.tree.add_file("/saves/b_next.bin", b"next", "20240101000000");
    harness.tree.stall_retrieve("/saves/a_stuck.bin", Duration::from_secs(60));
    let ctx = RequestContext::new_run();

    let report = run_sync_pass(&ctx, &harness.deps, &harness.file_sync("/saves")?).await?;

    assert_eq!(report.failed, 1);
    assert_eq!(report.new, 1);
    assert!(!harness.mirror.join("a_stuck.bin").exists());
    assert_eq!(std::fs::read(harness.mirror.join("b_next.bin"))?, b"next");
    assert_eq!(harness.tree.connect_count(), 2);
    assert_eq!(harness.logger.count("sync.pass.session_lost"), 1);
    assert_eq!(harness.logger.count("sync.pass.reconnected"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_reopen_is_not_retried_for_every_remaining_file() -> TestResult {
    let mut harness = Harness::new(|tree| FakeConnector::new(tree).with_accept_limit(1))?;
    harness.deps.transfer_timeout = Some(Duration::from_secs(1));
    harness.tree.add_file("/saves/a_stuck.bin", b"stuck", "20240101000000");
    harness.tree.add_file("/saves/b_next.bin", b"next", "20240101000000");
    harness.tree.add_file("/saves/c_last.bin", b"last", "20240101000000");
    harness.tree.stall_retrieve("/saves/a_stuck.bin", Duration::from_secs(60));
    let ctx = RequestContext::new_run();

    let report = run_sync_pass(&ctx, &harness.deps, &harness.file_sync("/saves")?).await?;

    assert_eq!(report.failed, 3);
    assert_eq!(report.fetched(), 0);
    assert_eq!(harness.tree.connect_count(), 2);
    assert_eq!(harness.logger.count("sync.pass.reconnect_failed"), 1);
    Ok(())
}

#[tokio::test]
async fn connect_failure_fails_only_the_pass() -> TestResult {
    let harness = Harness::new(FakeConnector::unreachable)?;
    harness.tree.add_file("/data/file.bin", b"x", "20240101000000");
    let ctx = RequestContext::new_run();

    let error = run_sync_pass(&ctx, &harness.deps, &harness.file_sync("/data")?)
        .await
        .err()
        .ok_or("expected connect failure")?;
    assert!(error.has_code("remote", "connect_failed"));
    assert_eq!(error.metadata.get("target").map(String::as_str), Some("files-1"));
    assert!(harness.notifier.notifications().is_empty());
    assert_eq!(harness.logger.count("sync.pass.connect_failed"), 1);
    Ok(())
}

#[tokio::test]
async fn session_is_closed_after_every_pass() -> TestResult {
    let harness = Harness::new(FakeConnector::new)?;
    harness.tree.add_file("/data/file.bin", b"x", "20240101000000");
    harness.tree.fail_list("/data");
    let ctx = RequestContext::new_run();
    let target = harness.file_sync("/data")?;

    let report = run_sync_pass(&ctx, &harness.deps, &target).await?;
    assert_eq!(report.skipped_dirs, 1);
    run_sync_pass(&ctx, &harness.deps, &harness.screenshots()).await?;

    assert_eq!(harness.tree.connect_count(), 2);
    assert_eq!(harness.tree.close_count(), 2);
    Ok(())
}

#[tokio::test]
async fn notification_failures_are_logged_not_fatal() -> TestResult {
    let mut harness = Harness::new(FakeConnector::new)?;
    let failing = RecordingNotifier::failing();
    harness.deps.notifier = Arc::new(failing.clone());
    harness.tree.add_file("/data/file.bin", b"x", "20240101000000");
    let ctx = RequestContext::new_run();

    let report = run_sync_pass(&ctx, &harness.deps, &harness.file_sync("/data")?).await?;
    assert_eq!(report.new, 1);
    assert_eq!(failing.notifications().len(), 1);
    assert_eq!(harness.logger.count("sync.notify.failed"), 1);
    Ok(())
}
