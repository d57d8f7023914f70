//! Per-target polling workers sharing one stop signal.
//!
//! Each enabled target gets its own tokio task that runs a pass, then sleeps
//! for whatever is left of its poll interval. Stopping is cooperative: the
//! signal is observed between passes, never inside one.

use crate::sync_pass::{SyncPassDeps, run_sync_pass};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use switch_sync_domain::{PassReport, SyncTarget, TargetId, TargetState};
use switch_sync_ports::{LogLevel, log_fields};
use switch_sync_shared::{
    CancellationToken, CorrelationId, ErrorEnvelope, RequestContext, Result, SleepOutcome,
    sleep_with_context,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Snapshot of one target worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    /// Target id.
    pub target: TargetId,
    /// Worker lifecycle state.
    pub state: TargetState,
    /// Passes completed since the worker set was started.
    pub passes: u64,
    /// Report of the most recent successful pass.
    pub last_report: Option<PassReport>,
    /// Error of the most recent failed pass, cleared by the next success.
    pub last_error: Option<ErrorEnvelope>,
}

impl TargetStatus {
    fn idle(target: TargetId) -> Self {
        Self {
            target,
            state: TargetState::Idle,
            passes: 0,
            last_report: None,
            last_error: None,
        }
    }

    fn record(&mut self, result: &Result<PassReport>) {
        self.passes = self.passes.saturating_add(1);
        match result {
            Ok(report) => {
                self.last_report = Some(report.clone());
                self.last_error = None;
            },
            Err(error) => self.last_error = Some(error.clone()),
        }
    }
}

/// Outcome of one pass executed by [`Scheduler::run_once`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPassResult {
    /// Target id.
    pub target: TargetId,
    /// Report when the pass ran.
    pub report: Option<PassReport>,
    /// Error when the session could not be opened.
    pub error: Option<ErrorEnvelope>,
}

type SharedStatuses = Arc<Mutex<Vec<TargetStatus>>>;

struct Workers {
    stop: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Owns the worker set for the configured targets.
pub struct Scheduler {
    deps: SyncPassDeps,
    targets: Vec<SyncTarget>,
    statuses: SharedStatuses,
    workers: Option<Workers>,
}

impl Scheduler {
    /// Scheduler for `targets`, all `Idle`.
    #[must_use]
    pub fn new(deps: SyncPassDeps, targets: Vec<SyncTarget>) -> Self {
        let statuses = idle_statuses(&targets);
        Self {
            deps,
            targets,
            statuses: Arc::new(Mutex::new(statuses)),
            workers: None,
        }
    }

    /// Configured targets.
    #[must_use]
    pub fn targets(&self) -> &[SyncTarget] {
        &self.targets
    }

    /// Returns true while a worker set is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    /// Spawn one worker per target. Calling `start` on a running scheduler is a no-op.
    pub fn start(&mut self) {
        if self.workers.is_some() {
            return;
        }
        let stop = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.targets.len());
        for (slot, target) in self.targets.iter().enumerate() {
            update(&self.statuses, slot, |status| {
                status.state = TargetState::Running;
                status.passes = 0;
            });
            let ctx = RequestContext::with_cancellation(CorrelationId::new_run_id(), stop.clone());
            handles.push(tokio::spawn(run_worker(
                ctx,
                self.deps.clone(),
                target.clone(),
                slot,
                Arc::clone(&self.statuses),
            )));
        }
        self.workers = Some(Workers { stop, handles });
    }

    /// Signal every worker and wait for in-flight passes to finish.
    pub async fn stop(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };
        workers.stop.cancel();
        for slot in 0..self.targets.len() {
            update(&self.statuses, slot, |status| {
                if status.state == TargetState::Running {
                    status.state = TargetState::Stopping;
                }
            });
        }
        for (slot, handle) in workers.handles.into_iter().enumerate() {
            if let Err(error) = handle.await {
                update(&self.statuses, slot, |status| status.state = TargetState::Stopped);
                if let Some(logger) = self.deps.logger.as_ref() {
                    logger.error(
                        "scheduler.worker.panicked",
                        "target worker ended abnormally",
                        Some(log_fields([("error", json!(error.to_string()))])),
                    );
                }
            }
        }
    }

    /// Stop, swap in a new target list, and restart if workers were running.
    pub async fn reconfigure(&mut self, targets: Vec<SyncTarget>) {
        let deps = self.deps.clone();
        self.rewire(deps, targets).await;
    }

    /// Like [`Scheduler::reconfigure`], but also replaces the pass
    /// dependencies, for instance a connector built for a new server address.
    pub async fn rewire(&mut self, deps: SyncPassDeps, targets: Vec<SyncTarget>) {
        let was_running = self.is_running();
        self.stop().await;
        let statuses = idle_statuses(&targets);
        if let Ok(mut guard) = self.statuses.lock() {
            *guard = statuses;
        }
        self.deps = deps;
        self.targets = targets;
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.info(
                "scheduler.reconfigured",
                "sync targets reconfigured",
                Some(log_fields([("targets", json!(self.targets.len()))])),
            );
        }
        if was_running {
            self.start();
        }
    }

    /// Snapshot of every target's state and last pass.
    #[must_use]
    pub fn status(&self) -> Vec<TargetStatus> {
        self.statuses
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Run a single pass for every target concurrently.
    pub async fn run_once(&self) -> Vec<TargetPassResult> {
        let passes = self.targets.iter().enumerate().map(|(slot, target)| async move {
            let result = run_sync_pass(&pass_context(&target.id), &self.deps, target).await;
            update(&self.statuses, slot, |status| status.record(&result));
            match result {
                Ok(report) => TargetPassResult {
                    target: target.id.clone(),
                    report: Some(report),
                    error: None,
                },
                Err(error) => TargetPassResult {
                    target: target.id.clone(),
                    report: None,
                    error: Some(error),
                },
            }
        });
        join_all(passes).await
    }
}

async fn run_worker(
    stop: RequestContext,
    deps: SyncPassDeps,
    target: SyncTarget,
    slot: usize,
    statuses: SharedStatuses,
) {
    let logger = deps
        .logger
        .as_ref()
        .map(|logger| logger.child(log_fields([("target", json!(target.id.as_str()))])));
    if let Some(logger) = logger.as_deref() {
        logger.info(
            "scheduler.target.started",
            "target worker started",
            Some(log_fields([(
                "pollIntervalMs",
                json!(u64::try_from(target.poll_interval.as_millis()).unwrap_or(u64::MAX)),
            )])),
        );
    }

    while !stop.is_cancelled() {
        let cycle_started = Instant::now();
        let result = run_sync_pass(&pass_context(&target.id), &deps, &target).await;
        if let (Err(error), Some(logger)) = (&result, logger.as_deref()) {
            logger.failure(
                LogLevel::Warn,
                "scheduler.pass.failed",
                "pass failed; retrying next cycle",
                None,
                error,
            );
        }
        update(&statuses, slot, |status| status.record(&result));

        let sleep_for = target.poll_interval.saturating_sub(cycle_started.elapsed());
        if sleep_with_context(&stop, sleep_for).await == SleepOutcome::Cancelled {
            break;
        }
    }

    update(&statuses, slot, |status| status.state = TargetState::Stopped);
    if let Some(logger) = logger.as_deref() {
        logger.info("scheduler.target.stopped", "target worker stopped", None);
    }
}

/// Passes get their own cancellation token so the stop signal only takes
/// effect between passes. The correlation id names the target.
fn pass_context(target: &TargetId) -> RequestContext {
    RequestContext::new(CorrelationId::new_pass_id(target.as_str()))
}

fn idle_statuses(targets: &[SyncTarget]) -> Vec<TargetStatus> {
    targets
        .iter()
        .map(|target| TargetStatus::idle(target.id.clone()))
        .collect()
}

fn update(statuses: &SharedStatuses, slot: usize, apply: impl FnOnce(&mut TargetStatus)) {
    if let Ok(mut guard) = statuses.lock()
        && let Some(status) = guard.get_mut(slot)
    {
        apply(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::path::PathBuf;
    use std::time::Duration;
    use switch_sync_adapters::LocalMirrorStore;
    use switch_sync_domain::RemotePath;
    use switch_sync_testkit::in_memory::RecordingNotifier;
    use switch_sync_testkit::remote::{FakeConnector, FakeRemoteTree};

    fn deps(connector: FakeConnector, scratch: PathBuf) -> SyncPassDeps {
        SyncPassDeps {
            connector: Arc::new(connector),
            store: Arc::new(LocalMirrorStore::new(scratch)),
            notifier: Arc::new(RecordingNotifier::new()),
            logger: None,
            transfer_timeout: None,
        }
    }

    fn target(
        index: usize,
        root: &str,
        local: PathBuf,
        secs: u64,
    ) -> std::result::Result<SyncTarget, Box<dyn Error>> {
        Ok(SyncTarget::file_sync(
            index,
            RemotePath::parse(root)?,
            local,
            Duration::from_secs(secs),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_moves_from_idle_to_stopped() -> std::result::Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let tree = FakeRemoteTree::new();
        tree.add_dir("/r");
        let mut scheduler = Scheduler::new(
            deps(FakeConnector::new(tree), temp.path().to_path_buf()),
            vec![target(1, "/r", temp.path().join("out"), 5)?],
        );

        assert!(scheduler.status().iter().all(|status| status.state == TargetState::Idle));
        scheduler.start();
        assert!(scheduler.is_running());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.status().iter().all(|status| status.state == TargetState::Running));

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        let status = scheduler.status();
        let first = status.first().ok_or("missing status")?;
        assert_eq!(first.state, TargetState::Stopped);
        assert!(first.passes >= 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_restarts_with_new_targets() -> std::result::Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let tree = FakeRemoteTree::new();
        tree.add_dir("/a");
        tree.add_dir("/b");
        let mut scheduler = Scheduler::new(
            deps(FakeConnector::new(tree), temp.path().to_path_buf()),
            vec![target(1, "/a", temp.path().join("a"), 5)?],
        );
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        scheduler
            .reconfigure(vec![
                target(1, "/a", temp.path().join("a"), 5)?,
                target(2, "/b", temp.path().join("b"), 5)?,
            ])
            .await;
        assert!(scheduler.is_running());
        let ids: Vec<String> = scheduler
            .status()
            .iter()
            .map(|status| status.target.as_str().to_owned())
            .collect();
        assert_eq!(ids, vec!["files-1".to_owned(), "files-2".to_owned()]);

        scheduler.stop().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn rewire_moves_workers_to_the_new_connector() -> std::result::Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let old_tree = FakeRemoteTree::new();
        old_tree.add_dir("/a");
        let new_tree = FakeRemoteTree::new();
        new_tree.add_dir("/a");
        let mut scheduler = Scheduler::new(
            deps(FakeConnector::new(old_tree.clone()), temp.path().to_path_buf()),
            vec![target(1, "/a", temp.path().join("a"), 5)?],
        );
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        scheduler
            .rewire(
                deps(FakeConnector::new(new_tree.clone()), temp.path().to_path_buf()),
                vec![target(1, "/a", temp.path().join("a"), 5)?],
            )
            .await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop().await;

        assert_eq!(old_tree.connect_count(), 1);
        assert_eq!(new_tree.connect_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn idle_scheduler_stays_idle_after_reconfigure() -> std::result::Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let mut scheduler = Scheduler::new(
            deps(FakeConnector::new(FakeRemoteTree::new()), temp.path().to_path_buf()),
            Vec::new(),
        );
        scheduler
            .reconfigure(vec![target(1, "/a", temp.path().join("a"), 5)?])
            .await;
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.targets().len(), 1);
        Ok(())
    }
}
