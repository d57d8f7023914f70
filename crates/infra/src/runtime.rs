//! Composition root: turn a validated config into a running scheduler.
//!
//! Owns the scratch directory for the lifetime of a run and removes it on
//! shutdown. Callers pick the logger; everything else comes from the config.
//! A running sync can be handed a reloaded config (SIGHUP on Unix), which
//! restarts the workers with the new targets and server settings.

use crate::{InfraError, InfraResult};
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switch_sync_adapters::{
    FtpConnector, FtpSettings, JsonLogger, LocalMirrorStore, LogNotifier, ScratchDir,
    StderrLogSink, TracingLogger,
};
use switch_sync_app::{Scheduler, SyncPassDeps, TargetPassResult, TargetStatus};
use switch_sync_config::ValidatedSwitchSyncConfig;
use switch_sync_ports::{LogLevel, LoggerPort, RemoteConnectorPort, log_fields};
use switch_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use tokio::sync::mpsc;

/// How log events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line on stderr.
    #[default]
    Json,
    /// Forwarded to `tracing`; the binary installs the subscriber.
    Pretty,
}

/// Logger selection for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservabilityOptions {
    /// Output format.
    pub format: LogFormat,
    /// Events below this level are dropped by the JSON logger.
    pub min_level: LogLevel,
}

impl Default for ObservabilityOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            min_level: LogLevel::Info,
        }
    }
}

/// Build the logger for `options`.
#[must_use]
pub fn build_logger(options: &ObservabilityOptions) -> Arc<dyn LoggerPort> {
    match options.format {
        LogFormat::Json => {
            Arc::new(JsonLogger::new(Arc::new(StderrLogSink)).with_min_level(options.min_level))
        },
        LogFormat::Pretty => Arc::new(TracingLogger::new()),
    }
}

/// FTP settings from the validated server section.
pub fn ftp_settings(config: &ValidatedSwitchSyncConfig) -> InfraResult<FtpSettings> {
    let host = config.server.host.clone().ok_or_else(|| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "missing_host"),
            "server.host is required to connect",
        )
    })?;
    let port = u16::try_from(config.limits().port.get()).map_err(|_| {
        ErrorEnvelope::invariant(ErrorCode::invalid_input(), "validated port exceeds u16")
    })?;
    Ok(FtpSettings {
        host,
        port,
        user: config.server.user.clone(),
        password: config.server.password.clone(),
        connect_timeout: config.connect_timeout(),
    })
}

/// Parent of the scratch directory: the configured override or the platform
/// temp location. Staging always happens in its `switch_ftp_sync` child.
#[must_use]
pub fn scratch_parent(config: &ValidatedSwitchSyncConfig) -> PathBuf {
    config
        .settings
        .scratch_dir
        .as_deref()
        .map_or_else(ScratchDir::default_parent, PathBuf::from)
}

/// A re-read config and the connector for its server section.
pub struct ReloadedConfig {
    /// Validated replacement config.
    pub config: ValidatedSwitchSyncConfig,
    /// Connector the restarted workers use.
    pub connector: Arc<dyn RemoteConnectorPort>,
}

impl ReloadedConfig {
    /// Pair `config` with an FTP connector for its server section.
    pub fn ftp(config: ValidatedSwitchSyncConfig) -> InfraResult<Self> {
        let connector = Arc::new(FtpConnector::new(ftp_settings(&config)?));
        Ok(Self { config, connector })
    }
}

/// A wired scheduler plus the scratch directory it stages into.
pub struct SyncRuntime {
    scheduler: Scheduler,
    deps: SyncPassDeps,
    scratch: ScratchDir,
    logger: Arc<dyn LoggerPort>,
}

impl SyncRuntime {
    /// Wire the FTP connector, mirror store, and notifier from `config`.
    pub fn build(
        config: &ValidatedSwitchSyncConfig,
        logger: Arc<dyn LoggerPort>,
    ) -> InfraResult<Self> {
        ensure_targets(config)?;
        let connector = Arc::new(FtpConnector::new(ftp_settings(config)?));
        Self::build_with_connector(config, connector, logger)
    }

    /// Wire a runtime around an explicit connector.
    pub fn build_with_connector(
        config: &ValidatedSwitchSyncConfig,
        connector: Arc<dyn RemoteConnectorPort>,
        logger: Arc<dyn LoggerPort>,
    ) -> InfraResult<Self> {
        ensure_targets(config)?;
        let scratch = ScratchDir::prepare(&scratch_parent(config))?;
        let deps = SyncPassDeps {
            connector,
            store: Arc::new(LocalMirrorStore::new(scratch.path().to_path_buf())),
            notifier: Arc::new(LogNotifier::new(Arc::clone(&logger))),
            logger: Some(Arc::clone(&logger)),
            transfer_timeout: config.transfer_timeout(),
        };
        let scheduler = Scheduler::new(deps.clone(), config.sync_targets());
        Ok(Self {
            scheduler,
            deps,
            scratch,
            logger,
        })
    }

    /// Scratch directory in use.
    #[must_use]
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Current per-target status.
    #[must_use]
    pub fn status(&self) -> Vec<TargetStatus> {
        self.scheduler.status()
    }

    /// One pass per target, concurrently.
    pub async fn run_once(&self) -> Vec<TargetPassResult> {
        self.scheduler.run_once().await
    }

    /// Restart the workers on `reloaded`'s targets and connector.
    ///
    /// The scratch directory stays where it is until the next start; a changed
    /// `scratchDir` is only reported. On error the running workers are left
    /// untouched.
    pub async fn reload(&mut self, reloaded: ReloadedConfig) -> InfraResult<()> {
        let ReloadedConfig { config, connector } = reloaded;
        ensure_targets(&config)?;
        let parent = scratch_parent(&config);
        if self.scratch.path().parent() != Some(parent.as_path()) {
            self.logger.warn(
                "sync.run.scratch_kept",
                "scratchDir changes take effect on restart",
                Some(log_fields([
                    ("scratchDir", json!(self.scratch.path().display().to_string())),
                    ("requested", json!(parent.display().to_string())),
                ])),
            );
        }
        self.deps = SyncPassDeps {
            connector,
            transfer_timeout: config.transfer_timeout(),
            ..self.deps.clone()
        };
        self.scheduler
            .rewire(self.deps.clone(), config.sync_targets())
            .await;
        Ok(())
    }

    /// Start every worker, wait for `shutdown`, then stop them.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let (_, reloads) = mpsc::channel(1);
        self.run_until_reloading(shutdown, reloads, || {
            Err(ErrorEnvelope::invariant(
                ErrorCode::internal(),
                "reload requested without a config source",
            ))
        })
        .await;
    }

    /// Like [`SyncRuntime::run_until`], but every message on `reloads` calls
    /// `load` and restarts the workers on the result. A failed reload is
    /// logged and the running config stays in effect.
    pub async fn run_until_reloading<F, L>(
        &mut self,
        shutdown: F,
        mut reloads: mpsc::Receiver<()>,
        mut load: L,
    ) where
        F: Future<Output = ()>,
        L: FnMut() -> InfraResult<ReloadedConfig>,
    {
        self.scheduler.start();
        self.logger.info(
            "sync.run.started",
            "sync started",
            Some(log_fields([
                ("targets", json!(self.scheduler.targets().len())),
                ("scratchDir", json!(self.scratch.path().display().to_string())),
            ])),
        );
        tokio::pin!(shutdown);
        let mut listening = true;
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                request = reloads.recv(), if listening => match request {
                    Some(()) => self.apply_reload(load()).await,
                    None => listening = false,
                },
            }
        }
        self.logger.info("sync.run.stopping", "stopping sync workers", None);
        self.scheduler.stop().await;
        self.logger.info("sync.run.stopped", "sync stopped", None);
    }

    async fn apply_reload(&mut self, loaded: InfraResult<ReloadedConfig>) {
        let reloaded = match loaded {
            Ok(reloaded) => self.reload(reloaded).await,
            Err(error) => Err(error),
        };
        match reloaded {
            Ok(()) => self.logger.info(
                "sync.run.reloaded",
                "config reloaded",
                Some(log_fields([
                    ("targets", json!(self.scheduler.targets().len())),
                    ("endpoint", json!(self.deps.connector.endpoint())),
                ])),
            ),
            Err(error) => self.logger.failure(
                LogLevel::Warn,
                "sync.run.reload_failed",
                "config reload failed; keeping the running config",
                None,
                &error,
            ),
        }
    }

    /// Remove the scratch directory and release its lock.
    pub fn shutdown(self) -> InfraResult<()> {
        self.scratch.remove()
    }
}

/// Build a runtime, run one pass for every target, and clean up.
pub fn run_once_blocking(
    config: &ValidatedSwitchSyncConfig,
    logger: Arc<dyn LoggerPort>,
) -> InfraResult<Vec<TargetPassResult>> {
    let runtime = SyncRuntime::build(config, logger)?;
    let results = block_on(runtime.run_once());
    runtime.shutdown()?;
    results
}

/// Build a runtime and sync until Ctrl-C, then clean up.
///
/// On Unix, SIGHUP re-runs `load` and restarts the workers on the new config.
pub fn run_until_ctrl_c<L>(
    config: &ValidatedSwitchSyncConfig,
    logger: Arc<dyn LoggerPort>,
    mut load: L,
) -> InfraResult<()>
where
    L: FnMut() -> InfraResult<ValidatedSwitchSyncConfig>,
{
    let mut runtime = SyncRuntime::build(config, Arc::clone(&logger))?;
    let ran = block_on(async {
        let reloads = forward_hangups(logger.as_ref());
        runtime
            .run_until_reloading(ctrl_c(logger), reloads, || ReloadedConfig::ftp(load()?))
            .await;
    });
    runtime.shutdown()?;
    ran
}

#[cfg(unix)]
fn forward_hangups(logger: &dyn LoggerPort) -> mpsc::Receiver<()> {
    use tokio::signal::unix::{SignalKind, signal};
    use tokio::sync::mpsc::error::TrySendError;

    let (sender, receiver) = mpsc::channel(1);
    match signal(SignalKind::hangup()) {
        Ok(mut hangups) => {
            tokio::spawn(async move {
                while hangups.recv().await.is_some() {
                    // A reload already queued covers this one too.
                    if let Err(TrySendError::Closed(())) = sender.try_send(()) {
                        break;
                    }
                }
            });
        },
        Err(error) => logger.failure(
            LogLevel::Warn,
            "sync.run.signal_failed",
            "could not listen for SIGHUP; config reload disabled",
            None,
            &InfraError::from(error),
        ),
    }
    receiver
}

#[cfg(not(unix))]
fn forward_hangups(_logger: &dyn LoggerPort) -> mpsc::Receiver<()> {
    let (_, receiver) = mpsc::channel(1);
    receiver
}

async fn ctrl_c(logger: Arc<dyn LoggerPort>) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        logger.failure(
            LogLevel::Error,
            "sync.run.signal_failed",
            "could not listen for Ctrl-C; shutting down",
            None,
            &InfraError::from(error),
        );
    }
}

fn ensure_targets(config: &ValidatedSwitchSyncConfig) -> InfraResult<()> {
    if config.has_enabled_target() {
        return Ok(());
    }
    Err(ErrorEnvelope::expected(
        ErrorCode::new("sync", "no_targets"),
        "no sync target is enabled; enable screenshots or a fileSync pair",
    ))
}

fn block_on<F>(future: F) -> InfraResult<F::Output>
where
    F: Future,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                format!("failed to start async runtime: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::time::Duration;
    use switch_sync_adapters::SCRATCH_DIR_NAME;
    use switch_sync_config::{FileSyncPairConfig, SwitchSyncConfig};
    use switch_sync_domain::TargetState;
    use switch_sync_testkit::in_memory::MemoryLogger;
    use switch_sync_testkit::remote::{FakeConnector, FakeRemoteTree};

    type TestResult = Result<(), Box<dyn Error>>;

    fn config_in(dir: &Path) -> Result<ValidatedSwitchSyncConfig, ErrorEnvelope> {
        let mut config = SwitchSyncConfig::default();
        config.server.host = Some("192.168.1.20".into());
        config.settings.scratch_dir = Some(dir.join("scratch").display().to_string().into());
        config.file_sync.push(FileSyncPairConfig {
            server_path: "/saves".into(),
            output_path: dir.join("mirror").display().to_string().into(),
            enabled: true,
        });
        config.validate_and_normalize().map_err(Into::into)
    }

    #[test]
    fn ftp_settings_follow_server_section() -> TestResult {
        let temp = tempfile::tempdir()?;
        let config = config_in(temp.path())?;
        let settings = ftp_settings(&config)?;
        assert_eq!(settings.host.as_ref(), "192.168.1.20");
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.user.as_ref(), "root");
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn config_without_targets_is_rejected() -> TestResult {
        let temp = tempfile::tempdir()?;
        let config = SwitchSyncConfig::default().validate_and_normalize()?;
        let error = SyncRuntime::build_with_connector(
            &config,
            Arc::new(FakeConnector::new(FakeRemoteTree::new())),
            Arc::new(MemoryLogger::new()),
        )
        .err()
        .ok_or("expected no_targets")?;
        assert!(error.has_code("sync", "no_targets"));
        assert!(!temp.path().join("scratch").exists());
        Ok(())
    }

    #[tokio::test]
    async fn run_once_mirrors_and_shutdown_removes_scratch() -> TestResult {
        let temp = tempfile::tempdir()?;
        let config = config_in(temp.path())?;
        let tree = FakeRemoteTree::new();
        tree.add_file("/saves/zelda/slot1.bin", b"save", "20240101000000");
        let logger = MemoryLogger::new();
        std::fs::create_dir_all(temp.path().join("scratch"))?;
        std::fs::write(temp.path().join("scratch/notes.txt"), b"keep")?;

        let runtime = SyncRuntime::build_with_connector(
            &config,
            Arc::new(FakeConnector::new(tree)),
            Arc::new(logger.clone()),
        )?;
        assert_eq!(
            runtime.scratch_path(),
            temp.path().join("scratch").join(SCRATCH_DIR_NAME).as_path()
        );
        assert!(runtime.scratch_path().is_dir());

        let results = runtime.run_once().await;
        let first = results.first().ok_or("missing result")?;
        assert_eq!(first.report.as_ref().map(|report| report.new), Some(1));
        assert!(temp.path().join("mirror/zelda/slot1.bin").is_file());
        assert_eq!(logger.count("sync.notification"), 1);

        runtime.shutdown()?;
        assert!(!temp.path().join("scratch").join(SCRATCH_DIR_NAME).exists());
        assert_eq!(std::fs::read(temp.path().join("scratch/notes.txt"))?, b"keep");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_stops_workers_on_shutdown_signal() -> TestResult {
        let temp = tempfile::tempdir()?;
        let config = config_in(temp.path())?;
        let tree = FakeRemoteTree::new();
        tree.add_dir("/saves");
        let logger = MemoryLogger::new();
        let mut runtime = SyncRuntime::build_with_connector(
            &config,
            Arc::new(FakeConnector::new(tree.clone())),
            Arc::new(logger.clone()),
        )?;

        runtime.run_until(tokio::time::sleep(Duration::from_secs(31))).await;

        assert!(runtime.status().iter().all(|status| status.state == TargetState::Stopped));
        assert_eq!(tree.connect_count(), 3);
        assert_eq!(logger.count("sync.run.stopped"), 1);
        runtime.shutdown()?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn reload_restarts_workers_on_the_new_config() -> TestResult {
        let temp = tempfile::tempdir()?;
        let config = config_in(temp.path())?;
        let old_tree = FakeRemoteTree::new();
        old_tree.add_dir("/saves");
        let new_tree = FakeRemoteTree::new();
        new_tree.add_dir("/saves");
        new_tree.add_dir("/mods");
        let logger = MemoryLogger::new();
        let mut runtime = SyncRuntime::build_with_connector(
            &config,
            Arc::new(FakeConnector::new(old_tree.clone())),
            Arc::new(logger.clone()),
        )?;

        let mut extended = config.clone().into_inner();
        extended.file_sync.push(FileSyncPairConfig {
            server_path: "/mods".into(),
            output_path: temp.path().join("mods").display().to_string().into(),
            enabled: true,
        });
        let mut loads = vec![
            Err(ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                "unterminated table",
            )),
            Ok(ReloadedConfig {
                config: extended.validate_and_normalize()?,
                connector: Arc::new(FakeConnector::new(new_tree.clone())),
            }),
        ]
        .into_iter();

        let (reload, reloads) = mpsc::channel(1);
        let signals = async move {
            for _ in 0..2 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let _ = reload.send(()).await;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        };
        runtime
            .run_until_reloading(signals, reloads, || {
                loads.next().unwrap_or_else(|| Err(ErrorEnvelope::cancelled("no more configs")))
            })
            .await;

        let names = logger.event_names();
        let failed_at = names.iter().position(|name| name == "sync.run.reload_failed");
        let reloaded_at = names.iter().position(|name| name == "sync.run.reloaded");
        assert!(failed_at.is_some() && failed_at < reloaded_at);
        assert_eq!(logger.count("sync.run.reloaded"), 1);
        assert_eq!(old_tree.connect_count(), 1);
        assert_eq!(new_tree.connect_count(), 2);
        let status = runtime.status();
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|status| status.state == TargetState::Stopped));
        runtime.shutdown()?;
        Ok(())
    }

    #[tokio::test]
    async fn reload_without_targets_keeps_the_running_config() -> TestResult {
        let temp = tempfile::tempdir()?;
        let config = config_in(temp.path())?;
        let logger = MemoryLogger::new();
        let mut runtime = SyncRuntime::build_with_connector(
            &config,
            Arc::new(FakeConnector::new(FakeRemoteTree::new())),
            Arc::new(logger.clone()),
        )?;

        let error = runtime
            .reload(ReloadedConfig {
                config: SwitchSyncConfig::default().validate_and_normalize()?,
                connector: Arc::new(FakeConnector::new(FakeRemoteTree::new())),
            })
            .await
            .err()
            .ok_or("expected no_targets")?;
        assert!(error.has_code("sync", "no_targets"));
        assert_eq!(runtime.status().len(), 1);
        runtime.shutdown()?;
        Ok(())
    }
}
