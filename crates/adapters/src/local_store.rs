//! Local mirror store: mtime lookups, staging files, and atomic publish.

use filetime::FileTime;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use switch_sync_ports::{BoxFuture, FileTimestamp, MirrorStorePort, StagingFile};
use switch_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use uuid::Uuid;

/// Name of the scratch directory created under its parent.
pub const SCRATCH_DIR_NAME: &str = "switch_ftp_sync";

/// Process-wide scratch directory for in-flight downloads.
///
/// Holding a `ScratchDir` also holds an exclusive lock on a sibling
/// `.lock` file, so two processes never purge each other's staging files.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    lock_path: PathBuf,
    lock: File,
}

impl ScratchDir {
    /// Platform temp location, the default parent.
    #[must_use]
    pub fn default_parent() -> PathBuf {
        std::env::temp_dir()
    }

    /// Lock, create, and purge `<parent>/switch_ftp_sync`.
    ///
    /// Only the dedicated child is ever purged or removed; the rest of
    /// `parent` is left alone.
    pub fn prepare(parent: &Path) -> Result<Self> {
        let path = parent.join(SCRATCH_DIR_NAME);
        let lock_path = lock_path_for(&path);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| store_error("scratch_failed", "create scratch parent", error, &path))?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|error| store_error("scratch_failed", "open scratch lock", error, &lock_path))?;
        lock.try_lock_exclusive().map_err(|_| {
            ErrorEnvelope::expected(
                ErrorCode::new("store", "scratch_locked"),
                "another switch-sync instance is using the scratch directory",
            )
            .with_metadata("path", path.display().to_string())
        })?;

        std::fs::create_dir_all(&path)
            .map_err(|error| store_error("scratch_failed", "create scratch dir", error, &path))?;
        purge_dir(&path)?;

        Ok(Self {
            path,
            lock_path,
            lock,
        })
    }

    /// Scratch directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory recursively and release the lock.
    pub fn remove(self) -> Result<()> {
        let removed = match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(store_error("scratch_failed", "remove scratch dir", error, &self.path)),
        };
        let _ = FileExt::unlock(&self.lock);
        drop(self.lock);
        let _ = std::fs::remove_file(&self.lock_path);
        removed
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn purge_dir(path: &Path) -> Result<()> {
    let entries = std::fs::read_dir(path)
        .map_err(|error| store_error("scratch_failed", "read scratch dir", error, path))?;
    for entry in entries {
        let entry = entry.map_err(|error| store_error("scratch_failed", "read scratch dir", error, path))?;
        let entry_path = entry.path();
        let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
        let removed = if is_dir {
            std::fs::remove_dir_all(&entry_path)
        } else {
            std::fs::remove_file(&entry_path)
        };
        removed.map_err(|error| store_error("scratch_failed", "purge scratch entry", error, &entry_path))?;
    }
    Ok(())
}

/// Filesystem-backed mirror store staging into a scratch directory.
#[derive(Debug, Clone)]
pub struct LocalMirrorStore {
    scratch: PathBuf,
}

impl LocalMirrorStore {
    /// Store staging into `scratch`.
    #[must_use]
    pub const fn new(scratch: PathBuf) -> Self {
        Self { scratch }
    }
}

impl MirrorStorePort for LocalMirrorStore {
    fn local_mtime(
        &self,
        _ctx: &RequestContext,
        path: PathBuf,
    ) -> BoxFuture<'_, Result<Option<FileTimestamp>>> {
        Box::pin(async move {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {
                    let modified = metadata
                        .modified()
                        .map_err(|error| store_error("mtime_failed", "read mtime", error, &path))?;
                    Ok(Some(FileTimestamp::from_system_time(modified)))
                },
                Ok(_) => Err(ErrorEnvelope::expected(
                    ErrorCode::new("store", "not_a_file"),
                    "local destination exists and is not a file",
                )
                .with_metadata("localPath", path.display().to_string())),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(error) => Err(store_error("mtime_failed", "read mtime", error, &path)),
            }
        })
    }

    fn ensure_dir(&self, _ctx: &RequestContext, dir: PathBuf) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match tokio::fs::create_dir_all(&dir).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
                Err(error) => Err(store_error("mkdir_failed", "create directory", error, &dir)),
            }
        })
    }

    fn create_staging(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<StagingFile>> {
        let path = self.scratch.join(format!("{}.tmp", Uuid::new_v4()));
        Box::pin(async move {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
                .map_err(|error| store_error("staging_failed", "create staging file", error, &path))?
                .into_std()
                .await;
            Ok(StagingFile { path, file })
        })
    }

    fn publish(
        &self,
        _ctx: &RequestContext,
        staging: PathBuf,
        destination: PathBuf,
        mtime: FileTimestamp,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let task_destination = destination.clone();
            tokio::task::spawn_blocking(move || publish_blocking(&staging, &task_destination, mtime))
                .await
                .map_err(|error| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::new("store", "publish_failed"),
                        format!("publish task failed: {error}"),
                        ErrorClass::NonRetriable,
                    )
                    .with_metadata("localPath", destination.display().to_string())
                })?
        })
    }

    fn discard(&self, _ctx: &RequestContext, staging: PathBuf) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match tokio::fs::remove_file(&staging).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(error) => Err(store_error("discard_failed", "remove staging file", error, &staging)),
            }
        })
    }
}

fn publish_blocking(staging: &Path, destination: &Path, mtime: FileTimestamp) -> Result<()> {
    let time = FileTime::from_unix_time(mtime.unix_seconds(), 0);
    stamp(staging, time)?;

    match std::fs::rename(staging, destination) {
        Ok(()) => {},
        Err(error) if error.kind() == io::ErrorKind::CrossesDevices => {
            publish_across_devices(staging, destination, time)?;
        },
        Err(error) => return Err(store_error("publish_failed", "rename into place", error, destination)),
    }

    // Some filesystems reset mtime on rename.
    stamp(destination, time)
}

/// Copy into a sibling of `destination`, then rename within its directory.
fn publish_across_devices(staging: &Path, destination: &Path, time: FileTime) -> Result<()> {
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sibling = destination.with_file_name(format!(".{file_name}.{}.part", Uuid::new_v4()));

    let result = std::fs::copy(staging, &sibling)
        .map_err(|error| store_error("publish_failed", "copy across devices", error, &sibling))
        .and_then(|_| stamp(&sibling, time))
        .and_then(|()| {
            std::fs::rename(&sibling, destination)
                .map_err(|error| store_error("publish_failed", "rename into place", error, destination))
        });

    if result.is_err() {
        let _ = std::fs::remove_file(&sibling);
        return result;
    }
    let _ = std::fs::remove_file(staging);
    Ok(())
}

fn stamp(path: &Path, time: FileTime) -> Result<()> {
    filetime::set_file_times(path, time, time)
        .map_err(|error| store_error("mtime_failed", "set mtime", error, path))
}

fn store_error(code: &'static str, action: &'static str, error: io::Error, path: &Path) -> ErrorEnvelope {
    ErrorEnvelope::from(error)
        .with_code(ErrorCode::new("store", code))
        .with_metadata("action", action)
        .with_metadata("localPath", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io::Write;

    fn ctx() -> RequestContext {
        RequestContext::new_run()
    }

    #[test]
    fn scratch_dir_purges_stale_files_and_removes_itself() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(SCRATCH_DIR_NAME);
        std::fs::create_dir_all(path.join("nested"))?;
        std::fs::write(path.join("stale.tmp"), b"old")?;

        let scratch = ScratchDir::prepare(temp.path())?;
        assert_eq!(scratch.path(), path.as_path());
        assert_eq!(std::fs::read_dir(scratch.path())?.count(), 0);

        scratch.remove()?;
        assert!(!path.exists());
        assert!(!temp.path().join("switch_ftp_sync.lock").exists());
        Ok(())
    }

    #[test]
    fn scratch_dir_leaves_files_beside_it_alone() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let downloads = temp.path().join("Downloads");
        std::fs::create_dir_all(downloads.join("photos"))?;
        std::fs::write(downloads.join("thesis.docx"), b"draft")?;
        std::fs::write(downloads.join("photos").join("a.jpg"), b"jpg")?;

        let scratch = ScratchDir::prepare(&downloads)?;
        assert_eq!(scratch.path(), downloads.join(SCRATCH_DIR_NAME).as_path());
        assert!(downloads.join("thesis.docx").is_file());
        assert!(downloads.join("photos").join("a.jpg").is_file());

        scratch.remove()?;
        assert!(downloads.is_dir());
        assert_eq!(std::fs::read(downloads.join("thesis.docx"))?, b"draft");
        assert!(downloads.join("photos").join("a.jpg").is_file());
        assert!(!downloads.join(SCRATCH_DIR_NAME).exists());
        Ok(())
    }

    #[test]
    fn scratch_dir_is_exclusive() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let first = ScratchDir::prepare(temp.path())?;

        let second = ScratchDir::prepare(temp.path());
        let error = second.err().ok_or("expected lock conflict")?;
        assert!(error.has_code("store", "scratch_locked"));

        first.remove()?;
        Ok(())
    }

    #[tokio::test]
    async fn publish_moves_file_and_stamps_mtime() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let store = LocalMirrorStore::new(temp.path().to_path_buf());
        let destination = temp.path().join("out").join("save.bin");

        store.ensure_dir(&ctx(), temp.path().join("out")).await?;
        let mut staging = store.create_staging(&ctx()).await?;
        staging.file.write_all(b"payload")?;
        drop(staging.file);

        let mtime = FileTimestamp::from_unix_seconds(1_704_164_645);
        store
            .publish(&ctx(), staging.path.clone(), destination.clone(), mtime)
            .await?;

        assert!(!staging.path.exists());
        assert_eq!(std::fs::read(&destination)?, b"payload");
        assert_eq!(store.local_mtime(&ctx(), destination).await?, Some(mtime));
        Ok(())
    }

    #[tokio::test]
    async fn publish_replaces_existing_file() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let store = LocalMirrorStore::new(temp.path().to_path_buf());
        let destination = temp.path().join("capture.jpg");
        std::fs::write(&destination, b"old")?;

        let mut staging = store.create_staging(&ctx()).await?;
        staging.file.write_all(b"new")?;
        drop(staging.file);
        store
            .publish(
                &ctx(),
                staging.path,
                destination.clone(),
                FileTimestamp::from_unix_seconds(1_700_000_000),
            )
            .await?;

        assert_eq!(std::fs::read(&destination)?, b"new");
        Ok(())
    }

    #[tokio::test]
    async fn missing_local_file_has_no_mtime() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let store = LocalMirrorStore::new(temp.path().to_path_buf());
        let mtime = store.local_mtime(&ctx(), temp.path().join("absent")).await?;
        assert_eq!(mtime, None);
        Ok(())
    }

    #[tokio::test]
    async fn ensure_dir_tolerates_existing_directory() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let store = LocalMirrorStore::new(temp.path().to_path_buf());
        let dir = temp.path().join("a").join("b");
        store.ensure_dir(&ctx(), dir.clone()).await?;
        store.ensure_dir(&ctx(), dir.clone()).await?;
        assert!(dir.is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn discard_ignores_missing_staging() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let store = LocalMirrorStore::new(temp.path().to_path_buf());
        let staging = store.create_staging(&ctx()).await?;
        drop(staging.file);
        store.discard(&ctx(), staging.path.clone()).await?;
        store.discard(&ctx(), staging.path.clone()).await?;
        assert!(!staging.path.exists());
        Ok(())
    }

    #[test]
    fn cross_device_fallback_leaves_no_sibling() -> Result<(), Box<dyn Error>> {
        let temp = tempfile::tempdir()?;
        let staging = temp.path().join("staging.tmp");
        std::fs::write(&staging, b"bytes")?;
        let destination = temp.path().join("final.bin");

        publish_across_devices(&staging, &destination, FileTime::from_unix_time(1_600_000_000, 0))?;

        assert_eq!(std::fs::read(&destination)?, b"bytes");
        assert!(!staging.exists());
        let leftovers = std::fs::read_dir(temp.path())?
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }
}
