//! Sync targets and the entries a walk produces.

use crate::primitives::{RemotePath, TargetId, contained_local_path};
use crate::timestamp::{base_name, format_timestamp, parse_embedded_timestamp, split_extension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Album root on the emuMMC auxiliary partition.
pub const EMUMMC_ALBUM_ROOT: &str = "/emuMMC/RAW1/Nintendo/Album";

/// Album root on primary storage.
pub const PRIMARY_ALBUM_ROOT: &str = "/Nintendo/Album";

/// One discovered remote file. Directories are traversal state only and never
/// become entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    /// Absolute path on the server.
    pub full_path: RemotePath,
}

impl RemoteEntry {
    /// Wrap a discovered file path.
    #[must_use]
    pub const fn file(full_path: RemotePath) -> Self {
        Self { full_path }
    }

    /// Base name of the file.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.full_path.file_name()
    }
}

/// How remote files map onto local names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RenameRule {
    /// Flatten into the local root, renaming by embedded capture time.
    CaptureTimestamp {
        /// strftime pattern for the new base name.
        pattern: String,
    },
}

impl RenameRule {
    /// Compute the local base name (with the original extension) for a remote file.
    ///
    /// Falls back to the remote base name when the name has no capture timestamp.
    #[must_use]
    pub fn local_name(&self, remote_name: &str) -> String {
        let base = base_name(remote_name);
        match self {
            Self::CaptureTimestamp { pattern } => {
                let (_, extension) = split_extension(base);
                parse_embedded_timestamp(base)
                    .and_then(|ts| format_timestamp(ts, pattern))
                    .map_or_else(|_| base.to_owned(), |name| format!("{name}{extension}"))
            },
        }
    }
}

/// What kind of content a target mirrors; drives notification wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    /// Console album captures.
    Screenshots,
    /// Generic remote-tree mirror.
    FileSync,
}

/// One configured remote/local pairing with its polling cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Stable id used in logs and status.
    pub id: TargetId,
    /// Content kind.
    pub kind: TargetKind,
    /// Remote roots walked in order during one pass.
    pub remote_roots: Vec<RemotePath>,
    /// Local mirror root.
    pub local_root: PathBuf,
    /// Optional renaming rule (screenshots only).
    pub rename_rule: Option<RenameRule>,
    /// Interval between cycle starts.
    pub poll_interval: Duration,
}

impl SyncTarget {
    /// Album target unioning the emuMMC and primary album roots.
    #[must_use]
    pub fn screenshots(local_root: PathBuf, pattern: String, poll_interval: Duration) -> Self {
        Self {
            id: TargetId::screenshots(),
            kind: TargetKind::Screenshots,
            remote_roots: vec![album_root(EMUMMC_ALBUM_ROOT), album_root(PRIMARY_ALBUM_ROOT)],
            local_root,
            rename_rule: Some(RenameRule::CaptureTimestamp { pattern }),
            poll_interval,
        }
    }

    /// Relative mirror of one remote tree.
    #[must_use]
    pub fn file_sync(
        index: usize,
        remote_root: RemotePath,
        local_root: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id: TargetId::file_sync(index),
            kind: TargetKind::FileSync,
            remote_roots: vec![remote_root],
            local_root,
            rename_rule: None,
            poll_interval,
        }
    }

    /// Resolve the local destination for `entry` discovered under `remote_root`.
    ///
    /// With a rename rule the file lands directly under the local root. Without
    /// one, the path relative to `remote_root` is mirrored.
    #[must_use]
    pub fn local_path_for(&self, remote_root: &RemotePath, entry: &RemoteEntry) -> PathBuf {
        match &self.rename_rule {
            Some(rule) => contained_local_path(&self.local_root, [rule.local_name(entry.file_name()).as_str()]),
            None => match entry.full_path.relative_segments(remote_root) {
                Some(segments) => contained_local_path(&self.local_root, segments),
                None => contained_local_path(&self.local_root, [entry.file_name()]),
            },
        }
    }
}

fn album_root(path: &str) -> RemotePath {
    RemotePath::parse(path).unwrap_or_else(|_| RemotePath::root())
}
