//! Scriptable in-memory FTP server double.
//!
//! `FakeRemoteTree` holds the directory tree plus failure injections and call
//! counters. `FakeConnector` hands out `FakeSession`s that share the tree, so a
//! test can mutate files between passes and watch what the engine does.

use crate::errors::{connect_refused_error, protocol_error};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use switch_sync_ports::{
    BoxFuture, ChangeDirOutcome, RemoteConnectorPort, RemotePath, RemoteSession,
};
use switch_sync_shared::{ErrorEnvelope, RequestContext, Result};
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { bytes: Vec<u8>, mdtm: Option<String> },
}

/// How listings name their entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingStyle {
    /// Bare base names.
    #[default]
    Names,
    /// Absolute paths, as some servers return from `NLST`.
    FullPaths,
    /// Base names preceded by `.` and `..`.
    WithDotEntries,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: BTreeMap<String, Node>,
    failing_lists: HashSet<String>,
    failing_change_dirs: HashSet<String>,
    failing_retrieves: HashSet<String>,
    list_delays: HashMap<String, Duration>,
    retrieve_stalls: HashMap<String, Duration>,
    listing_style: ListingStyle,
}

#[derive(Debug, Default)]
struct Stats {
    connects: AtomicUsize,
    closes: AtomicUsize,
    retrieves: AtomicUsize,
    connect_times: Mutex<Vec<Instant>>,
    change_dirs: Mutex<Vec<String>>,
}

/// Shared remote tree with failure injection.
#[derive(Debug, Clone, Default)]
pub struct FakeRemoteTree {
    state: Arc<Mutex<TreeState>>,
    stats: Arc<Stats>,
}

impl FakeRemoteTree {
    /// Empty tree containing only `/`.
    pub fn new() -> Self {
        let tree = Self::default();
        tree.add_dir("/");
        tree
    }

    /// Add a directory and its ancestors.
    pub fn add_dir(&self, path: &str) -> &Self {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        for ancestor in ancestors(&path) {
            state.nodes.entry(ancestor).or_insert(Node::Dir);
        }
        state.nodes.insert(path, Node::Dir);
        self
    }

    /// Add or replace a file whose `MDTM` reply is `mdtm`.
    pub fn add_file(&self, path: &str, bytes: &[u8], mdtm: &str) -> &Self {
        self.put_file(path, bytes, Some(mdtm.to_owned()))
    }

    /// Add a file whose `MDTM` query fails.
    pub fn add_file_without_mdtm(&self, path: &str, bytes: &[u8]) -> &Self {
        self.put_file(path, bytes, None)
    }

    fn put_file(&self, path: &str, bytes: &[u8], mdtm: Option<String>) -> &Self {
        let path = normalize(path);
        let mut state = self.state.lock().unwrap();
        for ancestor in ancestors(&path) {
            state.nodes.entry(ancestor).or_insert(Node::Dir);
        }
        state.nodes.insert(
            path,
            Node::File {
                bytes: bytes.to_vec(),
                mdtm,
            },
        );
        self
    }

    /// Make listing `path` fail.
    pub fn fail_list(&self, path: &str) -> &Self {
        self.state.lock().unwrap().failing_lists.insert(normalize(path));
        self
    }

    /// Make entering `path` fail with a transient protocol error.
    pub fn fail_change_dir(&self, path: &str) -> &Self {
        self.state.lock().unwrap().failing_change_dirs.insert(normalize(path));
        self
    }

    /// Make retrieving `path` fail after a partial write.
    pub fn fail_retrieve(&self, path: &str) -> &Self {
        self.state.lock().unwrap().failing_retrieves.insert(normalize(path));
        self
    }

    /// Clear all injected failures.
    pub fn heal(&self) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.failing_lists.clear();
        state.failing_change_dirs.clear();
        state.failing_retrieves.clear();
        self
    }

    /// Delay every listing of `path` by `delay` (tokio time).
    pub fn delay_list(&self, path: &str, delay: Duration) -> &Self {
        self.state.lock().unwrap().list_delays.insert(normalize(path), delay);
        self
    }

    /// Stall every retrieval of `path` for `delay` (tokio time) before any
    /// byte arrives.
    ///
    /// A session whose stalled retrieval is abandoned (its future dropped)
    /// behaves like an FTP control connection left mid-transfer: every later
    /// operation fails with `remote:session_closed`.
    pub fn stall_retrieve(&self, path: &str, delay: Duration) -> &Self {
        self.state.lock().unwrap().retrieve_stalls.insert(normalize(path), delay);
        self
    }

    /// Change how listings name entries.
    pub fn set_listing_style(&self, style: ListingStyle) -> &Self {
        self.state.lock().unwrap().listing_style = style;
        self
    }

    /// Sessions opened so far.
    pub fn connect_count(&self) -> usize {
        self.stats.connects.load(Ordering::SeqCst)
    }

    /// Sessions closed so far.
    pub fn close_count(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }

    /// Retrievals attempted so far.
    pub fn retrieve_count(&self) -> usize {
        self.stats.retrieves.load(Ordering::SeqCst)
    }

    /// Instants at which sessions were opened.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.stats.connect_times.lock().unwrap().clone()
    }

    /// Every path passed to `change_dir`, in call order.
    pub fn change_dir_paths(&self) -> Vec<String> {
        self.stats.change_dirs.lock().unwrap().clone()
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .nodes
            .keys()
            .filter(|path| path.as_str() != "/" && parent_of(path) == dir)
            .map(|path| match state.listing_style {
                ListingStyle::FullPaths => path.clone(),
                ListingStyle::Names | ListingStyle::WithDotEntries => {
                    path.rsplit('/').next().unwrap_or_default().to_owned()
                },
            })
            .collect();
        if state.listing_style == ListingStyle::WithDotEntries {
            names.insert(0, "..".to_owned());
            names.insert(0, ".".to_owned());
        }
        names
    }
}

/// Connector double that opens sessions over a [`FakeRemoteTree`].
#[derive(Debug, Clone)]
pub struct FakeConnector {
    tree: FakeRemoteTree,
    failure: Option<ErrorEnvelope>,
    connect_delay: Duration,
    accept_limit: Option<usize>,
}

impl FakeConnector {
    /// Connector that always succeeds.
    pub fn new(tree: FakeRemoteTree) -> Self {
        Self {
            tree,
            failure: None,
            connect_delay: Duration::ZERO,
            accept_limit: None,
        }
    }

    /// Connector that always fails with a connect error.
    pub fn unreachable(tree: FakeRemoteTree) -> Self {
        Self {
            failure: Some(connect_refused_error()),
            ..Self::new(tree)
        }
    }

    /// Delay each connect by `delay` (tokio time).
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Refuse every connect after the first `limit` on this tree.
    pub fn with_accept_limit(mut self, limit: usize) -> Self {
        self.accept_limit = Some(limit);
        self
    }
}

impl RemoteConnectorPort for FakeConnector {
    fn connect(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Box<dyn RemoteSession>>> {
        Box::pin(async move {
            self.tree.stats.connect_times.lock().unwrap().push(Instant::now());
            let earlier = self.tree.stats.connects.fetch_add(1, Ordering::SeqCst);
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            if let Some(error) = &self.failure {
                return Err(error.clone());
            }
            if self.accept_limit.is_some_and(|limit| earlier >= limit) {
                return Err(connect_refused_error());
            }
            let session: Box<dyn RemoteSession> = Box::new(FakeSession {
                tree: self.tree.clone(),
                cwd: "/".to_owned(),
                closed: false,
                mid_transfer: false,
            });
            Ok(session)
        })
    }

    fn endpoint(&self) -> &str {
        "fake:21"
    }
}

/// Session over a shared [`FakeRemoteTree`].
#[derive(Debug)]
pub struct FakeSession {
    tree: FakeRemoteTree,
    cwd: String,
    closed: bool,
    mid_transfer: bool,
}

impl FakeSession {
    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.closed || self.mid_transfer {
            return Err(protocol_error("session_closed", operation, &self.cwd));
        }
        Ok(())
    }
}

impl RemoteSession for FakeSession {
    fn change_dir(
        &mut self,
        _ctx: &RequestContext,
        path: RemotePath,
    ) -> BoxFuture<'_, Result<ChangeDirOutcome>> {
        Box::pin(async move {
            self.ensure_open("cwd")?;
            let path = path.as_str().to_owned();
            self.tree.stats.change_dirs.lock().unwrap().push(path.clone());
            let state = self.tree.state.lock().unwrap();
            if state.failing_change_dirs.contains(&path) {
                return Err(protocol_error("change_dir_failed", "cwd", &path));
            }
            let is_dir = matches!(state.nodes.get(&path), Some(Node::Dir));
            drop(state);
            if is_dir {
                self.cwd = path;
                Ok(ChangeDirOutcome::Entered)
            } else {
                Ok(ChangeDirOutcome::NotADirectory)
            }
        })
    }

    fn list_names(&mut self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            self.ensure_open("nlst")?;
            let (failing, delay) = {
                let state = self.tree.state.lock().unwrap();
                (
                    state.failing_lists.contains(&self.cwd),
                    state.list_delays.get(&self.cwd).copied(),
                )
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if failing {
                return Err(protocol_error("list_failed", "nlst", &self.cwd));
            }
            Ok(self.tree.children(&self.cwd))
        })
    }

    fn modify_time(
        &mut self,
        _ctx: &RequestContext,
        path: RemotePath,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.ensure_open("mdtm")?;
            let state = self.tree.state.lock().unwrap();
            match state.nodes.get(path.as_str()) {
                Some(Node::File {
                    mdtm: Some(mdtm), ..
                }) => Ok(mdtm.clone()),
                _ => Err(protocol_error("mdtm_failed", "mdtm", path.as_str())),
            }
        })
    }

    fn retrieve(
        &mut self,
        _ctx: &RequestContext,
        path: RemotePath,
        mut sink: File,
    ) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            self.ensure_open("retr")?;
            self.tree.stats.retrieves.fetch_add(1, Ordering::SeqCst);
            let stall = self
                .tree
                .state
                .lock()
                .unwrap()
                .retrieve_stalls
                .get(path.as_str())
                .copied();
            if let Some(stall) = stall {
                self.mid_transfer = true;
                tokio::time::sleep(stall).await;
                self.mid_transfer = false;
            }
            let (bytes, failing) = {
                let state = self.tree.state.lock().unwrap();
                let bytes = match state.nodes.get(path.as_str()) {
                    Some(Node::File { bytes, .. }) => bytes.clone(),
                    _ => return Err(protocol_error("retrieve_failed", "retr", path.as_str())),
                };
                (bytes, state.failing_retrieves.contains(path.as_str()))
            };
            if failing {
                let half = bytes.len() / 2;
                sink.write_all(&bytes[..half]).map_err(ErrorEnvelope::from)?;
                return Err(protocol_error("retrieve_failed", "retr", path.as_str()));
            }
            sink.write_all(&bytes).map_err(ErrorEnvelope::from)?;
            sink.sync_all().map_err(ErrorEnvelope::from)?;
            Ok(bytes.len() as u64)
        })
    }

    fn close(&mut self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.closed {
                self.closed = true;
                self.tree.stats.closes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = path;
    while current != "/" {
        current = parent_of(current);
        out.push(current.to_owned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> RemotePath {
        RemotePath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn sessions_enter_and_list_the_shared_tree() {
        let tree = FakeRemoteTree::new();
        tree.add_file("/a/c", b"payload", "20240102030405");
        tree.add_dir("/a/b");
        let connector = FakeConnector::new(tree.clone());
        let ctx = RequestContext::new_run();

        let mut session = connector.connect(&ctx).await.unwrap();
        assert_eq!(
            session.change_dir(&ctx, path("/a")).await.unwrap(),
            ChangeDirOutcome::Entered
        );
        assert_eq!(session.list_names(&ctx).await.unwrap(), vec!["b", "c"]);
        assert_eq!(
            session.change_dir(&ctx, path("/a/c")).await.unwrap(),
            ChangeDirOutcome::NotADirectory
        );
        assert_eq!(
            session.modify_time(&ctx, path("/a/c")).await.unwrap(),
            "20240102030405"
        );
        session.close(&ctx).await.unwrap();
        session.close(&ctx).await.unwrap();
        assert_eq!(tree.connect_count(), 1);
        assert_eq!(tree.close_count(), 1);
    }

    #[test]
    fn parents_and_ancestors_are_computed() {
        assert_eq!(parent_of("/a/b/c"), "/a/b");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(ancestors("/a/b"), vec!["/a".to_owned(), "/".to_owned()]);
        assert_eq!(normalize("/Nintendo/Album/"), "/Nintendo/Album");
    }
}
