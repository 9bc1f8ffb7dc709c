//! Workspace: the virtual filesystem surface over the test repository.
//!
//! Ties the entry tree, the working-tree tracker and the session together. Each
//! public operation runs to completion before the next one starts (`&mut self`).
//! Folder operations go to the remote first, then the local tree, then a refresh.

use crate::events::{ChangeBatcher, EventBus, FileChangeEvent, Subscription};
use crate::gherkin::{parse_features, Diagnostic};
use crate::model::Folder;
use crate::reconcile::{self, CommitReport, FeatureSource, ReconcileError};
use crate::remote::RemoteRepository;
use crate::session::{Session, SessionError};
use crate::tracker::WorkingTree;
use crate::tree::{
    basename, dirname, Entry, EntryKind, EntryTree, FileStat, FsError, RenameOptions, Result,
    WriteOptions,
};
use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Window in which file-change events are merged into one batch.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(5);

/// Result of [`Workspace::original_text`] when the caller's token went stale.
pub const CANCELED: &str = "Canceled";

#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Issue key prefix, e.g. `BUG`
    pub project_key: String,
    pub batch_window: Duration,
}

impl WorkspaceConfig {
    pub fn new(project_key: &str) -> Self {
        Self {
            project_key: project_key.to_string(),
            batch_window: DEFAULT_BATCH_WINDOW,
        }
    }
}

/// Checked by a caller-facing operation before it starts remote work.
#[derive(Debug, Clone, Default)]
pub struct LivenessToken(Arc<AtomicBool>);

impl LivenessToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Workspace<R> {
    session: Session<R>,
    tree: EntryTree,
    tracker: WorkingTree,
    batcher: ChangeBatcher,
}

impl<R: RemoteRepository> Workspace<R> {
    /// Empty workspace; call [`refresh`](Self::refresh) to populate it.
    pub fn new(session: Session<R>, config: &WorkspaceConfig) -> Self {
        Self {
            session,
            tree: EntryTree::new(),
            tracker: WorkingTree::new(),
            batcher: ChangeBatcher::new(Arc::new(EventBus::new()), config.batch_window),
        }
    }

    /// Discover custom fields and create an empty workspace.
    pub async fn connect(remote: Arc<R>, config: &WorkspaceConfig) -> std::result::Result<Self, SessionError> {
        let session = Session::connect(remote, &config.project_key).await?;
        Ok(Self::new(session, config))
    }

    pub fn session(&self) -> &Session<R> {
        &self.session
    }

    /// Receive batched file-change events until the returned handle is dropped.
    pub fn subscribe(&self, callback: impl Fn(Vec<FileChangeEvent>) + Send + Sync + 'static) -> Subscription {
        self.batcher.bus().subscribe(callback)
    }

    /// Rebuild the tree from the remote folder hierarchy.
    ///
    /// Dirty buffers are carried over onto the new tree and re-checked. A dirty path
    /// that no longer exists is dropped. Every remote call happens before the tree or
    /// the tracker is touched, so a failed refresh leaves both as they were.
    pub async fn refresh(&mut self) -> Result<()> {
        let pending: Vec<(String, Vec<u8>)> = self
            .tracker
            .dirty_paths()
            .into_iter()
            .filter_map(|path| {
                let data = self.tree.lookup_as_file(&path).ok()?.data.clone()?;
                Some((path, data))
            })
            .collect();

        let entries = self.session.folder_entries().await?;

        let mut tree = EntryTree::new();
        let mut events = Vec::new();
        for (path, folder) in &entries {
            match tree.create_directory(path, Some(folder.clone())) {
                Ok(created) => events.extend(created),
                Err(e) => tracing::warn!("Skipping folder {} (folderId: {}): {}", path, folder.id, e),
            }
        }
        let mut tracker = WorkingTree::new();
        tracker.reset(entries);

        let mut restored = Vec::new();
        for (path, data) in pending {
            match tracker.folder_for(&path) {
                Some(folder) => restored.push((path, folder.clone(), data)),
                None => tracing::warn!("Dropping pending changes of {}: folder no longer exists", path),
            }
        }
        let remote_texts = try_join_all(
            restored
                .iter()
                .map(|(_, folder, _)| self.session.feature_text(folder)),
        )
        .await?;

        let options = WriteOptions {
            create: true,
            overwrite: true,
        };
        for ((path, folder, data), remote_text) in restored.iter().zip(&remote_texts) {
            tree.write_file(path, data, options, Some(folder.clone()))?;
            tracker.mark(path, &String::from_utf8_lossy(data), remote_text);
        }
        self.tree = tree;
        self.tracker = tracker;
        self.reparse_dirty();

        tracing::info!(
            "Refreshed {} folder(s), {} pending file(s)",
            self.tracker.folders().count(),
            restored.len()
        );
        self.batcher.push(events);
        Ok(())
    }

    /// Re-check a buffer against the remote and re-parse the dirty set.
    /// Returns whether the file is dirty.
    ///
    /// When the remote text cannot be fetched the file stays dirty and the error is
    /// returned.
    pub async fn file_changed(&mut self, path: &str) -> Result<bool> {
        let dirty = self.track(path).await;
        self.reparse_dirty();
        dirty
    }

    async fn track(&mut self, path: &str) -> Result<bool> {
        let Some(folder) = self.tracker.folder_for(path).cloned() else {
            return Ok(false);
        };
        let content = self.tree.lookup_as_file(path)?.text();
        let remote_text = match self.session.feature_text(&folder).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Could not compare {} with the remote, keeping it dirty: {}", path, e);
                self.tracker.mark_dirty(path);
                return Err(e.into());
            }
        };
        let dirty = self.tracker.mark(path, &content, &remote_text);
        if dirty {
            tracing::debug!("{} differs from the remote", path);
        }
        Ok(dirty)
    }

    fn reparse_dirty(&mut self) {
        let sources: Vec<(String, String)> = self
            .tracker
            .dirty_paths()
            .into_iter()
            .filter_map(|path| {
                let text = self.tree.lookup_as_file(&path).ok()?.text();
                Some((path, text))
            })
            .collect();
        let outcome = parse_features(sources.iter().map(|(p, t)| (p.as_str(), t.as_str())));
        self.tracker.set_diagnostics(outcome.diagnostics);
    }

    pub fn stat(&self, path: &str) -> Result<FileStat> {
        self.tree.stat(path)
    }

    pub fn read_directory(&self, path: &str) -> Result<Vec<(String, EntryKind)>> {
        self.tree.read_directory(path)
    }

    /// File contents, pulled from the remote on first read.
    pub async fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let file = self.tree.lookup_as_file(path)?;
        if file.pull_data {
            if let Some(folder) = file.folder.clone() {
                let text = self.session.feature_text(&folder).await?;
                let file = self.tree.lookup_as_file_mut(path)?;
                file.set_data(text.into_bytes());
                file.pull_data = false;
            }
        }
        Ok(self.tree.lookup_as_file(path)?.data.clone().unwrap_or_default())
    }

    pub async fn write_file(&mut self, path: &str, content: &[u8], options: WriteOptions) -> Result<()> {
        let folder = self.tracker.folder_for(path).cloned();
        let events = self.tree.write_file(path, content, options, folder)?;
        self.batcher.push(events);
        self.file_changed(path).await?;
        Ok(())
    }

    /// Folder behind a directory path. Files and the root are rejected.
    fn folder_at(&self, path: &str, operation: &str) -> Result<Folder> {
        let folder = match self.tree.lookup(path)? {
            Entry::Directory(dir) => dir.folder.clone(),
            Entry::File(_) => None,
        };
        match folder {
            Some(folder) if !folder.is_root() => Ok(folder),
            _ => Err(FsError::PermissionDenied(format!(
                "{}: only folders can be {}",
                path, operation
            ))),
        }
    }

    fn parent_folder(&self, path: &str) -> Result<Folder> {
        self.tree
            .lookup_parent_directory(path)?
            .folder
            .clone()
            .ok_or_else(|| FsError::NotFound(dirname(path).to_string()))
    }

    /// Rename or move a folder directory.
    pub async fn rename(&mut self, old_path: &str, new_path: &str, options: RenameOptions) -> Result<()> {
        let folder = self.folder_at(old_path, "moved or renamed")?;
        let destination = self.parent_folder(new_path)?;
        if !options.overwrite && self.tree.find(new_path).is_some() {
            return Err(FsError::AlreadyExists(new_path.to_string()));
        }
        if new_path.starts_with(&format!("{}/", old_path.trim_end_matches('/'))) {
            return Err(FsError::PermissionDenied(format!(
                "{}: cannot move a folder into itself",
                new_path
            )));
        }

        let new_name = basename(new_path);
        if dirname(old_path) == dirname(new_path) {
            self.session.rename_folder(&folder, new_name).await?;
        } else {
            self.session.move_folder(&folder, &destination).await?;
            if folder.name != new_name {
                self.session.rename_folder(&folder, new_name).await?;
            }
        }

        let events = self.tree.rename(old_path, new_path, options)?;
        self.tracker.rename_prefix(old_path, new_path);
        self.batcher.push(events);
        self.refresh().await
    }

    /// Delete a folder directory and the remote folder behind it.
    pub async fn delete(&mut self, path: &str) -> Result<()> {
        let folder = self.folder_at(path, "deleted")?;
        self.session.delete_folder(&folder).await?;

        let events = self.tree.delete(path)?;
        self.tracker.remove_under(path);
        self.batcher.push(events);
        self.refresh().await
    }

    /// Create a folder under the folder of the parent directory.
    pub async fn create_directory(&mut self, path: &str) -> Result<()> {
        let parent = self.parent_folder(path)?;
        if self.tree.find(path).is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        let folder = self.session.create_folder(&parent, basename(path)).await?;

        let events = self.tree.create_directory(path, Some(folder))?;
        self.batcher.push(events);
        self.refresh().await
    }

    /// Push every dirty file to the remote.
    ///
    /// On parse errors nothing is written and the diagnostics are kept for display.
    pub async fn commit(&mut self) -> std::result::Result<CommitReport, ReconcileError> {
        if !self.tracker.has_changes() {
            tracing::info!("Nothing to commit");
            return Ok(CommitReport::default());
        }

        let sources = self.dirty_sources()?;
        match reconcile::commit(&self.session, &sources).await {
            Ok(report) => {
                tracing::info!(
                    "Committed {} file(s): {} created, {} updated, {} detached",
                    sources.len(),
                    report.created.len(),
                    report.updated.len(),
                    report.detached.len()
                );
                self.tracker.clear_dirty();
                self.tracker.set_diagnostics(Vec::new());
                self.refresh().await?;
                Ok(report)
            }
            Err(ReconcileError::Aborted { diagnostics }) => {
                self.tracker.set_diagnostics(diagnostics.clone());
                Err(ReconcileError::Aborted { diagnostics })
            }
            Err(e) => Err(e),
        }
    }

    fn dirty_sources(&self) -> Result<Vec<FeatureSource>> {
        let mut sources = Vec::new();
        for path in self.tracker.dirty_paths() {
            let Some(folder) = self.tracker.folder_for(&path).cloned() else {
                tracing::warn!("{} has no folder, not committed", path);
                continue;
            };
            let text = self.tree.lookup_as_file(&path)?.text();
            sources.push(FeatureSource { path, folder, text });
        }
        Ok(sources)
    }

    /// Discard local edits: re-pull the remote text of each file.
    pub async fn clean(&mut self, paths: &[String]) -> Result<()> {
        for path in paths {
            let Some(folder) = self.tracker.folder_for(path).cloned() else {
                return Err(FsError::NotFound(path.clone()));
            };
            let text = self.session.feature_text(&folder).await?;

            let file = self.tree.lookup_as_file_mut(path)?;
            file.set_data(text.into_bytes());
            file.pull_data = false;
            self.tracker.remove(path);
            self.batcher.push([FileChangeEvent::changed(path.as_str())]);
            tracing::info!("Discarded changes of {}", path);
        }
        self.reparse_dirty();
        Ok(())
    }

    pub async fn clean_all(&mut self) -> Result<()> {
        let paths = self.tracker.dirty_paths();
        self.clean(&paths).await
    }

    /// Remote text of a file, regenerated on every call.
    pub async fn original_text(&self, path: &str, token: &LivenessToken) -> Result<String> {
        if token.is_cancelled() {
            return Ok(CANCELED.to_string());
        }
        let folder = self
            .tracker
            .folder_for(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        Ok(self.session.feature_text(folder).await?)
    }

    pub fn dirty_paths(&self) -> Vec<String> {
        self.tracker.dirty_paths()
    }

    pub fn is_dirty(&self, path: &str) -> bool {
        self.tracker.is_dirty(path)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.tracker.diagnostics()
    }

    /// Paths of all feature files.
    pub fn feature_files(&self) -> Vec<String> {
        self.tree.file_paths()
    }

    /// Folder whose feature file lives at `path`.
    pub fn folder_for(&self, path: &str) -> Option<&Folder> {
        self.tracker.folder_for(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ROOT_FOLDER_ID;
    use crate::remote::{InMemoryRemote, RemoteCall};
    use std::sync::Mutex;

    async fn workspace(remote: &Arc<InMemoryRemote>) -> Workspace<InMemoryRemote> {
        let mut workspace = Workspace::connect(Arc::clone(remote), &WorkspaceConfig::new("BUG"))
            .await
            .unwrap();
        workspace.refresh().await.unwrap();
        workspace
    }

    fn seeded() -> Arc<InMemoryRemote> {
        let remote = Arc::new(InMemoryRemote::new("BUG"));
        let billing = remote.add_folder(ROOT_FOLDER_ID, "Billing");
        remote.add_folder(billing.id, "Late");
        remote.add_test(billing.id, "pays", "", "Given an invoice", &[]);
        remote
    }

    async fn read(workspace: &mut Workspace<InMemoryRemote>, path: &str) -> String {
        String::from_utf8(workspace.read_file(path).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_builds_tree() {
        let remote = seeded();
        let workspace = workspace(&remote).await;
        assert_eq!(
            workspace.feature_files(),
            vec!["/Billing/Billing.feature", "/Billing/Late/Late.feature"]
        );
        assert_eq!(
            workspace.stat("/Billing").unwrap().kind,
            EntryKind::Directory
        );
    }

    #[tokio::test]
    async fn test_read_file_pulls_remote_text() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        assert_eq!(
            read(&mut workspace, "/Billing/Billing.feature").await,
            "Feature: Billing\n\n@BUG-1\nScenario: pays\n\tGiven an invoice\n"
        );
        assert_eq!(
            read(&mut workspace, "/Billing/Late/Late.feature").await,
            "Feature: Late\n\n"
        );
    }

    #[tokio::test]
    async fn test_write_marks_dirty_and_back() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let path = "/Billing/Late/Late.feature";
        let original = read(&mut workspace, path).await;

        workspace
            .write_file(path, b"Feature: Late\n\nScenario: new\n", WriteOptions::default())
            .await
            .unwrap();
        assert!(workspace.is_dirty(path));

        workspace
            .write_file(path, original.as_bytes(), WriteOptions::default())
            .await
            .unwrap();
        assert!(!workspace.is_dirty(path));
    }

    #[tokio::test]
    async fn test_write_bare_file_denied() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let options = WriteOptions {
            create: true,
            overwrite: false,
        };
        let err = workspace
            .write_file("/Billing/notes.txt", b"x", options)
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_create_directory_creates_remote_folder() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        workspace.create_directory("/Billing/Refunds").await.unwrap();

        assert!(matches!(
            remote.calls()[0],
            RemoteCall::CreateFolder { ref name, .. } if name == "Refunds"
        ));
        assert!(workspace.stat("/Billing/Refunds/Refunds.feature").is_ok());
    }

    #[tokio::test]
    async fn test_rename_in_place_updates_folder() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        workspace
            .rename("/Billing/Late", "/Billing/Overdue", RenameOptions::default())
            .await
            .unwrap();

        assert!(matches!(
            remote.calls()[0],
            RemoteCall::UpdateFolder { ref name, .. } if name == "Overdue"
        ));
        assert!(workspace.stat("/Billing/Overdue/Overdue.feature").is_ok());
        assert!(workspace.stat("/Billing/Late").is_err());
    }

    #[tokio::test]
    async fn test_move_to_other_parent() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        workspace
            .rename("/Billing/Late", "/Late", RenameOptions::default())
            .await
            .unwrap();

        let calls = remote.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            calls[0],
            RemoteCall::MoveFolder { destination_id: ROOT_FOLDER_ID, .. }
        ));
        assert!(workspace.stat("/Late/Late.feature").is_ok());
    }

    #[tokio::test]
    async fn test_rename_keeps_dirty_buffer() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let edited = b"Feature: Late\n\nScenario: pending\n";
        workspace
            .write_file("/Billing/Late/Late.feature", edited, WriteOptions::default())
            .await
            .unwrap();
        workspace
            .rename("/Billing/Late", "/Billing/Overdue", RenameOptions::default())
            .await
            .unwrap();

        let path = "/Billing/Overdue/Overdue.feature";
        assert_eq!(workspace.dirty_paths(), vec![path]);
        assert_eq!(read(&mut workspace, path).await.as_bytes(), edited);
    }

    #[tokio::test]
    async fn test_file_operations_denied() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let err = workspace.delete("/Billing/Billing.feature").await.unwrap_err();
        assert!(matches!(err, FsError::PermissionDenied(_)));
        let err = workspace
            .rename("/Billing/Billing.feature", "/Billing/X.feature", RenameOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::PermissionDenied(_)));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_drops_dirty_files_below() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        workspace
            .write_file("/Billing/Late/Late.feature", b"Feature: x\n", WriteOptions::default())
            .await
            .unwrap();
        workspace.delete("/Billing/Late").await.unwrap();

        assert!(workspace.dirty_paths().is_empty());
        assert!(workspace.stat("/Billing/Late").is_err());
        assert!(matches!(remote.calls()[0], RemoteCall::DeleteFolder { .. }));
    }

    #[tokio::test]
    async fn test_commit_without_changes_is_noop() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let report = workspace.commit().await.unwrap();
        assert!(report.is_empty());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_clean_discards_edits() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let path = "/Billing/Billing.feature";
        let original = read(&mut workspace, path).await;
        workspace
            .write_file(
                path,
                b"Feature: Billing\n\nScenario: broken\n\tGiven x\n\t| a | b |\n\t| 1 |\n",
                WriteOptions::default(),
            )
            .await
            .unwrap();
        assert!(!workspace.diagnostics().is_empty());

        workspace.clean_all().await.unwrap();
        assert!(workspace.dirty_paths().is_empty());
        assert!(workspace.diagnostics().is_empty());
        assert_eq!(read(&mut workspace, path).await, original);
    }

    #[tokio::test]
    async fn test_original_text_respects_token() {
        let remote = seeded();
        let workspace = workspace(&remote).await;
        let token = LivenessToken::new();
        let text = workspace
            .original_text("/Billing/Late/Late.feature", &token)
            .await
            .unwrap();
        assert_eq!(text, "Feature: Late\n\n");

        token.cancel();
        let text = workspace
            .original_text("/Billing/Late/Late.feature", &token)
            .await
            .unwrap();
        assert_eq!(text, CANCELED);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_dirty_buffer() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let path = "/Billing/Late/Late.feature";
        let edited = "Feature: Late\n\nScenario: unsaved\n\tGiven a draft\n";
        workspace
            .write_file(path, edited.as_bytes(), WriteOptions::default())
            .await
            .unwrap();

        remote.fail_on("get_tests");
        assert!(workspace.refresh().await.is_err());
        assert_eq!(workspace.dirty_paths(), vec![path]);

        remote.recover("get_tests");
        workspace.refresh().await.unwrap();
        assert_eq!(workspace.dirty_paths(), vec![path]);
        assert_eq!(read(&mut workspace, path).await, edited);
    }

    #[tokio::test]
    async fn test_write_stays_dirty_when_remote_fails() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let path = "/Billing/Late/Late.feature";
        let original = read(&mut workspace, path).await;

        remote.fail_on("get_tests");
        let err = workspace
            .write_file(path, b"Feature: Late\n\nScenario: new\n", WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::Remote(_)));
        assert!(workspace.is_dirty(path));

        remote.recover("get_tests");
        workspace
            .write_file(path, original.as_bytes(), WriteOptions::default())
            .await
            .unwrap();
        assert!(!workspace.is_dirty(path));
    }

    #[tokio::test]
    async fn test_dirty_check_uses_current_remote_text() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let path = "/Billing/Late/Late.feature";
        let original = read(&mut workspace, path).await;

        let late = workspace.folder_for(path).unwrap().id;
        remote.add_test(late, "added elsewhere", "", "Given x", &[]);
        workspace
            .write_file(path, original.as_bytes(), WriteOptions::default())
            .await
            .unwrap();

        assert!(workspace.is_dirty(path));
        let remote_text = workspace
            .original_text(path, &LivenessToken::new())
            .await
            .unwrap();
        assert_ne!(remote_text, original);
    }

    #[tokio::test]
    async fn test_commit_without_feature_line_keeps_buffer() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        let path = "/Billing/Late/Late.feature";
        workspace
            .write_file(path, b"# all gone\n", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(workspace.diagnostics().len(), 1);

        let err = workspace.commit().await.unwrap_err();
        assert!(matches!(err, ReconcileError::Aborted { .. }));
        assert!(remote.calls().is_empty());
        assert_eq!(workspace.dirty_paths(), vec![path]);
        assert_eq!(read(&mut workspace, path).await, "# all gone\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_batched() {
        let remote = seeded();
        let mut workspace = workspace(&remote).await;
        // Let the refresh batch go out first
        tokio::time::sleep(Duration::from_millis(10)).await;
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let _sub = workspace.subscribe(move |batch| sink.lock().unwrap().push(batch));

        workspace
            .write_file("/Billing/Billing.feature", b"Feature: Billing\n", WriteOptions::default())
            .await
            .unwrap();
        workspace
            .write_file("/Billing/Late/Late.feature", b"Feature: Late\n", WriteOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }
}
