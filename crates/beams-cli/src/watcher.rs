//! Debounced watcher for the checkout directory.
//!
//! Uses notify-debouncer-mini and forwards feature-file events over a tokio channel.

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Feature-file event from the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Virtual path, e.g. `/Billing/Billing.feature`
    pub path: String,
    pub kind: FileEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// File was created or modified
    Modified,
    Deleted,
}

pub struct FileWatcher {
    root: PathBuf,
    /// Debouncer handle (must keep alive)
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl FileWatcher {
    pub fn new(root: PathBuf, debounce: Duration) -> Result<Self> {
        // FSEvents needs the real path (/var vs /private/var on macOS)
        let root = root.canonicalize().unwrap_or(root);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let root_clone = root.clone();

        let mut debouncer = new_debouncer(
            debounce,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(file_event) = Self::process_event(&event, &root_clone) {
                            if event_tx.send(file_event).is_err() {
                                // Receiver dropped
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            },
        )?;

        debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;

        Ok(Self {
            root,
            _debouncer: debouncer,
            event_rx,
        })
    }

    fn process_event(event: &DebouncedEvent, root: &Path) -> Option<FileEvent> {
        let path = classify(&event.path, root)?;
        let kind = if event.path.exists() {
            FileEventKind::Modified
        } else {
            FileEventKind::Deleted
        };
        debug!("File event: {:?} - {}", kind, path);
        Some(FileEvent { path, kind })
    }

    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<FileEvent> {
        &mut self.event_rx
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Virtual path of a watched file, if it is a visible `.feature` file under `root`.
fn classify(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.to_str()?;
    let relative = relative.replace('\\', "/");

    // Skip hidden files and directories
    if relative.starts_with('.') || relative.contains("/.") {
        return None;
    }
    if !relative.ends_with(".feature") {
        return None;
    }
    Some(format!("/{}", relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_feature_files_only() {
        let root = Path::new("/co");
        assert_eq!(
            classify(Path::new("/co/Billing/Billing.feature"), root).as_deref(),
            Some("/Billing/Billing.feature")
        );
        assert_eq!(classify(Path::new("/co/Billing/notes.md"), root), None);
        assert_eq!(classify(Path::new("/co/.git/x.feature"), root), None);
        assert_eq!(classify(Path::new("/other/A/A.feature"), root), None);
    }

    #[tokio::test]
    async fn test_watcher_reports_feature_writes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("A")).unwrap();
        let mut watcher = FileWatcher::new(dir.path().to_path_buf(), Duration::from_millis(50)).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(watcher.root().join("A").join("A.feature"), "Feature: A").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), watcher.event_rx().recv())
            .await
            .expect("Timed out waiting for file event")
            .expect("Watcher channel closed");
        assert_eq!(event.path, "/A/A.feature");
        assert_eq!(event.kind, FileEventKind::Modified);
    }
}
