//! Working-tree tracker: which feature buffers differ from their remote rendering.
//!
//! A buffer is dirty when its text differs from the remote text of its folder,
//! regenerated by the caller for every comparison. The tracker also keeps the folder
//! snapshot of the last refresh and the diagnostics of the last parse over the dirty
//! set.

use crate::gherkin::Diagnostic;
use crate::model::Folder;
use crate::tree::{basename, dirname};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct WorkingTree {
    /// folder path -> folder, as of the last refresh
    snapshot: BTreeMap<String, Folder>,
    /// feature file paths that differ from the remote
    dirty: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl WorkingTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the folder snapshot. Dirty paths are kept.
    pub fn reset(&mut self, entries: impl IntoIterator<Item = (String, Folder)>) {
        self.snapshot = entries.into_iter().collect();
    }

    pub fn folders(&self) -> impl Iterator<Item = (&String, &Folder)> {
        self.snapshot.iter()
    }

    /// Folder a feature file belongs to.
    ///
    /// Only the companion `<name>.feature` directly inside a known folder counts.
    pub fn folder_for(&self, file_path: &str) -> Option<&Folder> {
        let folder = self.snapshot.get(dirname(file_path))?;
        if basename(file_path) == format!("{}.feature", folder.name) {
            Some(folder)
        } else {
            None
        }
    }

    /// Compare a buffer against the remote text and update the dirty set.
    /// Returns whether the file is dirty afterwards.
    pub fn mark(&mut self, path: &str, content: &str, remote_text: &str) -> bool {
        if content == remote_text {
            self.dirty.remove(path);
            false
        } else {
            self.dirty.insert(path.to_string());
            true
        }
    }

    /// Add a path whose buffer could not be compared.
    pub fn mark_dirty(&mut self, path: &str) {
        self.dirty.insert(path.to_string());
    }

    pub fn is_dirty(&self, path: &str) -> bool {
        self.dirty.contains(path)
    }

    pub fn dirty_paths(&self) -> Vec<String> {
        self.dirty.iter().cloned().collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.dirty.remove(path)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Re-key dirty paths after a directory rename.
    ///
    /// `old/old.feature` becomes `new/new.feature`; other paths under `old` keep
    /// their relative part.
    pub fn rename_prefix(&mut self, old_dir: &str, new_dir: &str) {
        let old_dir = old_dir.trim_end_matches('/');
        let new_dir = new_dir.trim_end_matches('/');
        let old_companion = format!("{}/{}.feature", old_dir, basename(old_dir));
        let new_companion = format!("{}/{}.feature", new_dir, basename(new_dir));
        let prefix = format!("{}/", old_dir);

        let moved: Vec<String> = self
            .dirty
            .iter()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect();
        for path in moved {
            self.dirty.remove(&path);
            let renamed = if path == old_companion {
                new_companion.clone()
            } else {
                format!("{}/{}", new_dir, &path[prefix.len()..])
            };
            tracing::debug!("Re-keyed dirty file {} -> {}", path, renamed);
            self.dirty.insert(renamed);
        }
    }

    /// Forget every dirty path below a removed directory.
    pub fn remove_under(&mut self, dir: &str) {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.dirty.retain(|p| !p.starts_with(&prefix));
    }

    pub fn set_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics = diagnostics;
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: i64, name: &str, parent: &str) -> Folder {
        Folder {
            id,
            name: name.to_string(),
            rank: 1,
            test_count: 0,
            total_test_count: 0,
            test_repository_path: parent.to_string(),
            folders: Vec::new(),
        }
    }

    fn tracker() -> WorkingTree {
        let mut tracker = WorkingTree::new();
        tracker.reset([
            ("/A".to_string(), folder(1, "A", "")),
            ("/A/B".to_string(), folder(2, "B", "/A")),
        ]);
        tracker
    }

    #[test]
    fn test_folder_for_companion_only() {
        let tracker = tracker();
        assert_eq!(tracker.folder_for("/A/B/B.feature").unwrap().id, 2);
        assert!(tracker.folder_for("/A/B/other.feature").is_none());
        assert!(tracker.folder_for("/X/X.feature").is_none());
    }

    #[test]
    fn test_mark_tracks_difference_from_remote_text() {
        let mut tracker = tracker();
        assert!(tracker.mark("/A/A.feature", "Feature: A\nedited", "Feature: A\n\n"));
        assert!(tracker.is_dirty("/A/A.feature"));

        assert!(!tracker.mark("/A/A.feature", "Feature: A\n\n", "Feature: A\n\n"));
        assert!(!tracker.has_changes());
    }

    #[test]
    fn test_rename_prefix_rekeys_companion() {
        let mut tracker = tracker();
        tracker.mark("/A/A.feature", "x", "y");
        tracker.mark("/A/B/B.feature", "x", "y");
        tracker.mark("/AB/AB.feature", "x", "y");

        tracker.rename_prefix("/A", "/Z");
        assert_eq!(
            tracker.dirty_paths(),
            vec!["/AB/AB.feature", "/Z/B/B.feature", "/Z/Z.feature"]
        );
    }

    #[test]
    fn test_remove_under() {
        let mut tracker = tracker();
        tracker.mark("/A/B/B.feature", "x", "y");
        tracker.mark("/AB/AB.feature", "x", "y");
        tracker.remove_under("/A");
        assert_eq!(tracker.dirty_paths(), vec!["/AB/AB.feature"]);
    }

    #[test]
    fn test_reset_keeps_dirty_paths() {
        let mut tracker = tracker();
        tracker.mark("/A/A.feature", "x", "y");
        tracker.mark_dirty("/A/B/B.feature");
        tracker.reset([("/A".to_string(), folder(1, "A", ""))]);
        assert!(tracker.is_dirty("/A/A.feature"));
        assert!(tracker.is_dirty("/A/B/B.feature"));
        assert!(tracker.folder_for("/A/B/B.feature").is_none());
    }
}
