//! Entry tree: the in-memory virtual filesystem mirroring the folder hierarchy.
//!
//! Every folder is a directory holding exactly one file, its companion
//! `<name>.feature`. Files are lazily filled from the remote; this module only keeps
//! the node graph and enforces the local rules. Remote I/O happens in the workspace.

use crate::events::FileChangeEvent;
use crate::model::Folder;
use crate::remote::RemoteError;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata shared by both entry kinds. Times are milliseconds since epoch.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub name: String,
    pub ctime: u64,
    pub mtime: u64,
    pub size: u64,
}

impl EntryMeta {
    fn new(name: &str) -> Self {
        let now = now_millis();
        Self {
            name: name.to_string(),
            ctime: now,
            mtime: now,
            size: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub meta: EntryMeta,
    pub entries: BTreeMap<String, Entry>,
    pub folder: Option<Folder>,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub meta: EntryMeta,
    /// Buffer contents; `None` until first pulled or written
    pub data: Option<Vec<u8>>,
    /// Contents must be fetched from the remote before the next read
    pub pull_data: bool,
    /// Folder whose scenarios this file aggregates
    pub folder: Option<Folder>,
}

impl FileEntry {
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.meta.size = data.len() as u64;
        self.meta.mtime = now_millis();
        self.data = Some(data);
    }

    /// Buffer as text, lossily decoded.
    pub fn text(&self) -> String {
        self.data
            .as_deref()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub enum Entry {
    Directory(DirectoryEntry),
    File(FileEntry),
}

impl Entry {
    pub fn meta(&self) -> &EntryMeta {
        match self {
            Entry::Directory(d) => &d.meta,
            Entry::File(f) => &f.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut EntryMeta {
        match self {
            Entry::Directory(d) => &mut d.meta,
            Entry::File(f) => &mut f.meta,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Directory(_) => EntryKind::Directory,
            Entry::File(_) => EntryKind::File,
        }
    }

    pub fn folder(&self) -> Option<&Folder> {
        match self {
            Entry::Directory(d) => d.folder.as_ref(),
            Entry::File(f) => f.folder.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    pub ctime: u64,
    pub mtime: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub create: bool,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOptions {
    pub overwrite: bool,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|p| !p.is_empty())
}

/// Parent of a slash-delimited path; `/` for top-level entries.
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &trimmed[..i],
    }
}

pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

pub fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// The virtual tree. Replaced wholesale on refresh.
#[derive(Debug, Clone)]
pub struct EntryTree {
    root: Entry,
}

impl Default for EntryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryTree {
    /// Empty tree whose root directory stands for the repository root folder.
    pub fn new() -> Self {
        Self {
            root: Entry::Directory(DirectoryEntry {
                meta: EntryMeta::new(""),
                entries: BTreeMap::new(),
                folder: Some(Folder::root()),
            }),
        }
    }

    /// Resolve a path, or `None` if it doesn't exist.
    pub fn find(&self, path: &str) -> Option<&Entry> {
        let mut entry = &self.root;
        for part in segments(path) {
            entry = match entry {
                Entry::Directory(dir) => dir.entries.get(part)?,
                Entry::File(_) => return None,
            };
        }
        Some(entry)
    }

    pub fn lookup(&self, path: &str) -> Result<&Entry> {
        self.find(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    pub fn lookup_mut(&mut self, path: &str) -> Result<&mut Entry> {
        let mut entry = &mut self.root;
        for part in segments(path) {
            entry = match entry {
                Entry::Directory(dir) => dir
                    .entries
                    .get_mut(part)
                    .ok_or_else(|| FsError::NotFound(path.to_string()))?,
                Entry::File(_) => return Err(FsError::NotFound(path.to_string())),
            };
        }
        Ok(entry)
    }

    pub fn lookup_as_directory(&self, path: &str) -> Result<&DirectoryEntry> {
        match self.lookup(path)? {
            Entry::Directory(dir) => Ok(dir),
            Entry::File(_) => Err(FsError::NotADirectory(path.to_string())),
        }
    }

    pub fn lookup_as_directory_mut(&mut self, path: &str) -> Result<&mut DirectoryEntry> {
        match self.lookup_mut(path)? {
            Entry::Directory(dir) => Ok(dir),
            Entry::File(_) => Err(FsError::NotADirectory(path.to_string())),
        }
    }

    pub fn lookup_as_file(&self, path: &str) -> Result<&FileEntry> {
        match self.lookup(path)? {
            Entry::File(file) => Ok(file),
            Entry::Directory(_) => Err(FsError::IsADirectory(path.to_string())),
        }
    }

    pub fn lookup_as_file_mut(&mut self, path: &str) -> Result<&mut FileEntry> {
        match self.lookup_mut(path)? {
            Entry::File(file) => Ok(file),
            Entry::Directory(_) => Err(FsError::IsADirectory(path.to_string())),
        }
    }

    pub fn lookup_parent_directory(&self, path: &str) -> Result<&DirectoryEntry> {
        self.lookup_as_directory(dirname(path))
    }

    pub fn stat(&self, path: &str) -> Result<FileStat> {
        let entry = self.lookup(path)?;
        let meta = entry.meta();
        Ok(FileStat {
            kind: entry.kind(),
            ctime: meta.ctime,
            mtime: meta.mtime,
            size: meta.size,
        })
    }

    pub fn read_directory(&self, path: &str) -> Result<Vec<(String, EntryKind)>> {
        Ok(self
            .lookup_as_directory(path)?
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.kind()))
            .collect())
    }

    /// Create a directory and its companion feature file.
    ///
    /// The companion starts out as `Feature: <name>` and, when a folder is given, is
    /// marked for a remote pull on first read.
    pub fn create_directory(&mut self, path: &str, folder: Option<Folder>) -> Result<Vec<FileChangeEvent>> {
        let name = basename(path).to_string();
        let parent_path = dirname(path).to_string();
        let parent = self.lookup_as_directory_mut(&parent_path)?;
        if parent.entries.contains_key(&name) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }

        let feature_name = format!("{}.feature", name);
        let boilerplate = format!("Feature: {}", name).into_bytes();
        let mut companion = FileEntry {
            meta: EntryMeta::new(&feature_name),
            data: None,
            pull_data: folder.is_some(),
            folder: folder.clone(),
        };
        companion.set_data(boilerplate);

        let mut directory = DirectoryEntry {
            meta: EntryMeta::new(&name),
            entries: BTreeMap::new(),
            folder,
        };
        directory.meta.size = 1;
        directory
            .entries
            .insert(feature_name.clone(), Entry::File(companion));

        parent.entries.insert(name, Entry::Directory(directory));
        parent.meta.mtime = now_millis();
        parent.meta.size = parent.entries.len() as u64;

        Ok(vec![
            FileChangeEvent::changed(parent_path),
            FileChangeEvent::created(path),
            FileChangeEvent::created(join(path, &feature_name)),
        ])
    }

    /// Write file contents. New files can only be created for a folder.
    pub fn write_file(
        &mut self,
        path: &str,
        content: &[u8],
        options: WriteOptions,
        folder: Option<Folder>,
    ) -> Result<Vec<FileChangeEvent>> {
        let name = basename(path).to_string();
        let parent = self.lookup_as_directory_mut(dirname(path))?;
        let mut events = Vec::new();

        match parent.entries.get(&name) {
            None if folder.is_none() => {
                return Err(FsError::PermissionDenied(format!(
                    "{}: only folders can be created",
                    path
                )));
            }
            None if !options.create => return Err(FsError::NotFound(path.to_string())),
            None => {
                parent.entries.insert(
                    name.clone(),
                    Entry::File(FileEntry {
                        meta: EntryMeta::new(&name),
                        data: None,
                        pull_data: false,
                        folder,
                    }),
                );
                events.push(FileChangeEvent::created(path));
            }
            Some(Entry::Directory(_)) => return Err(FsError::IsADirectory(path.to_string())),
            Some(Entry::File(_)) if options.create && !options.overwrite => {
                return Err(FsError::AlreadyExists(path.to_string()));
            }
            Some(Entry::File(_)) => {}
        }

        if let Some(Entry::File(file)) = parent.entries.get_mut(&name) {
            file.set_data(content.to_vec());
            file.pull_data = false;
        }
        events.push(FileChangeEvent::changed(path));
        Ok(events)
    }

    /// Move or rename a folder directory. Its companion file follows the new name.
    pub fn rename(&mut self, old_path: &str, new_path: &str, options: RenameOptions) -> Result<Vec<FileChangeEvent>> {
        if let Entry::File(_) = self.lookup(old_path)? {
            return Err(FsError::PermissionDenied(format!(
                "{}: only folders can be moved or renamed",
                old_path
            )));
        }
        if !options.overwrite && self.find(new_path).is_some() {
            return Err(FsError::AlreadyExists(new_path.to_string()));
        }
        let old_prefix = format!("{}/", old_path.trim_end_matches('/'));
        if new_path.starts_with(&old_prefix) {
            return Err(FsError::PermissionDenied(format!(
                "{}: cannot move a folder into itself",
                new_path
            )));
        }
        self.lookup_parent_directory(new_path)?;

        let old_name = basename(old_path).to_string();
        let new_name = basename(new_path).to_string();
        let mut entry = self
            .lookup_as_directory_mut(dirname(old_path))?
            .entries
            .remove(&old_name)
            .ok_or_else(|| FsError::NotFound(old_path.to_string()))?;

        entry.meta_mut().name = new_name.clone();
        entry.meta_mut().mtime = now_millis();
        if let Entry::Directory(dir) = &mut entry {
            let old_feature = format!("{}.feature", old_name);
            let new_feature = format!("{}.feature", new_name);
            if old_feature != new_feature {
                if let Some(mut companion) = dir.entries.remove(&old_feature) {
                    companion.meta_mut().name = new_feature.clone();
                    dir.entries.insert(new_feature, companion);
                }
            }
        }

        self.lookup_as_directory_mut(dirname(new_path))?
            .entries
            .insert(new_name, entry);

        Ok(vec![
            FileChangeEvent::deleted(old_path),
            FileChangeEvent::created(new_path),
        ])
    }

    /// Remove a folder directory with everything below it.
    pub fn delete(&mut self, path: &str) -> Result<Vec<FileChangeEvent>> {
        if let Entry::File(_) = self.lookup(path)? {
            return Err(FsError::PermissionDenied(format!(
                "{}: only folders can be deleted",
                path
            )));
        }
        let parent_path = dirname(path).to_string();
        let parent = self.lookup_as_directory_mut(&parent_path)?;
        parent
            .entries
            .remove(basename(path))
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        parent.meta.mtime = now_millis();
        parent.meta.size = parent.entries.len() as u64;

        Ok(vec![
            FileChangeEvent::changed(parent_path),
            FileChangeEvent::deleted(path),
        ])
    }

    /// Paths of every file in the tree, depth first.
    pub fn file_paths(&self) -> Vec<String> {
        fn walk(dir: &DirectoryEntry, prefix: &str, out: &mut Vec<String>) {
            for (name, entry) in &dir.entries {
                let path = join(prefix, name);
                match entry {
                    Entry::File(_) => out.push(path),
                    Entry::Directory(child) => walk(child, &path, out),
                }
            }
        }

        let mut out = Vec::new();
        if let Entry::Directory(root) = &self.root {
            walk(root, "", &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FileChangeKind;

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

    fn tree() -> EntryTree {
        let mut tree = EntryTree::new();
        tree.create_directory("/A", Some(folder(1, "A", ""))).unwrap();
        tree.create_directory("/A/B", Some(folder(2, "B", "/A"))).unwrap();
        tree
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(dirname("/A/B/B.feature"), "/A/B");
        assert_eq!(dirname("/A"), "/");
        assert_eq!(basename("/A/B/B.feature"), "B.feature");
        assert_eq!(join("/", "A"), "/A");
        assert_eq!(join("/A", "B"), "/A/B");
    }

    #[test]
    fn test_lookup_errors() {
        let tree = tree();
        assert!(matches!(tree.lookup("/nope"), Err(FsError::NotFound(_))));
        assert!(tree.find("/nope").is_none());
        assert!(matches!(
            tree.lookup_as_file("/A"),
            Err(FsError::IsADirectory(_))
        ));
        assert!(matches!(
            tree.lookup_as_directory("/A/A.feature"),
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(
            tree.lookup("/A/A.feature/x"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_directory_materializes_companion() {
        let tree = tree();
        let file = tree.lookup_as_file("/A/B/B.feature").unwrap();
        assert_eq!(file.text(), "Feature: B");
        assert!(file.pull_data);
        assert_eq!(file.folder.as_ref().unwrap().id, 2);

        let listing = tree.read_directory("/A").unwrap();
        assert_eq!(
            listing,
            vec![
                ("A.feature".to_string(), EntryKind::File),
                ("B".to_string(), EntryKind::Directory),
            ]
        );
    }

    #[test]
    fn test_root_stands_for_repository_root() {
        let tree = EntryTree::new();
        let root = tree.lookup_as_directory("/").unwrap();
        assert!(root.folder.as_ref().unwrap().is_root());
    }

    #[test]
    fn test_write_rejects_bare_files() {
        let mut tree = tree();
        let options = WriteOptions {
            create: true,
            overwrite: true,
        };
        assert!(matches!(
            tree.write_file("/A/notes.txt", b"x", options, None),
            Err(FsError::PermissionDenied(_))
        ));
        assert!(matches!(
            tree.write_file("/A/B", b"x", options, None),
            Err(FsError::IsADirectory(_))
        ));
    }

    #[test]
    fn test_write_existing_file() {
        let mut tree = tree();
        let exclusive = WriteOptions {
            create: true,
            overwrite: false,
        };
        assert!(matches!(
            tree.write_file("/A/A.feature", b"x", exclusive, None),
            Err(FsError::AlreadyExists(_))
        ));

        let events = tree
            .write_file("/A/A.feature", b"Feature: A\n", WriteOptions::default(), None)
            .unwrap();
        assert_eq!(events, vec![FileChangeEvent::changed("/A/A.feature")]);
        let file = tree.lookup_as_file("/A/A.feature").unwrap();
        assert_eq!(file.text(), "Feature: A\n");
        assert!(!file.pull_data);
        assert_eq!(file.meta.size, 11);
    }

    #[test]
    fn test_rename_moves_companion_file() {
        let mut tree = tree();
        let events = tree
            .rename("/A/B", "/A/C", RenameOptions::default())
            .unwrap();
        assert_eq!(events[0].kind, FileChangeKind::Deleted);
        assert!(tree.find("/A/B").is_none());
        assert!(tree.lookup_as_file("/A/C/C.feature").is_ok());
        assert!(tree.find("/A/C/B.feature").is_none());
    }

    #[test]
    fn test_rename_rules() {
        let mut tree = tree();
        tree.create_directory("/D", Some(folder(3, "D", ""))).unwrap();
        assert!(matches!(
            tree.rename("/A/A.feature", "/A/X.feature", RenameOptions::default()),
            Err(FsError::PermissionDenied(_))
        ));
        assert!(matches!(
            tree.rename("/A", "/D", RenameOptions::default()),
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(
            tree.rename("/A", "/A/B/A", RenameOptions::default()),
            Err(FsError::PermissionDenied(_))
        ));
        assert!(tree.find("/A/B").is_some());
    }

    #[test]
    fn test_delete_only_folders() {
        let mut tree = tree();
        assert!(matches!(
            tree.delete("/A/A.feature"),
            Err(FsError::PermissionDenied(_))
        ));
        tree.delete("/A/B").unwrap();
        assert!(tree.find("/A/B").is_none());
        assert_eq!(tree.file_paths(), vec!["/A/A.feature"]);
    }
}
