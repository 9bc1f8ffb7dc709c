//! beams-core: working-tree mirror of a remote test repository.
//!
//! This crate provides:
//! - An in-memory entry tree mirroring the remote folder hierarchy, one feature file
//!   per folder
//! - Dirty tracking of feature buffers against their remote rendering
//! - A feature-file codec with located diagnostics
//! - Reconciliation of edited feature files back onto remote tests
//! - The RemoteRepository trait abstraction plus an in-memory implementation

pub mod events;
pub mod fields;
pub mod gherkin;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod tracker;
pub mod tree;
pub mod workspace;

pub use events::{EventBus, FileChangeEvent, FileChangeKind, Subscription};
pub use fields::{CustomField, CustomFieldMap};
pub use gherkin::{Diagnostic, Range};
pub use model::{Folder, IssueRecord, RemoteTest};
pub use reconcile::{CommitReport, ReconcileError};
pub use remote::{InMemoryRemote, RemoteError, RemoteRepository};
pub use session::{Session, SessionError};
pub use tree::{EntryKind, FileStat, FsError, RenameOptions, WriteOptions};
pub use workspace::{LivenessToken, Workspace, WorkspaceConfig, CANCELED};
