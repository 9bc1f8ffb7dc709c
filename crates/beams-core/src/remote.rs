//! RemoteRepository trait: the network boundary for folders, tests and issues.
//!
//! Implementations:
//! - `InMemoryRemote` - For testing; records every mutating call
//! - `JiraClient` (in beams-cli) - REST client over reqwest
//!
//! Every call fails with [`RemoteError::Transport`] carrying the raw response body on
//! a non-2xx status. Nothing here retries.

use crate::fields::{option_value, CustomField, CustomFieldMap, FieldAccess};
use crate::model::{
    flatten_folders, FieldDescriptor, Folder, IssueFields, IssueRecord, IssueType,
    PreconditionPayload, RemoteTest, TestPayload, ROOT_FOLDER_ID, TEXT_TEST_TYPE,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

/// Issue type name of tests.
pub const TEST_ISSUE_TYPE: &str = "Test";
/// Issue type name of preconditions.
pub const PRECONDITION_ISSUE_TYPE: &str = "Pre-Condition";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote request failed with status {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Response is missing field: {0}")]
    MissingField(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Remote test-repository operations consumed by the core.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// List every field of the remote schema (custom-field discovery).
    async fn get_fields(&self) -> Result<Vec<FieldDescriptor>>;

    /// Folder forest under the repository root.
    async fn get_folders(&self) -> Result<Vec<Folder>>;

    /// Create a folder under `parent_id` ([`ROOT_FOLDER_ID`] for the root).
    async fn create_folder(&self, parent_id: i64, name: &str) -> Result<Folder>;

    /// Rename a folder and/or change its rank among siblings.
    async fn update_folder(&self, id: i64, name: &str, rank: u32) -> Result<()>;

    /// Move a folder under another folder.
    async fn move_folder(&self, id: i64, destination_id: i64) -> Result<()>;

    async fn delete_folder(&self, id: i64) -> Result<()>;

    /// Text-based tests of a folder in rank order.
    async fn get_tests(&self, folder_id: i64) -> Result<Vec<RemoteTest>>;

    /// Tests not assigned to any folder.
    async fn get_orphans(&self) -> Result<Vec<RemoteTest>>;

    /// Attach and detach tests. Detached tests stay in the store as orphans.
    async fn update_folder_tests(&self, folder_id: i64, add: &[String], remove: &[String])
    -> Result<()>;

    /// Move `test_ids` in front of `target_leaf`, or to the end when it is `-1`.
    async fn sort_tests(&self, folder_id: i64, target_leaf: i64, test_ids: &[i64]) -> Result<()>;

    async fn get_issues(&self, fields: &CustomFieldMap, keys: &[String])
    -> Result<Vec<IssueRecord>>;

    /// Create a test; returns its new key.
    async fn create_issue(&self, fields: &CustomFieldMap, test: &TestPayload) -> Result<String>;

    async fn update_issue(&self, fields: &CustomFieldMap, key: &str, test: &TestPayload)
    -> Result<()>;

    /// Text-based preconditions, optionally only those carrying `label`.
    async fn find_preconditions(&self, fields: &CustomFieldMap, label: Option<&str>)
    -> Result<Vec<IssueRecord>>;

    /// Create a precondition; returns its new key.
    async fn create_precondition(&self, fields: &CustomFieldMap, pre: &PreconditionPayload)
    -> Result<String>;

    async fn update_precondition(
        &self,
        fields: &CustomFieldMap,
        key: &str,
        pre: &PreconditionPayload,
    ) -> Result<()>;

    /// Replace the label set of an issue.
    async fn set_labels(&self, key: &str, labels: &[String]) -> Result<()>;
}

/// Encode a test payload into an issue field map.
pub fn test_fields(fields: &CustomFieldMap, test: &TestPayload) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("summary".into(), test.summary.clone().into());
    map.insert("description".into(), test.description.clone().into());
    map.insert("labels".into(), test.labels.clone().into());
    map.insert(
        fields.id(CustomField::TestRepositoryPath).into(),
        test.path.clone().into(),
    );
    map.insert(
        fields.id(CustomField::TestType).into(),
        option_value(TEXT_TEST_TYPE),
    );
    map.insert(
        fields.id(CustomField::ScenarioType).into(),
        option_value(test.kind.keyword()),
    );
    map.insert(
        fields.id(CustomField::ScenarioSteps).into(),
        test.steps.clone().into(),
    );
    map
}

/// Encode a precondition payload into an issue field map.
pub fn precondition_fields(fields: &CustomFieldMap, pre: &PreconditionPayload) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("summary".into(), pre.summary.clone().into());
    map.insert("description".into(), pre.description.clone().into());
    map.insert("labels".into(), pre.labels.clone().into());
    map.insert(
        fields.id(CustomField::PreconditionType).into(),
        option_value(TEXT_TEST_TYPE),
    );
    map.insert(
        fields.id(CustomField::Conditions).into(),
        pre.steps.clone().into(),
    );
    map
}

/// A mutating call recorded by [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CreateFolder { parent_id: i64, name: String },
    UpdateFolder { id: i64, name: String, rank: u32 },
    MoveFolder { id: i64, destination_id: i64 },
    DeleteFolder { id: i64 },
    UpdateFolderTests { folder_id: i64, add: Vec<String>, remove: Vec<String> },
    SortTests { folder_id: i64, target_leaf: i64, test_ids: Vec<i64> },
    CreateIssue { key: String, summary: String },
    UpdateIssue { key: String, summary: String },
    CreatePrecondition { key: String, summary: String },
    UpdatePrecondition { key: String, summary: String },
    SetLabels { key: String, labels: Vec<String> },
}

#[derive(Default)]
struct RemoteState {
    folders: Vec<Folder>,
    /// folder id -> test keys in rank order
    folder_tests: BTreeMap<i64, Vec<String>>,
    issues: BTreeMap<String, IssueRecord>,
    issue_ids: BTreeMap<String, i64>,
    next_folder_id: i64,
    next_issue: u64,
    calls: Vec<RemoteCall>,
    failing: HashSet<&'static str>,
}

/// In-memory remote repository for testing.
pub struct InMemoryRemote {
    project_key: String,
    fields: CustomFieldMap,
    state: Mutex<RemoteState>,
}

impl InMemoryRemote {
    pub fn new(project_key: &str) -> Self {
        let fields = CustomFieldMap::resolve(&Self::descriptors())
            .unwrap_or_else(|_| CustomFieldMap::from_pairs([]));
        Self {
            project_key: project_key.to_string(),
            fields,
            state: Mutex::new(RemoteState {
                next_folder_id: 1,
                next_issue: 1,
                ..Default::default()
            }),
        }
    }

    fn descriptors() -> Vec<FieldDescriptor> {
        CustomField::ALL
            .iter()
            .enumerate()
            .map(|(i, f)| FieldDescriptor {
                id: format!("customfield_{}", 10100 + i),
                name: f.display_name().to_string(),
                custom: true,
            })
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Field map matching this remote's discovery listing.
    pub fn field_map(&self) -> &CustomFieldMap {
        &self.fields
    }

    /// Mutating calls so far, in issue order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Make every subsequent call of `operation` (e.g. `"create_issue"`) fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    /// Stop failing calls of `operation`.
    pub fn recover(&self, operation: &'static str) {
        self.state().failing.remove(operation);
    }

    /// Seed a folder without recording a call.
    pub fn add_folder(&self, parent_id: i64, name: &str) -> Folder {
        let mut state = self.state();
        Self::insert_folder(&mut state, parent_id, name)
    }

    /// Seed a text-based test in a folder without recording a call.
    pub fn add_test(&self, folder_id: i64, summary: &str, description: &str, steps: &str,
                    labels: &[&str]) -> String {
        let mut state = self.state();
        let path = Self::folder_path(&state, folder_id).unwrap_or_default();
        let payload = TestPayload {
            summary: summary.to_string(),
            description: description.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            path,
            steps: steps.to_string(),
            kind: crate::model::ScenarioKind::Scenario,
        };
        let fields = test_fields(&self.fields, &payload);
        let key = self.insert_issue(&mut state, TEST_ISSUE_TYPE, fields);
        state.folder_tests.entry(folder_id).or_default().push(key.clone());
        key
    }

    /// Seed a precondition without recording a call.
    pub fn add_precondition(&self, summary: &str, steps: &str, labels: &[&str]) -> String {
        let mut state = self.state();
        let payload = PreconditionPayload {
            summary: summary.to_string(),
            description: String::new(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            steps: steps.to_string(),
        };
        let fields = precondition_fields(&self.fields, &payload);
        self.insert_issue(&mut state, PRECONDITION_ISSUE_TYPE, fields)
    }

    /// Current issue record, if any.
    pub fn issue(&self, key: &str) -> Option<IssueRecord> {
        self.state().issues.get(key).cloned()
    }

    /// Keys of a folder's tests in rank order.
    pub fn folder_test_keys(&self, folder_id: i64) -> Vec<String> {
        self.state()
            .folder_tests
            .get(&folder_id)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, state: &RemoteState, operation: &'static str) -> Result<()> {
        if state.failing.contains(operation) {
            return Err(RemoteError::Transport {
                status: 500,
                body: format!("{{\"error\":\"{} failed\"}}", operation),
            });
        }
        Ok(())
    }

    fn insert_folder(state: &mut RemoteState, parent_id: i64, name: &str) -> Folder {
        let id = state.next_folder_id;
        state.next_folder_id += 1;
        let (parent_id, parent_path) = match Self::folder_path(state, parent_id) {
            Some(path) => (parent_id, path),
            None => (ROOT_FOLDER_ID, String::new()),
        };
        let mut folder = Folder {
            id,
            name: name.to_string(),
            rank: 1,
            test_count: 0,
            total_test_count: 0,
            test_repository_path: parent_path,
            folders: Vec::new(),
        };
        if let Some(siblings) = Self::children_mut(&mut state.folders, parent_id) {
            folder.rank = siblings.len() as u32 + 1;
            siblings.push(folder.clone());
        }
        folder
    }

    fn insert_issue(&self, state: &mut RemoteState, issue_type: &str, mut custom: Map<String, Value>)
    -> String {
        let key = format!("{}-{}", self.project_key, state.next_issue);
        state.next_issue += 1;
        let id = 1000 + state.issue_ids.len() as i64;
        state.issue_ids.insert(key.clone(), id);

        let summary = custom.remove("summary").and_then(|v| v.as_str().map(String::from));
        let description = custom.remove("description").and_then(|v| v.as_str().map(String::from));
        let labels = Self::labels_of(custom.remove("labels"));
        state.issues.insert(
            key.clone(),
            IssueRecord {
                key: key.clone(),
                fields: IssueFields {
                    summary: summary.unwrap_or_default(),
                    description: description.filter(|d| !d.is_empty()),
                    labels,
                    issuetype: Some(IssueType { name: issue_type.to_string() }),
                    custom,
                },
            },
        );
        key
    }

    fn apply_fields(state: &mut RemoteState, key: &str, mut custom: Map<String, Value>) -> Result<()> {
        let issue = state
            .issues
            .get_mut(key)
            .ok_or_else(|| RemoteError::Transport {
                status: 404,
                body: format!("Issue Does Not Exist: {}", key),
            })?;
        if let Some(summary) = custom.remove("summary").and_then(|v| v.as_str().map(String::from)) {
            issue.fields.summary = summary;
        }
        if let Some(description) = custom.remove("description") {
            issue.fields.description = description.as_str().filter(|d| !d.is_empty()).map(String::from);
        }
        if let Some(labels) = custom.remove("labels") {
            issue.fields.labels = Self::labels_of(Some(labels));
        }
        issue.fields.custom.extend(custom);
        Ok(())
    }

    fn labels_of(value: Option<Value>) -> Vec<String> {
        match value {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn children_mut(folders: &mut Vec<Folder>, id: i64) -> Option<&mut Vec<Folder>> {
        if id == ROOT_FOLDER_ID {
            return Some(folders);
        }
        for folder in folders.iter_mut() {
            if folder.id == id {
                return Some(&mut folder.folders);
            }
            if let Some(found) = Self::children_mut(&mut folder.folders, id) {
                return Some(found);
            }
        }
        None
    }

    fn take_folder(folders: &mut Vec<Folder>, id: i64) -> Option<Folder> {
        if let Some(pos) = folders.iter().position(|f| f.id == id) {
            let folder = folders.remove(pos);
            for (i, sibling) in folders.iter_mut().enumerate() {
                sibling.rank = i as u32 + 1;
            }
            return Some(folder);
        }
        folders
            .iter_mut()
            .find_map(|f| Self::take_folder(&mut f.folders, id))
    }

    fn folder_path(state: &RemoteState, id: i64) -> Option<String> {
        if id == ROOT_FOLDER_ID {
            return Some(String::new());
        }
        flatten_folders(&state.folders)
            .into_iter()
            .find(|(_, f)| f.id == id)
            .map(|(path, _)| path)
    }

    fn folder_by_path(state: &RemoteState, path: &str) -> Option<i64> {
        flatten_folders(&state.folders)
            .into_iter()
            .find(|(p, _)| p == path)
            .map(|(_, f)| f.id)
    }

    fn detach(state: &mut RemoteState, key: &str) {
        for keys in state.folder_tests.values_mut() {
            keys.retain(|k| k != key);
        }
    }

    /// Move a test into the folder named by its repository path field.
    fn place(&self, state: &mut RemoteState, key: &str, path: &str) {
        let target = Self::folder_by_path(state, path);
        let current = state
            .folder_tests
            .iter()
            .find(|(_, keys)| keys.iter().any(|k| k == key))
            .map(|(id, _)| *id);
        if target == current {
            return;
        }
        Self::detach(state, key);
        if let Some(id) = target {
            state.folder_tests.entry(id).or_default().push(key.to_string());
        }
    }

    fn with_counts(&self, state: &RemoteState, folders: &[Folder]) -> Vec<Folder> {
        folders
            .iter()
            .map(|f| {
                let mut f = f.clone();
                f.folders = self.with_counts(state, &f.folders);
                f.test_count = state.folder_tests.get(&f.id).map_or(0, |k| k.len() as u32);
                f.total_test_count =
                    f.test_count + f.folders.iter().map(|c| c.total_test_count).sum::<u32>();
                f
            })
            .collect()
    }

    fn remote_test(&self, state: &RemoteState, key: &str, rank: u32) -> Option<RemoteTest> {
        let issue = state.issues.get(key)?;
        Some(RemoteTest {
            id: state.issue_ids.get(key).copied().unwrap_or_default(),
            key: key.to_string(),
            summary: issue.fields.summary.clone(),
            assignee: None,
            rank,
            workflow_status: "TODO".to_string(),
            labels: issue.fields.labels.clone(),
            components: Vec::new(),
            test_type: issue
                .custom_text(&self.fields, CustomField::TestType)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[async_trait]
impl RemoteRepository for InMemoryRemote {
    async fn get_fields(&self) -> Result<Vec<FieldDescriptor>> {
        self.check(&self.state(), "get_fields")?;
        Ok(Self::descriptors())
    }

    async fn get_folders(&self) -> Result<Vec<Folder>> {
        let state = self.state();
        self.check(&state, "get_folders")?;
        Ok(self.with_counts(&state, &state.folders))
    }

    async fn create_folder(&self, parent_id: i64, name: &str) -> Result<Folder> {
        let mut state = self.state();
        self.check(&state, "create_folder")?;
        if parent_id != ROOT_FOLDER_ID && Self::folder_path(&state, parent_id).is_none() {
            return Err(RemoteError::Transport {
                status: 404,
                body: format!("Folder {} not found", parent_id),
            });
        }
        state.calls.push(RemoteCall::CreateFolder {
            parent_id,
            name: name.to_string(),
        });
        Ok(Self::insert_folder(&mut state, parent_id, name))
    }

    async fn update_folder(&self, id: i64, name: &str, rank: u32) -> Result<()> {
        let mut state = self.state();
        self.check(&state, "update_folder")?;
        state.calls.push(RemoteCall::UpdateFolder {
            id,
            name: name.to_string(),
            rank,
        });
        fn rename(folders: &mut [Folder], id: i64, name: &str) -> bool {
            for f in folders.iter_mut() {
                if f.id == id {
                    f.name = name.to_string();
                    return true;
                }
                if rename(&mut f.folders, id, name) {
                    return true;
                }
            }
            false
        }
        if !rename(&mut state.folders, id, name) {
            return Err(RemoteError::Transport {
                status: 404,
                body: format!("Folder {} not found", id),
            });
        }
        Ok(())
    }

    async fn move_folder(&self, id: i64, destination_id: i64) -> Result<()> {
        let mut state = self.state();
        self.check(&state, "move_folder")?;
        state.calls.push(RemoteCall::MoveFolder { id, destination_id });
        if Self::folder_path(&state, destination_id).is_none() {
            return Err(RemoteError::Transport {
                status: 404,
                body: format!("Folder {} not found", destination_id),
            });
        }
        let mut folder = Self::take_folder(&mut state.folders, id).ok_or_else(|| {
            RemoteError::Transport {
                status: 404,
                body: format!("Folder {} not found", id),
            }
        })?;
        if let Some(siblings) = Self::children_mut(&mut state.folders, destination_id) {
            folder.rank = siblings.len() as u32 + 1;
            siblings.push(folder);
        }
        Ok(())
    }

    async fn delete_folder(&self, id: i64) -> Result<()> {
        let mut state = self.state();
        self.check(&state, "delete_folder")?;
        state.calls.push(RemoteCall::DeleteFolder { id });
        let removed = Self::take_folder(&mut state.folders, id).ok_or_else(|| {
            RemoteError::Transport {
                status: 404,
                body: format!("Folder {} not found", id),
            }
        })?;
        let mut ids = vec![removed.id];
        ids.extend(flatten_folders(&removed.folders).into_iter().map(|(_, f)| f.id));
        for id in ids {
            state.folder_tests.remove(&id);
        }
        Ok(())
    }

    async fn get_tests(&self, folder_id: i64) -> Result<Vec<RemoteTest>> {
        let state = self.state();
        self.check(&state, "get_tests")?;
        let keys = state.folder_tests.get(&folder_id).cloned().unwrap_or_default();
        Ok(keys
            .iter()
            .enumerate()
            .filter_map(|(i, key)| self.remote_test(&state, key, i as u32 + 1))
            .filter(RemoteTest::is_text_based)
            .collect())
    }

    async fn get_orphans(&self) -> Result<Vec<RemoteTest>> {
        let state = self.state();
        self.check(&state, "get_orphans")?;
        let placed: HashSet<&String> = state.folder_tests.values().flatten().collect();
        Ok(state
            .issues
            .values()
            .filter(|i| i.fields.issuetype.as_ref().is_some_and(|t| t.name == TEST_ISSUE_TYPE))
            .filter(|i| !placed.contains(&i.key))
            .filter_map(|i| self.remote_test(&state, &i.key, 0))
            .collect())
    }

    async fn update_folder_tests(&self, folder_id: i64, add: &[String], remove: &[String])
    -> Result<()> {
        let mut state = self.state();
        self.check(&state, "update_folder_tests")?;
        state.calls.push(RemoteCall::UpdateFolderTests {
            folder_id,
            add: add.to_vec(),
            remove: remove.to_vec(),
        });
        let path = Self::folder_path(&state, folder_id).unwrap_or_default();
        let path_field = self.fields.id(CustomField::TestRepositoryPath).to_string();
        for key in remove {
            if let Some(keys) = state.folder_tests.get_mut(&folder_id) {
                keys.retain(|k| k != key);
            }
            if let Some(issue) = state.issues.get_mut(key) {
                issue.fields.custom.insert(path_field.clone(), Value::String(String::new()));
            }
        }
        for key in add {
            Self::detach(&mut state, key);
            state.folder_tests.entry(folder_id).or_default().push(key.clone());
            if let Some(issue) = state.issues.get_mut(key) {
                issue.fields.custom.insert(path_field.clone(), Value::String(path.clone()));
            }
        }
        Ok(())
    }

    async fn sort_tests(&self, folder_id: i64, target_leaf: i64, test_ids: &[i64]) -> Result<()> {
        let mut state = self.state();
        self.check(&state, "sort_tests")?;
        state.calls.push(RemoteCall::SortTests {
            folder_id,
            target_leaf,
            test_ids: test_ids.to_vec(),
        });
        let moving: Vec<String> = test_ids
            .iter()
            .filter_map(|id| {
                state
                    .issue_ids
                    .iter()
                    .find(|(_, v)| *v == id)
                    .map(|(k, _)| k.clone())
            })
            .collect();
        let target_key = state
            .issue_ids
            .iter()
            .find(|(_, v)| **v == target_leaf)
            .map(|(k, _)| k.clone());
        let keys = state.folder_tests.entry(folder_id).or_default();
        keys.retain(|k| !moving.contains(k));
        let at = target_key
            .and_then(|t| keys.iter().position(|k| *k == t))
            .unwrap_or(keys.len());
        for (offset, key) in moving.into_iter().enumerate() {
            keys.insert(at + offset, key);
        }
        Ok(())
    }

    async fn get_issues(&self, _fields: &CustomFieldMap, keys: &[String])
    -> Result<Vec<IssueRecord>> {
        let state = self.state();
        self.check(&state, "get_issues")?;
        Ok(state
            .issues
            .values()
            .filter(|i| keys.contains(&i.key))
            .cloned()
            .collect())
    }

    async fn create_issue(&self, fields: &CustomFieldMap, test: &TestPayload) -> Result<String> {
        let mut state = self.state();
        self.check(&state, "create_issue")?;
        let key = self.insert_issue(&mut state, TEST_ISSUE_TYPE, test_fields(fields, test));
        self.place(&mut state, &key, &test.path);
        state.calls.push(RemoteCall::CreateIssue {
            key: key.clone(),
            summary: test.summary.clone(),
        });
        Ok(key)
    }

    async fn update_issue(&self, fields: &CustomFieldMap, key: &str, test: &TestPayload)
    -> Result<()> {
        let mut state = self.state();
        self.check(&state, "update_issue")?;
        Self::apply_fields(&mut state, key, test_fields(fields, test))?;
        self.place(&mut state, key, &test.path);
        state.calls.push(RemoteCall::UpdateIssue {
            key: key.to_string(),
            summary: test.summary.clone(),
        });
        Ok(())
    }

    async fn find_preconditions(&self, fields: &CustomFieldMap, label: Option<&str>)
    -> Result<Vec<IssueRecord>> {
        let state = self.state();
        self.check(&state, "find_preconditions")?;
        Ok(state
            .issues
            .values()
            .filter(|i| {
                i.fields
                    .issuetype
                    .as_ref()
                    .is_some_and(|t| t.name == PRECONDITION_ISSUE_TYPE)
            })
            .filter(|i| i.is_text_precondition(fields))
            .filter(|i| label.is_none_or(|l| i.fields.labels.iter().any(|x| x == l)))
            .cloned()
            .collect())
    }

    async fn create_precondition(&self, fields: &CustomFieldMap, pre: &PreconditionPayload)
    -> Result<String> {
        let mut state = self.state();
        self.check(&state, "create_precondition")?;
        let key = self.insert_issue(
            &mut state,
            PRECONDITION_ISSUE_TYPE,
            precondition_fields(fields, pre),
        );
        state.calls.push(RemoteCall::CreatePrecondition {
            key: key.clone(),
            summary: pre.summary.clone(),
        });
        Ok(key)
    }

    async fn update_precondition(
        &self,
        fields: &CustomFieldMap,
        key: &str,
        pre: &PreconditionPayload,
    ) -> Result<()> {
        let mut state = self.state();
        self.check(&state, "update_precondition")?;
        Self::apply_fields(&mut state, key, precondition_fields(fields, pre))?;
        state.calls.push(RemoteCall::UpdatePrecondition {
            key: key.to_string(),
            summary: pre.summary.clone(),
        });
        Ok(())
    }

    async fn set_labels(&self, key: &str, labels: &[String]) -> Result<()> {
        let mut state = self.state();
        self.check(&state, "set_labels")?;
        let mut map = Map::new();
        map.insert("labels".into(), labels.to_vec().into());
        Self::apply_fields(&mut state, key, map)?;
        state.calls.push(RemoteCall::SetLabels {
            key: key.to_string(),
            labels: labels.to_vec(),
        });
        Ok(())
    }
}
