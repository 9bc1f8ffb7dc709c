//! Remote-facing data model: folders, tests and issue records.
//!
//! Everything here is fetched fresh on every refresh and replaced wholesale.
//! Nothing is patched incrementally against an older snapshot.

use serde::{Deserialize, Serialize};

/// Folder id reserved for the test repository root. Never used by a real folder.
pub const ROOT_FOLDER_ID: i64 = -1;

/// Display name of the root folder.
pub const ROOT_FOLDER_NAME: &str = "Test Repository";

/// Test type of the tests that take part in synchronization.
pub const TEXT_TEST_TYPE: &str = "Cucumber";

/// A folder of the remote test repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Internal folder id; [`ROOT_FOLDER_ID`] for the repository root.
    pub id: i64,
    /// Folder name
    pub name: String,
    /// Position among siblings, 1-based
    #[serde(default)]
    pub rank: u32,
    /// Count of direct child tests
    #[serde(default)]
    pub test_count: u32,
    /// Count of all descendant tests
    #[serde(default)]
    pub total_test_count: u32,
    /// Path of the parent folder (`""` for top-level folders).
    ///
    /// Derived from the ancestor chain by [`flatten_folders`]; the remote value is
    /// not trusted.
    #[serde(default)]
    pub test_repository_path: String,
    /// Sub-folders
    #[serde(default)]
    pub folders: Vec<Folder>,
}

impl Folder {
    /// The repository root sentinel.
    pub fn root() -> Self {
        Self {
            id: ROOT_FOLDER_ID,
            name: ROOT_FOLDER_NAME.to_string(),
            rank: 0,
            test_count: 0,
            total_test_count: 0,
            test_repository_path: String::new(),
            folders: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_FOLDER_ID
    }

    /// Full repository path of this folder, e.g. `/Billing/Invoices`.
    pub fn path(&self) -> String {
        if self.is_root() {
            return String::new();
        }
        format!("{}/{}", self.test_repository_path, self.name)
    }

    /// Path of the folder's companion feature file, e.g. `/Billing/Billing.feature`.
    pub fn feature_path(&self) -> String {
        format!("{}/{}.feature", self.path(), self.name)
    }

    /// Label associating a precondition with this folder.
    pub fn association_label(&self) -> String {
        folder_label(&self.path())
    }
}

/// Prefix of folder-association labels on preconditions.
pub const FOLDER_LABEL_PREFIX: &str = "folder:";

/// Folder-association label for a folder path. Labels cannot hold whitespace.
pub fn folder_label(path: &str) -> String {
    let path: String = path
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{}{}", FOLDER_LABEL_PREFIX, path)
}

/// Whether `label` ties a precondition to some folder.
pub fn is_folder_label(label: &str) -> bool {
    label.starts_with(FOLDER_LABEL_PREFIX)
}

/// Flatten a folder forest into `(path, folder)` pairs, parents before children.
///
/// Children are visited in rank order. Each folder's `test_repository_path` is
/// recomputed from the names of its ancestors and its nested `folders` are cleared,
/// so the returned values are flat snapshots.
pub fn flatten_folders(folders: &[Folder]) -> Vec<(String, Folder)> {
    fn walk(parent_path: &str, folders: &[Folder], out: &mut Vec<(String, Folder)>) {
        let mut ordered: Vec<&Folder> = folders.iter().collect();
        ordered.sort_by_key(|f| f.rank);

        for folder in ordered {
            let mut flat = folder.clone();
            flat.test_repository_path = parent_path.to_string();
            flat.folders = Vec::new();
            let path = flat.path();
            out.push((path.clone(), flat));
            walk(&path, &folder.folders, out);
        }
    }

    let mut out = Vec::new();
    walk("", folders, &mut out);
    out
}

/// A test as listed by the test repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTest {
    /// Internal test id
    pub id: i64,
    /// Issue key, e.g. `BUG-123`
    pub key: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub assignee: Option<String>,
    /// Position of the test in its folder, 1-based
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub workflow_status: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    /// Test type, e.g. "Manual", "Cucumber", "Generic"
    #[serde(default)]
    pub test_type: String,
}

impl RemoteTest {
    /// Only text-based tests are mirrored as scenarios.
    pub fn is_text_based(&self) -> bool {
        self.test_type == TEXT_TEST_TYPE
    }
}

/// Issue type reference inside [`IssueFields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueType {
    pub name: String,
}

/// Standard fields of an issue plus whatever custom fields the remote returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub issuetype: Option<IssueType>,
    /// `customfield_NNNNN` values, addressed through a
    /// [`CustomFieldMap`](crate::fields::CustomFieldMap).
    #[serde(flatten)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// A remote issue record: a test or a precondition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub key: String,
    pub fields: IssueFields,
}

/// Field descriptor returned by custom-field discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Opaque per-installation identifier, e.g. `customfield_10000`
    pub id: String,
    /// Display name, e.g. "Test Type"
    pub name: String,
    #[serde(default)]
    pub custom: bool,
}

/// Whether a scenario is a plain scenario or an outline with example tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScenarioKind {
    #[default]
    Scenario,
    Outline,
}

impl ScenarioKind {
    /// Keyword used when rendering and stored in the remote scenario-type field.
    pub fn keyword(self) -> &'static str {
        match self {
            ScenarioKind::Scenario => "Scenario",
            ScenarioKind::Outline => "Scenario Outline",
        }
    }

    /// Interpret a scenario keyword. `Scenario Outline` and `Scenario Template` are
    /// outlines; everything else is a plain scenario.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim() {
            "Scenario Outline" | "Scenario Template" => ScenarioKind::Outline,
            _ => ScenarioKind::Scenario,
        }
    }

    pub fn is_outline(self) -> bool {
        self == ScenarioKind::Outline
    }
}

/// Fields written when creating or updating a test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPayload {
    pub summary: String,
    pub description: String,
    pub labels: Vec<String>,
    /// Repository path of the owning folder
    pub path: String,
    pub steps: String,
    pub kind: ScenarioKind,
}

/// Fields written when creating or updating a precondition.
#[derive(Debug, Clone, PartialEq)]
pub struct PreconditionPayload {
    pub summary: String,
    pub description: String,
    pub labels: Vec<String>,
    pub steps: String,
}
