//! Reconciliation engine: applies edited feature files to the remote repository.
//!
//! Per document: write every scenario (update by key or create), sync the
//! background precondition, detach tests that disappeared from the text, then
//! reorder the folder to match document order. Nothing is written if any input
//! fails to parse.

use crate::gherkin::{
    decode_description, extract_body, parse_features, Background, Diagnostic, Feature, Scenario,
    ScenarioDocument,
};
use crate::model::{is_folder_label, Folder, PreconditionPayload, TestPayload};
use crate::remote::{RemoteError, RemoteRepository};
use crate::session::Session;
use crate::tree::FsError;
use futures::future::try_join_all;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Commit aborted: {} parse error(s) in feature files", .diagnostics.len())]
    Aborted { diagnostics: Vec<Diagnostic> },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Invalid project key pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// A dirty buffer handed to [`commit`].
#[derive(Debug, Clone)]
pub struct FeatureSource {
    pub path: String,
    pub folder: Folder,
    pub text: String,
}

/// What a commit did, for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub detached: Vec<String>,
    /// Preconditions created or updated from a Background
    pub preconditions: Vec<String>,
    /// Preconditions whose folder association was removed
    pub dissociated: Vec<String>,
}

impl CommitReport {
    fn merge(&mut self, other: CommitReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.detached.extend(other.detached);
        self.preconditions.extend(other.preconditions);
        self.dissociated.extend(other.dissociated);
    }

    pub fn is_empty(&self) -> bool {
        *self == CommitReport::default()
    }
}

/// Matchers for the issue keys of one project.
struct KeyPattern {
    tag: Regex,
    comment: Regex,
}

impl KeyPattern {
    fn new(project_key: &str) -> Result<Self> {
        let key = regex::escape(project_key);
        Ok(Self {
            tag: Regex::new(&format!(r"^{}-\d+$", key))?,
            comment: Regex::new(&format!(r"^#\s*@({}-\d+)\b", key))?,
        })
    }

    fn is_key(&self, tag: &str) -> bool {
        self.tag.is_match(tag)
    }

    fn comment_key<'a>(&self, comment: &'a str) -> Option<&'a str> {
        self.comment
            .captures(comment)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Parse every source and reconcile them all, or write nothing.
pub async fn commit<R: RemoteRepository>(
    session: &Session<R>,
    sources: &[FeatureSource],
) -> Result<CommitReport> {
    let outcome = parse_features(sources.iter().map(|s| (s.path.as_str(), s.text.as_str())));
    if outcome.has_errors {
        tracing::warn!(
            "Commit aborted, {} parse error(s) in dirty files",
            outcome.diagnostics.len()
        );
        return Err(ReconcileError::Aborted {
            diagnostics: outcome.diagnostics,
        });
    }

    let pattern = KeyPattern::new(session.project_key())?;
    let reports = try_join_all(
        outcome
            .documents
            .iter()
            .zip(sources)
            .map(|(document, source)| reconcile_document(session, &pattern, document, source)),
    )
    .await?;

    let mut report = CommitReport::default();
    for r in reports {
        report.merge(r);
    }
    Ok(report)
}

async fn reconcile_document<R: RemoteRepository>(
    session: &Session<R>,
    pattern: &KeyPattern,
    document: &ScenarioDocument,
    source: &FeatureSource,
) -> Result<CommitReport> {
    let mut report = CommitReport::default();
    let Some(feature) = &document.feature else {
        tracing::warn!("Skipping {}: no Feature declaration", source.path);
        return Ok(report);
    };
    let folder = &source.folder;
    tracing::info!("Reconciling {} (folderId: {})", source.path, folder.id);

    // Scenario writes of one document run concurrently; results come back in rank order.
    let written = try_join_all(
        feature
            .scenarios()
            .map(|scenario| write_scenario(session, pattern, scenario, &source.text, folder)),
    )
    .await?;
    let mut keys = Vec::with_capacity(written.len());
    for (key, created) in written {
        if created {
            report.created.push(key.clone());
        } else {
            report.updated.push(key.clone());
        }
        keys.push(key);
    }

    sync_background(session, pattern, document, feature, source, &mut report).await?;

    let remote_tests = session.remote().get_tests(folder.id).await?;
    let removed: Vec<String> = remote_tests
        .iter()
        .filter(|t| !keys.contains(&t.key))
        .map(|t| t.key.clone())
        .collect();
    if !removed.is_empty() {
        session
            .remote()
            .update_folder_tests(folder.id, &[], &removed)
            .await
            .inspect_err(|e| tracing::error!("Failed to detach tests from {}: {}", folder.path(), e))?;
        tracing::info!("Detached {:?} from {}", removed, folder.path());
        report.detached = removed;
    }

    // One call per test, each appended to the end, yields document order.
    for key in &keys {
        match remote_tests.iter().find(|t| t.key == *key) {
            Some(test) => {
                session
                    .remote()
                    .sort_tests(folder.id, -1, &[test.id])
                    .await
                    .inspect_err(|e| tracing::error!("Failed to reorder {}: {}", key, e))?;
            }
            None => tracing::warn!("{} is not listed in {}, not reordered", key, folder.path()),
        }
    }

    Ok(report)
}

/// Update or create one scenario. Returns the key and whether it was created.
async fn write_scenario<R: RemoteRepository>(
    session: &Session<R>,
    pattern: &KeyPattern,
    scenario: &Scenario,
    text: &str,
    folder: &Folder,
) -> Result<(String, bool)> {
    let key = scenario
        .tags
        .iter()
        .find(|t| pattern.is_key(&t.name))
        .map(|t| t.name.clone());
    let payload = TestPayload {
        summary: scenario.name.clone(),
        description: decode_description(&scenario.description),
        labels: scenario
            .tags
            .iter()
            .filter(|t| !pattern.is_key(&t.name))
            .map(|t| t.name.clone())
            .collect(),
        path: folder.path(),
        steps: extract_body(text, scenario.body_start(), scenario.body_end()),
        kind: scenario.kind(),
    };

    match key {
        Some(key) => {
            session
                .remote()
                .update_issue(session.fields(), &key, &payload)
                .await
                .inspect_err(|e| tracing::error!("Failed to update {}: {}", key, e))?;
            tracing::info!("Updated test {} \"{}\"", key, payload.summary);
            Ok((key, false))
        }
        None => {
            let key = session
                .remote()
                .create_issue(session.fields(), &payload)
                .await
                .inspect_err(|e| tracing::error!("Failed to create test \"{}\": {}", payload.summary, e))?;
            tracing::info!("Created test {} \"{}\"", key, payload.summary);
            Ok((key, true))
        }
    }
}

async fn sync_background<R: RemoteRepository>(
    session: &Session<R>,
    pattern: &KeyPattern,
    document: &ScenarioDocument,
    feature: &Feature,
    source: &FeatureSource,
    report: &mut CommitReport,
) -> Result<()> {
    let label = source.folder.association_label();
    let kept = match feature.background() {
        Some(background) => {
            let key = document
                .comments
                .iter()
                .filter(|c| c.location.line > feature.location.line)
                .find_map(|c| pattern.comment_key(&c.text));
            let key = write_background(session, background, key, &source.text, &label).await?;
            report.preconditions.push(key.clone());
            Some(key)
        }
        None => None,
    };

    let associated = session
        .remote()
        .find_preconditions(session.fields(), Some(&label))
        .await?;
    for pre in associated {
        if kept.as_deref() == Some(pre.key.as_str()) {
            continue;
        }
        let labels: Vec<String> = pre
            .fields
            .labels
            .iter()
            .filter(|l| **l != label)
            .cloned()
            .collect();
        session
            .remote()
            .set_labels(&pre.key, &labels)
            .await
            .inspect_err(|e| tracing::error!("Failed to dissociate {}: {}", pre.key, e))?;
        tracing::info!("Dissociated precondition {} from {}", pre.key, source.folder.path());
        report.dissociated.push(pre.key);
    }
    Ok(())
}

async fn write_background<R: RemoteRepository>(
    session: &Session<R>,
    background: &Background,
    key: Option<&str>,
    text: &str,
    label: &str,
) -> Result<String> {
    let mut payload = PreconditionPayload {
        summary: background.name.clone(),
        description: decode_description(&background.description),
        labels: vec![label.to_string()],
        steps: extract_body(text, background.body_start(), background.body_end()),
    };

    if let Some(key) = key {
        let existing = session
            .remote()
            .get_issues(session.fields(), &[key.to_string()])
            .await?
            .into_iter()
            .find(|i| i.key == key);
        match existing {
            Some(existing) => {
                // Re-label to the current folder; unrelated labels survive.
                payload.labels = existing
                    .fields
                    .labels
                    .into_iter()
                    .filter(|l| !is_folder_label(l))
                    .chain(std::iter::once(label.to_string()))
                    .collect();
                session
                    .remote()
                    .update_precondition(session.fields(), key, &payload)
                    .await
                    .inspect_err(|e| tracing::error!("Failed to update precondition {}: {}", key, e))?;
                tracing::info!("Updated precondition {} \"{}\"", key, payload.summary);
                return Ok(key.to_string());
            }
            None => tracing::warn!("Precondition {} not found, creating a new one", key),
        }
    }

    let key = session
        .remote()
        .create_precondition(session.fields(), &payload)
        .await
        .inspect_err(|e| tracing::error!("Failed to create precondition \"{}\": {}", payload.summary, e))?;
    tracing::info!("Created precondition {} \"{}\"", key, payload.summary);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{CustomField, FieldAccess};
    use crate::model::ROOT_FOLDER_ID;
    use crate::remote::{InMemoryRemote, RemoteCall};
    use std::sync::Arc;

    async fn setup() -> (Arc<InMemoryRemote>, Session<InMemoryRemote>, Folder) {
        let remote = Arc::new(InMemoryRemote::new("BUG"));
        let folder = remote.add_folder(ROOT_FOLDER_ID, "Billing");
        let session = Session::connect(Arc::clone(&remote), "BUG").await.unwrap();
        (remote, session, folder)
    }

    fn source(folder: &Folder, text: &str) -> FeatureSource {
        FeatureSource {
            path: folder.feature_path(),
            folder: folder.clone(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_key_pattern() {
        let pattern = KeyPattern::new("BUG").unwrap();
        assert!(pattern.is_key("BUG-12"));
        assert!(!pattern.is_key("BUG-12x"));
        assert!(!pattern.is_key("OTHER-1"));
        assert_eq!(pattern.comment_key("#@BUG-9"), Some("BUG-9"));
        assert_eq!(pattern.comment_key("# @BUG-9 shared"), Some("BUG-9"));
        assert_eq!(pattern.comment_key("# note"), None);
    }

    #[tokio::test]
    async fn test_commit_creates_with_labels_and_steps() {
        let (remote, session, folder) = setup().await;
        let text = "Feature: Billing\n\n@smoke\nScenario Outline: pays <n>\n\tGiven <n> invoices\n\n\tExamples:\n\t\t| n |\n\t\t| 1 |\n";
        let report = commit(&session, &[source(&folder, text)]).await.unwrap();

        assert_eq!(report.created, vec!["BUG-1"]);
        let issue = remote.issue("BUG-1").unwrap();
        assert_eq!(issue.fields.labels, vec!["smoke"]);
        assert_eq!(
            issue.custom_text(session.fields(), CustomField::ScenarioSteps),
            Some("Given <n> invoices\n\nExamples:\n\t| n |\n\t| 1 |")
        );
        assert!(issue.scenario_kind(session.fields()).unwrap().is_outline());
        assert_eq!(remote.folder_test_keys(folder.id), vec!["BUG-1"]);
    }

    #[tokio::test]
    async fn test_commit_parse_error_writes_nothing() {
        let (remote, session, folder) = setup().await;
        let text = "Feature: Billing\n\nScenario: s\n\tGiven x\n\t| a | b |\n\t| 1 |\n";
        let err = commit(&session, &[source(&folder, text)]).await.unwrap_err();
        match err {
            ReconcileError::Aborted { diagnostics } => assert_eq!(diagnostics.len(), 1),
            other => panic!("unexpected error: {}", other),
        }
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_background_creates_associated_precondition() {
        let (remote, session, folder) = setup().await;
        let text = "Feature: Billing\n\nBackground: logged in\n\tGiven a session\n\nScenario: s\n\tGiven x\n";
        let report = commit(&session, &[source(&folder, text)]).await.unwrap();

        // Scenarios are written before the background
        assert_eq!(report.created, vec!["BUG-1"]);
        assert_eq!(report.preconditions, vec!["BUG-2"]);
        assert!(report.dissociated.is_empty());
        let pre = remote.issue("BUG-2").unwrap();
        assert_eq!(pre.fields.labels, vec!["folder:/Billing"]);
        assert_eq!(pre.conditions(session.fields()), Some("Given a session"));
    }

    #[tokio::test]
    async fn test_background_update_relabels_to_folder() {
        let (remote, session, folder) = setup().await;
        let key = remote.add_precondition("old", "Given old", &["folder:/Elsewhere", "shared"]);
        let text = format!(
            "Feature: Billing\n\n#@{}\nBackground: new\n\tGiven new\n",
            key
        );
        commit(&session, &[source(&folder, &text)]).await.unwrap();

        let pre = remote.issue(&key).unwrap();
        assert_eq!(pre.fields.summary, "new");
        assert_eq!(pre.fields.labels, vec!["shared", "folder:/Billing"]);
        assert!(remote
            .calls()
            .contains(&RemoteCall::UpdatePrecondition { key: key.clone(), summary: "new".into() }));
    }

    #[tokio::test]
    async fn test_removed_background_is_dissociated() {
        let (remote, session, folder) = setup().await;
        let key = remote.add_precondition("setup", "Given y", &["folder:/Billing", "keep"]);
        let report = commit(&session, &[source(&folder, "Feature: Billing\n\n")])
            .await
            .unwrap();

        assert_eq!(report.dissociated, vec![key.clone()]);
        assert_eq!(remote.issue(&key).unwrap().fields.labels, vec!["keep"]);
    }

    #[tokio::test]
    async fn test_document_without_feature_aborts() {
        let (remote, session, folder) = setup().await;
        let err = commit(&session, &[source(&folder, "# nothing here\n")])
            .await
            .unwrap_err();
        match err {
            ReconcileError::Aborted { diagnostics } => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].range.start_line, 1);
            }
            other => panic!("Expected Aborted, got {:?}", other),
        }
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_propagates() {
        let (remote, session, folder) = setup().await;
        remote.fail_on("create_issue");
        let err = commit(&session, &[source(&folder, "Feature: Billing\nScenario: s\n")])
            .await
            .unwrap_err();
        match err {
            ReconcileError::Remote(RemoteError::Transport { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("create_issue"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
