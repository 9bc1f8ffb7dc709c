//! Session: the resolved custom-field map and the active remote, threaded through
//! every core call.
//!
//! Everything that turns remote state into feature text lives here, so the entry
//! tree and the tracker only ever see strings.

use crate::fields::{CustomFieldMap, FieldError};
use crate::gherkin::{render_background, render_feature, render_scenario};
use crate::model::{flatten_folders, Folder, IssueRecord, RemoteTest};
use crate::remote::{RemoteError, RemoteRepository, Result};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    MissingField(#[from] FieldError),

    #[error("Custom field discovery failed: {0}")]
    Remote(#[from] RemoteError),
}

pub struct Session<R> {
    remote: Arc<R>,
    fields: CustomFieldMap,
    project_key: String,
}

impl<R: RemoteRepository> Session<R> {
    /// Discover custom fields and open a session.
    pub async fn connect(remote: Arc<R>, project_key: &str) -> std::result::Result<Self, SessionError> {
        let descriptors = remote.get_fields().await?;
        let fields = CustomFieldMap::resolve(&descriptors)?;
        tracing::debug!("Resolved custom fields: {:?}", fields);
        Ok(Self::with_fields(remote, fields, project_key))
    }

    /// Open a session with an already resolved field map.
    pub fn with_fields(remote: Arc<R>, fields: CustomFieldMap, project_key: &str) -> Self {
        Self {
            remote,
            fields,
            project_key: project_key.to_string(),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn fields(&self) -> &CustomFieldMap {
        &self.fields
    }

    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    /// Current folder hierarchy as `(path, folder)` pairs, parents first.
    pub async fn folder_entries(&self) -> Result<Vec<(String, Folder)>> {
        let folders = self
            .remote
            .get_folders()
            .await
            .inspect_err(|e| tracing::error!("Failed to list folders: {}", e))?;
        Ok(flatten_folders(&folders))
    }

    /// Feature text of a folder as the remote currently has it.
    pub async fn feature_text(&self, folder: &Folder) -> Result<String> {
        let tests = self
            .remote
            .get_tests(folder.id)
            .await
            .inspect_err(|e| tracing::error!("Failed to list tests of {}: {}", folder.path(), e))?;
        let keys: Vec<String> = tests.into_iter().map(|t| t.key).collect();

        let scenarios = if keys.is_empty() {
            Vec::new()
        } else {
            let mut issues = self.remote.get_issues(&self.fields, &keys).await?;
            issues.sort_by_key(|i| keys.iter().position(|k| *k == i.key));
            issues
        };

        let background = self
            .remote
            .find_preconditions(&self.fields, Some(&folder.association_label()))
            .await?
            .into_iter()
            .next();

        Ok(render_feature(
            &folder.name,
            background.as_ref(),
            &scenarios,
            &self.fields,
        ))
    }

    /// A single scenario block, e.g. to paste an orphan into a feature file.
    pub async fn scenario_text(&self, key: &str) -> Result<Option<String>> {
        let issues = self
            .remote
            .get_issues(&self.fields, &[key.to_string()])
            .await?;
        Ok(issues
            .iter()
            .find(|i| i.key == key)
            .map(|i| render_scenario(i, &self.fields)))
    }

    pub async fn orphans(&self) -> Result<Vec<RemoteTest>> {
        self.remote
            .get_orphans()
            .await
            .inspect_err(|e| tracing::error!("Failed to list orphans: {}", e))
    }

    /// Text-based preconditions, with or without a folder association.
    pub async fn preconditions(&self) -> Result<Vec<IssueRecord>> {
        self.remote.find_preconditions(&self.fields, None).await
    }

    /// Background block of a precondition.
    pub async fn precondition_text(&self, key: &str) -> Result<Option<String>> {
        let issues = self
            .remote
            .get_issues(&self.fields, &[key.to_string()])
            .await?;
        Ok(issues
            .iter()
            .find(|i| i.key == key)
            .map(|i| render_background(i, &self.fields)))
    }

    pub async fn create_folder(&self, parent: &Folder, name: &str) -> Result<Folder> {
        let folder = self
            .remote
            .create_folder(parent.id, name)
            .await
            .inspect_err(|e| tracing::error!("Failed to create folder {}/{}: {}", parent.path(), name, e))?;
        tracing::info!("Created folder {} (folderId: {})", folder.path(), folder.id);
        Ok(folder)
    }

    pub async fn rename_folder(&self, folder: &Folder, name: &str) -> Result<()> {
        self.remote
            .update_folder(folder.id, name, folder.rank)
            .await
            .inspect_err(|e| tracing::error!("Failed to rename folder {}: {}", folder.path(), e))?;
        tracing::info!("Renamed folder {} to {} (folderId: {})", folder.path(), name, folder.id);
        Ok(())
    }

    pub async fn move_folder(&self, folder: &Folder, destination: &Folder) -> Result<()> {
        self.remote
            .move_folder(folder.id, destination.id)
            .await
            .inspect_err(|e| tracing::error!("Failed to move folder {}: {}", folder.path(), e))?;
        tracing::info!(
            "Moved folder {} under {} (folderId: {})",
            folder.path(),
            destination.name,
            folder.id
        );
        Ok(())
    }

    pub async fn delete_folder(&self, folder: &Folder) -> Result<()> {
        self.remote
            .delete_folder(folder.id)
            .await
            .inspect_err(|e| tracing::error!("Failed to delete folder {}: {}", folder.path(), e))?;
        tracing::info!("Deleted folder {} (folderId: {})", folder.path(), folder.id);
        Ok(())
    }
}
