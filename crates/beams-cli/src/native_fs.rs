//! Checkout directory: the virtual tree's feature files mirrored on disk with tokio::fs.

use beams_core::{FsError, RemoteRepository, Workspace, WriteOptions};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Fs(#[from] FsError),
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Local directory holding one `<folder>/<folder>.feature` per remote folder.
pub struct Checkout {
    root: PathBuf,
}

impl Checkout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of a virtual path like `/Billing/Billing.feature`.
    pub fn full_path(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    /// Virtual path of a file under the checkout root.
    pub fn virtual_path(&self, full_path: &Path) -> Option<String> {
        let relative = full_path.strip_prefix(&self.root).ok()?;
        let mut path = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    path.push('/');
                    path.push_str(part.to_str()?);
                }
                _ => return None,
            }
        }
        if path.is_empty() { None } else { Some(path) }
    }

    pub async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full_path = self.full_path(path);
        match fs::read(&full_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckoutError::Io {
                path: full_path,
                source,
            }),
        }
    }

    pub async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if needed
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| CheckoutError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        fs::write(&full_path, content)
            .await
            .map_err(|source| CheckoutError::Io {
                path: full_path,
                source,
            })
    }

    /// Write every feature file of the workspace to disk. Returns the number written.
    pub async fn write_all<R: RemoteRepository>(&self, workspace: &mut Workspace<R>) -> Result<usize> {
        let paths = workspace.feature_files();
        for path in &paths {
            let content = workspace.read_file(path).await?;
            self.write(path, &content).await?;
        }
        tracing::info!("Checked out {} feature file(s) to {:?}", paths.len(), self.root);
        Ok(paths.len())
    }

    /// Feed local feature files into the workspace. Returns the paths that are dirty
    /// afterwards.
    pub async fn load_into<R: RemoteRepository>(&self, workspace: &mut Workspace<R>) -> Result<Vec<String>> {
        for path in workspace.feature_files() {
            match self.read(&path).await? {
                Some(content) => {
                    workspace
                        .write_file(&path, &content, WriteOptions::default())
                        .await?;
                }
                None => tracing::debug!("{} is not checked out", path),
            }
        }
        Ok(workspace.dirty_paths())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_mapping() {
        let checkout = Checkout::new(PathBuf::from("/tmp/checkout"));
        let full = checkout.full_path("/Billing/Billing.feature");
        assert_eq!(full, PathBuf::from("/tmp/checkout/Billing/Billing.feature"));
        assert_eq!(
            checkout.virtual_path(&full).as_deref(),
            Some("/Billing/Billing.feature")
        );
        assert_eq!(checkout.virtual_path(Path::new("/elsewhere/x.feature")), None);
        assert_eq!(checkout.virtual_path(Path::new("/tmp/checkout")), None);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = Checkout::new(dir.path().to_path_buf());
        assert!(checkout.read("/A/A.feature").await.unwrap().is_none());

        checkout.write("/A/A.feature", b"Feature: A").await.unwrap();
        assert_eq!(
            checkout.read("/A/A.feature").await.unwrap().as_deref(),
            Some(&b"Feature: A"[..])
        );
    }
}
