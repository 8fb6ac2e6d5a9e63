//! Filesystem document storage
//!
//! Files live under `<root>/<org>/<ulid>`; the reference handed out is the `<org>/<ulid>` part.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::DocumentStorage;
use crate::core_types::{DocumentRef, OrgId};
use crate::error::{RegistryError, Result};

pub struct FsDocuments {
    root: PathBuf,
}

impl FsDocuments {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve a reference, refusing anything outside the caller's organization directory.
    fn resolve(&self, org: OrgId, reference: &DocumentRef) -> Result<PathBuf> {
        let prefix = format!("{}/", org);
        let name = reference
            .0
            .strip_prefix(&prefix)
            .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric()))
            .ok_or_else(|| RegistryError::not_found("document", reference))?;
        Ok(self.root.join(org.to_string()).join(name))
    }
}

fn io_error(e: std::io::Error) -> RegistryError {
    RegistryError::Storage(format!("document storage: {}", e))
}

#[async_trait]
impl DocumentStorage for FsDocuments {
    async fn store(&self, org: OrgId, bytes: Vec<u8>) -> Result<DocumentRef> {
        let dir = self.root.join(org.to_string());
        tokio::fs::create_dir_all(&dir).await.map_err(io_error)?;

        let name = ulid::Ulid::new().to_string();
        tokio::fs::write(dir.join(&name), bytes)
            .await
            .map_err(io_error)?;
        Ok(DocumentRef(format!("{}/{}", org, name)))
    }

    async fn fetch(&self, org: OrgId, reference: &DocumentRef) -> Result<Vec<u8>> {
        let path = self.resolve(org, reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RegistryError::not_found("document", reference))
            }
            Err(e) => Err(io_error(e)),
        }
    }

    async fn contains(&self, org: OrgId, reference: &DocumentRef) -> Result<bool> {
        let Ok(path) = self.resolve(org, reference) else {
            return Ok(false);
        };
        tokio::fs::try_exists(&path).await.map_err(io_error)
    }

    async fn remove(&self, org: OrgId, reference: &DocumentRef) -> Result<()> {
        let Ok(path) = self.resolve(org, reference) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_error(e)),
            _ => Ok(()),
        }
    }
}
