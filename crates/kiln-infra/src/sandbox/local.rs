//! Local sandbox provider: one directory per workspace key under the data dir.
//!
//! Useful for development without a remote control plane. The sandbox id is
//! derived from the workspace key, so `create` is naturally idempotent.

use std::path::PathBuf;

use kiln_core::sandbox::{SandboxError, SandboxProvider};
use kiln_types::sandbox::SandboxId;
use sha2::{Digest, Sha256};

pub struct LocalSandboxProvider {
    root: PathBuf,
    domain: String,
}

impl LocalSandboxProvider {
    pub fn new(root: PathBuf, domain: &str) -> Self {
        Self {
            root,
            domain: domain.to_string(),
        }
    }

    /// `local-` followed by the first 16 hex chars of `sha256(workspace_key)`.
    pub fn sandbox_id_for(workspace_key: &str) -> SandboxId {
        let digest = Sha256::digest(workspace_key.as_bytes());
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        SandboxId::new(format!("local-{hex}"))
    }

    fn dir(&self, sandbox_id: &SandboxId) -> PathBuf {
        self.root.join(sandbox_id.as_str())
    }
}

impl SandboxProvider for LocalSandboxProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(&self, workspace_key: &str) -> Result<SandboxId, SandboxError> {
        let sandbox_id = Self::sandbox_id_for(workspace_key);
        tokio::fs::create_dir_all(self.dir(&sandbox_id))
            .await
            .map_err(|e| SandboxError::Unavailable(format!("create sandbox dir: {e}")))?;
        Ok(sandbox_id)
    }

    async fn host(&self, sandbox_id: &SandboxId, port: u16) -> Result<String, SandboxError> {
        match tokio::fs::metadata(self.dir(sandbox_id)).await {
            Ok(meta) if meta.is_dir() => Ok(super::port_host(port, sandbox_id.as_str(), &self.domain)),
            Ok(_) => Err(SandboxError::NotFound(sandbox_id.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SandboxError::NotFound(sandbox_id.clone()))
            }
            Err(e) => Err(SandboxError::Unavailable(e.to_string())),
        }
    }
}
