//! Sandbox Lifecycle Manager.

use kiln_types::sandbox::SandboxId;

use super::provider::{SandboxError, SandboxProvider};

/// Creates and addresses sandboxes through a [`SandboxProvider`].
///
/// Provisioning is keyed by a stable workspace key (the run id), so a
/// replayed provision step gets the same sandbox back instead of a second
/// one. Address resolution is a pure lookup with no new side effect.
pub struct SandboxManager<S: SandboxProvider> {
    provider: S,
}

impl<S: SandboxProvider> SandboxManager<S> {
    pub fn new(provider: S) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &S {
        &self.provider
    }

    /// Create (or reuse) the sandbox for `workspace_key`.
    pub async fn provision(&self, workspace_key: &str) -> Result<SandboxId, SandboxError> {
        if workspace_key.trim().is_empty() {
            return Err(SandboxError::Rejected("workspace key is empty".into()));
        }

        let sandbox_id = self.provider.create(workspace_key).await?;
        tracing::info!(
            provider = self.provider.name(),
            workspace_key,
            sandbox_id = %sandbox_id,
            "sandbox provisioned"
        );
        Ok(sandbox_id)
    }

    /// Externally reachable URL for `port` inside `sandbox_id`.
    ///
    /// Fails with [`SandboxError::NotFound`] once the sandbox has expired.
    pub async fn resolve_address(
        &self,
        sandbox_id: &SandboxId,
        port: u16,
    ) -> Result<String, SandboxError> {
        let host = self.provider.host(sandbox_id, port).await?;
        let url = to_url(&host);
        tracing::debug!(sandbox_id = %sandbox_id, port, url = %url, "resolved sandbox address");
        Ok(url)
    }
}

/// Providers return a bare host; anything already carrying a scheme is
/// passed through unchanged.
fn to_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}
