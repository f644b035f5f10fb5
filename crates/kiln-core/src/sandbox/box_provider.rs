//! BoxSandboxProvider -- object-safe wrapper so the provider can be chosen
//! from configuration at runtime.

use std::future::Future;
use std::pin::Pin;

use kiln_types::sandbox::SandboxId;

use super::provider::{SandboxError, SandboxProvider};

/// Object-safe version of [`SandboxProvider`] with boxed futures.
pub trait SandboxProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn create_boxed<'a>(
        &'a self,
        workspace_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SandboxId, SandboxError>> + Send + 'a>>;

    fn host_boxed<'a>(
        &'a self,
        sandbox_id: &'a SandboxId,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<String, SandboxError>> + Send + 'a>>;
}

impl<T: SandboxProvider> SandboxProviderDyn for T {
    fn name(&self) -> &str {
        SandboxProvider::name(self)
    }

    fn create_boxed<'a>(
        &'a self,
        workspace_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SandboxId, SandboxError>> + Send + 'a>> {
        Box::pin(self.create(workspace_key))
    }

    fn host_boxed<'a>(
        &'a self,
        sandbox_id: &'a SandboxId,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<String, SandboxError>> + Send + 'a>> {
        Box::pin(self.host(sandbox_id, port))
    }
}

/// Type-erased sandbox provider.
pub struct BoxSandboxProvider {
    inner: Box<dyn SandboxProviderDyn + Send + Sync>,
}

impl BoxSandboxProvider {
    pub fn new<T: SandboxProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }
}

impl SandboxProvider for BoxSandboxProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create(&self, workspace_key: &str) -> Result<SandboxId, SandboxError> {
        self.inner.create_boxed(workspace_key).await
    }

    async fn host(&self, sandbox_id: &SandboxId, port: u16) -> Result<String, SandboxError> {
        self.inner.host_boxed(sandbox_id, port).await
    }
}
