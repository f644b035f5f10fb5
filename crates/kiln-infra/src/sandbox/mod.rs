//! Sandbox provider implementations.
//!
//! [`create_provider`] selects the backend named in `[sandbox].provider` and
//! returns it type-erased, so the engine is built once for either backend.

pub mod http;
pub mod local;

use std::path::Path;

use kiln_core::sandbox::SandboxError;
use kiln_core::sandbox::box_provider::BoxSandboxProvider;
use kiln_types::config::{SandboxConfig, SandboxProviderKind};
use secrecy::SecretString;

use self::http::HttpSandboxProvider;
use self::local::LocalSandboxProvider;

/// Build the configured sandbox provider.
///
/// The http backend reads its API key from the env var named by
/// `api_key_env`; a missing key is a configuration error.
pub fn create_provider(
    config: &SandboxConfig,
    data_dir: &Path,
) -> Result<BoxSandboxProvider, SandboxError> {
    match config.provider {
        SandboxProviderKind::Local => Ok(BoxSandboxProvider::new(LocalSandboxProvider::new(
            data_dir.join("sandboxes"),
            &config.domain,
        ))),
        SandboxProviderKind::Http => {
            let key = std::env::var(&config.api_key_env).map_err(|_| {
                SandboxError::Rejected(format!("{} is not set", config.api_key_env))
            })?;
            let provider = HttpSandboxProvider::new(config, SecretString::from(key))?;
            Ok(BoxSandboxProvider::new(provider))
        }
    }
}

/// `{port}-{sandbox_id}.{domain}`
pub(crate) fn port_host(port: u16, sandbox_id: &str, domain: &str) -> String {
    format!("{port}-{sandbox_id}.{}", domain.trim_matches('.'))
}
