//! Configuration loader for Kiln.
//!
//! Reads `config.toml` from the data directory (`~/.kiln/` unless
//! `KILN_DATA_DIR` says otherwise) into [`KilnConfig`]. A missing or
//! malformed file falls back to defaults.

use std::path::{Path, PathBuf};

use kiln_types::config::KilnConfig;

/// Env var overriding the data directory.
pub const DATA_DIR_ENV: &str = "KILN_DATA_DIR";

/// Resolve the data directory: `KILN_DATA_DIR`, else `~/.kiln`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kiln")
}

/// Load `{data_dir}/config.toml`.
///
/// - Missing file: [`KilnConfig::default()`].
/// - Unreadable or unparsable file: logs a warning, returns the default.
pub async fn load_config(data_dir: &Path) -> KilnConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return KilnConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return KilnConfig::default();
        }
    };

    match toml::from_str::<KilnConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            KilnConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::config::SandboxProviderKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.agent.model, "gpt-4o");
        assert_eq!(config.workflow.max_attempts, 3);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[sandbox]
provider = "http"
domain = "preview.example.com"

[server]
workers = 8
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.sandbox.provider, SandboxProviderKind::Http);
        assert_eq!(config.sandbox.domain, "preview.example.com");
        assert_eq!(config.server.workers, 8);
        assert_eq!(config.server.port, 3000);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.sandbox.provider, SandboxProviderKind::Local);
    }
}
