//! Global configuration types for Kiln.
//!
//! `KilnConfig` represents the top-level `config.toml` that controls the
//! model endpoint, the sandbox provider, workflow retry/timeout policy and
//! the HTTP server.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Kiln platform.
///
/// Loaded from `~/.kiln/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ---------------------------------------------------------------------------
// [agent]
// ---------------------------------------------------------------------------

/// Code-generating model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_agent_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_agent_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Replaces the built-in persona when set.
    #[serde(default)]
    pub system_policy: Option<String>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_agent_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_agent_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f64 {
    0.2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_agent_base_url(),
            api_key_env: default_agent_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_policy: None,
        }
    }
}

// ---------------------------------------------------------------------------
// [sandbox]
// ---------------------------------------------------------------------------

/// Which sandbox provider backs the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxProviderKind {
    /// Directory-per-workspace under the data dir; no remote control plane.
    #[default]
    Local,
    /// Remote control plane reached over HTTP.
    Http,
}

/// Sandbox provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub provider: SandboxProviderKind,
    /// Control-plane base URL (http provider only).
    #[serde(default = "default_sandbox_base_url")]
    pub base_url: String,
    #[serde(default = "default_sandbox_api_key_env")]
    pub api_key_env: String,
    /// Sandbox image/template name.
    #[serde(default = "default_template")]
    pub template: String,
    /// Public domain under which sandbox ports are exposed.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Service port inside the sandbox that serves the preview.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_sandbox_base_url() -> String {
    "https://api.sandbox.kiln.dev".to_string()
}

fn default_sandbox_api_key_env() -> String {
    "KILN_SANDBOX_API_KEY".to_string()
}

fn default_template() -> String {
    "nextjs-developer".to_string()
}

fn default_domain() -> String {
    "sandbox.kiln.dev".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl SandboxConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider: SandboxProviderKind::default(),
            base_url: default_sandbox_base_url(),
            api_key_env: default_sandbox_api_key_env(),
            template: default_template(),
            domain: default_domain(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// [workflow]
// ---------------------------------------------------------------------------

/// Retry and timeout policy applied by the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Attempts per step, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_provision_timeout_secs")]
    pub provision_timeout_secs: u64,
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
    #[serde(default = "default_persist_timeout_secs")]
    pub persist_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_provision_timeout_secs() -> u64 {
    60
}

fn default_agent_timeout_secs() -> u64 {
    300
}

fn default_resolve_timeout_secs() -> u64 {
    15
}

fn default_persist_timeout_secs() -> u64 {
    15
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            provision_timeout_secs: default_provision_timeout_secs(),
            agent_timeout_secs: default_agent_timeout_secs(),
            resolve_timeout_secs: default_resolve_timeout_secs(),
            persist_timeout_secs: default_persist_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// [server]
// ---------------------------------------------------------------------------

/// REST server and job worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Bounded job queue depth.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of concurrent workflow workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_queue_capacity() -> usize {
    256
}

fn default_workers() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
        }
    }
}
