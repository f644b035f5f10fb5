//! Sandbox lifecycle: provisioning and addressing ephemeral environments.
//!
//! The manager only creates and addresses sandboxes. Expiry and teardown
//! belong to the provider's own lifecycle.

pub mod box_provider;
pub mod manager;
pub mod provider;

pub use manager::SandboxManager;
pub use provider::{SandboxError, SandboxProvider};
