//! Shared domain types for Kiln.
//!
//! This crate contains the core domain types used across the Kiln platform:
//! Project, Message, Fragment, the workflow job/step model, agent output
//! shapes, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror,
//! schemars and sha2.

pub mod agent;
pub mod config;
pub mod error;
pub mod fragment;
pub mod llm;
pub mod message;
pub mod project;
pub mod sandbox;
pub mod workflow;
