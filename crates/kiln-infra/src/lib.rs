//! Infrastructure layer for Kiln.
//!
//! Implements the ports defined in `kiln-core`: SQLite storage for projects,
//! messages, fragments and the Step Ledger; sandbox providers; the
//! OpenAI-compatible model client; and the TOML config loader.

pub mod config;
pub mod llm;
pub mod sandbox;
pub mod sqlite;
