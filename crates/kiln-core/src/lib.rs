//! Business logic and port definitions for Kiln.
//!
//! This crate defines the "ports" (repository, sandbox, LLM and job queue
//! traits) that the infrastructure layer implements, plus the generation
//! workflow built on top of them. It depends only on `kiln-types` -- never on
//! `kiln-infra` or any database/IO crate.

pub mod agent;
pub mod artifact;
pub mod llm;
pub mod repository;
pub mod sandbox;
pub mod service;
pub mod tree;
pub mod workflow;

#[cfg(test)]
mod testing;
