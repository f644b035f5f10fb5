//! Generation workflow: durable, memoized step execution.
//!
//! - [`memo`]: Step Ledger wrapper that short-circuits completed steps and
//!   records new results before the pipeline moves on.
//! - [`retry`]: bounded exponential backoff and per-step timeouts.
//! - [`run_lock`]: per-run execution lock so redelivered events never run
//!   the same pipeline twice at once.
//! - [`engine`]: the fixed provision -> generate -> resolve -> persist pipeline.

pub mod engine;
pub mod memo;
pub mod retry;
pub mod run_lock;
