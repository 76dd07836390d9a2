//! Execution interface.
//!
//! The engine drives orders through the narrow `ExecutionClient` trait;
//! the live venue client lives outside the core. `DryRunExecutor`
//! synthesizes fills for paper trading and tests.

pub mod client;

pub use client::{DryRunExecutor, ExecutionClient};
