//! Multi-feed synchronization.
//!
//! Fan-in point for all price sources and book updates, and the sole
//! producer of `SynchronizedSnapshot`s: a dedicated publisher task
//! captures the latest-per-source state at a fixed cadence, pushes it
//! into a bounded ring, and hands it to the engine over a channel that
//! drops rather than blocks.

pub mod synchronizer;

pub use synchronizer::{LagStats, SyncConfig, Synchronizer};
