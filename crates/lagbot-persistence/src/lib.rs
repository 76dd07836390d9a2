//! Snapshot spooling for offline analysis.
//!
//! Observational only: synchronizer snapshots are appended to daily
//! JSON Lines files and never replayed.

pub mod error;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use writer::{SnapshotRecord, SnapshotSpooler};
