//! Stream adapters for the external feeds.
//!
//! Each adapter owns one feed on its own task, reconnects itself after a
//! configurable delay, and emits typed updates over a bounded channel.
//! Adapter errors are recoverable by reconnection and never surface to
//! the engine; observability is limited to the `StreamHealth` counters.
//!
//! - `SpotTradeStream`: direct spot-exchange trade stream
//! - `VenueStream`: venue multiplex stream (spot + oracle topics)
//! - `OracleRpcPoller`: on-chain aggregator poller
//! - `BookStream`: order-book subscriber for the working set's tokens
//! - `rest`: one-shot candle-open batch fetch

pub mod book;
pub mod error;
pub mod health;
pub mod oracle_rpc;
pub mod rest;
pub mod spot;
pub mod venue;

pub use book::{BookState, BookStream, BookStreamConfig};
pub use error::{StreamError, StreamResult};
pub use health::StreamHealth;
pub use oracle_rpc::{OracleRpcConfig, OracleRpcPoller};
pub use rest::fetch_interval_opens;
pub use spot::{SpotStreamConfig, SpotTradeStream};
pub use venue::{VenueStream, VenueStreamConfig};
