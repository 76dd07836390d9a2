//! Telemetry: structured logging and the engine event channel.

pub mod events;
pub mod logging;

pub use events::{EngineEvent, EventBus};
pub use logging::init_logging;
