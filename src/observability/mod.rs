//! Observability: structured logging setup and span macros

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use logging::{stage_span, tool_span, turn_span};
