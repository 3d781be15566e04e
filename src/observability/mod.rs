//! Observability for the live channel
//!
//! Structured logging through `tracing`, with span macros for channel and
//! session context.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{channel_span, session_span};
