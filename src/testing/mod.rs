//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for testing the live channel
//! without a WebSocket server.

pub mod mocks;

pub use mocks::*;
