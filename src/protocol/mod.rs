//! Wire-level message types for the courier push channels
//!
//! This module defines the inbound envelope the backend pushes, the closed
//! set of message kinds the channel dispatches on, outbound helper messages,
//! and builders for the endpoint paths the backend exposes.

pub mod endpoints;
pub mod messages;

pub use endpoints::*;
pub use messages::*;
