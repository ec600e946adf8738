//! Contact ID over IP core - event types, decoding and code tables
//!
//! This crate provides the foundational types for the receiver:
//!
//! - **Decoder**: turns one envelope line into a validated [`Event`]
//! - **Codes**: event code and qualifier description tables
//! - **Handler**: the trait decoded events are delivered to
//! - **Config**: receiver configuration loading

pub mod codes;
pub mod config;
pub mod decoder;
pub mod event;
pub mod handler;

// Re-export commonly used types
pub use codes::{describe_event_code, describe_qualifier, CodeTables};
pub use config::{ConfigLoader, ReceiverConfig};
pub use decoder::{decode, CidField, DecodeError, DecodeErrorKind, EventDecoder};
pub use event::Event;
pub use handler::{EventHandler, FnHandler};

/// Receiver version
pub const RECEIVER_VERSION: &str = env!("CARGO_PKG_VERSION");
