//! Contact ID over IP server
//!
//! - **Listener**: accepts panel connections, one task per connection
//! - **Session**: reads lines, decodes them, delivers events and acknowledges
//! - **Stats**: counters shared between the two

pub mod listener;
pub mod session;
pub mod stats;

pub use listener::{ContactIdServer, ListenerConfig};
pub use session::{ConnectionSession, SessionConfig, SessionOutcome, SessionReport};
pub use stats::{ServerStats, StatsSnapshot};
