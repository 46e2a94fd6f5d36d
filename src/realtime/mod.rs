//! Real-time delivery module.
//!
//! Provides the connection registry, the live message protocol, and
//! best-effort notification fan-out.

pub mod fanout;
pub mod protocol;
pub mod registry;

pub use fanout::Notifier;
pub use protocol::{LiveMessage, MessageKind};
pub use registry::ConnectionRegistry;
