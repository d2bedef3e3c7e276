//! Outbound reading stream for external consumers

pub mod messages;
pub mod publisher;

pub use messages::ReadingMessage;
pub use publisher::ReadingPublisher;
