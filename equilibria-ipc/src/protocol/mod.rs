//! Protocol-level message definitions: envelope types, acks and the
//! typed payloads of each command.

pub mod ack;
pub mod message;
pub mod payload;

pub use ack::{Ack, AckStatus};
pub use message::MessageType;
pub use payload::{SetModeRequest, SetTargetsRequest};
