//! Core domain model types for messageflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Message kinds and the accepted-kinds flag set
//! - The processing status state machine
//! - Type identity keys and the payload abstraction

mod kind;
mod payload;
mod status;

pub use kind::{MessageKind, MessageKinds};
pub use payload::{Payload, TypeKey};
pub use status::ProcessingStatus;
