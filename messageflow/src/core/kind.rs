//! Message kinds and the byte flag set pipelines use to declare what they accept.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// The kind of a message flowing through a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageKind {
    /// A request to change state, handled by exactly one handler.
    Command = 1,
    /// A request for data with a typed result.
    Query = 2,
    /// A notification fanned out to any number of handlers.
    Event = 4,
}

impl MessageKind {
    /// Returns the flag bit for this kind.
    #[must_use]
    pub const fn bit(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Query => write!(f, "query"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// A set of [`MessageKind`]s stored as byte flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MessageKinds(u8);

impl MessageKinds {
    /// No kinds.
    pub const NONE: Self = Self(0);
    /// Commands only.
    pub const COMMAND: Self = Self(MessageKind::Command.bit());
    /// Queries only.
    pub const QUERY: Self = Self(MessageKind::Query.bit());
    /// Events only.
    pub const EVENT: Self = Self(MessageKind::Event.bit());
    /// Every kind.
    pub const ALL: Self = Self(
        MessageKind::Command.bit() | MessageKind::Query.bit() | MessageKind::Event.bit(),
    );

    /// Returns the raw flag byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if the set contains the kind.
    #[must_use]
    pub const fn contains(self, kind: MessageKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<MessageKind> for MessageKinds {
    fn from(kind: MessageKind) -> Self {
        Self(kind.bit())
    }
}

impl BitOr for MessageKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr<MessageKind> for MessageKinds {
    type Output = Self;

    fn bitor(self, rhs: MessageKind) -> Self {
        Self(self.0 | rhs.bit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(MessageKind::Command.to_string(), "command");
        assert_eq!(MessageKind::Event.to_string(), "event");
    }

    #[test]
    fn test_kinds_flags() {
        let kinds = MessageKinds::COMMAND | MessageKind::Event;

        assert!(kinds.contains(MessageKind::Command));
        assert!(kinds.contains(MessageKind::Event));
        assert!(!kinds.contains(MessageKind::Query));
        assert_eq!(kinds.bits(), 5);
        assert!(MessageKinds::NONE.is_empty());
        assert_eq!(MessageKinds::ALL.bits(), 7);
    }
}
