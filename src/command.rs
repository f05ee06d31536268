//! Inbound command events and the clocking vocabulary.

use chrono::{DateTime, Utc};

/// A text command received from the chat channel.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub text: String,
    /// Identity compared against the stored authorized id.
    pub sender_id: i64,
    /// Where replies go.
    pub chat_id: i64,
    pub timestamp: DateTime<Utc>,
}

/// Which way to toggle the clocking control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Parse `in` / `out`, ignoring case and surrounding whitespace.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("in") {
            Some(Self::In)
        } else if text.eq_ignore_ascii_case("out") {
            Some(Self::Out)
        } else {
            None
        }
    }

    /// Lowercase phrase the portal shows once in this state.
    pub fn phrase(self) -> &'static str {
        match self {
            Self::In => "clocked in",
            Self::Out => "clocked out",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Self::In => "clock in",
            Self::Out => "clock out",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
        }
    }
}
