//! The three browser steps of a clocking session.
//!
//! Each step returns a typed outcome by value. Login and navigation release
//! the session themselves when they fail; the clock step never does.

pub mod clock;
pub mod login;
pub mod navigate;

/// User-facing text for an unexpected driver fault.
pub(crate) fn error_message(error: &impl std::fmt::Display) -> String {
    format!("An error occurred: {error}. Please retry.")
}
