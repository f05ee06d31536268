//! autoclock library: the clocking workflow, its Telegram front end and
//! the stores it reads from. `main.rs` wires these into the CLI.

pub mod browser;
pub mod channel;
pub mod command;
pub mod config;
pub mod daemon;
pub mod guard;
pub mod secrets;
pub mod session;
pub mod steps;
