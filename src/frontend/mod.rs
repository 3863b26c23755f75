//! Console front end
//!
//! A headless consumer of the recorder: it reads commands from stdin, calls
//! the [`SessionController`](crate::session::SessionController) control
//! operations, and polls snapshots on its own fixed interval for display.
//!
//! # Submodules
//!
//! - [`commands`] - Command line parsing
//! - [`status`] - Text and JSON rendering of a snapshot
//! - [`console`] - The select loop over commands and the refresh tick

pub mod commands;
pub mod console;
pub mod status;

pub use commands::{ConsoleCommand, ParseCommandError, HELP};
pub use console::{spawn_stdin_reader, Console, Flow};
