//! Text user interface
//!
//! Presentation stays outside the controller: it only reads snapshots and
//! turns typed lines into commands.

pub mod console;
pub mod player;

pub use console::{parse_line, ConsoleInput};
pub use player::{render, status_line};
