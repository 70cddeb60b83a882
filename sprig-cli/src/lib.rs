//! # Sprig CLI Library
//!
//! The terminal-facing half of sprig: argument parsing, row rendering with
//! the color/icon annotations, and the live watch loop. The heavy lifting —
//! object-store reading, analytics, layout — lives in `sprig-core`.

pub mod cli;
pub mod display;
pub mod watch;

pub use cli::Cli;
pub use display::{RenderConfig, render};
pub use watch::{ChangeWatcher, watch_loop};
