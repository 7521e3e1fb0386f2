//! CLI-specific functionality for the `world` binary
//!
//! This module contains argument parsing and the line printer used as the
//! display sink for process state events.

pub mod args;
pub mod render;

pub use args::{Args, BuildConfig, Commands, EvmCommands, ExecutionMode, StartConfig};
pub use render::{format_state, spawn_printer};
