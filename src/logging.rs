//! Structured logging helpers.
//!
//! The core never installs a logger itself; a binary or test that wants output installs one
//! (e.g. `env_logger`) the usual way. Every log line here follows the same
//! `[time LEVEL target] payload` shape, with `payload` a [`serde_json::json!`] value so that
//! logs remain greppable even once a model has many object types.

use colored::{Color, Colorize};

/// Colorizes a level tag the way the teacher crate's log lines do, for terminals that support it.
pub fn get_colored(level: &str, color: Color) -> colored::ColoredString {
    level.color(color)
}
