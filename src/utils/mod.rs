//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Command execution with error handling
//! - `template` - `{{name}}` template rendering

pub mod command;
pub mod template;
