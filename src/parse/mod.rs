//! Command splitting and global-option parsing.

pub mod args;
pub mod tokenize;

pub use args::{ArgSpec, ParsedArgs};
pub use tokenize::{base_command, split_command, tokenize};
