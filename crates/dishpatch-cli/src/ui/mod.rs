//! Terminal UI helpers.

pub mod output;
pub mod prompts;

pub use output::*;
