//! Command implementations for the Runway CLI.

pub mod groups;
pub mod train;
pub mod types;

pub use types::{GroupsCommand, RunArgs, Stage};
