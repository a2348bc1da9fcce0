//! Identifiers shared by every crate in the workspace.

pub mod enums;

pub use enums::*;
