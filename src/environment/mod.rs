//! Environment Module
//!
//! Locates the external engine executables that modules delegate to.

pub mod executables;

pub use executables::{find_executable, find_in_paths, override_var};
