//! Run Directory Management
//!
//! Everything that creates, inspects or mutates a run directory on disk.
//!
//! # Layout
//!
//! ```text
//! run1/
//! ├── 00_topoaa/
//! ├── 01_rigidbody/
//! ├── 02_seletop/
//! └── data/
//!     ├── 00_topoaa/
//!     ├── 01_rigidbody/
//!     └── 02_seletop/
//! ```
//!
//! - [`layout`]: Scanning and consistency of step and data folders
//! - [`staging`]: Copying input files into the data directory
//! - [`restart`]: Truncating a run before re-execution
//! - [`copy`]: Deriving a new run from selected steps
//! - [`prepare`]: The full preparation pipeline used by `run`
//!
//! A run directory has a single writer. Nothing here locks it.

pub mod copy;
pub mod layout;
pub mod prepare;
pub mod restart;
pub mod staging;

/// Name of the data directory inside a run directory.
pub const DATA_DIR: &str = "data";

pub use copy::{copy_steps, replace_longest_first, CopyReport};
pub use layout::{RunLayout, StepFolder};
pub use prepare::{prepare_run, PreparedRun};
pub use restart::{truncate, TruncateReport};
pub use staging::{check_inputs, is_file_param, stage, stage_from, StagedArtifact, StagedRun};
