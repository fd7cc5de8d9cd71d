//! Workflow Execution Module
//!
//! Runs the steps of a prepared run directory and carries each step's
//! output to the next.
//!
//! # Architecture
//!
//! - [`chain`]: Sequential step executor and its report
//! - [`artifact`]: Produced artifacts and the `io.json` handoff record
//! - [`backend`]: Invocation units and the backends that run them
//! - [`selection`]: Score-based top-K selection

pub mod artifact;
pub mod backend;
pub mod chain;
pub mod selection;

pub use artifact::{FileType, ProducedArtifact, StepOutput};
pub use backend::{ComputeBackend, DryRunBackend, Invocation, ShellBackend};
pub use chain::{ChainReport, ExecutionChain, StepRecord, StepStatus};
pub use selection::{select_top, Selection};
