//! dockrunner - Docking Workflow Orchestrator
//!
//! Prepares and executes multi-stage computational docking workflows. Each
//! stage is a module; the heavy computation of a module is delegated to an
//! external engine, while this crate owns the run directory: validation,
//! deterministic step numbering, input staging, restart and copy.
//!
//! # Architecture
//!
//! - [`workflow`]: Configuration model, parsing, validation and planning
//! - [`modules`]: Module capability interface and the built-in registry
//! - [`rundir`]: Staging, restart truncation and step copy on disk
//! - [`execution`]: Sequential execution chain and compute backends
//! - [`environment`]: Engine executable lookup
//! - [`monitoring`]: Execution timeline
//! - [`error`]: The crate error type
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use dockrunner::execution::{ExecutionChain, ShellBackend};
//! use dockrunner::modules::ModuleRegistry;
//! use dockrunner::rundir::prepare_run;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ModuleRegistry::builtin();
//!
//!     // Validate, plan and stage
//!     let run = prepare_run(Path::new("docking.yaml"), None, &registry, false)?;
//!
//!     // Execute every step
//!     let backend = ShellBackend::new(run.general.mode, run.general.batch_submit.clone());
//!     let chain = ExecutionChain::new(&registry, Box::new(backend));
//!     chain.run(&run.run_dir, &run.steps, run.restart_from, run.general.ncores)?;
//!     Ok(())
//! }
//! ```

pub mod environment;
pub mod error;
pub mod execution;
pub mod modules;
pub mod monitoring;
pub mod rundir;
pub mod workflow;

// Re-export commonly used types
pub use error::{Result, RunnerError};
pub use execution::ExecutionChain;
pub use modules::{Module, ModuleRegistry};
pub use rundir::{copy_steps, prepare_run, truncate};
pub use workflow::{load_config, ModuleStep, WorkflowConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "dockrunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "dockrunner");
    }

    #[test]
    fn test_builtin_registry_export() {
        let registry = ModuleRegistry::default();
        assert!(registry.contains("topoaa"));
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
