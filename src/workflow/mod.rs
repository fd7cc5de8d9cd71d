//! Workflow Definition Module
//!
//! Provides data structures and utilities for loading, validating and
//! planning declarative docking workflows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (WorkflowConfig, ModuleStep)
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Validation against the module registry
//! - [`planner`]: Step ordering and folder naming

pub mod model;
pub mod parser;
pub mod planner;
pub mod validator;

pub use model::{GeneralParams, ModuleStep, ValidatedConfig, WorkflowConfig};
pub use parser::load_config;
pub use planner::{plan, zero_fill, ZeroFill};
pub use validator::{validate, validate_installed_modules};
