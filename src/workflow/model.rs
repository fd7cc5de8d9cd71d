//! Workflow Data Model
//!
//! Core data structures representing a declarative workflow and the
//! module steps materialized from it.
//!
//! # Example YAML Format
//!
//! ```yaml
//! run_dir: run1
//! molecules:
//!   - receptor.pdb
//!   - ligand.pdb
//! ncores: 8
//!
//! topoaa:
//!   autohis: true
//!
//! rigidbody:
//!   sampling: 1000
//!   ambig_fname: restraints/ambig.tbl
//!
//! seletop:
//!   select: 200
//!
//! flexref:
//!   ambig_fname: restraints/ambig.tbl
//!
//! flexref.2:
//!   sampling_factor: 2
//! ```
//!
//! Top-level keys that are not general parameters are step keys; their
//! order in the file is the execution order.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Parameter name to value mapping for a single step.
pub type ParamSet = IndexMap<String, Value>;

/// General parameters that must be present in every configuration.
pub const MANDATORY_GENERAL_PARAMS: &[&str] = &["run_dir", "molecules"];

/// General parameters that may be omitted.
pub const OPTIONAL_GENERAL_PARAMS: &[&str] =
    &["ncores", "mode", "batch_submit", "continue_on_error"];

/// Parameters any module accepts in addition to its own defaults.
pub const MODULE_WIDE_PARAMS: &[&str] = &["ncores", "mode"];

/// Default command used to hand job scripts to a batch scheduler.
pub const DEFAULT_BATCH_SUBMIT: &str = "sbatch --wait";

/// Returns the module name of a step key.
///
/// A module may appear several times in one workflow by suffixing its key
/// (`flexref`, `flexref.2`); the module name is everything before the
/// first `.`.
///
/// ```
/// use dockrunner::workflow::model::module_name;
///
/// assert_eq!(module_name("flexref.2"), "flexref");
/// assert_eq!(module_name("seletop"), "seletop");
/// ```
pub fn module_name(step_key: &str) -> &str {
    step_key.split('.').next().unwrap_or(step_key)
}

/// Returns true if `key` is a reserved general parameter.
pub fn is_general_key(key: &str) -> bool {
    MANDATORY_GENERAL_PARAMS.contains(&key) || OPTIONAL_GENERAL_PARAMS.contains(&key)
}

/// A parsed, not yet validated workflow configuration.
///
/// Keeps every top-level entry in declaration order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct WorkflowConfig {
    pub entries: IndexMap<String, Value>,
}

impl WorkflowConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends or replaces a top-level entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Returns the general parameter entries in declaration order.
    pub fn general_entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().filter(|(k, _)| is_general_key(k))
    }

    /// Returns the step entries in declaration order.
    pub fn step_entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().filter(|(k, _)| !is_general_key(k))
    }
}

/// How a module's external work is launched.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Run job scripts directly on this machine.
    #[default]
    Local,
    /// Hand job scripts to a blocking batch submission command.
    Batch,
}

impl Mode {
    /// Parses a mode name as written in the configuration.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(Self::Local),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

/// Typed view of the general parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeneralParams {
    /// Run directory as written in the configuration
    pub run_dir: PathBuf,
    /// Input molecules handed to the topology step
    pub molecules: Vec<PathBuf>,
    /// Cores made available to each step
    pub ncores: usize,
    /// Launch mode for external work
    pub mode: Mode,
    /// Submission command used in batch mode
    pub batch_submit: String,
    /// Keep going after a failed step
    pub continue_on_error: bool,
}

/// One step declared in the configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepEntry {
    /// Step key as written (`flexref.2`)
    pub key: String,
    /// Registered module name (`flexref`)
    pub module: String,
    /// User-supplied parameters
    pub params: ParamSet,
}

/// A configuration that passed validation.
///
/// Only the validator constructs this type, so holding one proves the
/// mandatory parameters are present and every step names a known module
/// with known parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    general: GeneralParams,
    steps: Vec<StepEntry>,
}

impl ValidatedConfig {
    pub(crate) fn new(general: GeneralParams, steps: Vec<StepEntry>) -> Self {
        Self { general, steps }
    }

    /// Returns the typed general parameters.
    pub fn general(&self) -> &GeneralParams {
        &self.general
    }

    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[StepEntry] {
        &self.steps
    }
}

/// A step materialized into the run layout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModuleStep {
    /// 0-based execution position
    pub index: usize,
    /// Step key as declared in the configuration
    pub key: String,
    /// Registered module name
    pub module: String,
    /// Zero-padded folder name (`03_flexref`)
    pub dir_name: String,
    /// Parameters; file-valued entries point into the data directory
    /// once staged
    pub params: ParamSet,
}

impl ModuleStep {
    /// Creates a step with an empty parameter set.
    pub fn new(
        index: usize,
        key: impl Into<String>,
        module: impl Into<String>,
        dir_name: impl Into<String>,
    ) -> Self {
        Self {
            index,
            key: key.into(),
            module: module.into(),
            dir_name: dir_name.into(),
            params: ParamSet::new(),
        }
    }

    /// Sets a parameter value.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Folder holding this step's working files.
    pub fn workdir(&self, run_dir: &Path) -> PathBuf {
        run_dir.join(&self.dir_name)
    }

    /// Folder holding this step's staged inputs.
    pub fn data_dir(&self, run_dir: &Path) -> PathBuf {
        run_dir.join(crate::rundir::DATA_DIR).join(&self.dir_name)
    }
}
