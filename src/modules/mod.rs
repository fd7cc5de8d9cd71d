//! Module Registry
//!
//! Each workflow step is backed by a module. The orchestrator only talks to
//! modules through the [`Module`] capability interface and looks them up
//! in an explicit [`ModuleRegistry`] that callers build and pass around.
//!
//! # Built-in modules
//!
//! | Module          | Category   | Runs through           |
//! |-----------------|------------|------------------------|
//! | `topoaa`        | topology   | `cns` engine           |
//! | `rigidbody`     | sampling   | `cns` engine           |
//! | `flexref`       | refinement | `cns` engine           |
//! | `emref`         | refinement | `cns` engine           |
//! | `caprieval`     | analysis   | `caprieval` engine     |
//! | `clustfcc`      | analysis   | `fcc` engine           |
//! | `seletop`       | analysis   | in-process selection   |
//! | `seletopclusts` | analysis   | in-process selection   |

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::execution::artifact::StepOutput;
use crate::execution::backend::{ComputeBackend, Invocation, StepResult};
use crate::workflow::model::{ParamSet, MODULE_WIDE_PARAMS};

pub mod engine;
pub mod seletop;
pub mod seletopclusts;

pub use engine::EngineModule;
pub use seletop::SelectTop;
pub use seletopclusts::SelectTopClusters;

/// Default schemas shipped with the built-in modules.
const BUILTIN_DEFAULTS: &[(&str, &str)] = &[
    ("topoaa", include_str!("defaults/topoaa.yaml")),
    ("rigidbody", include_str!("defaults/rigidbody.yaml")),
    ("flexref", include_str!("defaults/flexref.yaml")),
    ("emref", include_str!("defaults/emref.yaml")),
    ("caprieval", include_str!("defaults/caprieval.yaml")),
    ("clustfcc", include_str!("defaults/clustfcc.yaml")),
    ("seletop", include_str!("defaults/seletop.yaml")),
    ("seletopclusts", include_str!("defaults/seletopclusts.yaml")),
];

static DEFAULTS: Lazy<HashMap<&'static str, ParamSet>> = Lazy::new(|| {
    BUILTIN_DEFAULTS
        .iter()
        .map(|(name, yaml)| {
            let params: ParamSet =
                serde_yaml::from_str(yaml).expect("embedded module defaults are valid YAML");
            (*name, params)
        })
        .collect()
});

static NO_DEFAULTS: Lazy<ParamSet> = Lazy::new(ParamSet::new);

/// Returns the embedded default schema of a built-in module.
pub fn builtin_defaults(name: &str) -> &'static ParamSet {
    DEFAULTS.get(name).unwrap_or(&*NO_DEFAULTS)
}

/// Stage of the pipeline a module belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Topology,
    Sampling,
    Refinement,
    Analysis,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Topology => "topology",
            Self::Sampling => "sampling",
            Self::Refinement => "refinement",
            Self::Analysis => "analysis",
        };
        f.write_str(name)
    }
}

/// What a module sees while it runs.
#[derive(Debug, Clone)]
pub struct StepContext<'a> {
    pub index: usize,
    /// Step folder name
    pub step: &'a str,
    /// Absolute run directory
    pub run_dir: &'a Path,
    /// Defaults overlaid with the step's parameters
    pub params: &'a ParamSet,
    pub ncores: usize,
    /// Output of the preceding completed step
    pub input: &'a StepOutput,
}

impl StepContext<'_> {
    /// Absolute step folder.
    pub fn workdir(&self) -> PathBuf {
        self.run_dir.join(self.step)
    }

    /// Reads a non-negative integer parameter.
    pub fn param_usize(&self, name: &str) -> Result<usize, String> {
        let value = self
            .params
            .get(name)
            .ok_or_else(|| format!("missing parameter '{}'", name))?;
        value
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| format!("parameter '{}' must be a non-negative integer", name))
    }

    /// Builds the invocation unit handed to a compute backend.
    pub fn invocation(&self, module: &str, executable: PathBuf) -> Invocation {
        Invocation {
            module: module.to_string(),
            step: self.step.to_string(),
            index: self.index,
            run_dir: self.run_dir.to_path_buf(),
            executable,
            ncores: self.ncores,
            params: self.params.clone(),
            input: self.input.clone(),
        }
    }
}

/// Capability interface every module implements.
pub trait Module: Send + Sync {
    /// Registered name, also used in step folder names.
    fn name(&self) -> &str;

    fn category(&self) -> Category;

    /// Default parameter schema; also the set of accepted parameter names.
    fn defaults(&self) -> &ParamSet;

    /// Returns the parameter names this module does not accept.
    fn validate_params(&self, params: &ParamSet) -> Vec<String> {
        let defaults = self.defaults();
        params
            .keys()
            .filter(|k| !defaults.contains_key(*k) && !MODULE_WIDE_PARAMS.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// Checks that the module's third-party dependencies are available.
    fn confirm_installation(&self) -> Result<(), String>;

    /// Whether the module can consume a branched predecessor output.
    fn accepts_branched_input(&self) -> bool {
        false
    }

    /// Defaults overlaid with the step's own parameters.
    fn merged_params(&self, params: &ParamSet) -> ParamSet {
        let mut merged = self.defaults().clone();
        for (name, value) in params {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    /// Runs the module and publishes its ordered output.
    fn execute(&self, ctx: &StepContext<'_>, backend: &dyn ComputeBackend)
        -> StepResult<StepOutput>;
}

/// Explicit name to module mapping.
pub struct ModuleRegistry {
    modules: IndexMap<String, Box<dyn Module>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            modules: IndexMap::new(),
        }
    }

    /// Creates a registry holding every built-in module.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for module in engine::builtin_engine_modules() {
            registry.register(Box::new(module));
        }
        registry.register(Box::new(SelectTop::new()));
        registry.register(Box::new(SelectTopClusters::new()));
        registry
    }

    /// Adds a module, replacing any module with the same name.
    pub fn register(&mut self, module: Box<dyn Module>) -> Option<Box<dyn Module>> {
        self.modules.insert(module.name().to_string(), module)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.modules.get(name).map(|m| m.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Registered module names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
