//! Workflow Validation
//!
//! Checks a parsed configuration against the module registry:
//! - Mandatory general parameters are present and well typed
//! - Every step key names a registered module
//! - Every step parameter is known to its module
//!
//! Validation is pure. All problems found are reported together in a single
//! [`RunnerError::Configuration`], one per line.
//!
//! Installation checks are a separate pass ([`validate_installed_modules`])
//! so that a configuration can be validated on a machine without the
//! engines installed.

use std::collections::HashSet;
use std::path::PathBuf;

use log::{debug, info, warn};
use serde_yaml::Value;
use thiserror::Error;

use super::model::{
    module_name, GeneralParams, Mode, ParamSet, StepEntry, ValidatedConfig, WorkflowConfig,
    DEFAULT_BATCH_SUBMIT, MANDATORY_GENERAL_PARAMS,
};
use crate::error::{Result, RunnerError};
use crate::modules::{Category, ModuleRegistry};

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Error)]
enum ValidationError {
    #[error("Parameter '{0}' is not defined")]
    MissingGeneral(&'static str),

    #[error("Parameter '{name}' {expected}")]
    BadGeneral { name: String, expected: &'static str },

    #[error("Workflow declares no modules")]
    EmptyWorkflow,

    #[error("Step '{0}': module '{1}' is not a registered module")]
    UnknownModule(String, String),

    #[error("Step '{0}': parameters must be a mapping")]
    NotAMapping(String),

    #[error("Step '{0}': parameter names must be strings")]
    NonStringKey(String),

    #[error("Step '{step}': unexpected parameter(s) for module '{module}': {}", .params.join(", "))]
    UnknownParams {
        step: String,
        module: String,
        params: Vec<String>,
    },

    #[error("Step '{step}': parameter '{name}' {expected}")]
    BadStepParam {
        step: String,
        name: &'static str,
        expected: &'static str,
    },
}

/// Validates a configuration against the registry.
///
/// Returns the configuration in typed form. `ncores` defaults to the number
/// of CPUs and is capped at it.
pub fn validate(config: &WorkflowConfig, registry: &ModuleRegistry) -> Result<ValidatedConfig> {
    info!("Validating workflow configuration");

    let mut errors = Vec::new();

    for &name in MANDATORY_GENERAL_PARAMS {
        if !config.entries.contains_key(name) {
            errors.push(ValidationError::MissingGeneral(name));
        }
    }

    let general = general_params(config, &mut errors);

    let mut steps = Vec::new();
    for (key, value) in config.step_entries() {
        let module = module_name(key);
        let Some(handler) = registry.get(module) else {
            errors.push(ValidationError::UnknownModule(key.clone(), module.to_string()));
            continue;
        };

        let params = match step_params(key, value) {
            Ok(params) => params,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        check_module_wide_params(key, &params, &mut errors);

        let unknown = handler.validate_params(&params);
        if !unknown.is_empty() {
            errors.push(ValidationError::UnknownParams {
                step: key.clone(),
                module: module.to_string(),
                params: unknown,
            });
        }

        debug!("Step '{}' uses module '{}'", key, module);
        steps.push(StepEntry {
            key: key.clone(),
            module: module.to_string(),
            params,
        });
    }

    if config.step_entries().next().is_none() {
        errors.push(ValidationError::EmptyWorkflow);
    }

    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(RunnerError::config(messages.join("\n")));
    }

    if let Some(first) = steps.first() {
        let category = registry.get(&first.module).map(|m| m.category());
        if category != Some(Category::Topology) {
            warn!(
                "First step '{}' is not a topology module; it still receives the input molecules",
                first.key
            );
        }
    }

    // Missing mandatory parameters were reported above.
    let general = general.ok_or_else(|| RunnerError::config("Incomplete general parameters"))?;

    info!(
        "Configuration validated: {} steps, {} cores",
        steps.len(),
        general.ncores
    );
    Ok(ValidatedConfig::new(general, steps))
}

/// Confirms every distinct module used by the workflow is installed.
///
/// All failures are collected into a single [`RunnerError::Module`].
pub fn validate_installed_modules(
    config: &ValidatedConfig,
    registry: &ModuleRegistry,
) -> Result<()> {
    let mut checked = HashSet::new();
    let mut failures = Vec::new();

    for step in config.steps() {
        if !checked.insert(step.module.as_str()) {
            continue;
        }
        let Some(module) = registry.get(&step.module) else {
            failures.push(format!("module '{}' is not registered", step.module));
            continue;
        };
        if let Err(message) = module.confirm_installation() {
            failures.push(message);
        }
    }

    if failures.is_empty() {
        debug!("{} module(s) confirmed installed", checked.len());
        Ok(())
    } else {
        Err(RunnerError::Module(failures))
    }
}

/// Reads the typed general parameters, recording every problem found.
///
/// Returns `None` if any general parameter is missing or malformed.
fn general_params(
    config: &WorkflowConfig,
    errors: &mut Vec<ValidationError>,
) -> Option<GeneralParams> {
    let before = errors.len();
    let entries = &config.entries;

    let mut bad = |name: &str, expected: &'static str| {
        errors.push(ValidationError::BadGeneral {
            name: name.to_string(),
            expected,
        })
    };

    let run_dir = match entries.get("run_dir") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(PathBuf::from(s)),
        Some(_) => {
            bad("run_dir", "must be a non-empty path");
            None
        }
        None => None,
    };

    let molecules = match entries.get("molecules") {
        Some(Value::String(s)) if !s.is_empty() => Some(vec![PathBuf::from(s)]),
        Some(Value::Sequence(items)) if !items.is_empty() => {
            let paths: Option<Vec<PathBuf>> = items
                .iter()
                .map(|v| v.as_str().filter(|s| !s.is_empty()).map(PathBuf::from))
                .collect();
            if paths.is_none() {
                bad("molecules", "must list file paths");
            }
            paths
        }
        Some(_) => {
            bad("molecules", "must be a file path or a list of file paths");
            None
        }
        None => None,
    };

    let max_cores = num_cpus::get();
    let ncores = match entries.get("ncores") {
        None => max_cores,
        Some(v) => match v.as_u64() {
            Some(n) if n > 0 => {
                let n = n as usize;
                if n > max_cores {
                    warn!(
                        "ncores = {} exceeds the {} available cores, using {}",
                        n, max_cores, max_cores
                    );
                }
                n.min(max_cores)
            }
            _ => {
                bad("ncores", "must be a positive integer");
                max_cores
            }
        },
    };

    let mode = match entries.get("mode") {
        None => Mode::default(),
        Some(v) => match v.as_str().and_then(Mode::parse) {
            Some(mode) => mode,
            None => {
                bad("mode", "must be 'local' or 'batch'");
                Mode::default()
            }
        },
    };

    let batch_submit = match entries.get("batch_submit") {
        None => DEFAULT_BATCH_SUBMIT.to_string(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(_) => {
            bad("batch_submit", "must be a non-empty command");
            DEFAULT_BATCH_SUBMIT.to_string()
        }
    };

    let continue_on_error = match entries.get("continue_on_error") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            bad("continue_on_error", "must be true or false");
            false
        }
    };

    if errors.len() > before {
        return None;
    }

    Some(GeneralParams {
        run_dir: run_dir?,
        molecules: molecules?,
        ncores,
        mode,
        batch_submit,
        continue_on_error,
    })
}

/// Checks the types of the parameters every module accepts.
fn check_module_wide_params(key: &str, params: &ParamSet, errors: &mut Vec<ValidationError>) {
    if let Some(mode) = params.get("mode") {
        if mode.as_str().and_then(Mode::parse).is_none() {
            errors.push(ValidationError::BadStepParam {
                step: key.to_string(),
                name: "mode",
                expected: "must be 'local' or 'batch'",
            });
        }
    }
    if let Some(ncores) = params.get("ncores") {
        if !matches!(ncores.as_u64(), Some(n) if n > 0) {
            errors.push(ValidationError::BadStepParam {
                step: key.to_string(),
                name: "ncores",
                expected: "must be a positive integer",
            });
        }
    }
}

/// Converts a step's YAML value into a parameter set.
///
/// A step written with no body (`topoaa:`) has no parameters.
fn step_params(key: &str, value: &Value) -> std::result::Result<ParamSet, ValidationError> {
    match value {
        Value::Null => Ok(ParamSet::new()),
        Value::Mapping(mapping) => mapping
            .iter()
            .map(|(k, v)| match k {
                Value::String(name) => Ok((name.clone(), v.clone())),
                _ => Err(ValidationError::NonStringKey(key.to_string())),
            })
            .collect(),
        _ => Err(ValidationError::NotAMapping(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{Module, StepContext};
    use crate::execution::artifact::StepOutput;
    use crate::execution::backend::{ComputeBackend, StepResult};
    use crate::workflow::parser::parse_config;

    fn parse(yaml: &str) -> WorkflowConfig {
        parse_config(yaml).unwrap()
    }

    fn config_error(yaml: &str) -> String {
        match validate(&parse(yaml), &ModuleRegistry::builtin()) {
            Err(RunnerError::Configuration(message)) => message,
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_configuration() {
        let yaml = r#"
run_dir: run1
molecules:
  - receptor.pdb
  - ligand.pdb
ncores: 1
topoaa:
rigidbody:
  sampling: 20
  ambig_fname: ambig.tbl
seletop:
  select: 5
flexref.2:
  ncores: 1
"#;
        let validated = validate(&parse(yaml), &ModuleRegistry::builtin()).unwrap();

        let general = validated.general();
        assert_eq!(general.run_dir, PathBuf::from("run1"));
        assert_eq!(general.molecules.len(), 2);
        assert_eq!(general.ncores, 1);
        assert_eq!(general.mode, Mode::Local);
        assert_eq!(general.batch_submit, DEFAULT_BATCH_SUBMIT);
        assert!(!general.continue_on_error);

        let keys: Vec<_> = validated.steps().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["topoaa", "rigidbody", "seletop", "flexref.2"]);
        assert_eq!(validated.steps()[3].module, "flexref");
        assert!(validated.steps()[0].params.is_empty());
    }

    #[test]
    fn test_single_molecule_string() {
        let yaml = "run_dir: r\nmolecules: complex.pdb\ntopoaa:\n";
        let validated = validate(&parse(yaml), &ModuleRegistry::builtin()).unwrap();
        assert_eq!(validated.general().molecules, vec![PathBuf::from("complex.pdb")]);
    }

    #[test]
    fn test_missing_mandatory_params() {
        let message = config_error("topoaa:\n");
        assert!(message.contains("'run_dir' is not defined"));
        assert!(message.contains("'molecules' is not defined"));
    }

    #[test]
    fn test_unknown_module_names_the_key() {
        let message = config_error("run_dir: r\nmolecules: m.pdb\ntopoaa:\nfrobnicate:\n  x: 1\n");
        assert!(message.contains("frobnicate"));
        assert!(message.contains("not a registered module"));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let message = config_error("run_dir: r\nmolecules: m.pdb\nseletop:\n  select: 3\n  colour: red\n");
        assert!(message.contains("seletop"));
        assert!(message.contains("colour"));
        assert!(!message.contains("select,"));
    }

    #[test]
    fn test_module_wide_params_allowed_everywhere() {
        let yaml = "run_dir: r\nmolecules: m.pdb\ntopoaa:\n  ncores: 1\n  mode: local\n";
        assert!(validate(&parse(yaml), &ModuleRegistry::builtin()).is_ok());
    }

    #[test]
    fn test_module_wide_params_are_type_checked() {
        let message = config_error(
            "run_dir: r\nmolecules: m.pdb\ntopoaa:\n  mode: banana\nrigidbody:\n  ncores: -2\n",
        );
        assert!(message.contains("Step 'topoaa': parameter 'mode'"), "{}", message);
        assert!(message.contains("Step 'rigidbody': parameter 'ncores'"), "{}", message);
    }

    #[test]
    fn test_all_errors_reported_together() {
        let message = config_error("ncores: 0\nmode: cloud\nfrobnicate:\nseletop: 3\n");
        let lines: Vec<_> = message.lines().collect();
        assert_eq!(lines.len(), 6, "{}", message);
    }

    #[test]
    fn test_empty_workflow() {
        let message = config_error("run_dir: r\nmolecules: m.pdb\n");
        assert!(message.contains("no modules"));
    }

    #[test]
    fn test_bad_general_types() {
        let message = config_error(
            "run_dir: 3\nmolecules: [a.pdb, 4]\ncontinue_on_error: maybe\nbatch_submit: ''\ntopoaa:\n",
        );
        assert!(message.contains("'run_dir'"));
        assert!(message.contains("'molecules'"));
        assert!(message.contains("'continue_on_error'"));
        assert!(message.contains("'batch_submit'"));
    }

    #[test]
    fn test_ncores_capped_at_cpu_count() {
        let yaml = "run_dir: r\nmolecules: m.pdb\nncores: 100000\ntopoaa:\n";
        let validated = validate(&parse(yaml), &ModuleRegistry::builtin()).unwrap();
        assert_eq!(validated.general().ncores, num_cpus::get());
    }

    #[test]
    fn test_batch_mode() {
        let yaml = "run_dir: r\nmolecules: m.pdb\nmode: batch\nbatch_submit: qsub -sync y\ntopoaa:\n";
        let validated = validate(&parse(yaml), &ModuleRegistry::builtin()).unwrap();
        assert_eq!(validated.general().mode, Mode::Batch);
        assert_eq!(validated.general().batch_submit, "qsub -sync y");
    }

    struct Uninstalled(&'static str);

    impl Module for Uninstalled {
        fn name(&self) -> &str {
            self.0
        }
        fn category(&self) -> Category {
            Category::Sampling
        }
        fn defaults(&self) -> &ParamSet {
            crate::modules::builtin_defaults("seletop")
        }
        fn confirm_installation(&self) -> std::result::Result<(), String> {
            Err(format!("{} is not installed", self.0))
        }
        fn execute(
            &self,
            _ctx: &StepContext<'_>,
            _backend: &dyn ComputeBackend,
        ) -> StepResult<StepOutput> {
            Ok(StepOutput::empty())
        }
    }

    #[test]
    fn test_installation_failures_are_aggregated() {
        let mut registry = ModuleRegistry::builtin();
        registry.register(Box::new(Uninstalled("alpha")));
        registry.register(Box::new(Uninstalled("beta")));

        let yaml = "run_dir: r\nmolecules: m.pdb\nalpha:\nbeta:\nalpha.2:\nseletop:\n";
        let validated = validate(&parse(yaml), &registry).unwrap();

        match validate_installed_modules(&validated, &registry) {
            Err(RunnerError::Module(failures)) => {
                assert_eq!(
                    failures,
                    vec!["alpha is not installed", "beta is not installed"]
                );
            }
            other => panic!("expected module error, got {:?}", other),
        }
    }

    #[test]
    fn test_installed_modules_pass() {
        let yaml = "run_dir: r\nmolecules: m.pdb\nseletop:\nseletopclusts:\n";
        let registry = ModuleRegistry::builtin();
        let validated = validate(&parse(yaml), &registry).unwrap();
        assert!(validate_installed_modules(&validated, &registry).is_ok());
    }
}
