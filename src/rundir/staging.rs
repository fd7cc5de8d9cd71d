//! Input Staging
//!
//! Copies every user-supplied input file into the run's data directory and
//! rewrites the step parameters to point at the copies, so that a run
//! directory is self-contained.
//!
//! A parameter references a file when its name is `molecules` or ends in
//! `_fname` and its value is a non-empty string or a list of strings. The
//! same rule applies to every step, the topology step included.
//!
//! Staged values are relative to the run directory:
//!
//! ```text
//! ambig_fname: /home/me/restraints/ambig.tbl
//!   -> ambig_fname: data/01_rigidbody/ambig.tbl
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_yaml::Value;

use super::DATA_DIR;
use crate::error::{Result, RunnerError};
use crate::workflow::model::ModuleStep;

/// Parameter name carrying the input molecules.
const MOLECULES_PARAM: &str = "molecules";

/// Suffix of parameter names that carry a file path.
const FILE_PARAM_SUFFIX: &str = "_fname";

/// A file copied into a step's data folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub step_index: usize,
    /// Path as given in the configuration
    pub original: PathBuf,
    /// Path relative to the run directory
    pub staged: PathBuf,
}

/// Result of staging a set of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRun {
    /// Steps with file parameters rewritten to staged paths
    pub steps: Vec<ModuleStep>,
    /// Files actually copied
    pub artifacts: Vec<StagedArtifact>,
}

/// Returns true if the parameter references one or more files.
pub fn is_file_param(name: &str, value: &Value) -> bool {
    names_file(name) && !file_values(value).is_empty()
}

fn names_file(name: &str) -> bool {
    name == MOLECULES_PARAM || name.ends_with(FILE_PARAM_SUFFIX)
}

/// True for values a file parameter cannot hold: anything but null, a
/// string or a list of strings.
fn is_malformed_file_value(value: &Value) -> bool {
    match value {
        Value::Null | Value::String(_) => false,
        Value::Sequence(items) => items.iter().any(|item| !item.is_string()),
        _ => true,
    }
}

/// The file paths held by a parameter value.
fn file_values(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.as_str()],
        Value::Sequence(items) => {
            let paths: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
            paths
                .map(|p| p.into_iter().filter(|s| !s.is_empty()).collect())
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

/// Checks every file referenced by the steps exists and that no two inputs
/// of one step share a file name.
///
/// All problems are reported together.
pub fn check_inputs(steps: &[ModuleStep]) -> Result<()> {
    let mut errors = Vec::new();

    for step in steps {
        let mut names = HashSet::new();
        for (param, value) in &step.params {
            if names_file(param) && is_malformed_file_value(value) {
                errors.push(format!(
                    "Step '{}': '{}' must be a file path or a list of file paths",
                    step.key, param
                ));
                continue;
            }
            if !is_file_param(param, value) {
                continue;
            }
            for path in file_values(value) {
                let path = Path::new(path);
                if !path.is_file() {
                    errors.push(format!(
                        "Step '{}': file '{}' given in '{}' does not exist",
                        step.key,
                        path.display(),
                        param
                    ));
                    continue;
                }
                match path.file_name() {
                    Some(name) if !names.insert(name.to_os_string()) => {
                        errors.push(format!(
                            "Step '{}': more than one input file is named '{}'",
                            step.key,
                            name.to_string_lossy()
                        ));
                    }
                    Some(_) => {}
                    None => errors.push(format!(
                        "Step '{}': '{}' in '{}' is not a file path",
                        step.key,
                        path.display(),
                        param
                    )),
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RunnerError::config(errors.join("\n")))
    }
}

/// Stages the input files of every step into `run_dir`.
pub fn stage(run_dir: &Path, steps: &[ModuleStep]) -> Result<StagedRun> {
    stage_from(run_dir, steps, 0)
}

/// Stages the steps at or after `from` and rewrites the parameters of
/// every step.
///
/// Steps before `from` keep their data folders untouched; only their
/// parameters are rewritten so they match what was staged originally.
/// Inputs are checked before anything is copied. Steps are staged in
/// index order, so the topology step is always staged first.
pub fn stage_from(run_dir: &Path, steps: &[ModuleStep], from: usize) -> Result<StagedRun> {
    let to_copy: Vec<ModuleStep> = steps.iter().filter(|s| s.index >= from).cloned().collect();
    check_inputs(&to_copy)?;

    let mut staged_steps = Vec::with_capacity(steps.len());
    let mut artifacts = Vec::new();

    for step in steps {
        let copy = step.index >= from;
        let data_rel = Path::new(DATA_DIR).join(&step.dir_name);
        if copy {
            fs::create_dir_all(run_dir.join(&data_rel))?;
        }

        let mut staged = step.clone();
        for (param, value) in staged.params.iter_mut() {
            if !is_file_param(param, value) {
                continue;
            }
            let rewritten = rewrite_value(value, &data_rel, |original, staged_path| {
                if copy {
                    fs::copy(original, run_dir.join(staged_path))?;
                    debug!("Staged {} -> {}", original.display(), staged_path.display());
                    artifacts.push(StagedArtifact {
                        step_index: step.index,
                        original: original.to_path_buf(),
                        staged: staged_path.to_path_buf(),
                    });
                }
                Ok(())
            })?;
            *value = rewritten;
        }
        staged_steps.push(staged);
    }

    info!(
        "Staged {} input file(s) for {} step(s)",
        artifacts.len(),
        to_copy.len()
    );
    Ok(StagedRun {
        steps: staged_steps,
        artifacts,
    })
}

/// Maps each path of a file parameter to its staged location, calling
/// `on_file` for every file. Keeps the value's shape.
fn rewrite_value<F>(value: &Value, data_rel: &Path, mut on_file: F) -> Result<Value>
where
    F: FnMut(&Path, &Path) -> Result<()>,
{
    let mut restage = |original: &str| -> Result<Value> {
        let original = Path::new(original);
        let name = original.file_name().ok_or_else(|| {
            RunnerError::config(format!("'{}' is not a file path", original.display()))
        })?;
        let staged = data_rel.join(name);
        on_file(original, &staged)?;
        Ok(Value::from(staged.to_string_lossy().into_owned()))
    };

    match value {
        Value::String(s) => restage(s.as_str()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item.as_str() {
                Some(s) if !s.is_empty() => restage(s),
                _ => Ok(item.clone()),
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Sequence),
        other => Ok(other.clone()),
    }
}
