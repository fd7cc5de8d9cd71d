//! External Compute Backends
//!
//! Engine-backed modules do not compute anything themselves. They emit a
//! self-contained [`Invocation`] into their step folder and hand it to a
//! [`ComputeBackend`], which blocks until the external work finishes and
//! returns the path of the results file the engine wrote.
//!
//! # Engine contract
//!
//! The engine executable is called with the invocation file as its only
//! argument, from the run directory. On success it must write
//! `results.json` (a serialized [`StepOutput`]) next to the invocation,
//! with artifact paths relative to the run directory.

use std::error::Error;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use super::artifact::StepOutput;
use crate::workflow::model::{Mode, ParamSet};

/// Invocation unit written into each engine-backed step folder.
pub const INVOCATION_FILE: &str = "invocation.json";

/// Results file the engine writes on success.
pub const RESULTS_FILE: &str = "results.json";

/// Job script generated for the shell backend.
pub const JOB_SCRIPT: &str = "run.sh";

/// Result type for step-level work.
pub type StepResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Everything an external engine needs to run one step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Registered module name
    pub module: String,
    /// Step folder name (`02_flexref`)
    pub step: String,
    /// 0-based step index
    pub index: usize,
    /// Absolute run directory
    pub run_dir: PathBuf,
    /// Engine executable
    pub executable: PathBuf,
    /// Cores granted to this step
    pub ncores: usize,
    /// Module defaults overlaid with the step's parameters
    pub params: ParamSet,
    /// Output of the preceding completed step
    pub input: StepOutput,
}

impl Invocation {
    /// Absolute step folder.
    pub fn workdir(&self) -> PathBuf {
        self.run_dir.join(&self.step)
    }

    /// Writes the invocation into the step folder and returns its path.
    pub fn write(&self) -> StepResult<PathBuf> {
        let workdir = self.workdir();
        fs::create_dir_all(&workdir)?;

        let path = workdir.join(INVOCATION_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        debug!("Wrote invocation: {}", path.display());
        Ok(path)
    }
}

/// Completion signal returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub results_path: PathBuf,
}

/// Runs invocation units and waits for them to finish.
pub trait ComputeBackend: Send + Sync {
    /// Blocks until the external work for `invocation` is done.
    fn submit(&self, invocation: &Invocation) -> StepResult<Completion>;
}

/// Runs each invocation through a generated bash job script.
///
/// In [`Mode::Local`] the script runs directly; in [`Mode::Batch`] it is
/// handed to the configured submission command (`sbatch --wait` by
/// default), which must block until the job ends. A step's own `mode`
/// parameter takes precedence over the backend's mode.
#[derive(Debug, Clone)]
pub struct ShellBackend {
    mode: Mode,
    batch_submit: String,
}

impl ShellBackend {
    pub fn new(mode: Mode, batch_submit: impl Into<String>) -> Self {
        Self {
            mode,
            batch_submit: batch_submit.into(),
        }
    }

    pub fn local() -> Self {
        Self::new(Mode::Local, "")
    }

    /// Mode used for one invocation.
    pub fn mode_for(&self, invocation: &Invocation) -> Mode {
        invocation
            .params
            .get("mode")
            .and_then(|v| v.as_str())
            .and_then(Mode::parse)
            .unwrap_or(self.mode)
    }
}

impl ComputeBackend for ShellBackend {
    fn submit(&self, invocation: &Invocation) -> StepResult<Completion> {
        let step_name = &invocation.step;
        let invocation_path = invocation.write()?;
        let workdir = invocation.workdir();

        let script_path = create_job_script(&workdir, invocation, &invocation_path)?;

        let output = match self.mode_for(invocation) {
            Mode::Local => run_local(&script_path, &invocation.run_dir)?,
            Mode::Batch => run_batch(&self.batch_submit, &script_path, &invocation.run_dir)?,
        };

        fs::write(workdir.join("run.out"), &output.stdout)?;
        fs::write(workdir.join("run.err"), &output.stderr)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                "Step '{}' failed with exit code: {:?}",
                step_name,
                output.status.code()
            );
            if !stderr.trim().is_empty() {
                error!("stderr:\n{}", stderr);
            }
            return Err(format!(
                "engine '{}' exited with status {:?}; see {}/run.err",
                invocation.executable.display(),
                output.status.code(),
                step_name
            )
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("Step '{}' output:\n{}", step_name, stdout);
        }

        let results_path = workdir.join(RESULTS_FILE);
        if !results_path.exists() {
            return Err(format!(
                "engine finished but did not write {}/{}",
                step_name, RESULTS_FILE
            )
            .into());
        }

        Ok(Completion { results_path })
    }
}

/// Logs invocations and completes them with an empty result.
#[derive(Debug, Clone, Default)]
pub struct DryRunBackend;

impl ComputeBackend for DryRunBackend {
    fn submit(&self, invocation: &Invocation) -> StepResult<Completion> {
        invocation.write()?;

        info!("[DRY RUN] Step: {}", invocation.step);
        info!("  Module: {}", invocation.module);
        info!("  Executable: {}", invocation.executable.display());
        info!("  Cores: {}", invocation.ncores);
        info!("  Input artifacts: {}", invocation.input.len());

        let results_path = invocation.workdir().join(RESULTS_FILE);
        StepOutput::empty().save(&results_path)?;
        Ok(Completion { results_path })
    }
}

/// Reads the step output an engine wrote.
pub fn read_results(path: &Path) -> StepResult<StepOutput> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("cannot read results {}: {}", path.display(), e))?;
    let output = serde_json::from_str(&content)
        .map_err(|e| format!("malformed results {}: {}", path.display(), e))?;
    Ok(output)
}

/// Creates the bash job script for an invocation inside its step folder.
fn create_job_script(
    workdir: &Path,
    invocation: &Invocation,
    invocation_path: &Path,
) -> StepResult<PathBuf> {
    let script_path = workdir.join(JOB_SCRIPT);
    let mut file = File::create(&script_path)?;

    writeln!(file, "#!/bin/bash")?;
    writeln!(file, "set -e")?;
    writeln!(file, "cd {}", shell_quote(&invocation.run_dir.to_string_lossy()))?;
    writeln!(file, "export OMP_NUM_THREADS={}", invocation.ncores)?;
    writeln!(
        file,
        "{} {}",
        shell_quote(&invocation.executable.to_string_lossy()),
        shell_quote(&invocation_path.to_string_lossy())
    )?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(script_path)
}

/// Runs a job script directly with bash.
fn run_local(script_path: &Path, run_dir: &Path) -> StepResult<Output> {
    let mut cmd = Command::new("bash");
    cmd.arg(script_path).current_dir(run_dir);
    debug!("Executing {} in {}", script_path.display(), run_dir.display());
    Ok(cmd.output()?)
}

/// Hands a job script to a blocking submission command.
fn run_batch(submit: &str, script_path: &Path, run_dir: &Path) -> StepResult<Output> {
    let mut parts = submit.split_whitespace();
    let program = parts
        .next()
        .ok_or("batch mode requires a non-empty 'batch_submit' command")?;

    let mut cmd = Command::new(program);
    cmd.args(parts).arg(script_path).current_dir(run_dir);
    info!("Submitting {} with '{}'", script_path.display(), submit);
    Ok(cmd.output()?)
}

/// Single-quotes a string for bash.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}
