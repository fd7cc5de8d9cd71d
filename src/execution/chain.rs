//! Module Execution Chain
//!
//! Runs the steps of a prepared run one after another. Each step receives
//! the [`StepOutput`] of the last completed step and publishes its own,
//! which the chain writes to `io.json` in the step folder.
//!
//! # Step lifecycle
//!
//! ```text
//! Pending -> Running -> Completed
//!                    -> Failed
//! Skipped              (retained before the restart index)
//! ```
//!
//! A failure stops the chain unless continue-on-error is set; in that case
//! the next step receives the output of the last step that completed.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use log::{error, info, warn};

use super::artifact::{StepOutput, IO_FILE};
use super::backend::ComputeBackend;
use crate::error::{Result, RunnerError};
use crate::modules::{Module, ModuleRegistry, StepContext};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::model::ModuleStep;

/// Status of a step in the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    /// Waiting for its turn
    Pending,
    /// Retained from a previous execution
    Skipped,
    Running,
    Completed,
    /// Failed with error message
    Failed(String),
}

/// Outcome of one step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub index: usize,
    /// Step folder name
    pub step: String,
    pub module: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    /// Number of artifacts published
    pub outputs: usize,
}

impl StepRecord {
    fn new(step: &ModuleStep, status: StepStatus) -> Self {
        Self {
            index: step.index,
            step: step.dir_name.clone(),
            module: step.module.clone(),
            status,
            started_at: None,
            finished_at: None,
            outputs: 0,
        }
    }

    /// Wall-clock duration in milliseconds, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Result of running a chain.
#[derive(Debug, Clone)]
pub struct ChainReport {
    pub records: Vec<StepRecord>,
    pub timeline: ExecutionTimeline,
}

impl ChainReport {
    /// Steps that failed, in order.
    pub fn failed(&self) -> Vec<&StepRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.status, StepStatus::Failed(_)))
            .collect()
    }

    pub fn completed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed().is_empty()
    }
}

/// Sequential executor over a module registry and a compute backend.
///
/// # Example
///
/// ```rust,no_run
/// use dockrunner::execution::{DryRunBackend, ExecutionChain};
/// use dockrunner::modules::ModuleRegistry;
/// use dockrunner::rundir::prepare_run;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = ModuleRegistry::builtin();
///     let run = prepare_run(Path::new("docking.yaml"), None, &registry, true)?;
///
///     let chain = ExecutionChain::new(&registry, Box::new(DryRunBackend));
///     let report = chain.run(&run.run_dir, &run.steps, 0, run.general.ncores)?;
///     println!("{} steps completed", report.completed());
///     Ok(())
/// }
/// ```
pub struct ExecutionChain<'a> {
    registry: &'a ModuleRegistry,
    backend: Box<dyn ComputeBackend>,
    continue_on_error: bool,
}

impl<'a> ExecutionChain<'a> {
    pub fn new(registry: &'a ModuleRegistry, backend: Box<dyn ComputeBackend>) -> Self {
        Self {
            registry,
            backend,
            continue_on_error: false,
        }
    }

    /// Keeps running after a failed step.
    pub fn set_continue_on_error(&mut self, enabled: bool) {
        self.continue_on_error = enabled;
    }

    /// Runs `steps[from..]` in order.
    ///
    /// With `from > 0` the input of the first executed step is read from the
    /// `io.json` of step `from - 1`, which must exist.
    pub fn run(
        &self,
        run_dir: &Path,
        steps: &[ModuleStep],
        from: usize,
        ncores: usize,
    ) -> Result<ChainReport> {
        let run_dir = fs::canonicalize(run_dir)?;
        let mut input = initial_input(&run_dir, steps, from)?;
        let mut timeline = ExecutionTimeline::new();

        let mut records: Vec<StepRecord> = steps
            .iter()
            .map(|s| {
                let status = if s.index < from {
                    StepStatus::Skipped
                } else {
                    StepStatus::Pending
                };
                StepRecord::new(s, status)
            })
            .collect();

        info!(
            "Starting execution of {} step(s) in {}",
            steps.len().saturating_sub(from),
            run_dir.display()
        );

        for (position, step) in steps.iter().enumerate().skip(from) {
            let module = self.registry.get(&step.module).ok_or_else(|| RunnerError::Execution {
                step: step.dir_name.clone(),
                message: format!("module '{}' is not registered", step.module),
            })?;

            let record = &mut records[position];
            record.status = StepStatus::Running;
            record.started_at = Some(Local::now());
            timeline.add_event(step.dir_name.as_str(), EventType::Started);
            info!("Running step {} ({})", step.dir_name, module.category());

            let result = self.execute_step(module, step, &run_dir, ncores, &input);
            record.finished_at = Some(Local::now());

            match result {
                Ok(output) => {
                    output.save(&step.workdir(&run_dir).join(IO_FILE))?;
                    info!(
                        "Step {} completed: {} artifact(s)",
                        step.dir_name,
                        output.len()
                    );
                    record.status = StepStatus::Completed;
                    record.outputs = output.len();
                    timeline.add_event(step.dir_name.as_str(), EventType::Completed);
                    input = output;
                }
                Err(message) => {
                    error!("Step {} failed: {}", step.dir_name, message);
                    record.status = StepStatus::Failed(message.clone());
                    timeline.add_event(step.dir_name.as_str(), EventType::Failed);

                    if self.continue_on_error {
                        warn!("Continuing after failed step {}", step.dir_name);
                        continue;
                    }

                    info!(
                        "Fix the problem and resume with --restart {}",
                        step.index
                    );
                    return Err(RunnerError::Execution {
                        step: step.dir_name.clone(),
                        message,
                    });
                }
            }
        }

        let report = ChainReport { records, timeline };
        info!(
            "{} step(s) completed, {} failed",
            report.completed(),
            report.failed().len()
        );
        Ok(report)
    }

    /// Runs one module, returning its output or an error message.
    fn execute_step(
        &self,
        module: &dyn Module,
        step: &ModuleStep,
        run_dir: &Path,
        ncores: usize,
        input: &StepOutput,
    ) -> std::result::Result<StepOutput, String> {
        if input.is_branched() && !module.accepts_branched_input() {
            return Err(format!(
                "module '{}' cannot follow a step that produced a branched output",
                module.name()
            ));
        }

        fs::create_dir_all(step.workdir(run_dir)).map_err(|e| e.to_string())?;

        let params = module.merged_params(&step.params);
        let ncores = params
            .get("ncores")
            .and_then(|v| v.as_u64())
            .filter(|&n| n > 0)
            .map_or(ncores, |n| (n as usize).min(ncores));

        let ctx = StepContext {
            index: step.index,
            step: &step.dir_name,
            run_dir,
            params: &params,
            ncores,
            input,
        };
        module
            .execute(&ctx, self.backend.as_ref())
            .map_err(|e| e.to_string())
    }
}

/// Input of the first executed step.
fn initial_input(run_dir: &Path, steps: &[ModuleStep], from: usize) -> Result<StepOutput> {
    if from == 0 {
        return Ok(StepOutput::empty());
    }
    let previous = steps.get(from - 1).ok_or_else(|| {
        RunnerError::config(format!(
            "Cannot restart from step {}: the workflow has {} steps",
            from,
            steps.len()
        ))
    })?;

    let path = previous.workdir(run_dir).join(IO_FILE);
    if !path.is_file() {
        return Err(RunnerError::precondition(format!(
            "Cannot restart from step {}: {} was not completed ({} is missing)",
            from,
            previous.dir_name,
            path.display()
        )));
    }
    StepOutput::load(&path)
}
