//! Run preparation.
//!
//! [`prepare_run`] takes a configuration file to a materialized run
//! directory, ready for the execution chain. Every check that can fail on
//! user input runs before the run directory is created or modified.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::layout::RunLayout;
use super::restart::truncate;
use super::staging::{check_inputs, stage_from, StagedArtifact};
use crate::error::{Result, RunnerError};
use crate::modules::ModuleRegistry;
use crate::workflow::model::{GeneralParams, ModuleStep};
use crate::workflow::parser::load_config;
use crate::workflow::planner::plan;
use crate::workflow::validator::{validate, validate_installed_modules};

/// A run directory ready to execute.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub run_dir: PathBuf,
    pub general: GeneralParams,
    /// Every step, with file parameters pointing into the data directory
    pub steps: Vec<ModuleStep>,
    /// First step to execute
    pub restart_from: usize,
    /// Files copied during this preparation
    pub staged: Vec<StagedArtifact>,
}

impl PreparedRun {
    /// The steps that will run.
    pub fn pending_steps(&self) -> &[ModuleStep] {
        &self.steps[self.restart_from..]
    }
}

/// Validates, plans and stages a workflow.
///
/// With `restart_from = Some(k)` the existing run directory is truncated at
/// `k` and only steps `k..` are staged again. In dry-run mode the module
/// installation check is skipped.
pub fn prepare_run(
    config_path: &Path,
    restart_from: Option<usize>,
    registry: &ModuleRegistry,
    dry_run: bool,
) -> Result<PreparedRun> {
    let config = load_config(config_path)?;
    let validated = validate(&config, registry)?;
    if !dry_run {
        validate_installed_modules(&validated, registry)?;
    }

    let steps = plan(&validated);
    let general = validated.general().clone();
    let run_dir = general.run_dir.clone();
    let from = restart_from.unwrap_or(0);

    if from >= steps.len() {
        return Err(RunnerError::config(format!(
            "Cannot restart from step {}: the workflow has {} steps",
            from,
            steps.len()
        )));
    }

    check_inputs(&steps[from..])?;

    match restart_from {
        None => check_fresh(&run_dir)?,
        Some(_) => check_restartable(&run_dir, &steps[..from])?,
    }

    if restart_from.is_some() {
        info!("Restarting {} from step {}", run_dir.display(), from);
        truncate(&run_dir, from)?;
    }

    fs::create_dir_all(&run_dir)?;
    let staged = stage_from(&run_dir, &steps, from)?;
    for step in &staged.steps[from..] {
        fs::create_dir_all(step.workdir(&run_dir))?;
    }

    info!(
        "Run directory {} ready: {} step(s) to execute",
        run_dir.display(),
        steps.len() - from
    );
    Ok(PreparedRun {
        run_dir,
        general,
        steps: staged.steps,
        restart_from: from,
        staged: staged.artifacts,
    })
}

/// A fresh run needs an absent or empty run directory.
fn check_fresh(run_dir: &Path) -> Result<()> {
    if !run_dir.exists() {
        return Ok(());
    }
    let empty = run_dir.is_dir() && fs::read_dir(run_dir)?.next().is_none();
    if empty {
        Ok(())
    } else {
        Err(RunnerError::precondition(format!(
            "Run directory '{}' already exists and is not empty; use --restart to resume it",
            run_dir.display()
        )))
    }
}

/// A restart needs the run directory, with the retained steps named as the
/// current configuration names them.
fn check_restartable(run_dir: &Path, retained: &[ModuleStep]) -> Result<()> {
    if !run_dir.is_dir() {
        return Err(RunnerError::precondition(format!(
            "Cannot restart: run directory '{}' does not exist",
            run_dir.display()
        )));
    }

    let layout = RunLayout::scan(run_dir)?;
    let mismatched: Vec<&str> = retained
        .iter()
        .filter(|s| layout.step(s.index).map(|f| f.name.as_str()) != Some(s.dir_name.as_str()))
        .map(|s| s.dir_name.as_str())
        .collect();

    if mismatched.is_empty() {
        Ok(())
    } else {
        Err(RunnerError::precondition(format!(
            "Cannot restart: run directory '{}' has no step folder(s) {}",
            run_dir.display(),
            mismatched.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rundir::DATA_DIR;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        config: PathBuf,
    }

    impl Fixture {
        fn run_dir(&self) -> PathBuf {
            self.dir.path().join("run1")
        }
    }

    fn fixture(extra: &str) -> Fixture {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("receptor.pdb"), "ATOM r\n").unwrap();
        fs::write(root.join("ligand.pdb"), "ATOM l\n").unwrap();
        fs::write(root.join("ambig.tbl"), "assign\n").unwrap();

        let yaml = format!(
            "run_dir: {root}/run1\n\
             molecules:\n  - {root}/receptor.pdb\n  - {root}/ligand.pdb\n\
             topoaa:\n\
             rigidbody:\n  ambig_fname: {root}/ambig.tbl\n\
             seletop:\n  select: 2\n\
             flexref:\n\
             {extra}",
            root = root.display(),
            extra = extra
        );
        let config = root.join("docking.yaml");
        fs::write(&config, yaml).unwrap();
        Fixture { dir, config }
    }

    fn prepare(fx: &Fixture, restart: Option<usize>) -> Result<PreparedRun> {
        prepare_run(&fx.config, restart, &ModuleRegistry::builtin(), true)
    }

    #[test]
    fn test_prepare_fresh_run() {
        let fx = fixture("");
        let prepared = prepare(&fx, None).unwrap();
        let run_dir = fx.run_dir();

        assert_eq!(prepared.steps.len(), 4);
        assert_eq!(prepared.restart_from, 0);
        assert_eq!(prepared.staged.len(), 3);
        assert!(RunLayout::scan(&run_dir).unwrap().is_consistent());
        assert!(run_dir.join("data/00_topoaa/receptor.pdb").is_file());
        assert!(run_dir.join("03_flexref").is_dir());
    }

    #[test]
    fn test_invalid_config_leaves_no_run_dir() {
        let fx = fixture("frobnicate:\n");
        let err = prepare(&fx, None).unwrap_err();

        assert!(matches!(err, RunnerError::Configuration(_)));
        assert!(err.to_string().contains("frobnicate"));
        assert!(!fx.run_dir().exists());
    }

    #[test]
    fn test_missing_general_param_leaves_no_run_dir() {
        let fx = fixture("");
        let yaml = format!(
            "run_dir: {}\ntopoaa:\nseletop:\n",
            fx.run_dir().display()
        );
        fs::write(&fx.config, yaml).unwrap();

        let err = prepare(&fx, None).unwrap_err();
        assert!(matches!(err, RunnerError::Configuration(_)));
        assert!(err.to_string().contains("'molecules' is not defined"));
        assert!(!fx.run_dir().exists());
    }

    #[test]
    fn test_missing_input_leaves_no_run_dir() {
        let fx = fixture("");
        fs::remove_file(fx.dir.path().join("ambig.tbl")).unwrap();

        let err = prepare(&fx, None).unwrap_err();
        assert!(matches!(err, RunnerError::Configuration(_)));
        assert!(!fx.run_dir().exists());
    }

    #[test]
    fn test_fresh_run_refuses_populated_run_dir() {
        let fx = fixture("");
        prepare(&fx, None).unwrap();

        let err = prepare(&fx, None).unwrap_err();
        assert!(matches!(err, RunnerError::Precondition(_)));
    }

    #[test]
    fn test_restart_truncates_and_restages() {
        let fx = fixture("");
        prepare(&fx, None).unwrap();
        let run_dir = fx.run_dir();
        fs::write(run_dir.join("01_rigidbody/io.json"), "{}").unwrap();
        fs::write(run_dir.join("02_seletop/io.json"), "{}").unwrap();
        // Retained inputs are not needed any more.
        fs::remove_file(fx.dir.path().join("receptor.pdb")).unwrap();

        let prepared = prepare(&fx, Some(2)).unwrap();

        assert_eq!(prepared.restart_from, 2);
        assert_eq!(prepared.pending_steps().len(), 2);
        assert!(prepared.staged.is_empty());
        assert!(run_dir.join("01_rigidbody/io.json").is_file());
        assert!(!run_dir.join("02_seletop/io.json").exists());
        assert!(run_dir.join("02_seletop").is_dir());
        assert!(run_dir.join(DATA_DIR).join("00_topoaa/receptor.pdb").is_file());
        assert_eq!(
            prepared.steps[1].params.get("ambig_fname"),
            Some(&serde_yaml::Value::from("data/01_rigidbody/ambig.tbl"))
        );
    }

    #[test]
    fn test_restart_index_out_of_range() {
        let fx = fixture("");
        prepare(&fx, None).unwrap();

        let err = prepare(&fx, Some(4)).unwrap_err();
        assert!(matches!(err, RunnerError::Configuration(_)));
    }

    #[test]
    fn test_restart_requires_existing_run() {
        let fx = fixture("");
        let err = prepare(&fx, Some(1)).unwrap_err();
        assert!(matches!(err, RunnerError::Precondition(_)));
    }

    #[test]
    fn test_restart_detects_changed_workflow() {
        let fx = fixture("");
        prepare(&fx, None).unwrap();
        fs::rename(fx.run_dir().join("01_rigidbody"), fx.run_dir().join("01_emref")).unwrap();

        let err = prepare(&fx, Some(3)).unwrap_err();
        assert!(err.to_string().contains("01_rigidbody"));
    }
}
