//! Restart truncation.
//!
//! Restarting from step `k` deletes every step folder and data folder with
//! an index of `k` or more and leaves everything below `k` alone. Deletion
//! is not atomic; calling [`truncate`] again with the same index finishes an
//! interrupted truncation and is otherwise a no-op.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::layout::{RunLayout, StepFolder};
use super::DATA_DIR;
use crate::error::{Result, RunnerError};

/// What a truncation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruncateReport {
    /// Folders deleted, step folders first
    pub removed: Vec<PathBuf>,
    /// Folders expected as the counterpart of a removed folder but absent
    pub missing: Vec<PathBuf>,
}

impl TruncateReport {
    /// True if nothing was removed.
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Removes every step at or after `from` from `run_dir`.
pub fn truncate(run_dir: &Path, from: usize) -> Result<TruncateReport> {
    if !run_dir.is_dir() {
        return Err(RunnerError::precondition(format!(
            "Run directory '{}' does not exist",
            run_dir.display()
        )));
    }

    let layout = RunLayout::scan(run_dir)?;
    let data_dir = run_dir.join(DATA_DIR);
    let doomed = |folders: &[StepFolder]| -> Vec<String> {
        folders
            .iter()
            .filter(|f| f.index >= from)
            .map(|f| f.name.clone())
            .collect()
    };
    let steps = doomed(layout.steps());
    let data = doomed(layout.data_folders());

    let mut report = TruncateReport::default();

    for name in &steps {
        let path = run_dir.join(name);
        fs::remove_dir_all(&path)?;
        report.removed.push(path);
        if !data.contains(name) {
            let counterpart = data_dir.join(name);
            warn!(
                "Data folder {} does not exist, nothing to remove",
                counterpart.display()
            );
            report.missing.push(counterpart);
        }
    }

    for name in &data {
        let path = data_dir.join(name);
        fs::remove_dir_all(&path)?;
        report.removed.push(path);
        if !steps.contains(name) {
            let counterpart = run_dir.join(name);
            warn!(
                "Step folder {} does not exist, nothing to remove",
                counterpart.display()
            );
            report.missing.push(counterpart);
        }
    }

    if report.is_noop() {
        info!("Nothing to remove from step {} onwards", from);
    } else {
        info!(
            "Removed {} folder(s) from step {} onwards",
            report.removed.len(),
            from
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STEPS: &[&str] = &[
        "00_topoaa",
        "01_rigidbody",
        "02_seletop",
        "03_flexref",
        "04_emref",
    ];

    fn populate(run_dir: &Path) {
        for name in STEPS {
            fs::create_dir_all(run_dir.join(name)).unwrap();
            fs::write(run_dir.join(name).join("io.json"), name).unwrap();
            fs::create_dir_all(run_dir.join(DATA_DIR).join(name)).unwrap();
        }
    }

    fn remaining(run_dir: &Path) -> Vec<String> {
        RunLayout::scan(run_dir)
            .unwrap()
            .steps()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    #[test]
    fn test_truncate_removes_from_index() {
        let temp_dir = tempdir().unwrap();
        let run_dir = temp_dir.path();
        populate(run_dir);

        let report = truncate(run_dir, 2).unwrap();

        assert_eq!(report.removed.len(), 6);
        assert!(report.missing.is_empty());
        assert_eq!(remaining(run_dir), vec!["00_topoaa", "01_rigidbody"]);
        assert!(RunLayout::scan(run_dir).unwrap().is_consistent());
        // Retained steps are untouched.
        let kept = fs::read_to_string(run_dir.join("01_rigidbody/io.json")).unwrap();
        assert_eq!(kept, "01_rigidbody");
    }

    #[test]
    fn test_truncate_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let run_dir = temp_dir.path();
        populate(run_dir);

        truncate(run_dir, 3).unwrap();
        let before = RunLayout::scan(run_dir).unwrap();
        let report = truncate(run_dir, 3).unwrap();

        assert!(report.is_noop());
        assert_eq!(RunLayout::scan(run_dir).unwrap(), before);
    }

    #[test]
    fn test_truncate_tolerates_partial_cleanup() {
        let temp_dir = tempdir().unwrap();
        let run_dir = temp_dir.path();
        populate(run_dir);
        // Simulate an interrupted truncation.
        fs::remove_dir_all(run_dir.join("04_emref")).unwrap();
        fs::remove_dir_all(run_dir.join(DATA_DIR).join("03_flexref")).unwrap();

        let report = truncate(run_dir, 3).unwrap();

        assert_eq!(report.removed.len(), 2);
        assert_eq!(
            report.missing,
            vec![
                run_dir.join(DATA_DIR).join("03_flexref"),
                run_dir.join("04_emref")
            ]
        );
        assert_eq!(remaining(run_dir).len(), 3);
    }

    #[test]
    fn test_truncate_from_zero_empties_run() {
        let temp_dir = tempdir().unwrap();
        let run_dir = temp_dir.path();
        populate(run_dir);

        truncate(run_dir, 0).unwrap();
        assert!(remaining(run_dir).is_empty());
        assert!(run_dir.join(DATA_DIR).is_dir());
    }

    #[test]
    fn test_truncate_missing_run_dir() {
        let temp_dir = tempdir().unwrap();
        let err = truncate(&temp_dir.path().join("absent"), 1).unwrap_err();
        assert!(matches!(err, RunnerError::Precondition(_)));
    }
}
