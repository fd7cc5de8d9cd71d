//! Step and data folders of a run directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use super::DATA_DIR;
use crate::error::Result;
use crate::workflow::model::ModuleStep;
use crate::workflow::planner::parse_step_folder;

/// A step folder name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFolder {
    pub index: usize,
    pub module: String,
    /// Full folder name (`03_flexref`)
    pub name: String,
}

impl StepFolder {
    /// Parses a folder name; `None` if it is not a step folder.
    pub fn parse(name: &str) -> Option<Self> {
        let (index, module) = parse_step_folder(name)?;
        Some(Self {
            index,
            module: module.to_string(),
            name: name.to_string(),
        })
    }
}

/// Step folders and data subfolders of one run directory, in index order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    run_dir: PathBuf,
    steps: Vec<StepFolder>,
    data: Vec<StepFolder>,
}

impl RunLayout {
    /// The layout a set of planned steps materializes into.
    pub fn from_steps(run_dir: impl Into<PathBuf>, steps: &[ModuleStep]) -> Self {
        let folders: Vec<StepFolder> = steps
            .iter()
            .map(|s| StepFolder {
                index: s.index,
                module: s.module.clone(),
                name: s.dir_name.clone(),
            })
            .collect();
        Self {
            run_dir: run_dir.into(),
            steps: folders.clone(),
            data: folders,
        }
    }

    /// Reads the layout currently on disk.
    ///
    /// A missing data directory yields no data folders.
    pub fn scan(run_dir: impl Into<PathBuf>) -> Result<Self> {
        let run_dir = run_dir.into();
        let steps = scan_folders(&run_dir)?;

        let data_dir = run_dir.join(DATA_DIR);
        let data = if data_dir.is_dir() {
            scan_folders(&data_dir)?
        } else {
            Vec::new()
        };

        debug!(
            "Scanned {}: {} step folder(s), {} data folder(s)",
            run_dir.display(),
            steps.len(),
            data.len()
        );
        Ok(Self {
            run_dir,
            steps,
            data,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn steps(&self) -> &[StepFolder] {
        &self.steps
    }

    pub fn data_folders(&self) -> &[StepFolder] {
        &self.data
    }

    /// Finds the step folder with the given index.
    pub fn step(&self, index: usize) -> Option<&StepFolder> {
        self.steps.iter().find(|s| s.index == index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True if step folders and data subfolders match one to one.
    pub fn is_consistent(&self) -> bool {
        self.steps == self.data
    }
}

/// Lists the step folders directly under `dir`, sorted by index.
fn scan_folders(dir: &Path) -> Result<Vec<StepFolder>> {
    let mut folders = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(folder) = name.to_str().and_then(StepFolder::parse) {
            folders.push(folder);
        }
    }
    folders.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make(run_dir: &Path, names: &[&str], data: &[&str]) {
        for name in names {
            fs::create_dir_all(run_dir.join(name)).unwrap();
        }
        for name in data {
            fs::create_dir_all(run_dir.join(DATA_DIR).join(name)).unwrap();
        }
    }

    #[test]
    fn test_scan_orders_by_index_and_ignores_others() {
        let temp_dir = tempdir().unwrap();
        let run_dir = temp_dir.path();
        make(run_dir, &["02_seletop", "00_topoaa", "01_rigidbody", "notes"], &[]);
        fs::write(run_dir.join("03_file"), "not a folder").unwrap();

        let layout = RunLayout::scan(run_dir).unwrap();
        let names: Vec<_> = layout.steps().iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["00_topoaa", "01_rigidbody", "02_seletop"]);
        assert!(layout.data_folders().is_empty());
        assert_eq!(layout.step(1).unwrap().module, "rigidbody");
        assert!(layout.step(7).is_none());
    }

    #[test]
    fn test_consistency() {
        let temp_dir = tempdir().unwrap();
        let run_dir = temp_dir.path();
        make(
            run_dir,
            &["00_topoaa", "01_rigidbody"],
            &["00_topoaa", "01_rigidbody"],
        );
        assert!(RunLayout::scan(run_dir).unwrap().is_consistent());

        fs::remove_dir(run_dir.join(DATA_DIR).join("01_rigidbody")).unwrap();
        let layout = RunLayout::scan(run_dir).unwrap();
        assert!(!layout.is_consistent());
        assert_eq!(layout.len(), 2);
    }

    #[test]
    fn test_from_steps() {
        let steps = vec![
            ModuleStep::new(0, "topoaa", "topoaa", "00_topoaa"),
            ModuleStep::new(1, "emref", "emref", "01_emref"),
        ];
        let layout = RunLayout::from_steps("run1", &steps);

        assert!(layout.is_consistent());
        assert_eq!(layout.run_dir(), Path::new("run1"));
        assert_eq!(layout.steps()[1].name, "01_emref");
    }

    #[test]
    fn test_step_folder_parse() {
        let folder = StepFolder::parse("04_flexref").unwrap();
        assert_eq!(folder.index, 4);
        assert_eq!(folder.module, "flexref");
        assert!(StepFolder::parse(DATA_DIR).is_none());
    }
}
