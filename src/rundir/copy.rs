//! Step Copy
//!
//! Derives a new run directory from selected steps of an existing one. The
//! selected steps are renumbered from zero in ascending order of their
//! original index, their step and data folders are copied, and every text
//! file in the copied step folders is rewritten so that references to the
//! old step names and the old run directory point at the new ones.
//!
//! ```text
//! copy -r run1 -m 2 4 -o run2
//!
//! run1/02_seletop  -> run2/00_seletop
//! run1/04_emref    -> run2/01_emref
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use super::layout::{RunLayout, StepFolder};
use super::DATA_DIR;
use crate::error::{Result, RunnerError};
use crate::workflow::planner::ZeroFill;

/// Outcome of a step copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyReport {
    /// The new run directory
    pub layout: RunLayout,
    /// Source data folders that did not exist; empty ones were created
    pub missing_data: Vec<PathBuf>,
}

/// Copies the steps at `indices` of `source` into a new run at `dest`.
///
/// Fails without touching the filesystem if `dest` exists, `source` is not
/// a directory or an index has no step folder. If copying fails midway the
/// partial `dest` is removed.
pub fn copy_steps(source: &Path, indices: &[usize], dest: &Path) -> Result<CopyReport> {
    if dest.exists() {
        return Err(RunnerError::precondition(format!(
            "Directory '{}' already exists",
            dest.display()
        )));
    }
    if !source.is_dir() {
        return Err(RunnerError::precondition(format!(
            "Run directory '{}' does not exist",
            source.display()
        )));
    }

    info!("Reading input run directory {}", source.display());
    let layout = RunLayout::scan(source)?;

    let wanted: BTreeSet<usize> = indices.iter().copied().collect();
    let mut selected: Vec<&StepFolder> = Vec::new();
    let mut unknown = Vec::new();
    for index in wanted {
        match layout.step(index) {
            Some(folder) => selected.push(folder),
            None => unknown.push(index.to_string()),
        }
    }
    if !unknown.is_empty() {
        return Err(RunnerError::precondition(format!(
            "Run directory '{}' has no step(s) {}",
            source.display(),
            unknown.join(", ")
        )));
    }
    if selected.is_empty() {
        return Err(RunnerError::precondition("No steps selected"));
    }
    info!(
        "Selected steps: {}",
        selected
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    fs::create_dir_all(dest.join(DATA_DIR))?;
    info!("Created directory: {}", dest.display());

    match copy_selected(source, &selected, dest) {
        Ok(report) => Ok(report),
        Err(e) => {
            warn!("Copy failed, removing {}", dest.display());
            if let Err(cleanup) = fs::remove_dir_all(dest) {
                warn!("Could not remove {}: {}", dest.display(), cleanup);
            }
            Err(e)
        }
    }
}

fn copy_selected(source: &Path, selected: &[&StepFolder], dest: &Path) -> Result<CopyReport> {
    let fill = ZeroFill::for_total(selected.len());
    let mut renames = Vec::with_capacity(selected.len());
    let mut missing_data = Vec::new();
    for (position, old) in selected.iter().enumerate() {
        let new_name = fill.fill(&old.module, position);

        let from = source.join(&old.name);
        let to = dest.join(&new_name);
        copy_tree(&from, &to)?;
        info!("Copied {} -> {}", from.display(), to.display());

        let from = source.join(DATA_DIR).join(&old.name);
        let to = dest.join(DATA_DIR).join(&new_name);
        if from.is_dir() {
            copy_tree(&from, &to)?;
            info!("Copied {} -> {}", from.display(), to.display());
        } else {
            warn!(
                "{} does not exist, creating an empty data folder",
                from.display()
            );
            fs::create_dir_all(&to)?;
            missing_data.push(from);
        }

        renames.push((old.name.clone(), new_name));
    }

    let substitutions = substitutions(source, dest, &renames);
    for (_, new_name) in &renames {
        let rewritten = rewrite_tree(&dest.join(new_name), &substitutions)?;
        debug!("Updated references in {} file(s) of {}", rewritten, new_name);
    }
    info!("File references updated");

    Ok(CopyReport {
        layout: RunLayout::scan(dest)?,
        missing_data,
    })
}

/// Replaces every occurrence of each pattern in a single left-to-right
/// pass.
///
/// At each position the longest matching pattern wins. Replacement text is
/// never scanned again, so one substitution cannot alter another's output.
///
/// ```
/// use dockrunner::rundir::replace_longest_first;
///
/// let pairs = vec![
///     ("run".to_string(), "X".to_string()),
///     ("run1".to_string(), "run2".to_string()),
/// ];
/// assert_eq!(replace_longest_first("run1/run", &pairs), "run2/X");
/// ```
pub fn replace_longest_first(text: &str, pairs: &[(String, String)]) -> String {
    let mut patterns: Vec<&(String, String)> =
        pairs.iter().filter(|(old, _)| !old.is_empty()).collect();
    patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while let Some(c) = rest.chars().next() {
        for (old, new) in &patterns {
            if rest.starts_with(old.as_str()) {
                out.push_str(new);
                rest = &rest[old.len()..];
                continue 'scan;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Builds the rename table: step names, then the run directory as given
/// and in canonical form.
///
/// A run directory written as `.`, `..` or nothing only appears through its
/// canonical form.
fn substitutions(source: &Path, dest: &Path, renames: &[(String, String)]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = renames.to_vec();

    if let (Some(from), Some(to)) = (path_text(source), path_text(dest)) {
        pairs.push((from, to));
    }
    if let (Ok(source), Ok(dest)) = (fs::canonicalize(source), fs::canonicalize(dest)) {
        if let (Some(from), Some(to)) = (path_text(&source), path_text(&dest)) {
            pairs.push((from, to));
        }
    }
    pairs.sort();
    pairs.dedup();
    pairs
}

/// Path as matched in file contents, without a leading `./` or trailing `/`.
fn path_text(path: &Path) -> Option<String> {
    let text = path.to_string_lossy();
    let mut text = text.as_ref();
    while let Some(rest) = text.strip_prefix("./") {
        text = rest;
    }
    let text = text.trim_end_matches('/');
    match text {
        "" | "." | ".." => None,
        _ => Some(text.to_string()),
    }
}

/// Recursively copies a directory tree.
///
/// Symbolic links are copied as what they point to. Broken links are
/// recreated as links.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(src).unwrap_or(path);
        let target: PathBuf = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if file_type.is_symlink() {
            copy_link(path, &target)?;
        } else if file_type.is_file() {
            fs::copy(path, &target)?;
        }
    }
    Ok(())
}

fn copy_link(link: &Path, target: &Path) -> Result<()> {
    match fs::canonicalize(link) {
        Ok(real) if real.is_dir() => {
            // A link to one of its own ancestors would never end.
            let parent = link.parent().and_then(|p| fs::canonicalize(p).ok());
            if parent.is_some_and(|p| p.starts_with(&real)) {
                warn!("Skipping recursive link {}", link.display());
                return Ok(());
            }
            copy_tree(&real, target)
        }
        Ok(real) if real.is_file() => {
            fs::copy(real, target)?;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(_) => {
            let points_to = fs::read_link(link)?;
            debug!(
                "Keeping broken link {} -> {}",
                link.display(),
                points_to.display()
            );
            #[cfg(unix)]
            std::os::unix::fs::symlink(&points_to, target)?;
            Ok(())
        }
    }
}

/// Applies the substitutions to every UTF-8 file under `dir`.
///
/// Returns the number of files changed.
fn rewrite_tree(dir: &Path, pairs: &[(String, String)]) -> Result<usize> {
    let mut changed = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(text) = fs::read_to_string(entry.path()) else {
            debug!("Skipping non-text file {}", entry.path().display());
            continue;
        };
        let updated = replace_longest_first(&text, pairs);
        if updated != text {
            fs::write(entry.path(), updated)?;
            changed += 1;
        }
    }
    Ok(changed)
}
