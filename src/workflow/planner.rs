//! Step Planning
//!
//! Turns a validated configuration into the ordered list of
//! [`ModuleStep`]s and owns the step folder naming scheme.
//!
//! # Naming
//!
//! Step folders are named `{index:0W}_{module}` where the width `W` is
//! `max(2, digits(total))`. The width travels as an explicit [`ZeroFill`]
//! value; planning, restart and copy each compute it from the step count
//! they work with.
//!
//! ```
//! use dockrunner::workflow::planner::{parse_step_folder, zero_fill, ZeroFill};
//!
//! assert_eq!(zero_fill("flexref", 3, 6), "03_flexref");
//! assert_eq!(ZeroFill::for_total(120).fill("emref", 7), "007_emref");
//! assert_eq!(parse_step_folder("03_flexref"), Some((3, "flexref")));
//! ```

use log::{debug, info};
use serde_yaml::Value;

use super::model::{ModuleStep, ValidatedConfig};

/// Minimum width of the numeric prefix.
const MIN_WIDTH: usize = 2;

/// Zero-padding width for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroFill {
    width: usize,
}

impl ZeroFill {
    /// Width sufficient for `total` steps.
    pub fn for_total(total: usize) -> Self {
        let digits = total.to_string().len();
        Self {
            width: digits.max(MIN_WIDTH),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Folder name of the step at `index`.
    pub fn fill(&self, module: &str, index: usize) -> String {
        format!("{:0width$}_{}", index, module, width = self.width)
    }
}

/// Folder name of step `index` in a run of `total` steps.
pub fn zero_fill(module: &str, index: usize, total: usize) -> String {
    ZeroFill::for_total(total).fill(module, index)
}

/// Splits a step folder name into its index and module name.
///
/// Returns `None` for names that are not step folders.
pub fn parse_step_folder(name: &str) -> Option<(usize, &str)> {
    let (prefix, module) = name.split_once('_')?;
    if prefix.is_empty() || module.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = prefix.parse().ok()?;
    Some((index, module))
}

/// Materializes the steps of a validated configuration in execution order.
///
/// The first step receives the input molecules as its `molecules`
/// parameter.
pub fn plan(config: &ValidatedConfig) -> Vec<ModuleStep> {
    let total = config.steps().len();
    let fill = ZeroFill::for_total(total);
    info!("Planning {} steps (prefix width {})", total, fill.width());

    config
        .steps()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let dir_name = fill.fill(&entry.module, index);
            let mut step = ModuleStep::new(index, &entry.key, &entry.module, &dir_name);
            step.params = entry.params.clone();

            if index == 0 {
                let molecules: Vec<Value> = config
                    .general()
                    .molecules
                    .iter()
                    .map(|p| Value::from(p.to_string_lossy().into_owned()))
                    .collect();
                step.params
                    .insert("molecules".to_string(), Value::Sequence(molecules));
            }

            debug!("Planned step {} as '{}'", entry.key, dir_name);
            step
        })
        .collect()
}
