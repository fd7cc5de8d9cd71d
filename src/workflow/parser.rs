//! Workflow Parser
//!
//! Handles loading and parsing workflow configurations from YAML files.
//! Parsing keeps the declaration order of every top-level key; semantic
//! checks live in the validator.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info};
use serde_yaml::Value;

use super::model::WorkflowConfig;
use crate::error::{Result, RunnerError};

/// Loads a workflow configuration from a YAML file.
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Returns
///
/// * `Ok(WorkflowConfig)` - Parsed, not yet validated configuration
/// * `Err(RunnerError::Configuration)` - Unreadable file or invalid YAML
///
/// # Example
///
/// ```rust,no_run
/// use dockrunner::workflow::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("docking.yaml")?;
///     println!("Loaded {} top-level entries", config.entries.len());
///     Ok(())
/// }
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<WorkflowConfig> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|e| {
        RunnerError::config(format!(
            "Failed to read workflow file '{}': {}. Check that the file exists and is readable.",
            path.display(),
            e
        ))
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    parse_config(&yaml_content)
}

/// Parses a workflow configuration from YAML text.
pub fn parse_config(yaml_content: &str) -> Result<WorkflowConfig> {
    if yaml_content.trim().is_empty() {
        return Err(RunnerError::config("Workflow file is empty"));
    }

    // Mapping rejects duplicate keys; a plain map would keep the last one.
    let document: Value = serde_yaml::from_str(yaml_content).map_err(|e| {
        RunnerError::config(format!(
            "Failed to parse workflow YAML: {}. Check the file format.",
            e
        ))
    })?;

    let Value::Mapping(mapping) = document else {
        return Err(RunnerError::config(
            "Workflow file must be a mapping of parameters and modules",
        ));
    };

    let mut entries = IndexMap::with_capacity(mapping.len());
    for (key, value) in mapping {
        match key {
            Value::String(key) => {
                entries.insert(key, value);
            }
            other => {
                return Err(RunnerError::config(format!(
                    "Top-level key {:?} is not a string",
                    other
                )))
            }
        }
    }

    let config = WorkflowConfig { entries };

    info!(
        "Parsed {} general parameters, {} steps",
        config.general_entries().count(),
        config.step_entries().count()
    );

    Ok(config)
}

/// Saves a workflow configuration to a YAML file.
pub fn save_config(config: &WorkflowConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let yaml_content = serde_yaml::to_string(config)?;
    fs::write(path, yaml_content)?;
    info!("Workflow saved to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
run_dir: run1
molecules:
  - receptor.pdb
  - ligand.pdb
topoaa:
  autohis: false
rigidbody:
  sampling: 20
seletop:
  select: 5
flexref: {}
flexref.2:
  sampling_factor: 2
"#;

    #[test]
    fn test_parse_preserves_declaration_order() {
        let config = parse_config(SAMPLE).unwrap();
        let steps: Vec<_> = config.step_entries().map(|(k, _)| k.as_str()).collect();

        assert_eq!(
            steps,
            vec!["topoaa", "rigidbody", "seletop", "flexref", "flexref.2"]
        );
    }

    #[test]
    fn test_parse_general_entries() {
        let config = parse_config(SAMPLE).unwrap();
        let general: Vec<_> = config.general_entries().map(|(k, _)| k.as_str()).collect();
        assert_eq!(general, vec!["run_dir", "molecules"]);
    }

    #[test]
    fn test_parse_empty_text() {
        let result = parse_config("   \n");
        assert!(matches!(result, Err(RunnerError::Configuration(_))));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_config("this is not valid yaml: [[[");
        assert!(matches!(result, Err(RunnerError::Configuration(_))));
    }

    #[test]
    fn test_parse_duplicate_module_key_rejected() {
        let text = "run_dir: r\nmolecules: m.pdb\nflexref: {}\nflexref: {}\n";
        assert!(parse_config(text).is_err());
    }

    #[test]
    fn test_parse_rejects_non_mapping_document() {
        assert!(parse_config("- topoaa\n- rigidbody\n").is_err());
        assert!(parse_config("1: topoaa\n").is_err());
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config("/nonexistent/path/workflow.yaml");
        assert!(matches!(result, Err(RunnerError::Configuration(_))));
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("saved.yaml");

        let config = parse_config(SAMPLE).unwrap();
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
