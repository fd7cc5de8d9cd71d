//! Produced Artifacts and Step Output
//!
//! Every module publishes a [`StepOutput`] when it completes. The chain
//! writes it to `io.json` inside the step folder and hands it to the next
//! step as input, which is what makes modules composable regardless of
//! what they compute.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File name of the handoff record written into each completed step folder.
pub const IO_FILE: &str = "io.json";

/// Type tag of a produced artifact.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    StructuralModel,
    Topology,
    RestraintTable,
    #[serde(other)]
    Other,
}

/// One output object produced by a step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProducedArtifact {
    pub file_type: FileType,
    /// Lower is better; used for ranking by downstream modules
    #[serde(default)]
    pub score: f64,
    /// Path relative to the run directory
    pub path: PathBuf,
}

impl ProducedArtifact {
    pub fn new(file_type: FileType, score: f64, path: impl Into<PathBuf>) -> Self {
        Self {
            file_type,
            score,
            path: path.into(),
        }
    }

    /// Shorthand for a structural model.
    pub fn model(score: f64, path: impl Into<PathBuf>) -> Self {
        Self::new(FileType::StructuralModel, score, path)
    }
}

/// Ordered output of a completed step.
///
/// Most modules produce a single ordered list. Modules that split their
/// results (clustering) produce one list per branch; only modules that
/// declare support for it may consume such an output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    Single { artifacts: Vec<ProducedArtifact> },
    Branched { branches: Vec<Vec<ProducedArtifact>> },
}

impl StepOutput {
    /// Empty single-branch output; the input of the first step.
    pub fn empty() -> Self {
        Self::Single {
            artifacts: Vec::new(),
        }
    }

    pub fn single(artifacts: Vec<ProducedArtifact>) -> Self {
        Self::Single { artifacts }
    }

    pub fn branched(branches: Vec<Vec<ProducedArtifact>>) -> Self {
        Self::Branched { branches }
    }

    pub fn is_branched(&self) -> bool {
        matches!(self, Self::Branched { .. })
    }

    /// Total number of artifacts across all branches.
    pub fn len(&self) -> usize {
        match self {
            Self::Single { artifacts } => artifacts.len(),
            Self::Branched { branches } => branches.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every artifact, branch by branch.
    pub fn artifacts(&self) -> Box<dyn Iterator<Item = &ProducedArtifact> + '_> {
        match self {
            Self::Single { artifacts } => Box::new(artifacts.iter()),
            Self::Branched { branches } => Box::new(branches.iter().flatten()),
        }
    }

    /// Reads a step output from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the step output as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for StepOutput {
    fn default() -> Self {
        Self::empty()
    }
}
