//! Select the best models of the best clusters.
//!
//! Consumes the branched output of a clustering step: branches are taken
//! in order (best cluster first), up to `top_cluster` of them, and the
//! `top_models` lowest-scoring models of each are kept. The result is a
//! single flat list, cluster by cluster.

use log::info;

use super::{builtin_defaults, Category, Module, StepContext};
use crate::execution::artifact::{FileType, ProducedArtifact, StepOutput};
use crate::execution::backend::{ComputeBackend, StepResult};
use crate::execution::selection::select_top;
use crate::workflow::model::ParamSet;

#[derive(Debug, Clone, Default)]
pub struct SelectTopClusters;

impl SelectTopClusters {
    pub fn new() -> Self {
        Self
    }
}

impl Module for SelectTopClusters {
    fn name(&self) -> &str {
        "seletopclusts"
    }

    fn category(&self) -> Category {
        Category::Analysis
    }

    fn defaults(&self) -> &ParamSet {
        builtin_defaults("seletopclusts")
    }

    fn confirm_installation(&self) -> Result<(), String> {
        Ok(())
    }

    fn accepts_branched_input(&self) -> bool {
        true
    }

    fn execute(
        &self,
        ctx: &StepContext<'_>,
        _backend: &dyn ComputeBackend,
    ) -> StepResult<StepOutput> {
        let top_cluster = ctx.param_usize("top_cluster")?;
        let top_models = ctx.param_usize("top_models")?;

        let branches: Vec<&[ProducedArtifact]> = match ctx.input {
            StepOutput::Single { artifacts } => vec![artifacts.as_slice()],
            StepOutput::Branched { branches } => branches.iter().map(Vec::as_slice).collect(),
        };

        let mut selected = Vec::new();
        for (rank, branch) in branches.into_iter().take(top_cluster).enumerate() {
            let selection = select_top(branch, FileType::StructuralModel, top_models);
            info!(
                "[seletopclusts] cluster {}: {} model(s) selected",
                rank + 1,
                selection.selected.len()
            );
            selected.extend(selection.selected);
        }

        Ok(StepOutput::single(selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::backend::DryRunBackend;
    use serde_yaml::Value;
    use std::path::Path;

    fn run(input: &StepOutput, top_cluster: i64, top_models: i64) -> StepOutput {
        let module = SelectTopClusters::new();
        let mut params = ParamSet::new();
        params.insert("top_cluster".to_string(), Value::from(top_cluster));
        params.insert("top_models".to_string(), Value::from(top_models));

        let ctx = StepContext {
            index: 5,
            step: "05_seletopclusts",
            run_dir: Path::new("/unused"),
            params: &params,
            ncores: 1,
            input,
        };
        module.execute(&ctx, &DryRunBackend).unwrap()
    }

    fn clusters() -> StepOutput {
        StepOutput::branched(vec![
            vec![
                ProducedArtifact::model(-10.0, "c1_a.pdb"),
                ProducedArtifact::model(-30.0, "c1_b.pdb"),
                ProducedArtifact::model(-20.0, "c1_c.pdb"),
            ],
            vec![
                ProducedArtifact::model(-5.0, "c2_a.pdb"),
                ProducedArtifact::model(-8.0, "c2_b.pdb"),
            ],
            vec![ProducedArtifact::model(-1.0, "c3_a.pdb")],
        ])
    }

    fn names(output: &StepOutput) -> Vec<String> {
        output
            .artifacts()
            .map(|a| a.path.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_selects_per_cluster_in_cluster_order() {
        let output = run(&clusters(), 2, 2);
        assert!(!output.is_branched());
        assert_eq!(names(&output), vec!["c1_b.pdb", "c1_c.pdb", "c2_b.pdb", "c2_a.pdb"]);
    }

    #[test]
    fn test_small_clusters_contribute_everything() {
        let output = run(&clusters(), 10, 5);
        assert_eq!(output.len(), 6);
    }

    #[test]
    fn test_single_input_treated_as_one_cluster() {
        let input = StepOutput::single(vec![
            ProducedArtifact::model(2.0, "x.pdb"),
            ProducedArtifact::model(1.0, "y.pdb"),
        ]);
        let output = run(&input, 3, 1);
        assert_eq!(names(&output), vec!["y.pdb"]);
    }

    #[test]
    fn test_accepts_branched_input() {
        assert!(SelectTopClusters::new().accepts_branched_input());
    }
}
