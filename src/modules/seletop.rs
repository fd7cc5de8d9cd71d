//! Select the top-scoring models of the previous step.

use super::{builtin_defaults, Category, Module, StepContext};
use crate::execution::artifact::{FileType, StepOutput};
use crate::execution::backend::{ComputeBackend, StepResult};
use crate::execution::selection::select_top;
use crate::workflow::model::ParamSet;

/// Keeps the `select` lowest-scoring structural models.
#[derive(Debug, Clone, Default)]
pub struct SelectTop;

impl SelectTop {
    pub fn new() -> Self {
        Self
    }
}

impl Module for SelectTop {
    fn name(&self) -> &str {
        "seletop"
    }

    fn category(&self) -> Category {
        Category::Analysis
    }

    fn defaults(&self) -> &ParamSet {
        builtin_defaults("seletop")
    }

    fn confirm_installation(&self) -> Result<(), String> {
        Ok(())
    }

    fn execute(
        &self,
        ctx: &StepContext<'_>,
        _backend: &dyn ComputeBackend,
    ) -> StepResult<StepOutput> {
        let candidates = match ctx.input {
            StepOutput::Single { artifacts } => artifacts,
            StepOutput::Branched { .. } => {
                return Err("[seletop] This module cannot come after one that produced an iterable"
                    .into())
            }
        };

        let count = ctx.param_usize("select")?;
        let selection = select_top(candidates, FileType::StructuralModel, count);

        Ok(StepOutput::single(selection.selected))
    }
}
