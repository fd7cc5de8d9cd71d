//! Engine-backed modules.
//!
//! These modules hand their step to an external engine through the
//! compute backend and publish whatever the engine reports.

use std::path::PathBuf;

use log::debug;

use super::{builtin_defaults, Category, Module, StepContext};
use crate::environment::find_executable;
use crate::execution::artifact::StepOutput;
use crate::execution::backend::{read_results, ComputeBackend, StepResult};
use crate::workflow::model::ParamSet;

/// A module whose computation runs in an external executable.
#[derive(Debug, Clone)]
pub struct EngineModule {
    name: &'static str,
    category: Category,
    executable: &'static str,
    branched_input: bool,
}

impl EngineModule {
    pub fn new(name: &'static str, category: Category, executable: &'static str) -> Self {
        Self {
            name,
            category,
            executable,
            branched_input: false,
        }
    }

    /// Allows the module to follow one that produced a branched output.
    pub fn accepting_branches(mut self) -> Self {
        self.branched_input = true;
        self
    }

    /// Name of the engine executable this module runs.
    pub fn executable(&self) -> &str {
        self.executable
    }
}

/// The engine-backed built-in modules, in registry order.
pub fn builtin_engine_modules() -> Vec<EngineModule> {
    vec![
        EngineModule::new("topoaa", Category::Topology, "cns"),
        EngineModule::new("rigidbody", Category::Sampling, "cns"),
        EngineModule::new("flexref", Category::Refinement, "cns"),
        EngineModule::new("emref", Category::Refinement, "cns"),
        EngineModule::new("caprieval", Category::Analysis, "caprieval").accepting_branches(),
        EngineModule::new("clustfcc", Category::Analysis, "fcc"),
    ]
}

impl Module for EngineModule {
    fn name(&self) -> &str {
        self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    fn defaults(&self) -> &ParamSet {
        builtin_defaults(self.name)
    }

    fn confirm_installation(&self) -> Result<(), String> {
        match find_executable(self.executable) {
            Some(path) => {
                debug!("Module '{}' uses {}", self.name, path.display());
                Ok(())
            }
            None => Err(format!(
                "module '{}' requires the '{}' executable; install it on PATH or set {}",
                self.name,
                self.executable,
                crate::environment::override_var(self.executable)
            )),
        }
    }

    fn accepts_branched_input(&self) -> bool {
        self.branched_input
    }

    fn execute(
        &self,
        ctx: &StepContext<'_>,
        backend: &dyn ComputeBackend,
    ) -> StepResult<StepOutput> {
        let executable =
            find_executable(self.executable).unwrap_or_else(|| PathBuf::from(self.executable));
        let invocation = ctx.invocation(self.name, executable);

        let completion = backend.submit(&invocation)?;
        read_results(&completion.results_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::artifact::ProducedArtifact;
    use crate::execution::backend::{Completion, Invocation, RESULTS_FILE};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records invocations and answers with a fixed output.
    struct CannedBackend {
        output: StepOutput,
        seen: Mutex<Vec<Invocation>>,
    }

    impl ComputeBackend for CannedBackend {
        fn submit(&self, invocation: &Invocation) -> StepResult<Completion> {
            self.seen.lock().unwrap().push(invocation.clone());
            invocation.write()?;
            let results_path = invocation.workdir().join(RESULTS_FILE);
            self.output.save(&results_path)?;
            Ok(Completion { results_path })
        }
    }

    #[test]
    fn test_builtin_engine_modules() {
        let modules = builtin_engine_modules();
        assert_eq!(modules.len(), 6);
        assert!(modules.iter().all(|m| !m.defaults().is_empty()));

        let clustfcc = modules.iter().find(|m| m.name() == "clustfcc").unwrap();
        assert_eq!(clustfcc.executable(), "fcc");
        assert!(!clustfcc.accepts_branched_input());

        let caprieval = modules.iter().find(|m| m.name() == "caprieval").unwrap();
        assert!(caprieval.accepts_branched_input());
    }

    #[test]
    fn test_confirm_installation_reports_missing_engine() {
        let module = EngineModule::new("fake", Category::Sampling, "no-such-engine-xyz");
        let err = module.confirm_installation().unwrap_err();

        assert!(err.contains("no-such-engine-xyz"));
        assert!(err.contains("DOCKRUNNER_NO_SUCH_ENGINE_XYZ_EXEC"));
    }

    #[test]
    fn test_execute_publishes_engine_results() {
        let temp_dir = tempdir().unwrap();
        let expected = StepOutput::single(vec![
            ProducedArtifact::model(-40.0, "01_rigidbody/rigidbody_1.pdb"),
            ProducedArtifact::model(-35.0, "01_rigidbody/rigidbody_2.pdb"),
        ]);
        let backend = CannedBackend {
            output: expected.clone(),
            seen: Mutex::new(Vec::new()),
        };

        let module = EngineModule::new("rigidbody", Category::Sampling, "no-such-engine-xyz");
        let params = module.merged_params(&ParamSet::new());
        let input = StepOutput::empty();
        let ctx = StepContext {
            index: 1,
            step: "01_rigidbody",
            run_dir: temp_dir.path(),
            params: &params,
            ncores: 4,
            input: &input,
        };

        let output = module.execute(&ctx, &backend).unwrap();
        assert_eq!(output, expected);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].module, "rigidbody");
        assert_eq!(seen[0].ncores, 4);
        assert_eq!(seen[0].executable, Path::new("no-such-engine-xyz"));
        assert!(seen[0].params.contains_key("sampling"));
    }
}
