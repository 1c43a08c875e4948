//! Matrix expansion for parallel job generation.

use gantry_core::Result;
use gantry_core::job::{JobInstance, JobSpec};
use gantry_core::workflow::Workflow;
use tracing::debug;

/// Expander for OS-axis job matrices.
pub struct MatrixExpander;

impl MatrixExpander {
    pub fn new() -> Self {
        Self
    }

    /// Produce one instance per axis value, in declaration order.
    pub fn expand(&self, spec: &JobSpec) -> Vec<JobInstance> {
        spec.axis_values
            .iter()
            .map(|os| {
                let mut resolved = spec.default_overrides.clone();
                if let Some(overrides) = spec.per_axis_overrides.get(os) {
                    resolved.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                JobInstance {
                    job: spec.name.clone(),
                    os: os.clone(),
                    resolved_overrides: resolved,
                }
            })
            .collect()
    }

    /// Expand every job of a workflow, jobs in declaration order.
    pub fn expand_workflow(&self, workflow: &Workflow) -> Result<Vec<JobInstance>> {
        let mut instances = Vec::new();
        for job in &workflow.jobs {
            let expanded = self.expand(&job.spec()?);
            debug!(job = %job.name, instances = expanded.len(), "Expanded job matrix");
            instances.extend(expanded);
        }
        Ok(instances)
    }
}

impl Default for MatrixExpander {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a job template into its concrete instances.
pub fn expand(spec: &JobSpec) -> Vec<JobInstance> {
    MatrixExpander::new().expand(spec)
}
