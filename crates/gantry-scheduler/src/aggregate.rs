//! Folding job results into a pipeline verdict.

use gantry_core::ids::Os;
use gantry_core::job::{InstanceKey, JobInstance, JobResult, JobStatus, UploadStatus};
use gantry_core::verdict::{IssueKind, OverallStatus, PipelineVerdict, Severity, VerdictIssue};
use gantry_core::workflow::{CoverageConfig, Workflow};
use std::collections::BTreeSet;
use tracing::debug;

/// Reduces job results to a [`PipelineVerdict`].
///
/// The reduction is commutative: results are put in canonical order before
/// anything is derived from them, so arrival order never changes the verdict.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    coverage: Option<CoverageConfig>,
}

impl ResultAggregator {
    pub fn new(coverage: Option<CoverageConfig>) -> Self {
        Self { coverage }
    }

    pub fn from_workflow(workflow: &Workflow) -> Self {
        Self::new(workflow.coverage.clone())
    }

    /// Aggregate a complete result set.
    pub fn aggregate(&self, results: impl IntoIterator<Item = JobResult>) -> PipelineVerdict {
        let mut results: Vec<JobResult> = results.into_iter().collect();
        results.sort();

        let issues: Vec<VerdictIssue> = results.iter().flat_map(|r| self.issues_for(r)).collect();
        let status = if issues.iter().any(|i| i.severity == Severity::Error) {
            OverallStatus::Failure
        } else {
            OverallStatus::Success
        };

        debug!(
            %status,
            results = results.len(),
            issues = issues.len(),
            "Aggregated pipeline results"
        );

        PipelineVerdict {
            status,
            results,
            issues,
        }
    }

    /// Aggregate while some instances may still be running. Any expected
    /// instance without a result makes the verdict `Pending`.
    pub fn aggregate_partial(
        &self,
        expected: &[JobInstance],
        results: impl IntoIterator<Item = JobResult>,
    ) -> PipelineVerdict {
        let mut verdict = self.aggregate(results);

        let reported: BTreeSet<InstanceKey> =
            verdict.results.iter().map(|r| r.instance.key()).collect();
        let missing: BTreeSet<InstanceKey> = expected
            .iter()
            .map(JobInstance::key)
            .filter(|key| !reported.contains(key))
            .collect();

        if missing.is_empty() {
            return verdict;
        }

        verdict.status = OverallStatus::Pending;
        verdict
            .issues
            .extend(missing.into_iter().map(|key| VerdictIssue {
                job: key.job,
                os: key.os,
                severity: Severity::Warning,
                kind: IssueKind::NotReported,
            }));
        verdict
    }

    fn issues_for(&self, result: &JobResult) -> Vec<VerdictIssue> {
        let issue = |severity, kind| VerdictIssue {
            job: result.instance.job.clone(),
            os: result.instance.os.clone(),
            severity,
            kind,
        };

        if result.status == JobStatus::Failure {
            return vec![issue(
                Severity::Error,
                IssueKind::JobFailed {
                    message: result.message.clone(),
                },
            )];
        }

        let Some(coverage) = &self.coverage else {
            return Vec::new();
        };
        if !coverage.applies_to(&result.instance) {
            return Vec::new();
        }

        let severity = if coverage.fail_on_error {
            Severity::Error
        } else {
            Severity::Warning
        };

        let kind = match &result.coverage_report {
            None => IssueKind::CoverageMissing,
            Some(report) => match &report.upload {
                UploadStatus::Failed { reason } => IssueKind::CoverageUploadFailed {
                    reason: reason.clone(),
                },
                _ if !report.is_valid() => IssueKind::CoverageEmpty,
                _ => return Vec::new(),
            },
        };

        vec![issue(severity, kind)]
    }
}

/// Aggregate a complete result set, requiring a valid coverage report from
/// every instance running on `coverage_required_os`.
pub fn aggregate(
    results: impl IntoIterator<Item = JobResult>,
    coverage_required_os: impl Into<Os>,
    fail_on_coverage_error: bool,
) -> PipelineVerdict {
    ResultAggregator::new(Some(CoverageConfig::new(
        coverage_required_os,
        fail_on_coverage_error,
    )))
    .aggregate(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::job::CoverageReport;
    use pretty_assertions::assert_eq;

    const UBUNTU: &str = "ubuntu-22.04";

    fn coverage() -> CoverageReport {
        CoverageReport::new("coverage.xml", "<coverage line-rate=\"0.71\"/>")
    }

    fn all_green() -> Vec<JobResult> {
        vec![
            JobResult::success(JobInstance::new("tests", UBUNTU)).with_coverage(coverage()),
            JobResult::success(JobInstance::new("tests", "windows-2022")),
            JobResult::success(JobInstance::new("tests", "macos-latest")),
        ]
    }

    #[test]
    fn test_all_success_with_coverage() {
        let verdict = aggregate(all_green(), UBUNTU, true);
        assert_eq!(verdict.status, OverallStatus::Success);
        assert!(verdict.issues.is_empty());
        assert_eq!(verdict.results.len(), 3);
    }

    #[test]
    fn test_single_failure_fails_pipeline() {
        let mut results = all_green();
        results[1] = JobResult::failure(
            JobInstance::new("tests", "windows-2022"),
            "step `test` exited with code 1",
        );

        let verdict = aggregate(results, UBUNTU, true);
        assert_eq!(verdict.status, OverallStatus::Failure);
        assert_eq!(verdict.failed_results().count(), 1);
        assert_eq!(verdict.issues.len(), 1);
        assert_eq!(verdict.issues[0].os, "windows-2022");
        assert_eq!(verdict.results.len(), 3);
    }

    #[test]
    fn test_missing_coverage_fails_when_required() {
        let mut results = all_green();
        results[0].coverage_report = None;

        let verdict = aggregate(results, UBUNTU, true);
        assert_eq!(verdict.status, OverallStatus::Failure);
        assert_eq!(verdict.issues[0].kind, IssueKind::CoverageMissing);
    }

    #[test]
    fn test_coverage_problems_are_warnings_when_not_required() {
        let mut results = all_green();
        results[0].coverage_report = None;

        let verdict = aggregate(results, UBUNTU, false);
        assert_eq!(verdict.status, OverallStatus::Success);
        assert_eq!(verdict.warnings().count(), 1);
    }

    #[test]
    fn test_failed_upload_fails_pipeline() {
        let mut results = all_green();
        let mut report = coverage();
        report.upload = UploadStatus::Failed {
            reason: "HTTP 503".to_string(),
        };
        results[0].coverage_report = Some(report);

        let verdict = aggregate(results, UBUNTU, true);
        assert_eq!(verdict.status, OverallStatus::Failure);
        assert_eq!(
            verdict.issues[0].kind,
            IssueKind::CoverageUploadFailed {
                reason: "HTTP 503".to_string()
            }
        );
    }

    #[test]
    fn test_empty_report_is_invalid() {
        let mut results = all_green();
        results[0].coverage_report = Some(CoverageReport::new("coverage.xml", ""));

        let verdict = aggregate(results, UBUNTU, true);
        assert_eq!(verdict.issues[0].kind, IssueKind::CoverageEmpty);
    }

    #[test]
    fn test_coverage_only_checked_on_designated_os() {
        let results = vec![
            JobResult::success(JobInstance::new("tests", UBUNTU)).with_coverage(coverage()),
            JobResult::success(JobInstance::new("tests", "windows-2022")),
        ];
        assert!(aggregate(results, UBUNTU, true).is_success());
    }

    #[test]
    fn test_coverage_job_scoping() {
        let aggregator = ResultAggregator::new(Some(
            CoverageConfig::new(UBUNTU, true).for_job("tests"),
        ));
        let mut results = all_green();
        results.push(JobResult::success(JobInstance::new("lint", UBUNTU)));

        assert!(aggregator.aggregate(results.clone()).is_success());
        assert!(!aggregate(results, UBUNTU, true).is_success());
    }

    #[test]
    fn test_failed_coverage_job_reports_only_the_failure() {
        let mut results = all_green();
        results[0] = JobResult::failure(JobInstance::new("tests", UBUNTU), "pytest failed");

        let verdict = aggregate(results, UBUNTU, true);
        assert_eq!(verdict.issues.len(), 1);
        assert!(matches!(verdict.issues[0].kind, IssueKind::JobFailed { .. }));
    }

    #[test]
    fn test_permutation_invariance() {
        let mut results = all_green();
        results[2] = JobResult::failure(JobInstance::new("tests", "macos-latest"), "segfault");
        results.push(JobResult::success(JobInstance::new("lint", UBUNTU)));

        let expected = aggregate(results.clone(), UBUNTU, true);

        let n = results.len();
        for rotation in 0..n {
            let mut permuted = results.clone();
            permuted.rotate_left(rotation);
            assert_eq!(aggregate(permuted.clone(), UBUNTU, true), expected);
            permuted.reverse();
            assert_eq!(aggregate(permuted, UBUNTU, true), expected);
        }
    }

    #[test]
    fn test_partial_results_are_pending() {
        let expected: Vec<JobInstance> = all_green().into_iter().map(|r| r.instance).collect();
        let aggregator = ResultAggregator::new(Some(CoverageConfig::new(UBUNTU, true)));

        let partial = aggregator.aggregate_partial(&expected, all_green().into_iter().take(2));
        assert_eq!(partial.status, OverallStatus::Pending);
        assert_eq!(partial.issues.len(), 1);
        assert_eq!(partial.issues[0].kind, IssueKind::NotReported);
        assert_eq!(partial.issues[0].os, "macos-latest");

        let complete = aggregator.aggregate_partial(&expected, all_green());
        assert_eq!(complete.status, OverallStatus::Success);
    }

    #[test]
    fn test_partial_with_failure_is_still_pending() {
        let expected: Vec<JobInstance> = all_green().into_iter().map(|r| r.instance).collect();
        let aggregator = ResultAggregator::new(Some(CoverageConfig::new(UBUNTU, true)));
        let results = vec![JobResult::failure(
            JobInstance::new("tests", "windows-2022"),
            "boom",
        )];

        let verdict = aggregator.aggregate_partial(&expected, results);
        assert_eq!(verdict.status, OverallStatus::Pending);
        assert_eq!(verdict.errors().count(), 1);
    }
}
