//! Pipeline scheduling and orchestration for Gantry.
//!
//! The policy is split into three pure stages, [`triggers`], [`matrix`] and
//! [`aggregate`], glued together by the async [`scheduler`].

pub mod aggregate;
pub mod matrix;
pub mod scheduler;
pub mod triggers;

pub use aggregate::{ResultAggregator, aggregate};
pub use matrix::{MatrixExpander, expand};
pub use scheduler::{PipelineOutcome, Scheduler};
pub use triggers::{TriggerDecision, TriggerEvaluator, TriggerMismatch, should_run};
