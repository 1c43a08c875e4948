//! Job execution adapters for Gantry.
//!
//! [`ShellJobRunner`] runs job steps on the host; the uploaders publish the
//! coverage report of the designated instance.

pub mod shell;
pub mod upload;

pub use shell::{RunnerConfig, ShellJobRunner, WORK_DIR, WorkspaceIsolation};
pub use upload::{DirectoryUploader, NoopUploader};
