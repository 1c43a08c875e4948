//! Gantry Core
//!
//! Core domain types, traits, and error handling for Gantry.
//! This crate defines the shared vocabulary of the CI policy: repository
//! events, workflow definitions, job instances, results and verdicts.

pub mod error;
pub mod event;
pub mod glob;
pub mod ids;
pub mod interpolation;
pub mod job;
pub mod ports;
pub mod verdict;
pub mod workflow;

pub use error::{Error, Result};
pub use ids::*;
