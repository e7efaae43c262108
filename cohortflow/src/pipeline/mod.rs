//! Pipeline configuration and execution.
//!
//! This module provides:
//! - [`PipelineConfig`]: the explicit, serde-loadable configuration
//! - [`Pipeline`] / [`PipelineBuilder`]: the fetch → transform → store
//!   orchestrator
//! - [`RunReport`] / [`RunId`]: what a successful run returns

mod config;
mod orchestrator;
mod report;

pub use config::PipelineConfig;
pub use orchestrator::{Pipeline, PipelineBuilder};
pub use report::{RunId, RunReport};
