// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Pipelines
//!
//! A composite tool's pipeline goes through three steps: the evaluator
//! turns its raw spec into a [`PipelineDescription`], the
//! [`PipelineGraph`] expands and reduces it, and the [`PipelineExecutor`]
//! runs the resulting nodes as jobs.

mod definition;
mod evaluator;
mod executor;
mod graph;

pub use definition::{PipelineDescription, PipelineJob};
pub use evaluator::{PipelineEvaluator, TemplateEvaluator};
pub use executor::{NodeRun, PipelineExecutor, PipelineResult};
pub use graph::{JobNode, PipelineGraph};
