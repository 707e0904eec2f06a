// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! # toolflow - Tool and Pipeline Runner
//!
//! `toolflow` runs tools: either a single command, or a composite tool
//! whose pipeline of other tools is expanded into a job graph.
//!
//! ## Features
//!
//! - **Recursive expansion** - Composite tools are inlined into one flat graph
//! - **Transitive reduction** - Redundant dependencies are dropped before scheduling
//! - **Job tracking** - Every node runs as a job with states, messages and timestamps
//! - **Cancellation** - Failures and interrupts cancel dependents and sub-jobs
//!
//! ## Quick Start
//!
//! ```bash
//! # List tools declared in toolflow.yaml
//! toolflow tools
//!
//! # Show how a composite tool expands
//! toolflow graph sort-twice -s input=in.txt -s output=out.txt
//!
//! # Run it
//! toolflow run sort-twice -s input=in.txt -s output=out.txt
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod executors;
pub mod jobs;
pub mod manifest;
pub mod pipeline;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use context::RunContext;
pub use errors::{ToolflowError, ToolflowResult};
pub use jobs::{Job, JobHandle, JobRegistry, JobState};
pub use manifest::Manifest;
pub use pipeline::{PipelineDescription, PipelineExecutor, PipelineGraph, PipelineJob};
pub use tools::{Configuration, Parameter, Tool, ToolRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
