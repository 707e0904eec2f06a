// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Run context
//!
//! Everything a composite tool needs to expand and run its pipeline,
//! passed explicitly instead of living in process-wide state.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::jobs::JobRegistry;
use crate::pipeline::{PipelineEvaluator, TemplateEvaluator};
use crate::tools::ToolRegistry;

/// Registries, evaluator and settings shared by one run
///
/// Cloning is cheap; clones share the same registries and cancellation
/// token.
#[derive(Clone)]
pub struct RunContext {
    tools: Arc<ToolRegistry>,
    evaluator: Arc<dyn PipelineEvaluator>,
    jobs: JobRegistry,
    settings: Arc<Settings>,
    cancel: CancellationToken,
}

impl RunContext {
    /// Context with the template evaluator, an empty job registry and
    /// default settings
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools: Arc::new(tools),
            evaluator: Arc::new(TemplateEvaluator),
            jobs: JobRegistry::new(),
            settings: Arc::new(Settings::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_jobs(mut self, jobs: JobRegistry) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn PipelineEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Use `cancel` as the run's cancellation signal
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn evaluator(&self) -> &dyn PipelineEvaluator {
        self.evaluator.as_ref()
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Fires when the whole run is canceled
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Same registries and settings under a different cancellation token
    pub(crate) fn scoped(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("tools", &self.tools.len())
            .field("settings", &self.settings)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
