// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Jobs: the tracked execution records
//!
//! A [`Job`] is created when a graph node is about to be dispatched and
//! follows the lifecycle `CREATED -> QUEUED -> RUNNING -> {DONE | FAILED | CANCELED}`.
//! Dependency links between jobs are stored as ids and resolved through the
//! [`JobRegistry`].

mod registry;
mod stats;

pub use registry::{JobHandle, JobRegistry};
pub use stats::{JobStats, StatsMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::tools::Configuration;

/// Job identifier
pub type JobId = String;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Queued,
    Running,
    Done,
    Failed,
    Canceled,
}

impl JobState {
    /// No transition is legal out of a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }

    /// Terminal and not successful
    pub fn is_unsuccessful(self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Queued => 1,
            Self::Running => 2,
            Self::Done | Self::Failed | Self::Canceled => 3,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Queued => write!(f, "QUEUED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Severity of a job message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warn,
    Error,
}

/// A diagnostic message reported by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub created: DateTime<Utc>,
    pub level: MessageLevel,
    /// Id of the job that reported the message
    pub source: JobId,
    pub text: String,
}

impl Message {
    pub fn new(source: &str, level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            created: Utc::now(),
            level,
            source: source.to_string(),
            text: text.into(),
        }
    }
}

/// Execution record for one run of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Owning pipeline instance, absent for standalone jobs
    pub pipeline_id: Option<JobId>,
    /// The job whose execution dispatched this one
    pub parent_id: Option<JobId>,
    /// Identifier assigned by a remote execution environment
    pub remote_id: Option<String>,
    pub tool_name: String,
    /// Name of the environment the job runs in
    pub execute_environment: String,
    pub environment: HashMap<String, String>,
    pub dependencies_before: Vec<JobId>,
    pub dependencies_after: Vec<JobId>,
    pub working_directory: PathBuf,
    pub log: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
    configuration: Configuration,
    progress: i32,
    messages: Vec<Message>,
    state: JobState,
    state_reason: Option<String>,
    job_stats: JobStats,
}

impl Job {
    /// Create a job in the `CREATED` state with a fresh id
    pub fn new(tool_name: &str, configuration: Configuration, working_directory: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pipeline_id: None,
            parent_id: None,
            remote_id: None,
            tool_name: tool_name.to_string(),
            execute_environment: String::from("local"),
            environment: HashMap::new(),
            dependencies_before: Vec::new(),
            dependencies_after: Vec::new(),
            working_directory,
            log: None,
            error_log: None,
            configuration,
            progress: -1,
            messages: Vec::new(),
            state: JobState::Created,
            state_reason: None,
            job_stats: JobStats::new(),
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Current progress in percent, -1 when unknown
    pub fn progress(&self) -> i32 {
        self.progress
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn state_reason(&self) -> Option<&str> {
        self.state_reason.as_deref()
    }

    pub fn job_stats(&self) -> &JobStats {
        &self.job_stats
    }

    pub fn set_progress(&mut self, progress: i32) {
        self.progress = progress.clamp(-1, 100);
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Move the job to `state`
    ///
    /// Returns whether the transition was applied. Transitions out of a
    /// terminal state and backwards moves (e.g. `RUNNING -> QUEUED`, as a
    /// late environment report might attempt) are ignored. The start date
    /// is stamped on entering `RUNNING` and the end date on entering a
    /// terminal state, both at most once.
    pub fn set_state(&mut self, state: JobState, reason: Option<String>) -> bool {
        if self.state.is_terminal() {
            if state != self.state {
                tracing::warn!(
                    job = %self.id,
                    current = %self.state,
                    requested = %state,
                    "Ignoring transition out of terminal state"
                );
            }
            return false;
        }
        if state == self.state || state.rank() < self.state.rank() {
            tracing::debug!(job = %self.id, current = %self.state, requested = %state, "Ignoring stale transition");
            return false;
        }

        let now = stats::now();
        if state == JobState::Running {
            self.job_stats.mark_started(now);
        }
        if state.is_terminal() {
            self.job_stats.mark_ended(now);
        }
        self.state_reason = if state == JobState::Done { None } else { reason };
        self.state = state;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("sort", Configuration::new(), PathBuf::from("/work"))
    }

    #[test]
    fn test_new_job_defaults() {
        let job = job();
        assert_eq!(job.state(), JobState::Created);
        assert_eq!(job.progress(), -1);
        assert!(job.job_stats().start_date().is_none());
        assert!(uuid::Uuid::parse_str(&job.id).is_ok());
    }

    #[test]
    fn test_full_lifecycle_stamps_dates() {
        let mut job = job();
        assert!(job.set_state(JobState::Queued, None));
        assert!(job.job_stats().start_date().is_none());

        assert!(job.set_state(JobState::Running, None));
        let started = job.job_stats().start_date();
        assert!(started.is_some());

        assert!(job.set_state(JobState::Done, Some("ignored".into())));
        assert!(job.job_stats().end_date().is_some());
        assert_eq!(job.job_stats().start_date(), started);
        assert!(job.state_reason().is_none());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut job = job();
        job.set_state(JobState::Running, None);
        assert!(job.set_state(JobState::Failed, Some("exit 1".into())));
        let ended = job.job_stats().end_date();

        assert!(!job.set_state(JobState::Done, None));
        assert!(!job.set_state(JobState::Canceled, Some("late".into())));
        assert!(!job.set_state(JobState::Failed, Some("again".into())));

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.state_reason(), Some("exit 1"));
        assert_eq!(job.job_stats().end_date(), ended);
    }

    #[test]
    fn test_backward_transition_is_ignored() {
        let mut job = job();
        job.set_state(JobState::Running, None);
        assert!(!job.set_state(JobState::Queued, None));
        assert_eq!(job.state(), JobState::Running);
    }

    #[test]
    fn test_reason_cleared_on_later_transition() {
        let mut job = job();
        job.set_state(JobState::Queued, Some("waiting for slot".into()));
        assert_eq!(job.state_reason(), Some("waiting for slot"));
        job.set_state(JobState::Running, None);
        assert!(job.state_reason().is_none());
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut job = job();
        job.set_progress(150);
        assert_eq!(job.progress(), 100);
        job.set_progress(-20);
        assert_eq!(job.progress(), -1);
    }

    #[test]
    fn test_job_serializes_stats_as_flat_map() {
        let job = job();
        let value = serde_json::to_value(&job).unwrap();
        assert!(value["job_stats"]["createDate"].is_i64());
        assert_eq!(value["state"], "CREATED");

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.job_stats(), job.job_stats());
    }
}
