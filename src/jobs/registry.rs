// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Shared job table
//!
//! Jobs are only mutated through the registry's write lock; readers get
//! cloned snapshots.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use super::{Job, JobId, JobState, Message, MessageLevel};
use crate::errors::{ToolflowError, ToolflowResult};

#[derive(Default)]
struct Table {
    jobs: HashMap<JobId, Job>,
    tokens: HashMap<JobId, CancellationToken>,
}

struct Inner {
    table: RwLock<Table>,
    changes: watch::Sender<u64>,
}

/// Registry of jobs, shared by the executor and status readers
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                table: RwLock::new(Table::default()),
                changes,
            }),
        }
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|version| *version += 1);
    }

    /// Add a job and return a handle to it
    pub async fn insert(&self, job: Job) -> JobHandle {
        let id = job.id.clone();
        self.inner.table.write().await.jobs.insert(id.clone(), job);
        self.notify();
        JobHandle {
            id,
            registry: self.clone(),
        }
    }

    /// Handle to an existing job
    pub async fn handle(&self, id: &str) -> Option<JobHandle> {
        let table = self.inner.table.read().await;
        table.jobs.contains_key(id).then(|| JobHandle {
            id: id.to_string(),
            registry: self.clone(),
        })
    }

    /// Snapshot of one job
    pub async fn get(&self, id: &str) -> Option<Job> {
        self.inner.table.read().await.jobs.get(id).cloned()
    }

    /// Snapshot of every job, ordered by creation date
    pub async fn list(&self) -> Vec<Job> {
        let table = self.inner.table.read().await;
        let mut jobs: Vec<Job> = table.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.job_stats().create_date());
        jobs
    }

    /// Snapshot of the jobs dispatched by `parent`
    pub async fn children(&self, parent: &str) -> Vec<Job> {
        let table = self.inner.table.read().await;
        let mut jobs: Vec<Job> = table
            .jobs
            .values()
            .filter(|j| j.parent_id.as_deref() == Some(parent))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.job_stats().create_date());
        jobs
    }

    /// Record that `after` must not start before `before` is done
    pub async fn link(&self, before: &str, after: &str) -> ToolflowResult<()> {
        let mut table = self.inner.table.write().await;
        for id in [before, after] {
            if !table.jobs.contains_key(id) {
                return Err(ToolflowError::JobNotFound { job: id.to_string() });
            }
        }
        if let Some(job) = table.jobs.get_mut(before) {
            if !job.dependencies_after.iter().any(|d| d == after) {
                job.dependencies_after.push(after.to_string());
            }
        }
        if let Some(job) = table.jobs.get_mut(after) {
            if !job.dependencies_before.iter().any(|d| d == before) {
                job.dependencies_before.push(before.to_string());
            }
        }
        Ok(())
    }

    /// Move a job to a new state
    ///
    /// When the job ends `FAILED` or `CANCELED`, every job that
    /// transitively depends on it and has not finished yet is canceled
    /// with a reason naming this job. Returns whether the transition on
    /// `id` itself was applied.
    pub async fn transition(
        &self,
        id: &str,
        state: JobState,
        reason: Option<String>,
    ) -> ToolflowResult<bool> {
        let applied = {
            let mut table = self.inner.table.write().await;
            let job = table
                .jobs
                .get_mut(id)
                .ok_or_else(|| ToolflowError::JobNotFound { job: id.to_string() })?;
            let applied = job.set_state(state, reason);
            if applied {
                tracing::debug!(job = %id, tool = %job.tool_name, state = %state, "Job state changed");
            }
            if applied && state.is_unsuccessful() {
                cancel_dependents(&mut table, id);
            }
            applied
        };
        if applied {
            self.notify();
        }
        Ok(applied)
    }

    /// Append a message to a job and to each of its ancestors
    pub async fn push_message(&self, id: &str, message: Message) -> ToolflowResult<()> {
        {
            let mut table = self.inner.table.write().await;
            if !table.jobs.contains_key(id) {
                return Err(ToolflowError::JobNotFound { job: id.to_string() });
            }
            let mut seen = HashSet::new();
            let mut next = Some(id.to_string());
            while let Some(current) = next.take() {
                if !seen.insert(current.clone()) {
                    break;
                }
                if let Some(job) = table.jobs.get_mut(&current) {
                    job.push_message(message.clone());
                    next = job.parent_id.clone();
                }
            }
        }
        self.notify();
        Ok(())
    }

    pub async fn set_progress(&self, id: &str, progress: i32) -> ToolflowResult<()> {
        self.update(id, |job| job.set_progress(progress)).await
    }

    pub async fn set_remote_id(&self, id: &str, remote_id: &str) -> ToolflowResult<()> {
        self.update(id, |job| job.remote_id = Some(remote_id.to_string()))
            .await
    }

    async fn update(&self, id: &str, f: impl FnOnce(&mut Job)) -> ToolflowResult<()> {
        {
            let mut table = self.inner.table.write().await;
            let job = table
                .jobs
                .get_mut(id)
                .ok_or_else(|| ToolflowError::JobNotFound { job: id.to_string() })?;
            f(job);
        }
        self.notify();
        Ok(())
    }

    /// Associate a cancellation token with a job so that [`cancel`](Self::cancel)
    /// can interrupt work in flight
    pub async fn register_token(&self, id: &str, token: CancellationToken) {
        self.inner
            .table
            .write()
            .await
            .tokens
            .insert(id.to_string(), token);
    }

    pub async fn unregister_token(&self, id: &str) {
        self.inner.table.write().await.tokens.remove(id);
    }

    /// Cancel a job and every unfinished job it dispatched, directly or
    /// through sub-pipelines
    ///
    /// Registered cancellation tokens of all affected jobs are fired, so
    /// jobs not yet dispatched never start and running ones are
    /// interrupted at their next suspension point. Returns the number of
    /// jobs moved to `CANCELED`.
    pub async fn cancel(&self, id: &str, reason: &str) -> ToolflowResult<usize> {
        let canceled = {
            let mut table = self.inner.table.write().await;
            if !table.jobs.contains_key(id) {
                return Err(ToolflowError::JobNotFound { job: id.to_string() });
            }

            let mut tree = vec![id.to_string()];
            let mut queue = VecDeque::from([id.to_string()]);
            while let Some(current) = queue.pop_front() {
                for child in table
                    .jobs
                    .values()
                    .filter(|j| j.parent_id.as_deref() == Some(current.as_str()))
                {
                    tree.push(child.id.clone());
                    queue.push_back(child.id.clone());
                }
            }

            let mut canceled = 0;
            for job_id in &tree {
                if let Some(token) = table.tokens.get(job_id) {
                    token.cancel();
                }
                let applied = table
                    .jobs
                    .get_mut(job_id)
                    .map(|job| job.set_state(JobState::Canceled, Some(reason.to_string())))
                    .unwrap_or(false);
                if applied {
                    canceled += 1;
                    cancel_dependents(&mut table, job_id);
                }
            }
            canceled
        };
        tracing::info!(job = %id, canceled, "Cancellation requested");
        self.notify();
        Ok(canceled)
    }

    /// Wait until a job reaches a terminal state
    ///
    /// Sleeps on the registry's change notification rather than polling.
    pub async fn wait_terminal(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> ToolflowResult<JobState> {
        let mut changes = self.inner.changes.subscribe();
        loop {
            let state = self
                .get(id)
                .await
                .map(|j| j.state())
                .ok_or_else(|| ToolflowError::JobNotFound { job: id.to_string() })?;
            if state.is_terminal() {
                return Ok(state);
            }
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Ok(state);
                    }
                }
                _ = cancel.cancelled() => {
                    return Err(ToolflowError::Cancelled { job: id.to_string() });
                }
            }
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").finish_non_exhaustive()
    }
}

/// Cancel all unfinished transitive dependents of `failed`
fn cancel_dependents(table: &mut Table, failed: &str) {
    let Some(origin) = table.jobs.get(failed) else {
        return;
    };
    let reason = format!(
        "dependency '{}' ({}) ended {}",
        failed,
        origin.tool_name,
        origin.state()
    );

    let mut queue: VecDeque<JobId> = origin.dependencies_after.iter().cloned().collect();
    let mut seen = HashSet::new();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(token) = table.tokens.get(&id) {
            token.cancel();
        }
        if let Some(job) = table.jobs.get_mut(&id) {
            if job.set_state(JobState::Canceled, Some(reason.clone())) {
                tracing::info!(job = %id, tool = %job.tool_name, "{}", reason);
            }
            queue.extend(job.dependencies_after.iter().cloned());
        }
    }
}

/// Reference to one job in a registry
///
/// This is what tools and environments receive to report status.
#[derive(Clone, Debug)]
pub struct JobHandle {
    id: JobId,
    registry: JobRegistry,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Current snapshot of the job
    pub async fn snapshot(&self) -> ToolflowResult<Job> {
        self.registry
            .get(&self.id)
            .await
            .ok_or_else(|| ToolflowError::JobNotFound { job: self.id.clone() })
    }

    pub async fn set_state(&self, state: JobState, reason: Option<String>) -> ToolflowResult<bool> {
        self.registry.transition(&self.id, state, reason).await
    }

    pub async fn message(&self, level: MessageLevel, text: impl Into<String>) -> ToolflowResult<()> {
        self.registry
            .push_message(&self.id, Message::new(&self.id, level, text))
            .await
    }

    pub async fn info(&self, text: impl Into<String>) -> ToolflowResult<()> {
        self.message(MessageLevel::Info, text).await
    }

    pub async fn set_progress(&self, progress: i32) -> ToolflowResult<()> {
        self.registry.set_progress(&self.id, progress).await
    }

    pub async fn set_remote_id(&self, remote_id: &str) -> ToolflowResult<()> {
        self.registry.set_remote_id(&self.id, remote_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Configuration;
    use std::path::PathBuf;
    use std::time::Duration;

    fn job(tool: &str) -> Job {
        Job::new(tool, Configuration::new(), PathBuf::from("/work"))
    }

    async fn chain(registry: &JobRegistry, tools: &[&str]) -> Vec<JobHandle> {
        let mut handles: Vec<JobHandle> = Vec::new();
        for tool in tools {
            let handle = registry.insert(job(tool)).await;
            if let Some(prev) = handles.last() {
                registry.link(prev.id(), handle.id()).await.unwrap();
            }
            handles.push(handle);
        }
        handles
    }

    #[tokio::test]
    async fn test_link_records_both_directions() {
        let registry = JobRegistry::new();
        let jobs = chain(&registry, &["a", "b"]).await;

        let a = jobs[0].snapshot().await.unwrap();
        let b = jobs[1].snapshot().await.unwrap();
        assert_eq!(a.dependencies_after, vec![b.id.clone()]);
        assert_eq!(b.dependencies_before, vec![a.id.clone()]);
    }

    #[tokio::test]
    async fn test_failure_cancels_dependents() {
        let registry = JobRegistry::new();
        let jobs = chain(&registry, &["a", "b", "c"]).await;

        jobs[0].set_state(JobState::Running, None).await.unwrap();
        jobs[0]
            .set_state(JobState::Failed, Some("exit code 1".into()))
            .await
            .unwrap();

        for dependent in &jobs[1..] {
            let snapshot = dependent.snapshot().await.unwrap();
            assert_eq!(snapshot.state(), JobState::Canceled);
            let reason = snapshot.state_reason().unwrap();
            assert!(reason.contains(jobs[0].id()));
        }

        // a canceled dependent can never start
        assert!(!jobs[1].set_state(JobState::Running, None).await.unwrap());
        assert_eq!(jobs[1].snapshot().await.unwrap().state(), JobState::Canceled);
    }

    #[tokio::test]
    async fn test_done_does_not_cascade() {
        let registry = JobRegistry::new();
        let jobs = chain(&registry, &["a", "b"]).await;
        jobs[0].set_state(JobState::Done, None).await.unwrap();
        assert_eq!(jobs[1].snapshot().await.unwrap().state(), JobState::Created);
    }

    #[tokio::test]
    async fn test_messages_reach_ancestors() {
        let registry = JobRegistry::new();
        let parent = registry.insert(job("pipeline")).await;
        let mut child = job("leaf");
        child.parent_id = Some(parent.id().to_string());
        let child = registry.insert(child).await;

        child.info("halfway there").await.unwrap();

        let parent_messages = parent.snapshot().await.unwrap().messages().to_vec();
        assert_eq!(parent_messages.len(), 1);
        assert_eq!(parent_messages[0].source, child.id());
        assert_eq!(child.snapshot().await.unwrap().messages().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_descendants_and_tokens() {
        let registry = JobRegistry::new();
        let parent = registry.insert(job("pipeline")).await;
        let mut child = job("leaf");
        child.parent_id = Some(parent.id().to_string());
        let child = registry.insert(child).await;
        let mut done = job("leaf");
        done.parent_id = Some(parent.id().to_string());
        let done = registry.insert(done).await;
        done.set_state(JobState::Done, None).await.unwrap();

        let token = CancellationToken::new();
        registry.register_token(child.id(), token.clone()).await;

        let canceled = registry.cancel(parent.id(), "user request").await.unwrap();

        assert_eq!(canceled, 2);
        assert!(token.is_cancelled());
        assert_eq!(child.snapshot().await.unwrap().state(), JobState::Canceled);
        assert_eq!(done.snapshot().await.unwrap().state(), JobState::Done);
    }

    #[tokio::test]
    async fn test_wait_terminal_wakes_on_change() {
        let registry = JobRegistry::new();
        let handle = registry.insert(job("remote")).await;
        let waiter = {
            let registry = registry.clone();
            let id = handle.id().to_string();
            tokio::spawn(async move {
                registry
                    .wait_terminal(&id, &CancellationToken::new())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.set_state(JobState::Running, None).await.unwrap();
        handle.set_state(JobState::Done, None).await.unwrap();

        let state = waiter.await.unwrap().unwrap();
        assert_eq!(state, JobState::Done);
    }

    #[tokio::test]
    async fn test_wait_terminal_honours_cancellation() {
        let registry = JobRegistry::new();
        let handle = registry.insert(job("remote")).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = registry.wait_terminal(handle.id(), &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_snapshot_from_sync_code() {
        let registry = JobRegistry::new();
        let handle = tokio_test::block_on(registry.insert(job("a")));
        tokio_test::block_on(handle.set_progress(40)).unwrap();
        let snapshot = tokio_test::block_on(handle.snapshot()).unwrap();
        assert_eq!(snapshot.progress(), 40);
    }
}
