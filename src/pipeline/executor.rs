// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Pipeline executor
//!
//! Runs the nodes of a reduced pipeline graph, each as its own job.
//! Nodes start as soon as all their predecessors are done, bounded by the
//! configured parallelism.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::PipelineGraph;
use crate::context::RunContext;
use crate::errors::{ToolflowError, ToolflowResult};
use crate::jobs::{Job, JobHandle, JobId, JobState, MessageLevel};
use crate::tools::{Configuration, Tool};

/// Job created for one graph node
#[derive(Debug, Clone)]
pub struct NodeRun {
    /// Node id in the graph
    pub node: String,
    /// Final snapshot of the job
    pub job: Job,
}

/// Result of executing a pipeline
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Pipeline instance the jobs belong to
    pub pipeline_id: JobId,
    /// One entry per node, in execution order
    pub jobs: Vec<NodeRun>,
    /// Total execution time
    pub duration: Duration,
    /// Whether every job ended `DONE`
    pub success: bool,
}

impl PipelineResult {
    /// Runs that did not end `DONE`
    pub fn failed(&self) -> impl Iterator<Item = &NodeRun> {
        self.jobs.iter().filter(|r| r.job.state() != JobState::Done)
    }

    /// One line per failed job, or per canceled job if none failed
    pub fn failure_summary(&self) -> String {
        let failed: Vec<&NodeRun> = self
            .jobs
            .iter()
            .filter(|r| r.job.state() == JobState::Failed)
            .collect();
        let runs = if failed.is_empty() {
            self.failed().collect()
        } else {
            failed
        };

        runs.iter()
            .map(|r| {
                format!(
                    "{} ({}) {}: {}",
                    r.node,
                    r.job.tool_name,
                    r.job.state(),
                    r.job.state_reason().unwrap_or("no reason given")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Everything a dispatched node needs
struct Dispatch {
    node: String,
    tool: Arc<Tool>,
    configuration: Configuration,
    handle: JobHandle,
    token: CancellationToken,
}

/// Pipeline executor
pub struct PipelineExecutor {
    context: RunContext,
}

impl PipelineExecutor {
    /// Create an executor running tools from `context`
    pub fn new(context: RunContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Look up the tool of every node
    pub fn check_tools(&self, graph: &PipelineGraph) -> ToolflowResult<HashMap<String, Arc<Tool>>> {
        graph
            .nodes()
            .map(|node| {
                self.context
                    .tools()
                    .get(&node.tool)
                    .map(|tool| (node.id.clone(), tool))
                    .ok_or_else(|| ToolflowError::ToolNotFound {
                        tool: node.tool.clone(),
                    })
            })
            .collect()
    }

    /// Execute a reduced graph
    ///
    /// Creates one job per node under `parent`, then runs them. A failed
    /// or canceled job cancels its dependents; other branches continue
    /// unless `fail_fast` is set. Errors are only returned for problems
    /// found before anything runs; job failures are reported through the
    /// returned [`PipelineResult`].
    pub async fn execute(
        &self,
        graph: &PipelineGraph,
        working_dir: &Path,
        parent: Option<&JobHandle>,
    ) -> ToolflowResult<PipelineResult> {
        let start = Instant::now();
        let order: Vec<String> = graph
            .topological_order()?
            .into_iter()
            .map(|n| n.id.clone())
            .collect();
        let mut tools = self.check_tools(graph)?;

        let jobs = self.context.jobs();
        let settings = self.context.settings();
        let pipeline_id = match parent {
            Some(parent) => {
                let snapshot = parent.snapshot().await?;
                snapshot.pipeline_id.unwrap_or(snapshot.id)
            }
            None => uuid::Uuid::new_v4().to_string(),
        };
        let pipeline_token = self.context.cancel_token().child_token();

        let mut handles: HashMap<String, JobHandle> = HashMap::with_capacity(order.len());
        let mut tokens: HashMap<String, CancellationToken> = HashMap::with_capacity(order.len());
        for id in &order {
            let Some(node) = graph.node(id) else {
                continue;
            };
            let tool = &tools[id];
            let mut job = Job::new(&node.tool, node.configuration.clone(), working_dir.to_path_buf());
            job.pipeline_id = Some(pipeline_id.clone());
            job.parent_id = parent.map(|p| p.id().to_string());
            job.execute_environment = tool.environment().name().to_string();
            job.environment = tool.env().clone();
            if let Some(ref dir) = settings.log_dir {
                job.log = Some(dir.join(format!("{}.out", job.id)));
                job.error_log = Some(dir.join(format!("{}.err", job.id)));
            }

            let handle = jobs.insert(job).await;
            let token = pipeline_token.child_token();
            jobs.register_token(handle.id(), token.clone()).await;
            handles.insert(id.clone(), handle);
            tokens.insert(id.clone(), token);
        }
        for id in &order {
            for before in graph.predecessors(id) {
                jobs.link(handles[before].id(), handles[id].id()).await?;
            }
        }

        tracing::info!(
            pipeline = %pipeline_id,
            jobs = order.len(),
            edges = graph.edge_count(),
            "Starting pipeline"
        );

        let mut waiting: HashMap<&str, usize> = order
            .iter()
            .map(|id| (id.as_str(), graph.predecessors(id).len()))
            .collect();
        let mut ready: VecDeque<&str> = order
            .iter()
            .map(String::as_str)
            .filter(|id| waiting[id] == 0)
            .collect();

        // a slot is taken at dispatch and released when the node's task ends
        let slots = Arc::new(Semaphore::new(settings.max_parallel.max(1)));
        let mut running: JoinSet<(String, ToolflowResult<()>)> = JoinSet::new();
        let working_dir = working_dir.to_path_buf();

        loop {
            while !pipeline_token.is_cancelled() {
                let Some(&id) = ready.front() else {
                    break;
                };
                let Ok(permit) = slots.clone().try_acquire_owned() else {
                    break;
                };
                ready.pop_front();
                let handle = handles[id].clone();
                if handle.snapshot().await?.state().is_terminal() {
                    continue;
                }
                let (Some(node), Some(tool)) = (graph.node(id), tools.remove(id)) else {
                    continue;
                };
                handle.set_state(JobState::Queued, None).await?;
                tracing::info!(node = %id, tool = %node.tool, job = %handle.id(), "Dispatching job");

                let dispatch = Dispatch {
                    node: id.to_string(),
                    tool,
                    configuration: node.configuration.clone(),
                    handle,
                    token: tokens[id].clone(),
                };
                running.spawn(run_node(
                    dispatch,
                    self.context.clone(),
                    working_dir.clone(),
                    permit,
                ));
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (id, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Job task aborted");
                    continue;
                }
            };
            let handle = &handles[&id];

            match result {
                Ok(()) => {
                    handle.set_state(JobState::Done, None).await?;
                    tracing::info!(node = %id, job = %handle.id(), "Job done");
                    for next in graph.successors(&id) {
                        if let Some(count) = waiting.get_mut(next) {
                            *count -= 1;
                            if *count == 0 {
                                ready.push_back(next);
                            }
                        }
                    }
                }
                Err(e) if e.is_cancelled() => {
                    handle.set_state(JobState::Canceled, Some(e.to_string())).await?;
                    tracing::info!(node = %id, job = %handle.id(), "Job canceled");
                }
                Err(e) => {
                    let reason = e.to_string();
                    handle.message(MessageLevel::Error, reason.clone()).await?;
                    handle.set_state(JobState::Failed, Some(reason.clone())).await?;
                    tracing::warn!(node = %id, job = %handle.id(), error = %reason, "Job failed");
                    if settings.fail_fast {
                        pipeline_token.cancel();
                    }
                }
            }
        }

        // whatever never started was stopped by cancellation or fail-fast
        let mut runs = Vec::with_capacity(order.len());
        for id in &order {
            let handle = &handles[id];
            if !handle.snapshot().await?.state().is_terminal() {
                handle
                    .set_state(
                        JobState::Canceled,
                        Some(String::from("pipeline stopped before the job could run")),
                    )
                    .await?;
            }
            jobs.unregister_token(handle.id()).await;
            runs.push(NodeRun {
                node: id.clone(),
                job: handle.snapshot().await?,
            });
        }

        let duration = start.elapsed();
        let success = runs.iter().all(|r| r.job.state() == JobState::Done);
        if success {
            tracing::info!(pipeline = %pipeline_id, secs = duration.as_secs_f64(), "Pipeline completed");
        } else {
            tracing::warn!(pipeline = %pipeline_id, secs = duration.as_secs_f64(), "Pipeline failed");
        }

        Ok(PipelineResult {
            pipeline_id,
            jobs: runs,
            duration,
            success,
        })
    }
}

/// Run the node's tool while holding a slot
///
/// The tool runs in its own task so that a panicking callback still
/// yields an outcome for its node.
async fn run_node(
    dispatch: Dispatch,
    context: RunContext,
    working_dir: PathBuf,
    _permit: OwnedSemaphorePermit,
) -> (String, ToolflowResult<()>) {
    let Dispatch {
        node,
        tool,
        configuration,
        handle,
        token,
    } = dispatch;
    let cancelled = || ToolflowError::Cancelled {
        job: handle.id().to_string(),
    };

    if token.is_cancelled() {
        return (node, Err(cancelled()));
    }
    if let Err(e) = handle.set_state(JobState::Running, None).await {
        return (node, Err(e));
    }

    let context = context.scoped(token);
    let name = tool.name().to_string();
    let task_handle = handle.clone();
    let outcome = tokio::spawn(async move {
        tool.run(Some(&context), Some(&working_dir), &configuration, Some(&task_handle))
            .await
    })
    .await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(ToolflowError::execution(&name, "tool panicked")),
        Err(_) => Err(cancelled()),
    };
    (node, result)
}
