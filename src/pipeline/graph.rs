// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Pipeline graph
//!
//! Expands a pipeline description into a flat graph of leaf tool runs and
//! reduces its edges to the transitive reduction. Nodes live in a petgraph
//! arena, so splicing a sub-pipeline in place of a composite job only
//! touches the edge list around it.

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::stable_graph::StableDiGraph;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;

use super::{PipelineDescription, PipelineEvaluator, PipelineJob};
use crate::errors::{ToolflowError, ToolflowResult};
use crate::tools::{resolver, Configuration, ToolKind, ToolRegistry};

/// One leaf tool run in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct JobNode {
    /// Id unique within the graph; jobs of sub-pipelines are prefixed with
    /// the id of the composite job they replace, e.g. `align/index`
    pub id: String,

    /// The pipeline job this node was created from
    pub job: PipelineJob,

    /// Name of the leaf tool to run
    pub tool: String,

    /// Configuration with file parameters made absolute
    pub configuration: Configuration,
}

/// Entry and exit nodes of an expanded description
#[derive(Debug, Default)]
struct Fragment {
    nodes: Vec<NodeIndex>,
    entries: Vec<NodeIndex>,
    exits: Vec<NodeIndex>,
}

/// Graph of job nodes; an edge `a -> b` means `a` runs before `b`
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    graph: StableDiGraph<JobNode, ()>,
    index: HashMap<String, NodeIndex>,
}

impl PipelineGraph {
    /// Expand `description` into a flat graph
    ///
    /// Every job's tool is looked up in `tools`. Leaf tools become one
    /// node with their configuration resolved against `working_dir`.
    /// Composite tools are evaluated with `evaluator` and expanded
    /// recursively; the sub-pipeline's entry nodes inherit the composite
    /// job's predecessors and its exit nodes the composite job's
    /// successors.
    pub fn prepare(
        description: &PipelineDescription,
        tools: &ToolRegistry,
        evaluator: &dyn PipelineEvaluator,
        working_dir: Option<&Path>,
    ) -> ToolflowResult<Self> {
        let mut graph = Self::default();
        let mut expanding = Vec::new();
        let mut expander = Expander {
            tools,
            evaluator,
            working_dir,
            expanding: &mut expanding,
        };
        expander.expand(&mut graph, description, "")?;
        graph.check_acyclic()?;

        tracing::debug!(
            nodes = graph.len(),
            edges = graph.edge_count(),
            "Expanded pipeline graph"
        );
        Ok(graph)
    }

    /// Remove every edge implied by a longer path
    ///
    /// Reachability between nodes is unchanged. Returns the number of
    /// removed edges; a second call removes none.
    pub fn reduce_dependencies(&mut self) -> ToolflowResult<usize> {
        let order = toposort(&self.graph, None).map_err(|_| self.cycle_error())?;

        // nodes reachable from each node, built from the sinks up
        let mut reach: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::with_capacity(order.len());
        for &node in order.iter().rev() {
            let mut reachable = HashSet::new();
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                reachable.insert(next);
                if let Some(further) = reach.get(&next) {
                    reachable.extend(further.iter().copied());
                }
            }
            reach.insert(node, reachable);
        }

        let redundant: Vec<_> = self
            .graph
            .edge_indices()
            .filter(|&edge| {
                let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                    return false;
                };
                self.graph
                    .neighbors_directed(from, Direction::Outgoing)
                    .any(|via| via != to && reach.get(&via).is_some_and(|r| r.contains(&to)))
            })
            .collect();

        for edge in &redundant {
            self.graph.remove_edge(*edge);
        }

        tracing::debug!(
            removed = redundant.len(),
            remaining = self.edge_count(),
            "Reduced pipeline dependencies"
        );
        Ok(redundant.len())
    }

    /// Nodes in an order where every node follows its predecessors
    ///
    /// Among nodes that are ready at the same time, the one created first
    /// comes first, so the order is stable for a given description.
    pub fn topological_order(&self) -> ToolflowResult<Vec<&JobNode>> {
        let mut pending: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&n, _)| Reverse(n))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(&self.graph[node]);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(next));
                    }
                }
            }
        }

        if order.len() != self.len() {
            return Err(self.cycle_error());
        }
        Ok(order)
    }

    /// Get a node by id
    pub fn node(&self, id: &str) -> Option<&JobNode> {
        self.index.get(id).map(|&n| &self.graph[n])
    }

    /// Nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = &JobNode> {
        self.graph.node_indices().map(move |n| &self.graph[n])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All edges as `(before, after)` id pairs, sorted
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].id.clone(), self.graph[b].id.clone()))
            .collect();
        edges.sort();
        edges
    }

    /// Ids of the nodes that must finish before `id`
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Ids of the nodes waiting for `id`
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<&str> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Whether there is a direct edge `from -> to`
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    /// Whether `to` can be reached from `from` along one or more edges
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        let (Some(&a), Some(&b)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        self.graph
            .neighbors_directed(a, Direction::Outgoing)
            .any(|next| has_path_connecting(&self.graph, next, b, None))
    }

    /// Execution order as a numbered list
    pub fn to_text(&self) -> ToolflowResult<String> {
        let mut out = String::new();
        for (i, node) in self.topological_order()?.into_iter().enumerate() {
            out.push_str(&format!("{}. {} ({})", i + 1, node.id, node.tool));
            let after = self.predecessors(&node.id);
            if !after.is_empty() {
                out.push_str(&format!(" [after: {}]", after.join(", ")));
            }
            out.push('\n');
        }
        Ok(out)
    }

    /// Graphviz rendering
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for node in self.nodes() {
            out.push_str(&format!(
                "    \"{}\" [label=\"{}\\n{}\"];\n",
                node.id, node.id, node.tool
            ));
        }
        for (from, to) in self.edges() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        out.push_str("}\n");
        out
    }

    /// Mermaid rendering
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for node in self.nodes() {
            out.push_str(&format!(
                "    {}[\"{} ({})\"]\n",
                mermaid_id(&node.id),
                node.id,
                node.tool
            ));
        }
        for (from, to) in self.edges() {
            out.push_str(&format!("    {} --> {}\n", mermaid_id(&from), mermaid_id(&to)));
        }
        out
    }

    fn add_node(&mut self, node: JobNode) -> ToolflowResult<NodeIndex> {
        if self.index.contains_key(&node.id) {
            return Err(ToolflowError::DuplicateJob { job: node.id });
        }
        let id = node.id.clone();
        let index = self.graph.add_node(node);
        self.index.insert(id, index);
        Ok(index)
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    fn check_acyclic(&self) -> ToolflowResult<()> {
        toposort(&self.graph, None)
            .map(|_| ())
            .map_err(|_| self.cycle_error())
    }

    fn cycle_error(&self) -> ToolflowError {
        let cycle = tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| {
                scc.len() > 1 || scc.first().is_some_and(|&n| self.graph.find_edge(n, n).is_some())
            })
            .map(|scc| scc.into_iter().map(|n| self.graph[n].id.clone()).collect())
            .unwrap_or_default();
        ToolflowError::CyclicPipeline {
            cycle: close_cycle(cycle),
        }
    }
}

/// Recursive expansion state
struct Expander<'a> {
    tools: &'a ToolRegistry,
    evaluator: &'a dyn PipelineEvaluator,
    working_dir: Option<&'a Path>,
    /// Composite tools currently being expanded, outermost first
    expanding: &'a mut Vec<String>,
}

impl Expander<'_> {
    fn expand(
        &mut self,
        graph: &mut PipelineGraph,
        description: &PipelineDescription,
        prefix: &str,
    ) -> ToolflowResult<Fragment> {
        description.check_references()?;
        let order = job_order(description, prefix)?;

        let mut fragments: HashMap<&str, Fragment> = HashMap::with_capacity(description.jobs.len());
        for job in &description.jobs {
            let qualified = format!("{prefix}{}", job.id);
            let tool = self
                .tools
                .get(&job.tool)
                .ok_or_else(|| ToolflowError::UnknownTool {
                    job: qualified.clone(),
                    tool: job.tool.clone(),
                })?;
            let configuration =
                resolver::resolve(self.working_dir, tool.parameters(), &job.configuration)?;

            let fragment = match tool.kind() {
                ToolKind::Leaf(_) => {
                    let node = graph.add_node(JobNode {
                        id: qualified,
                        job: job.clone(),
                        tool: job.tool.clone(),
                        configuration,
                    })?;
                    Fragment {
                        nodes: vec![node],
                        entries: vec![node],
                        exits: vec![node],
                    }
                }
                ToolKind::Composite(spec) => {
                    if let Some(start) = self.expanding.iter().position(|t| t == tool.name()) {
                        let mut cycle = self.expanding[start..].to_vec();
                        cycle.push(tool.name().to_string());
                        return Err(ToolflowError::CyclicPipeline { cycle });
                    }
                    tracing::debug!(job = %qualified, tool = %tool.name(), "Expanding composite job");

                    let nested = self.evaluator.evaluate(tool.name(), spec, &configuration)?;
                    self.expanding.push(tool.name().to_string());
                    let fragment = self.expand(graph, &nested, &format!("{qualified}/"));
                    self.expanding.pop();
                    fragment?
                }
            };
            fragments.insert(job.id.as_str(), fragment);
        }

        // a job whose fragment is empty passes its predecessors through;
        // walking in job order makes every predecessor's exits known first
        let mut exits: HashMap<&str, Vec<NodeIndex>> = HashMap::with_capacity(fragments.len());
        for job in order.iter().map(|&i| &description.jobs[i]) {
            let own = &fragments[job.id.as_str()];
            let effective = if own.nodes.is_empty() {
                let mut inherited = Vec::new();
                for dep in &job.after {
                    for &n in exits.get(dep.as_str()).into_iter().flatten() {
                        if !inherited.contains(&n) {
                            inherited.push(n);
                        }
                    }
                }
                inherited
            } else {
                own.exits.clone()
            };
            exits.insert(job.id.as_str(), effective);
        }

        for job in &description.jobs {
            let entries = &fragments[job.id.as_str()].entries;
            for dep in &job.after {
                for &from in exits.get(dep.as_str()).into_iter().flatten() {
                    for &to in entries {
                        graph.add_edge(from, to);
                    }
                }
            }
        }

        let nodes: Vec<NodeIndex> = description
            .jobs
            .iter()
            .flat_map(|job| fragments[job.id.as_str()].nodes.iter().copied())
            .collect();
        let member: HashSet<NodeIndex> = nodes.iter().copied().collect();
        let internal = |node: NodeIndex, direction: Direction| {
            graph
                .graph
                .neighbors_directed(node, direction)
                .any(|n| member.contains(&n))
        };
        let entries = nodes
            .iter()
            .copied()
            .filter(|&n| !internal(n, Direction::Incoming))
            .collect();
        let exits = nodes
            .iter()
            .copied()
            .filter(|&n| !internal(n, Direction::Outgoing))
            .collect();

        Ok(Fragment {
            nodes,
            entries,
            exits,
        })
    }
}

/// Positions of the jobs of one description in dependency order
///
/// Cycles among the jobs are rejected before anything is expanded.
fn job_order(description: &PipelineDescription, prefix: &str) -> ToolflowResult<Vec<usize>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let index: HashMap<&str, NodeIndex> = description
        .jobs
        .iter()
        .map(|job| (job.id.as_str(), graph.add_node(job.id.as_str())))
        .collect();

    for job in &description.jobs {
        if job.after.iter().any(|dep| dep == &job.id) {
            let id = format!("{prefix}{}", job.id);
            return Err(ToolflowError::CyclicPipeline {
                cycle: vec![id.clone(), id],
            });
        }
        for dep in &job.after {
            if let (Some(&from), Some(&to)) = (index.get(dep.as_str()), index.get(job.id.as_str())) {
                graph.add_edge(from, to, ());
            }
        }
    }

    if let Ok(sorted) = toposort(&graph, None) {
        return Ok(sorted.into_iter().map(NodeIndex::index).collect());
    }
    let cycle = tarjan_scc(&graph)
        .into_iter()
        .find(|scc| scc.len() > 1)
        .map(|scc| scc.into_iter().map(|n| format!("{prefix}{}", graph[n])).collect())
        .unwrap_or_default();
    Err(ToolflowError::CyclicPipeline {
        cycle: close_cycle(cycle),
    })
}

/// Sort cycle members and repeat the first at the end
fn close_cycle(mut members: Vec<String>) -> Vec<String> {
    members.sort();
    if let Some(first) = members.first().cloned() {
        members.push(first);
    }
    members
}

fn mermaid_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TemplateEvaluator;
    use crate::tools::{callback_fn, Parameter, Tool};
    use serde_json::json;

    fn leaf(name: &str) -> Tool {
        Tool::builder(name)
            .parameter(Parameter::new("input").file())
            .parameter(Parameter::new("output").file())
            .callback(callback_fn(|_, _| Ok(())))
            .build()
            .unwrap()
    }

    fn composite(name: &str, spec: serde_json::Value) -> Tool {
        Tool::builder(name)
            .parameter(Parameter::new("input").file())
            .pipeline(spec)
            .build()
            .unwrap()
    }

    fn registry(tools: Vec<Tool>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        registry
    }

    fn prepare(description: &PipelineDescription, tools: &ToolRegistry) -> ToolflowResult<PipelineGraph> {
        PipelineGraph::prepare(description, tools, &TemplateEvaluator, Some(Path::new("/work")))
    }

    /// Description over the leaf tool `t` from `(id, after)` pairs
    fn chain(jobs: &[(&str, &[&str])]) -> PipelineDescription {
        jobs.iter().fold(PipelineDescription::new(), |description, (id, after)| {
            let job = after
                .iter()
                .fold(PipelineJob::new(*id, "t"), |job, dep| job.after(*dep));
            description.job(job)
        })
    }

    fn pairs(edges: &[(&str, &str)]) -> Vec<(String, String)> {
        edges.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_diamond_with_shortcut_is_reduced() {
        let tools = registry(vec![leaf("t")]);
        let description = chain(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["a", "b", "c"]),
        ]);
        let mut graph = prepare(&description, &tools).unwrap();
        assert_eq!(graph.edge_count(), 5);

        let removed = graph.reduce_dependencies().unwrap();

        assert_eq!(removed, 1);
        assert!(!graph.has_edge("a", "d"));
        assert_eq!(graph.edges(), pairs(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]));
    }

    #[test]
    fn test_reduction_is_idempotent() {
        let tools = registry(vec![leaf("t")]);
        let description = chain(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a", "b"]),
            ("d", &["a", "b", "c"]),
            ("e", &["a", "d"]),
        ]);
        let mut graph = prepare(&description, &tools).unwrap();

        graph.reduce_dependencies().unwrap();
        let once = graph.edges();
        let removed = graph.reduce_dependencies().unwrap();

        assert_eq!(removed, 0);
        assert_eq!(graph.edges(), once);
        assert_eq!(once, pairs(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e")]));
    }

    #[test]
    fn test_reduction_preserves_reachability() {
        let tools = registry(vec![leaf("t")]);
        let description = chain(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "a"]),
            ("e", &["c", "d", "a"]),
            ("f", &["b"]),
            ("g", &[]),
        ]);
        let mut graph = prepare(&description, &tools).unwrap();
        let ids: Vec<String> = graph.nodes().map(|n| n.id.clone()).collect();
        let before: Vec<bool> = ids
            .iter()
            .flat_map(|u| ids.iter().map(move |v| (u, v)))
            .map(|(u, v)| graph.reaches(u, v))
            .collect();

        graph.reduce_dependencies().unwrap();

        let after: Vec<bool> = ids
            .iter()
            .flat_map(|u| ids.iter().map(move |v| (u, v)))
            .map(|(u, v)| graph.reaches(u, v))
            .collect();
        assert_eq!(before, after);
        assert!(!graph.has_edge("a", "d"));
        assert!(!graph.has_edge("a", "e"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let tools = registry(vec![leaf("t")]);
        let description = chain(&[("a", &["b"]), ("b", &["a"])]);

        match prepare(&description, &tools) {
            Err(ToolflowError::CyclicPipeline { cycle }) => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let tools = registry(vec![leaf("t")]);
        let description = chain(&[("a", &["a"])]);

        assert!(matches!(
            prepare(&description, &tools),
            Err(ToolflowError::CyclicPipeline { .. })
        ));
    }

    #[test]
    fn test_cycle_between_empty_composites_is_rejected() {
        let tools = registry(vec![composite("nothing", json!({ "jobs": [] }))]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("a", "nothing").after("b"))
            .job(PipelineJob::new("b", "nothing").after("a"));

        assert!(matches!(
            prepare(&description, &tools),
            Err(ToolflowError::CyclicPipeline { .. })
        ));
    }

    #[test]
    fn test_unknown_tool_names_the_job() {
        let tools = registry(vec![leaf("t")]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("a", "t"))
            .job(PipelineJob::new("b", "missing").after("a"));

        match prepare(&description, &tools) {
            Err(ToolflowError::UnknownTool { job, tool }) => {
                assert_eq!(job, "b");
                assert_eq!(tool, "missing");
            }
            other => panic!("expected an unknown tool, got {other:?}"),
        }
    }

    #[test]
    fn test_composite_is_spliced_between_neighbours() {
        let tools = registry(vec![
            leaf("t"),
            composite(
                "T",
                json!({
                    "jobs": [
                        { "id": "j1", "tool": "t", "configuration": { "input": "${input}" } },
                        { "id": "j2", "tool": "t", "after": ["j1"] }
                    ]
                }),
            ),
        ]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("X", "t"))
            .job(PipelineJob::new("P", "T").with("input", "in.txt").after("X"))
            .job(PipelineJob::new("Y", "t").after("P"));

        let mut graph = prepare(&description, &tools).unwrap();
        graph.reduce_dependencies().unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edges(), pairs(&[("P/j1", "P/j2"), ("P/j2", "Y"), ("X", "P/j1")]));
        assert!(!graph.has_edge("X", "Y"));
        assert!(graph.node("P").is_none());

        let j1 = graph.node("P/j1").unwrap();
        assert_eq!(j1.job.id, "j1");
        assert_eq!(j1.configuration["input"], json!("/work/in.txt"));
    }

    #[test]
    fn test_composite_with_parallel_entries_and_exits() {
        let tools = registry(vec![
            leaf("t"),
            composite(
                "fan",
                json!({
                    "jobs": [
                        { "id": "l", "tool": "t" },
                        { "id": "r", "tool": "t" }
                    ]
                }),
            ),
        ]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("x", "t"))
            .job(PipelineJob::new("p", "fan").after("x"))
            .job(PipelineJob::new("y", "t").after("p"));

        let graph = prepare(&description, &tools).unwrap();

        assert_eq!(
            graph.edges(),
            pairs(&[("p/l", "y"), ("p/r", "y"), ("x", "p/l"), ("x", "p/r")])
        );
    }

    #[test]
    fn test_empty_composite_passes_dependencies_through() {
        let tools = registry(vec![leaf("t"), composite("nothing", json!({ "jobs": [] }))]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("x", "t"))
            .job(PipelineJob::new("p", "nothing").after("x"))
            .job(PipelineJob::new("y", "t").after("p"));

        let graph = prepare(&description, &tools).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges(), pairs(&[("x", "y")]));
    }

    #[test]
    fn test_empty_composite_listed_before_its_predecessor() {
        let tools = registry(vec![leaf("t"), composite("nothing", json!({ "jobs": [] }))]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("p", "nothing").after("x"))
            .job(PipelineJob::new("x", "t"))
            .job(PipelineJob::new("y", "t").after("p"));

        let graph = prepare(&description, &tools).unwrap();

        assert_eq!(graph.edges(), pairs(&[("x", "y")]));
        assert!(graph.reaches("x", "y"));
    }

    #[test]
    fn test_chained_empty_composites_in_reverse_order() {
        let tools = registry(vec![leaf("t"), composite("nothing", json!({ "jobs": [] }))]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("y", "t").after("q"))
            .job(PipelineJob::new("q", "nothing").after("p"))
            .job(PipelineJob::new("p", "nothing").after("x"))
            .job(PipelineJob::new("x", "t"));

        let graph = prepare(&description, &tools).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges(), pairs(&[("x", "y")]));
    }

    #[test]
    fn test_composite_spliced_with_forward_references() {
        let tools = registry(vec![
            leaf("t"),
            composite(
                "T",
                json!({
                    "jobs": [
                        { "id": "j2", "tool": "t", "after": ["j1"] },
                        { "id": "j1", "tool": "t" }
                    ]
                }),
            ),
        ]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("Y", "t").after("P"))
            .job(PipelineJob::new("P", "T").after("X"))
            .job(PipelineJob::new("X", "t"));

        let mut graph = prepare(&description, &tools).unwrap();
        graph.reduce_dependencies().unwrap();

        assert_eq!(graph.edges(), pairs(&[("P/j1", "P/j2"), ("P/j2", "Y"), ("X", "P/j1")]));
        assert!(!graph.has_edge("X", "Y"));
    }

    #[test]
    fn test_nested_composites_expand_fully() {
        let tools = registry(vec![
            leaf("t"),
            composite("inner", json!({ "jobs": [{ "id": "leaf", "tool": "t" }] })),
            composite("outer", json!({ "jobs": [{ "id": "mid", "tool": "inner" }] })),
        ]);
        let description = PipelineDescription::new().job(PipelineJob::new("top", "outer"));

        let graph = prepare(&description, &tools).unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.nodes().next().unwrap().id, "top/mid/leaf");
    }

    #[test]
    fn test_recursive_composite_is_rejected() {
        let tools = registry(vec![
            composite("ping", json!({ "jobs": [{ "id": "a", "tool": "pong" }] })),
            composite("pong", json!({ "jobs": [{ "id": "b", "tool": "ping" }] })),
        ]);
        let description = PipelineDescription::new().job(PipelineJob::new("start", "ping"));

        match prepare(&description, &tools) {
            Err(ToolflowError::CyclicPipeline { cycle }) => {
                assert_eq!(cycle, vec!["ping", "pong", "ping"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_topological_order_is_stable() {
        let tools = registry(vec![leaf("t")]);
        let description = chain(&[("c", &["a"]), ("b", &[]), ("a", &[])]);
        let graph = prepare(&description, &tools).unwrap();

        let order: Vec<&str> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|n| n.id.as_str())
            .collect();

        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_text_rendering() {
        let tools = registry(vec![
            leaf("t"),
            composite("T", json!({ "jobs": [{ "id": "j1", "tool": "t" }, { "id": "j2", "tool": "t", "after": ["j1"] }] })),
        ]);
        let description = PipelineDescription::new()
            .job(PipelineJob::new("X", "t"))
            .job(PipelineJob::new("P", "T").after("X"))
            .job(PipelineJob::new("Y", "t").after("P").after("X"));
        let mut graph = prepare(&description, &tools).unwrap();
        graph.reduce_dependencies().unwrap();

        insta::assert_snapshot!(graph.to_text().unwrap(), @r###"
        1. X (t)
        2. P/j1 (t) [after: X]
        3. P/j2 (t) [after: P/j1]
        4. Y (t) [after: P/j2]
        "###);
    }

    #[test]
    fn test_mermaid_and_dot_rendering() {
        let tools = registry(vec![leaf("t")]);
        let graph = prepare(&chain(&[("a", &[]), ("b/c", &["a"])]), &tools).unwrap();

        let mermaid = graph.to_mermaid();
        assert!(mermaid.starts_with("graph TD\n"));
        assert!(mermaid.contains("    b_c[\"b/c (t)\"]\n"));
        assert!(mermaid.contains("    a --> b_c\n"));

        let dot = graph.to_dot();
        assert!(dot.contains("    \"a\" -> \"b/c\";\n"));
    }
}
