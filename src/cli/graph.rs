// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Graph command - show the expanded job graph

use miette::Result;
use std::path::PathBuf;

use super::{parse_assignments, GraphFormat, Workspace};
use crate::pipeline::PipelineGraph;

/// Run the graph command
pub async fn run(
    tool: Option<String>,
    set: Vec<String>,
    format: GraphFormat,
    manifest: Option<PathBuf>,
    config: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let workspace = Workspace::load(manifest.as_deref(), config.as_deref())?;
    let registry = workspace.registry()?;
    let configuration = parse_assignments(&set)?;

    let graph = workspace.graph(&registry, tool.as_deref(), &configuration)?;
    if verbose {
        eprintln!("{} jobs, {} dependencies after reduction", graph.len(), graph.edge_count());
    }

    println!("{}", render(&graph, format)?);
    Ok(())
}

pub(crate) fn render(graph: &PipelineGraph, format: GraphFormat) -> Result<String> {
    Ok(match format {
        GraphFormat::Text => graph.to_text()?,
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    })
}
