// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Tools command - list declared tools

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::Workspace;
use crate::utils::print_header;

/// Run the tools command
pub async fn run(manifest: Option<PathBuf>, config: Option<PathBuf>, verbose: bool) -> Result<()> {
    let workspace = Workspace::load(manifest.as_deref(), config.as_deref())?;
    let registry = workspace.registry()?;

    let mut tools: Vec<_> = registry.iter().collect();
    tools.sort_by(|a, b| a.name().cmp(b.name()));

    print_header(&format!("Tools in {}", workspace.manifest_path.display()));
    for tool in tools {
        let kind = if tool.is_composite() { "composite" } else { "command" };
        let version = tool.version().map(|v| format!(" {v}")).unwrap_or_default();
        println!("{}{} [{}]", tool.name().bold(), version.dimmed(), kind.cyan());

        if let Some(description) = tool.description() {
            println!("  {}", description);
        }

        for parameter in tool.parameters().values() {
            let mut flags = Vec::new();
            if tool.default_input() == Some(parameter.name.as_str()) {
                flags.push("input");
            }
            if tool.default_output() == Some(parameter.name.as_str()) {
                flags.push("output");
            }
            if parameter.is_file {
                flags.push("file");
            }
            if parameter.is_list {
                flags.push("list");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            };
            println!("  • {}{}", parameter.name, flags.dimmed());
            if verbose {
                if let Some(ref description) = parameter.description {
                    println!("      {}", description.dimmed());
                }
            }
        }

        if verbose && !tool.installer().is_empty() {
            println!("  requires: {}", tool.installer().join(", ").dimmed());
        }
    }

    Ok(())
}
