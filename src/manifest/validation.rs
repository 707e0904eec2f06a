// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Manifest validation
//!
//! Checks a manifest before anything runs.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::{Manifest, ToolDefinition};
use crate::pipeline::PipelineDescription;
use crate::tools::template;

/// Manifest validator
pub struct ManifestValidator;

impl ManifestValidator {
    /// Validate a manifest
    pub fn validate(manifest: &Manifest) -> ValidationResult {
        let mut result = ValidationResult::new();

        if manifest.tools.is_empty() {
            result.add_error("Manifest defines no tools");
        }

        let mut seen = HashSet::new();
        for tool in &manifest.tools {
            if !seen.insert(tool.name.as_str()) {
                result.add_error(&format!("Duplicate tool name: '{}'", tool.name));
            }
        }

        for tool in &manifest.tools {
            Self::validate_tool(tool, manifest, &mut result);
        }

        if let Some(ref spec) = manifest.pipeline {
            Self::validate_pipeline(manifest.pipeline_name(), spec, manifest, &mut result);
        }

        for cycle in Self::composite_cycles(manifest) {
            result.add_error(&format!("Composite tools reference each other: {}", cycle.join(" -> ")));
        }

        result
    }

    fn validate_tool(tool: &ToolDefinition, manifest: &Manifest, result: &mut ValidationResult) {
        let name = &tool.name;
        match (&tool.command, &tool.pipeline) {
            (None, None) => result.add_error(&format!("Tool '{name}': neither a command nor a pipeline is defined")),
            (Some(_), Some(_)) => result.add_error(&format!("Tool '{name}': defines both a command and a pipeline")),
            _ => {}
        }

        let mut parameters = HashSet::new();
        for parameter in &tool.parameters {
            if !parameters.insert(parameter.name.as_str()) {
                result.add_error(&format!("Tool '{name}': duplicate parameter '{}'", parameter.name));
            }
        }
        for (role, default) in [("input", &tool.default_input), ("output", &tool.default_output)] {
            if let Some(default) = default {
                if !parameters.contains(default.as_str()) {
                    result.add_error(&format!("Tool '{name}': default {role} '{default}' is not a parameter"));
                }
            }
        }

        if let Some(ref command) = tool.command {
            if command.trim().is_empty() {
                result.add_error(&format!("Tool '{name}': command is empty"));
            }
            for variable in template::variables(command) {
                if !parameters.contains(variable.as_str()) {
                    result.add_warning(&format!(
                        "Tool '{name}': command uses '${{{variable}}}' which is not a declared parameter"
                    ));
                }
            }
        }

        if let Some(ref spec) = tool.pipeline {
            if pipeline_tools(spec).iter().any(|t| t == name) {
                result.add_error(&format!("Tool '{name}': pipeline runs the tool itself"));
            }
            Self::validate_pipeline(name, spec, manifest, result);
        }

        if tool.description.is_none() {
            result.add_warning(&format!("Tool '{name}': no description"));
        }
        if tool.parameters.is_empty() {
            result.add_warning(&format!("Tool '{name}': no parameters declared"));
        }
    }

    /// Check job references of a pipeline that can be read before evaluation
    fn validate_pipeline(owner: &str, spec: &Value, manifest: &Manifest, result: &mut ValidationResult) {
        let description = match PipelineDescription::from_value(spec.clone()) {
            Ok(description) => description,
            Err(_) => {
                result.add_warning(&format!(
                    "Pipeline of '{owner}': structure is only known after evaluation"
                ));
                return;
            }
        };

        if description.jobs.is_empty() {
            result.add_warning(&format!("Pipeline of '{owner}': no jobs"));
        }
        if let Err(e) = description.check_references() {
            result.add_error(&format!("Pipeline of '{owner}': {e}"));
        }
        for job in &description.jobs {
            if template::variables(&job.tool).is_empty() && manifest.tool(&job.tool).is_none() {
                result.add_error(&format!(
                    "Pipeline of '{owner}': job '{}' references unknown tool '{}'",
                    job.id, job.tool
                ));
            }
        }
    }

    /// Groups of composite tools that reach each other through their pipelines
    fn composite_cycles(manifest: &Manifest) -> Vec<Vec<String>> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let index: HashMap<&str, NodeIndex> = manifest
            .tools
            .iter()
            .filter(|t| t.is_composite())
            .map(|t| (t.name.as_str(), graph.add_node(t.name.as_str())))
            .collect();

        for tool in manifest.tools.iter().filter(|t| t.is_composite()) {
            let Some(spec) = tool.pipeline.as_ref() else {
                continue;
            };
            for used in pipeline_tools(spec) {
                if let (Some(&from), Some(&to)) = (index.get(tool.name.as_str()), index.get(used.as_str())) {
                    if from != to {
                        graph.update_edge(from, to, ());
                    }
                }
            }
        }

        tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut names: Vec<String> = scc.into_iter().map(|n| graph[n].to_string()).collect();
                names.sort();
                if let Some(first) = names.first().cloned() {
                    names.push(first);
                }
                names
            })
            .collect()
    }
}

/// Tool names referenced by the jobs of a raw pipeline spec
fn pipeline_tools(spec: &Value) -> Vec<String> {
    spec.get("jobs")
        .and_then(Value::as_array)
        .map(|jobs| {
            jobs.iter()
                .filter_map(|job| job.get("tool").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Result of manifest validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(yaml: &str) -> ValidationResult {
        ManifestValidator::validate(&Manifest::from_yaml(yaml).unwrap())
    }

    #[test]
    fn test_valid_manifest() {
        let result = validate(
            r#"
tools:
  - name: sort
    description: Sort lines
    parameters: [{ name: input, file: true }, { name: output, file: true }]
    default_input: input
    command: "sort ${input} > ${output}"
"#,
        );
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(!result.has_warnings(), "{:?}", result.warnings);
    }

    #[test]
    fn test_empty_manifest() {
        let result = validate("tools: []");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no tools"));
    }

    #[test]
    fn test_duplicate_names_and_bad_defaults() {
        let result = validate(
            r#"
tools:
  - { name: dup, command: "true", default_output: out }
  - { name: dup, command: "false" }
"#,
        );
        assert!(result.errors.iter().any(|e| e.contains("Duplicate tool name")));
        assert!(result.errors.iter().any(|e| e.contains("default output 'out'")));
    }

    #[test]
    fn test_body_is_required() {
        let result = validate("tools:\n  - { name: empty, description: nothing }\n");
        assert!(result.errors.iter().any(|e| e.contains("neither")));
    }

    #[test]
    fn test_unknown_tool_in_pipeline() {
        let result = validate(
            r#"
tools:
  - name: wrapper
    pipeline:
      jobs:
        - { id: a, tool: missing }
        - { id: b, tool: "${which}" }
"#,
        );
        let unknown: Vec<_> = result.errors.iter().filter(|e| e.contains("unknown tool")).collect();
        assert_eq!(unknown.len(), 1);
        assert!(unknown[0].contains("'missing'"));
    }

    #[test]
    fn test_composite_cycles() {
        let result = validate(
            r#"
tools:
  - name: self
    pipeline: { jobs: [{ id: a, tool: self }] }
  - name: ping
    pipeline: { jobs: [{ id: a, tool: pong }] }
  - name: pong
    pipeline: { jobs: [{ id: b, tool: ping }] }
"#,
        );
        assert!(result.errors.iter().any(|e| e.contains("runs the tool itself")));
        assert!(result.errors.iter().any(|e| e.contains("ping -> pong -> ping")));
    }

    #[test]
    fn test_warnings() {
        let result = validate("tools:\n  - { name: bare, command: \"echo ${msg}\" }\n");
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("no description")));
        assert!(result.warnings.iter().any(|w| w.contains("no parameters")));
        assert!(result.warnings.iter().any(|w| w.contains("${msg}")));
    }

    #[test]
    fn test_broken_job_references() {
        let result = validate(
            r#"
tools:
  - { name: t, command: "true" }
pipeline:
  jobs:
    - { id: a, tool: t, after: [ghost] }
"#,
        );
        assert!(result.errors.iter().any(|e| e.contains("ghost")));
    }
}
