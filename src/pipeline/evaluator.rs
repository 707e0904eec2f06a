// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Pipeline evaluation
//!
//! Turns the raw pipeline spec of a composite tool plus a configuration
//! into a [`PipelineDescription`].

use serde_json::Value;

use super::PipelineDescription;
use crate::errors::{ToolflowError, ToolflowResult};
use crate::tools::{template, Configuration};

/// Evaluates composite tool pipelines
pub trait PipelineEvaluator: Send + Sync {
    /// Evaluate the pipeline of `tool` against `configuration`
    fn evaluate(
        &self,
        tool: &str,
        spec: &Value,
        configuration: &Configuration,
    ) -> ToolflowResult<PipelineDescription>;
}

/// Evaluator that interpolates `${name}` placeholders
///
/// Every string of the spec is rendered against the configuration; a
/// string that is exactly one placeholder takes the configuration value
/// as is, so lists stay lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEvaluator;

impl PipelineEvaluator for TemplateEvaluator {
    fn evaluate(
        &self,
        tool: &str,
        spec: &Value,
        configuration: &Configuration,
    ) -> ToolflowResult<PipelineDescription> {
        let rendered = template::render_value(spec, configuration).map_err(|e| match e {
            ToolflowError::Configuration { message } => {
                ToolflowError::configuration(format!("pipeline of '{tool}': {message}"))
            }
            other => other,
        })?;

        let mut description: PipelineDescription =
            serde_json::from_value(rendered).map_err(|e| ToolflowError::InvalidTool {
                tool: tool.to_string(),
                reason: format!("pipeline does not evaluate to a job list: {e}"),
            })?;
        if description.name.is_none() {
            description.name = Some(tool.to_string());
        }
        tracing::debug!(tool, jobs = description.jobs.len(), "Evaluated pipeline");
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Configuration {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_placeholders_are_rendered() {
        let spec = json!({
            "jobs": [
                { "id": "a", "tool": "cat", "configuration": { "input": "${inputs}", "label": "run-${n}" } }
            ]
        });

        let description = TemplateEvaluator
            .evaluate("concat", &spec, &config(json!({ "inputs": ["x", "y"], "n": 2 })))
            .unwrap();

        let job = &description.jobs[0];
        assert_eq!(job.configuration["input"], json!(["x", "y"]));
        assert_eq!(job.configuration["label"], json!("run-2"));
        assert_eq!(description.name.as_deref(), Some("concat"));
    }

    #[test]
    fn test_unknown_variable_names_the_tool() {
        let spec = json!({ "jobs": [{ "id": "a", "tool": "cat", "configuration": { "input": "${nope}" } }] });

        let err = TemplateEvaluator
            .evaluate("concat", &spec, &Configuration::new())
            .unwrap_err();

        assert!(matches!(err, ToolflowError::Configuration { .. }));
        assert!(err.to_string().contains("concat"));
    }

    #[test]
    fn test_malformed_spec_is_invalid_tool() {
        let err = TemplateEvaluator
            .evaluate("broken", &json!({ "jobs": "none" }), &Configuration::new())
            .unwrap_err();

        assert!(matches!(err, ToolflowError::InvalidTool { tool, .. } if tool == "broken"));
    }
}
