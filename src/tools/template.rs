// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! `${name}` templates over a configuration

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::Configuration;
use crate::errors::{ToolflowError, ToolflowResult};

fn variable() -> &'static Regex {
    static VARIABLE: OnceLock<Regex> = OnceLock::new();
    VARIABLE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.-]*)\}").expect("Invalid template pattern")
    })
}

/// Interpolate every `${name}` in `template`
pub fn render(template: &str, configuration: &Configuration) -> ToolflowResult<String> {
    interpolate(template, configuration, display)
}

/// Interpolate every `${name}` in a shell command template
///
/// Each value is quoted as one shell word, and each element of a list as
/// its own word, so paths with spaces or shell metacharacters stay intact.
pub fn render_shell(template: &str, configuration: &Configuration) -> ToolflowResult<String> {
    interpolate(template, configuration, shell_display)
}

fn interpolate(
    template: &str,
    configuration: &Configuration,
    show: fn(&Value) -> String,
) -> ToolflowResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for captures in variable().captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&show(lookup(name.as_str(), configuration)?));
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Render every string inside `value`
///
/// A string consisting of a single `${name}` is replaced by the
/// configuration value itself, so lists and numbers keep their type.
pub fn render_value(value: &Value, configuration: &Configuration) -> ToolflowResult<Value> {
    match value {
        Value::String(s) => {
            if let Some(captures) = variable().captures(s) {
                if captures.get(0).is_some_and(|m| m.as_str() == s) {
                    let name = &captures[1];
                    return lookup(name, configuration).cloned();
                }
            }
            render(s, configuration).map(Value::String)
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_value(item, configuration))
            .collect::<ToolflowResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                rendered.insert(render(key, configuration)?, render_value(item, configuration)?);
            }
            Ok(Value::Object(rendered))
        }
        other => Ok(other.clone()),
    }
}

/// Names of all variables used in `template`
pub fn variables(template: &str) -> Vec<String> {
    variable()
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Textual form of a configuration value
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

/// Shell form of a configuration value
pub fn shell_display(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(shell_display).collect::<Vec<_>>().join(" "),
        other => quote(&display(other)),
    }
}

/// Quote `word` for a POSIX shell unless it only holds safe characters
pub fn quote(word: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-+=./:,@%".contains(c);
    if !word.is_empty() && word.chars().all(safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', "'\\''"))
}

fn lookup<'a>(name: &str, configuration: &'a Configuration) -> ToolflowResult<&'a Value> {
    configuration
        .get(name)
        .ok_or_else(|| ToolflowError::configuration(format!("unknown template variable '{name}'")))
}
