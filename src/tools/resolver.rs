// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Configuration resolution
//!
//! Converts the values of file parameters to absolute paths. Everything
//! else in the configuration passes through untouched.

use serde_json::Value;
use std::path::{Component, Path, PathBuf};

use super::{Configuration, Parameter, Parameters};
use crate::errors::{ToolflowError, ToolflowResult};

/// Resolve `raw` against `working_dir` using the tool's parameter model
///
/// Returns a new configuration; `raw` is never modified. File parameters
/// absent from `raw` (or set to null) are skipped. The working directory
/// defaults to the current directory, and is only looked up when there is
/// something to resolve.
pub fn resolve(
    working_dir: Option<&Path>,
    parameters: &Parameters,
    raw: &Configuration,
) -> ToolflowResult<Configuration> {
    let file_parameters: Vec<&Parameter> = parameters
        .values()
        .filter(|p| p.is_file && raw.get(&p.name).is_some_and(|v| !v.is_null()))
        .collect();

    let mut resolved = raw.clone();
    if file_parameters.is_empty() {
        return Ok(resolved);
    }

    let base = working_directory(working_dir)?;
    for parameter in file_parameters {
        let value = &raw[&parameter.name];
        let converted = if parameter.is_list {
            let Value::Array(items) = value else {
                return Err(ToolflowError::configuration(format!(
                    "parameter '{}' expects a list of paths, got {}",
                    parameter.name, value
                )));
            };
            let paths = items
                .iter()
                .map(|item| path_value(&parameter.name, item).map(|p| to_absolute(&base, &p)))
                .collect::<ToolflowResult<Vec<_>>>()?;
            Value::Array(paths.into_iter().map(Value::String).collect())
        } else {
            Value::String(to_absolute(&base, &path_value(&parameter.name, value)?))
        };
        resolved.insert(parameter.name.clone(), converted);
    }

    Ok(resolved)
}

/// Absolute form of the working directory, defaulting to the current one
pub fn working_directory(working_dir: Option<&Path>) -> ToolflowResult<PathBuf> {
    match working_dir {
        Some(dir) if dir.is_absolute() => Ok(normalize(dir)),
        Some(dir) => Ok(normalize(&std::env::current_dir()?.join(dir))),
        None => Ok(normalize(&std::env::current_dir()?)),
    }
}

/// Turn `path` into an absolute path under `base` unless it already is one
pub fn to_absolute(base: &Path, path: &str) -> String {
    if Path::new(path).is_absolute() {
        return path.to_string();
    }
    normalize(&base.join(path)).to_string_lossy().into_owned()
}

/// Lexically remove `.` and `..` components
///
/// The file does not need to exist, so this never touches the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

fn path_value(parameter: &str, value: &Value) -> ToolflowResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ToolflowError::configuration(format!(
            "parameter '{parameter}' expects a path, got {other}"
        ))),
    }
}
