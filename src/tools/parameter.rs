// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Tool parameters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters of a tool keyed by name
pub type Parameters = BTreeMap<String, Parameter>;

/// One configuration slot of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name, unique within its tool
    pub name: String,

    /// Value is a file path and gets resolved against the working directory
    #[serde(default, rename = "file")]
    pub is_file: bool,

    /// Value is a sequence
    #[serde(default, rename = "list")]
    pub is_list: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    /// A scalar, non-file parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_file: false,
            is_list: false,
            description: None,
        }
    }

    /// Mark the parameter as file-valued
    pub fn file(mut self) -> Self {
        self.is_file = true;
        self
    }

    /// Mark the parameter as list-valued
    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
