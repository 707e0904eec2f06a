// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Validate command - check the tool manifest

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::Workspace;
use crate::manifest::ManifestValidator;
use crate::utils::{print_error, print_section, print_success, print_warning};

/// Run the validate command
pub async fn run(manifest: Option<PathBuf>, config: Option<PathBuf>, verbose: bool) -> Result<()> {
    println!("{}", "Validating manifest...".bold());
    println!();

    let workspace = match Workspace::load(manifest.as_deref(), config.as_deref()) {
        Ok(workspace) => workspace,
        Err(e) => {
            print_error("Failed to load manifest");
            println!();
            return Err(e.into());
        }
    };
    print_success(&format!("{} is valid YAML", workspace.manifest_path.display()));

    let validation = ManifestValidator::validate(&workspace.manifest);
    if validation.is_valid() {
        // Building catches what the validator cannot see, e.g. bad parameter shapes
        if let Err(e) = workspace.registry() {
            print_section("Errors");
            print_error(&e.to_string());
            println!();
            return Err(miette::miette!("Manifest validation failed"));
        }
        print_success(&format!("{} tools build", workspace.manifest.tools.len()));
    }

    if !validation.errors.is_empty() {
        print_section("Errors");
        for error in &validation.errors {
            print_error(error);
        }
    }

    if !validation.warnings.is_empty() {
        print_section("Warnings");
        for warning in &validation.warnings {
            print_warning(warning);
        }
    }

    if verbose {
        print_section("Manifest summary");
        println!("  Pipeline: {}", workspace.manifest.pipeline_name());
        println!("  Tools: {}", workspace.manifest.tools.len());
        for tool in &workspace.manifest.tools {
            let kind = if tool.is_composite() { "composite" } else { "command" };
            println!("    - {} ({})", tool.name, kind.dimmed());
        }
    }

    println!();

    if !validation.is_valid() {
        Err(miette::miette!("Manifest validation failed"))
    } else if validation.has_warnings() {
        println!("{}", "Manifest is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Manifest is valid!".green().bold());
        Ok(())
    }
}
