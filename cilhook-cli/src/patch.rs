use std::path::{Path, PathBuf};

use anyhow::Context;
use cilhook::{
    patchers::PatchProfile,
    project::{PatchProject, ProjectLoader, RunReport},
    script::PatchScript,
};
use log::debug;
use serde::Serialize;

use crate::app::Cli;

/// Reference images expected in the runtime directory, in resolution order.
pub const RUNTIME_MODULES: [&str; 2] = ["UnityEngine.json", "mscorlib.json"];

/// Image declaring the stock dispatcher.
pub const DISPATCHER_MODULE: &str = "SurvivalKit.json";

/// Type the preparing tool leaves in the target.
pub const VERSION_MARKER: &str = "Deobfuscated";

#[derive(Debug, Serialize)]
struct Summary {
    target: String,
    output: String,
    hooks: usize,
    failures: Vec<FailureReport>,
}

#[derive(Debug, Serialize)]
struct FailureReport {
    patch: String,
    stage: Option<String>,
    error: String,
}

/// Rejects targets that are not module images.
pub fn check_target(target: &Path) -> Result<(), String> {
    let is_image = target
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_image {
        Ok(())
    } else {
        Err(format!("{} is not a module image (.json)", target.display()))
    }
}

/// Directory the runtime images are loaded from.
pub fn runtime_dir(cli: &Cli) -> PathBuf {
    match (&cli.runtime_dir, cli.target.parent()) {
        (Some(dir), _) => dir.clone(),
        (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        (None, _) => PathBuf::from("."),
    }
}

/// Path of the dispatcher image.
pub fn dispatcher_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(path) = &cli.dispatcher {
        return Ok(path.clone());
    }
    let exe = std::env::current_exe().context("failed to locate the cilhook executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(DISPATCHER_MODULE))
}

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let profile = match &cli.profile {
        Some(path) => PatchProfile::from_file(path)
            .with_context(|| format!("failed to load profile: {}", path.display()))?,
        None => PatchProfile::survival_kit(),
    };
    let script = match &cli.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read script: {}", path.display()))?;
            let script = PatchScript::parse(&text)
                .with_context(|| format!("failed to parse script: {}", path.display()))?;
            debug!("{} declares {} patch(es)", path.display(), script.len());
            Some(script)
        }
        None => None,
    };

    let runtime = runtime_dir(cli);
    let mut loader = ProjectLoader::new().target(&cli.target);
    for name in RUNTIME_MODULES {
        loader = loader.dependency(runtime.join(name));
    }
    let mut project = loader
        .dependency(dispatcher_path(cli)?)
        .version_marker(VERSION_MARKER)
        .build()
        .with_context(|| format!("failed to load {}", cli.target.display()))?;

    let report = project.run(Some(&profile), script)?;

    let output = PatchProject::output_path(&cli.target);
    project
        .write_to(&output)
        .with_context(|| format!("failed to write output: {}", output.display()))?;

    let summary = summarize(&cli.target, &output, &report);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Patched {} -> {} ({} hook(s), {} failure(s))",
            file_display_name(&cli.target),
            file_display_name(&output),
            summary.hooks,
            summary.failures.len()
        );
    }
    Ok(())
}

fn summarize(target: &Path, output: &Path, report: &RunReport) -> Summary {
    let mut failures = Vec::new();
    if let Some(profile) = &report.profile {
        for outcome in &profile.outcomes {
            if let Err(error) = &outcome.result {
                failures.push(FailureReport {
                    patch: outcome.name.clone(),
                    stage: None,
                    error: error.to_string(),
                });
            }
        }
    }
    if let Some(script) = &report.script {
        for (label, stage, error) in script.failures() {
            failures.push(FailureReport {
                patch: label.to_string(),
                stage: Some(stage.to_string()),
                error: error.to_string(),
            });
        }
    }
    Summary {
        target: target.display().to_string(),
        output: output.display().to_string(),
        hooks: report.hooks(),
        failures,
    }
}

/// Extract a display-friendly filename from a path.
fn file_display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
