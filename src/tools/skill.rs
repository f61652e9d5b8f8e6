//! `skill.exec` and `skills.install`.
//!
//! Script resolution walks the three skill layers highest-first, so an
//! override always shadows a local or upstream copy of the same
//! script. Execution goes through the same sandbox wrapper, executor
//! pool, and output caps as `runtime.exec`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{HandlerResult, ToolError, ToolFailure};
use crate::exec::sandbox::wrap_with_sandbox;
use crate::exec::{format_exec_output, run_bounded, RunError};
use crate::skills::git::install_skills_from_git_url;
use crate::skills::resolve_in_layers;
use crate::tools::ExecContext;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkillExecArgs {
    #[serde(default)]
    skill: String,
    #[serde(default)]
    script: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    timeout_seconds: Option<i64>,
}

#[derive(Deserialize)]
struct InstallArgs {
    #[serde(default)]
    url: String,
    #[serde(default)]
    layer: String,
}

pub async fn exec(ctx: &ExecContext, args: &str) -> HandlerResult {
    if !ctx.policy.allows_tool("skill.exec") {
        return Err(ToolError::PolicyDenied.into());
    }
    if !ctx.config.skills_enabled {
        return Err(ToolError::FeatureDisabled("skill execution is disabled".into()).into());
    }
    let parsed: SkillExecArgs = serde_json::from_str(args.trim())
        .map_err(|e| ToolError::MalformedArgs(format!("invalid skill.exec args: {e}")))?;
    let skill = parsed.skill.trim();
    let script = parsed.script.trim();
    if skill.is_empty() || script.is_empty() {
        return Err(ToolError::MalformedArgs("skill and script are required".into()).into());
    }
    if skill.contains("..") || script.contains("..") {
        return Err(ToolError::PathViolation("invalid skill/script".into()).into());
    }
    if !ctx.policy.allows_skill_exec(skill, script) {
        return Err(ToolError::PolicyDenied.into());
    }

    let abs = resolve_script(&ctx.workspace, skill, script).ok_or_else(|| {
        ToolError::Other(format!("skill script not found: {skill}/{script}"))
    })?;

    let argv = script_argv(&abs, script, &parsed.args);
    let argv = wrap_with_sandbox(argv, &ctx.config.sandbox)?;
    let timeout = ctx.config.clamp_exec_timeout(parsed.timeout_seconds);

    debug!(skill, script, ?timeout, "skill.exec");
    let outcome = run_bounded(
        &argv,
        &ctx.workspace,
        timeout,
        ctx.config.max_output_bytes,
        &ctx.pool,
    )
    .await
    .map_err(|e| ToolError::Other(e.to_string()))?;

    let output = format_exec_output(outcome.stdout.trim(), outcome.stderr.trim());
    match outcome.error {
        None => Ok(output),
        Some(RunError::Timeout(d)) => {
            Err(ToolFailure::with_output(ToolError::ProcessTimeout(d), output))
        }
        Some(e) => Err(ToolFailure::with_output(
            ToolError::ProcessFailure(format!("skill.exec failed: {e}")),
            output,
        )),
    }
}

/// `skills.install` — `{"url": "https://...", "layer": "upstream"}`.
pub async fn install(ctx: &ExecContext, args: &str) -> HandlerResult {
    let parsed: InstallArgs = serde_json::from_str(args.trim())
        .map_err(|e| ToolError::MalformedArgs(format!("invalid skills.install args: {e}")))?;
    if parsed.url.trim().is_empty() {
        return Err(ToolError::MalformedArgs("url is required (https://...)".into()).into());
    }
    let layer = match parsed.layer.trim().to_lowercase().as_str() {
        "" => "upstream".to_string(),
        l @ ("local" | "upstream") => l.to_string(),
        other => {
            return Err(ToolError::MalformedArgs(format!("unknown layer {other:?}")).into());
        }
    };
    let installed = install_skills_from_git_url(
        &ctx.workspace,
        parsed.url.trim(),
        &layer,
        &ctx.config,
        &ctx.pool,
    )
    .await?;
    Ok(format!("installed skills: {}", installed.join(", ")))
}

/// Highest layer wins: `_overrides`, then local, then `_upstream`.
/// Traversal in skill/script is rejected before this is called.
fn resolve_script(workspace: &Path, skill: &str, script: &str) -> Option<PathBuf> {
    resolve_in_layers(workspace, skill, |dir| {
        let p = dir.join("scripts").join(script);
        p.is_file().then_some(p)
    })
}

fn script_argv(abs: &Path, script: &str, args: &[String]) -> Vec<String> {
    let abs = abs.to_string_lossy().into_owned();
    let lower = script.to_lowercase();
    let mut argv = if cfg!(windows) {
        if lower.ends_with(".ps1") {
            vec![
                "powershell".into(),
                "-NoProfile".into(),
                "-ExecutionPolicy".into(),
                "Bypass".into(),
                "-File".into(),
                abs,
            ]
        } else if lower.ends_with(".bat") || lower.ends_with(".cmd") {
            vec!["cmd".into(), "/c".into(), abs]
        } else {
            vec![abs]
        }
    } else if lower.ends_with(".sh") {
        vec!["sh".into(), abs]
    } else {
        vec![abs]
    };
    argv.extend(args.iter().cloned());
    argv
}
