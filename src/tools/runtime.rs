//! `runtime.exec` — shell command execution inside the workspace.
//!
//! With execution disabled, only a narrow read-only safelist is
//! honored (directory listing, cloning a skill repository); everything
//! else is refused before a process is ever spawned. With execution
//! enabled, commands still pass the policy prefix allowlist and run
//! through the sandbox wrapper under the shared executor pool.

use serde::Deserialize;
use tracing::debug;

use crate::error::{HandlerResult, ToolError, ToolFailure};
use crate::exec::sandbox::wrap_with_sandbox;
use crate::exec::{format_exec_output, run_bounded, RunError};
use crate::tools::ExecContext;

/// Shell metacharacters that disqualify a command from the safelist.
const UNSAFE_CHARS: &[char] = &[';', '&', '|', '`', '$', '>', '<', '\n', '\r'];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecArgs {
    #[serde(default)]
    command: String,
    #[serde(default)]
    timeout_seconds: Option<i64>,
}

pub async fn exec(ctx: &ExecContext, args: &str) -> HandlerResult {
    if !ctx.policy.allows_tool("runtime.exec") {
        return Err(ToolError::PolicyDenied.into());
    }
    let parsed: ExecArgs = serde_json::from_str(args.trim())
        .map_err(|e| ToolError::MalformedArgs(format!("invalid runtime.exec args: {e}")))?;
    let command = parsed.command.trim();
    if command.is_empty() {
        return Err(ToolError::MalformedArgs("missing command".into()).into());
    }

    if !ctx.config.exec_enabled && !is_safelisted_command(command) {
        return Err(ToolError::FeatureDisabled(
            "shell execution is disabled; only read-only listing and skill cloning are available"
                .into(),
        )
        .into());
    }
    if !ctx.policy.allows_runtime_command(command) {
        return Err(ToolError::PolicyDenied.into());
    }

    let argv = shell_argv(command);
    let argv = wrap_with_sandbox(argv, &ctx.config.sandbox)?;
    let timeout = ctx.config.clamp_exec_timeout(parsed.timeout_seconds);

    debug!(%command, ?timeout, "runtime.exec");
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
            ToolError::ProcessFailure(format!("runtime.exec failed: {e}")),
            output,
        )),
    }
}

fn shell_argv(command: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![
            "powershell".into(),
            "-NoProfile".into(),
            "-Command".into(),
            command.into(),
        ]
    } else {
        vec!["sh".into(), "-lc".into(), command.into()]
    }
}

/// Commands permitted while execution is disabled: a plain directory
/// listing, or a shallow https clone targeting `skills/`.
fn is_safelisted_command(command: &str) -> bool {
    if command.contains(UNSAFE_CHARS) {
        return false;
    }
    let Ok(tokens) = shell_words::split(command) else {
        return false;
    };
    let Some(first) = tokens.first() else {
        return false;
    };
    match first.to_lowercase().as_str() {
        "ls" | "dir" => tokens[1..].iter().all(|t| is_safe_listing_arg(t)),
        "git" => is_safe_skill_clone(&tokens),
        _ => false,
    }
}

fn is_safe_listing_arg(arg: &str) -> bool {
    !arg.starts_with('/')
        && !arg.starts_with('~')
        && !arg.contains("..")
        && !arg.contains('\\')
}

fn is_safe_skill_clone(tokens: &[String]) -> bool {
    // Exactly: git clone <https-url> skills/<dest>
    if tokens.len() != 4 || tokens[1] != "clone" {
        return false;
    }
    let url = &tokens[2];
    if !url.starts_with("https://") || url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let dest = tokens[3].replace('\\', "/");
    dest.starts_with("skills/") && !dest.contains("..")
}
