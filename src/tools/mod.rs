//! Tool dispatch.
//!
//! [`execute_calls`] runs a parsed batch in order: policy check, then
//! approval, then the handler. A failing call never aborts the batch;
//! results stay index-aligned with their calls so callers can report
//! them side by side.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::approval::ApprovalGate;
use crate::config::ExecConfig;
use crate::error::{HandlerResult, ToolError};
use crate::exec::ExecutorPool;
use crate::parser::ExecCall;
use crate::policy::ToolPolicy;
use crate::tools::memory::MemoryStore;

pub mod fs;
pub mod memory;
pub mod runtime;
pub mod skill;

/// Everything a handler needs to run one call.
#[derive(Clone)]
pub struct ExecContext {
    /// Absolute workspace root; every relative path resolves under it.
    pub workspace: PathBuf,
    pub policy: ToolPolicy,
    pub config: ExecConfig,
    pub pool: Arc<ExecutorPool>,
    /// Backing store for the memory tools, when one is attached.
    pub memory: Option<Arc<dyn MemoryStore>>,
}

impl ExecContext {
    pub fn new(workspace: PathBuf, policy: ToolPolicy, config: ExecConfig) -> Self {
        let pool = Arc::new(ExecutorPool::new(config.max_concurrent));
        Self {
            workspace,
            policy,
            config,
            pool,
            memory: None,
        }
    }

    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }
}

/// Outcome of one call, index-aligned with the batch that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool: String,
    pub ok: bool,
    pub output: String,
    pub error: String,
}

impl ToolResult {
    pub fn ok(tool: &str, output: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            ok: true,
            output: output.into(),
            error: String::new(),
        }
    }

    pub fn fail(tool: &str, error: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            ok: false,
            output: String::new(),
            error: error.into(),
        }
    }

    fn from_handler(tool: &str, res: HandlerResult) -> Self {
        match res {
            Ok(output) => Self::ok(tool, output),
            Err(failure) => Self {
                tool: tool.to_string(),
                ok: false,
                output: failure.output,
                error: failure.error.to_string(),
            },
        }
    }
}

/// Run a batch of calls sequentially.
///
/// Each call passes through the policy gate, then the approval gate
/// (skipped when `auto_approve` is set), then its handler. With
/// approval required and no gate attached, the call is denied.
pub async fn execute_calls(
    ctx: &ExecContext,
    calls: &[ExecCall],
    approver: Option<&dyn ApprovalGate>,
) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        // One canonical spelling for the policy check, the approval
        // check, and routing; results keep the caller's spelling.
        let tool = call.tool.to_ascii_lowercase();
        debug!(tool = %tool, "dispatching tool call");
        if !ctx.policy.allows_tool(&tool) {
            results.push(ToolResult::fail(&call.tool, ToolError::PolicyDenied.to_string()));
            continue;
        }
        if ctx.policy.requires_approval(&tool) && !ctx.config.auto_approve {
            let approved = match approver {
                Some(gate) => gate.approve(call).await,
                None => false,
            };
            if !approved {
                results.push(ToolResult::fail(
                    &call.tool,
                    ToolError::ApprovalDenied.to_string(),
                ));
                continue;
            }
        }
        let res = dispatch(ctx, &tool, &call.args_raw).await;
        results.push(ToolResult::from_handler(&call.tool, res));
    }
    results
}

async fn dispatch(ctx: &ExecContext, tool: &str, args: &str) -> HandlerResult {
    match tool {
        "fs.read" | "file_read" => fs::read(ctx, args).await,
        "fs.write" | "file_write" => fs::write(ctx, args).await,
        "runtime.exec" | "shell_exec" => runtime::exec(ctx, args).await,
        "skill.exec" | "skill_exec" => skill::exec(ctx, args).await,
        "skills.install" | "install_skill" | "skill_store_install" => {
            skill::install(ctx, args).await
        }
        "memory.store" => memory::store(ctx, args).await,
        "memory.recall" => memory::recall(ctx, args).await,
        "memory.forget" => memory::forget(ctx, args).await,
        "memory.list" => memory::list(ctx, args).await,
        "memory.stats" => memory::stats(ctx, args).await,
        _ => Err(ToolError::UnknownTool.into()),
    }
}
