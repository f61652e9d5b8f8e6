//! Tool-invocation and execution-sandbox core for local-first agent
//! runtimes.
//!
//! The crate covers the path from free-form model text to bounded,
//! policy-gated side effects:
//!
//! - [`extract_exec_calls`] recovers `[EXEC:tool args]` tags from text
//! - [`ToolPolicy`] / [`load_tool_policy`] resolve the layered
//!   permission policy (defaults, workspace file, environment)
//! - [`execute_calls`] dispatches a batch through policy, approval,
//!   and the tool handlers
//! - [`ExecutorPool`] and [`exec::run_bounded`] bound every spawned
//!   process by timeout, output caps, and a concurrency limit
//! - [`skills`] discovers and installs skill script bundles from
//!   directories, zip archives, and git repositories
//! - [`AuditLog`] records approvals and results with secrets masked
//!
//! Front ends (a REPL, a chat bridge, a batch runner) supply the
//! conversation loop and an [`ApprovalGate`]; everything here is
//! transport-agnostic.

pub mod approval;
pub mod audit;
pub mod config;
pub mod error;
pub mod exec;
pub mod parser;
pub mod policy;
pub mod redact;
pub mod skills;
pub mod tools;
pub mod workspace;

pub use approval::{ApprovalGate, AutoApprove, DenyAll};
pub use audit::{format_tool_results, format_tool_results_meta, AuditLevel, AuditLog};
pub use config::{ExecConfig, SandboxConfig};
pub use error::{HandlerResult, ToolError, ToolFailure};
pub use exec::ExecutorPool;
pub use parser::{extract_exec_calls, ExecCall};
pub use policy::{load_tool_policy, merge_policy, PolicyOverrides, ToolPolicy};
pub use redact::redact_secrets;
pub use tools::memory::{InMemoryStore, MemoryEntry, MemoryStore};
pub use tools::{execute_calls, ExecContext, ToolResult};
pub use workspace::resolve_workspace_path;
