//! Workspace file tools: `fs.read` and `fs.write`.
//!
//! Both resolve paths through the workspace jail. Writes are further
//! restricted to a fixed set of trusted top-level directories plus the
//! policy's write-prefix allowlist, and a handful of curated files can
//! never be overwritten wholesale.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{HandlerResult, ToolError, ToolFailure};
use crate::tools::ExecContext;
use crate::workspace::resolve_workspace_path;

/// Read cap: 256 KiB.
const MAX_READ_BYTES: usize = 256 * 1024;
/// Write cap: 512 KiB per call.
const MAX_WRITE_BYTES: usize = 512 * 1024;

/// Top-level directories writes may land in, before the policy
/// allowlist is consulted.
const TRUSTED_WRITE_DIRS: &[&str] = &["memory", "skills", "logs", "workspace", "data"];

/// Files that may only grow via append.
const PROTECTED_BASENAMES: &[&str] = &["facts.md", "reflections.md", "agent.md"];

#[derive(Deserialize)]
struct ReadArgs {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteArgs {
    path: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    mode: String,
}

/// `fs.read` — args are a bare path or `{"path": "..."}`.
pub async fn read(ctx: &ExecContext, args: &str) -> HandlerResult {
    let raw = args.trim();
    if raw.is_empty() {
        return Err(ToolError::MalformedArgs("missing path".into()).into());
    }
    let rel = if raw.starts_with('{') {
        let parsed: ReadArgs = serde_json::from_str(raw)
            .map_err(|e| ToolError::MalformedArgs(format!("invalid fs.read args: {e}")))?;
        parsed.path
    } else {
        raw.trim_matches('"').to_string()
    };
    let abs = resolve_workspace_path(&ctx.workspace, &rel)?;
    let data = tokio::fs::read(&abs)
        .await
        .map_err(|e| ToolError::Other(format!("read {rel}: {e}")))?;
    let mut text = String::from_utf8_lossy(&data).into_owned();
    if text.len() > MAX_READ_BYTES {
        let mut end = MAX_READ_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("\n\n[TRUNCATED]");
    }
    debug!(path = %rel, bytes = data.len(), "fs.read");
    Ok(text)
}

/// `fs.write` — `{"path", "content", "mode"}`, mode `append` (default)
/// or `overwrite`.
pub async fn write(ctx: &ExecContext, args: &str) -> HandlerResult {
    if !ctx.policy.allows_tool("fs.write") {
        return Err(ToolError::PolicyDenied.into());
    }
    let parsed: WriteArgs = serde_json::from_str(args.trim())
        .map_err(|e| ToolError::MalformedArgs(format!("invalid fs.write args: {e}")))?;
    if parsed.path.trim().is_empty() {
        return Err(ToolError::MalformedArgs("missing path".into()).into());
    }
    if parsed.content.len() > MAX_WRITE_BYTES {
        return Err(ToolError::ResourceLimitExceeded(format!(
            "content exceeds {MAX_WRITE_BYTES} bytes"
        ))
        .into());
    }
    let mode = match parsed.mode.trim().to_lowercase().as_str() {
        "" | "append" => "append",
        "overwrite" => "overwrite",
        other => {
            return Err(ToolError::MalformedArgs(format!("unknown mode {other:?}")).into());
        }
    };

    let abs = resolve_workspace_path(&ctx.workspace, &parsed.path)?;
    let rel = abs
        .strip_prefix(&ctx.workspace)
        .unwrap_or(Path::new(&parsed.path))
        .to_string_lossy()
        .replace('\\', "/");

    if !is_trusted_write_dir(&rel) {
        return Err(ToolError::PathViolation(format!(
            "writes to {rel} are not permitted"
        ))
        .into());
    }
    if !ctx.policy.allows_write_path(&rel) {
        return Err(ToolError::PathViolation(format!(
            "path {rel} is outside the write allowlist"
        ))
        .into());
    }
    if mode == "overwrite" && is_protected(&abs) {
        return Err(ToolError::PathViolation(format!(
            "{rel} is append-only"
        ))
        .into());
    }

    if let Some(parent) = abs.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ToolFailure::from(ToolError::from(e)))?;
    }

    let written = if mode == "overwrite" {
        tokio::fs::write(&abs, parsed.content.as_bytes())
            .await
            .map_err(|e| ToolFailure::from(ToolError::from(e)))?;
        parsed.content.len()
    } else {
        append_with_separator(&abs, &parsed.content).await?
    };

    debug!(path = %rel, bytes = written, mode, "fs.write");
    Ok(format!("wrote {written} bytes to {rel} ({mode})"))
}

/// Append, inserting a newline separator when the file already has
/// content and the new chunk does not start with one.
async fn append_with_separator(abs: &Path, content: &str) -> Result<usize, ToolFailure> {
    let existing_len = tokio::fs::metadata(abs).await.map(|m| m.len()).unwrap_or(0);
    let mut chunk = String::new();
    if existing_len > 0 && !content.starts_with('\n') {
        chunk.push('\n');
    }
    chunk.push_str(content);

    use tokio::io::AsyncWriteExt;
    let mut f = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(abs)
        .await
        .map_err(|e| ToolFailure::from(ToolError::from(e)))?;
    f.write_all(chunk.as_bytes())
        .await
        .map_err(|e| ToolFailure::from(ToolError::from(e)))?;
    f.flush()
        .await
        .map_err(|e| ToolFailure::from(ToolError::from(e)))?;
    Ok(chunk.len())
}

fn is_trusted_write_dir(rel: &str) -> bool {
    let first = rel.split('/').next().unwrap_or("").to_lowercase();
    TRUSTED_WRITE_DIRS.contains(&first.as_str())
}

fn is_protected(abs: &Path) -> bool {
    let name = abs
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    PROTECTED_BASENAMES.contains(&name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecConfig;
    use crate::policy::ToolPolicy;
    use tempfile::tempdir;

    fn ctx_in(dir: &Path) -> ExecContext {
        ExecContext::new(dir.to_path_buf(), ToolPolicy::default(), ExecConfig::default())
    }

    fn err_of(res: HandlerResult) -> ToolError {
        res.unwrap_err().error
    }

    // ── fs.read ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_read_bare_and_json_path() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("memory")).unwrap();
        std::fs::write(dir.path().join("memory/notes.md"), "note body").unwrap();
        let ctx = ctx_in(dir.path());

        assert_eq!(read(&ctx, "memory/notes.md").await.unwrap(), "note body");
        assert_eq!(
            read(&ctx, r#"{"path":"memory/notes.md"}"#).await.unwrap(),
            "note body"
        );
        // workspace/ prefix is stripped before resolution
        assert_eq!(
            read(&ctx, "workspace/memory/notes.md").await.unwrap(),
            "note body"
        );
    }

    #[tokio::test]
    async fn test_read_rejects_traversal_and_absolute() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        assert!(matches!(
            err_of(read(&ctx, "../outside.txt").await),
            ToolError::PathViolation(_)
        ));
        assert!(matches!(
            err_of(read(&ctx, "/etc/passwd").await),
            ToolError::PathViolation(_)
        ));
    }

    #[tokio::test]
    async fn test_read_truncates_large_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("memory")).unwrap();
        let big = "a".repeat(MAX_READ_BYTES + 100);
        std::fs::write(dir.path().join("memory/big.md"), &big).unwrap();
        let ctx = ctx_in(dir.path());
        let out = read(&ctx, "memory/big.md").await.unwrap();
        assert!(out.ends_with("[TRUNCATED]"));
        assert!(out.len() < big.len());
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        assert!(read(&ctx, "memory/none.md").await.is_err());
    }

    // ── fs.write ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_write_append_creates_and_separates() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        write(&ctx, r#"{"path":"memory/log.md","content":"first"}"#)
            .await
            .unwrap();
        write(&ctx, r#"{"path":"memory/log.md","content":"second"}"#)
            .await
            .unwrap();
        let body = std::fs::read_to_string(dir.path().join("memory/log.md")).unwrap();
        assert_eq!(body, "first\nsecond");
    }

    #[tokio::test]
    async fn test_write_overwrite_replaces() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        write(&ctx, r#"{"path":"memory/n.md","content":"old"}"#)
            .await
            .unwrap();
        write(
            &ctx,
            r#"{"path":"memory/n.md","content":"new","mode":"overwrite"}"#,
        )
        .await
        .unwrap();
        let body = std::fs::read_to_string(dir.path().join("memory/n.md")).unwrap();
        assert_eq!(body, "new");
    }

    #[tokio::test]
    async fn test_overwrite_protected_file_always_denied() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let res = write(
            &ctx,
            r#"{"path":"memory/facts.md","content":"x","mode":"overwrite"}"#,
        )
        .await;
        assert!(matches!(err_of(res), ToolError::PathViolation(_)));
        // append to the same file is fine
        write(&ctx, r#"{"path":"memory/facts.md","content":"x"}"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_outside_trusted_dirs_denied() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let res = write(&ctx, r#"{"path":"secrets/k.md","content":"x"}"#).await;
        assert!(matches!(err_of(res), ToolError::PathViolation(_)));
    }

    #[tokio::test]
    async fn test_write_respects_policy_allowlist() {
        let dir = tempdir().unwrap();
        let mut ctx = ctx_in(dir.path());
        ctx.policy.allowed_write_prefixes = vec!["memory/notes.md".into()];
        write(&ctx, r#"{"path":"memory/notes.md","content":"ok"}"#)
            .await
            .unwrap();
        let res = write(&ctx, r#"{"path":"memory/other.md","content":"no"}"#).await;
        assert!(matches!(err_of(res), ToolError::PathViolation(_)));
    }

    #[tokio::test]
    async fn test_write_content_cap() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let big = "x".repeat(MAX_WRITE_BYTES + 1);
        let args = serde_json::json!({"path": "memory/big.md", "content": big}).to_string();
        let res = write(&ctx, &args).await;
        assert!(matches!(err_of(res), ToolError::ResourceLimitExceeded(_)));
        assert!(!dir.path().join("memory/big.md").exists());
    }

    #[tokio::test]
    async fn test_write_policy_disabled() {
        let dir = tempdir().unwrap();
        let mut ctx = ctx_in(dir.path());
        ctx.policy.allow_fs_write = false;
        let res = write(&ctx, r#"{"path":"memory/x.md","content":"x"}"#).await;
        assert!(matches!(err_of(res), ToolError::PolicyDenied));
    }

    #[tokio::test]
    async fn test_write_bad_args() {
        let dir = tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        assert!(matches!(
            err_of(write(&ctx, "not json").await),
            ToolError::MalformedArgs(_)
        ));
        assert!(matches!(
            err_of(write(&ctx, r#"{"path":"","content":"x"}"#).await),
            ToolError::MalformedArgs(_)
        ));
        assert!(matches!(
            err_of(write(&ctx, r#"{"path":"memory/x.md","mode":"weird"}"#).await),
            ToolError::MalformedArgs(_)
        ));
    }
}
