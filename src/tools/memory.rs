//! Memory tools over a pluggable store.
//!
//! The store is an external collaborator (SQLite, vector DB, whatever
//! the front end wires in); the handlers only define the contract.
//! Content is passed through secret redaction before it is persisted.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{HandlerResult, ToolError};
use crate::redact::redact_secrets;
use crate::tools::ExecContext;

/// One stored memory row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub id: i64,
    pub scope: String,
    pub content: String,
}

/// Backing store for the memory tools.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn insert(&self, scope: &str, content: &str) -> anyhow::Result<i64>;
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<MemoryEntry>>;
    /// Returns false when no row with that id exists.
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;
    async fn list(&self, limit: usize) -> anyhow::Result<Vec<MemoryEntry>>;
    async fn count(&self) -> anyhow::Result<u64>;
}

/// Simple in-process store: substring search, insertion order. Suitable
/// for tests and short-lived sessions.
#[derive(Default)]
pub struct InMemoryStore {
    inner: std::sync::Mutex<(i64, Vec<MemoryEntry>)>,
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn insert(&self, scope: &str, content: &str) -> anyhow::Result<i64> {
        let mut inner = self.inner.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        inner.0 += 1;
        let id = inner.0;
        inner.1.push(MemoryEntry {
            id,
            scope: scope.to_string(),
            content: content.to_string(),
        });
        Ok(id)
    }

    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<MemoryEntry>> {
        let inner = self.inner.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        let needle = query.to_lowercase();
        Ok(inner
            .1
            .iter()
            .filter(|e| e.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        let before = inner.1.len();
        inner.1.retain(|e| e.id != id);
        Ok(inner.1.len() != before)
    }

    async fn list(&self, limit: usize) -> anyhow::Result<Vec<MemoryEntry>> {
        let inner = self.inner.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        Ok(inner.1.iter().take(limit).cloned().collect())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let inner = self.inner.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        Ok(inner.1.len() as u64)
    }
}

fn store_of(ctx: &ExecContext) -> Result<&dyn MemoryStore, ToolError> {
    ctx.memory
        .as_deref()
        .ok_or_else(|| ToolError::FeatureDisabled("memory store is not attached".into()))
}

#[derive(Deserialize)]
struct StoreArgs {
    #[serde(default)]
    content: String,
    #[serde(default)]
    scope: String,
}

#[derive(Deserialize)]
struct RecallArgs {
    #[serde(default)]
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ForgetArgs {
    #[serde(default)]
    id: i64,
}

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default)]
    limit: Option<usize>,
}

/// `memory.store` — `{"content", "scope"}`, scope defaults to `global`.
pub async fn store(ctx: &ExecContext, args: &str) -> HandlerResult {
    let store = store_of(ctx)?;
    let parsed: StoreArgs = serde_json::from_str(args.trim())
        .map_err(|e| ToolError::MalformedArgs(format!("invalid memory.store args: {e}")))?;
    let content = parsed.content.trim();
    if content.is_empty() {
        return Err(ToolError::MalformedArgs("missing content".into()).into());
    }
    let scope = if parsed.scope.trim().is_empty() {
        "global"
    } else {
        parsed.scope.trim()
    };
    let content = redact_secrets(content);
    let id = store
        .insert(scope, &content)
        .await
        .map_err(ToolError::from)?;
    Ok(format!("stored memory #{id} in scope {scope}"))
}

/// `memory.recall` — `{"query", "limit"}`.
pub async fn recall(ctx: &ExecContext, args: &str) -> HandlerResult {
    let store = store_of(ctx)?;
    let parsed: RecallArgs = serde_json::from_str(args.trim())
        .map_err(|e| ToolError::MalformedArgs(format!("invalid memory.recall args: {e}")))?;
    let query = parsed.query.trim();
    if query.is_empty() {
        return Err(ToolError::MalformedArgs("missing query".into()).into());
    }
    let limit = parsed.limit.unwrap_or(5).clamp(1, 20);
    let entries = store.search(query, limit).await.map_err(ToolError::from)?;
    if entries.is_empty() {
        return Ok("(no matches)".to_string());
    }
    Ok(render_entries(&entries, 240))
}

/// `memory.forget` — `{"id"}`.
pub async fn forget(ctx: &ExecContext, args: &str) -> HandlerResult {
    let store = store_of(ctx)?;
    let parsed: ForgetArgs = serde_json::from_str(args.trim())
        .map_err(|e| ToolError::MalformedArgs(format!("invalid memory.forget args: {e}")))?;
    if parsed.id <= 0 {
        return Err(ToolError::MalformedArgs("id must be positive".into()).into());
    }
    let removed = store.delete(parsed.id).await.map_err(ToolError::from)?;
    if !removed {
        return Err(ToolError::Other(format!("no memory #{}", parsed.id)).into());
    }
    Ok(format!("forgot memory #{}", parsed.id))
}

/// `memory.list` — `{"limit"}`, default 50.
pub async fn list(ctx: &ExecContext, args: &str) -> HandlerResult {
    let store = store_of(ctx)?;
    let parsed: ListArgs = if args.trim().is_empty() {
        ListArgs { limit: None }
    } else {
        serde_json::from_str(args.trim())
            .map_err(|e| ToolError::MalformedArgs(format!("invalid memory.list args: {e}")))?
    };
    let limit = parsed.limit.unwrap_or(50).clamp(1, 200);
    let entries = store.list(limit).await.map_err(ToolError::from)?;
    if entries.is_empty() {
        return Ok("(empty)".to_string());
    }
    Ok(render_entries(&entries, 200))
}

/// `memory.stats`.
pub async fn stats(ctx: &ExecContext, _args: &str) -> HandlerResult {
    let store = store_of(ctx)?;
    let n = store.count().await.map_err(ToolError::from)?;
    Ok(format!("memories={n}"))
}

fn render_entries(entries: &[MemoryEntry], preview_len: usize) -> String {
    entries
        .iter()
        .map(|e| format!("- #{} [{}] {}", e.id, e.scope, preview_text(&e.content, preview_len)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview_text(s: &str, max: usize) -> String {
    let s = s.trim().replace('\n', " ");
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecConfig;
    use crate::policy::ToolPolicy;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ctx_with_store(dir: &std::path::Path) -> ExecContext {
        ExecContext::new(
            dir.to_path_buf(),
            ToolPolicy::default(),
            ExecConfig::default(),
        )
        .with_memory(Arc::new(InMemoryStore::default()))
    }

    #[tokio::test]
    async fn test_store_and_recall() {
        let dir = tempdir().unwrap();
        let ctx = ctx_with_store(dir.path());
        let out = store(&ctx, r#"{"content":"the deploy key lives in vault"}"#)
            .await
            .unwrap();
        assert_eq!(out, "stored memory #1 in scope global");
        let out = recall(&ctx, r#"{"query":"deploy"}"#).await.unwrap();
        assert!(out.contains("#1 [global]"));
        assert!(out.contains("deploy key"));
        let out = recall(&ctx, r#"{"query":"nonexistent"}"#).await.unwrap();
        assert_eq!(out, "(no matches)");
    }

    #[tokio::test]
    async fn test_store_redacts_content() {
        let dir = tempdir().unwrap();
        let ctx = ctx_with_store(dir.path());
        store(&ctx, r#"{"content":"OPENAI_API_KEY=supersecret123"}"#)
            .await
            .unwrap();
        let out = recall(&ctx, r#"{"query":"OPENAI"}"#).await.unwrap();
        assert!(out.contains("<redacted>"));
        assert!(!out.contains("supersecret123"));
    }

    #[tokio::test]
    async fn test_store_custom_scope_and_missing_content() {
        let dir = tempdir().unwrap();
        let ctx = ctx_with_store(dir.path());
        let out = store(&ctx, r#"{"content":"x","scope":"project"}"#)
            .await
            .unwrap();
        assert!(out.contains("scope project"));
        let err = store(&ctx, r#"{"content":"  "}"#).await.unwrap_err();
        assert!(matches!(err.error, ToolError::MalformedArgs(_)));
    }

    #[tokio::test]
    async fn test_forget() {
        let dir = tempdir().unwrap();
        let ctx = ctx_with_store(dir.path());
        store(&ctx, r#"{"content":"ephemeral"}"#).await.unwrap();
        assert_eq!(
            forget(&ctx, r#"{"id":1}"#).await.unwrap(),
            "forgot memory #1"
        );
        assert!(forget(&ctx, r#"{"id":1}"#).await.is_err());
        let err = forget(&ctx, r#"{"id":0}"#).await.unwrap_err();
        assert!(matches!(err.error, ToolError::MalformedArgs(_)));
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let dir = tempdir().unwrap();
        let ctx = ctx_with_store(dir.path());
        assert_eq!(list(&ctx, "{}").await.unwrap(), "(empty)");
        assert_eq!(stats(&ctx, "").await.unwrap(), "memories=0");
        store(&ctx, r#"{"content":"one"}"#).await.unwrap();
        store(&ctx, r#"{"content":"two"}"#).await.unwrap();
        let out = list(&ctx, "").await.unwrap();
        assert!(out.contains("#1 [global] one"));
        assert!(out.contains("#2 [global] two"));
        assert_eq!(stats(&ctx, "").await.unwrap(), "memories=2");
    }

    #[tokio::test]
    async fn test_no_store_attached() {
        let dir = tempdir().unwrap();
        let ctx = ExecContext::new(
            dir.path().to_path_buf(),
            ToolPolicy::default(),
            ExecConfig::default(),
        );
        let err = stats(&ctx, "").await.unwrap_err();
        assert!(matches!(err.error, ToolError::FeatureDisabled(_)));
    }

    #[test]
    fn test_preview_text() {
        assert_eq!(preview_text("short", 10), "short");
        let p = preview_text(&"a".repeat(300), 200);
        assert_eq!(p.len(), 203);
        assert!(p.ends_with("..."));
        assert_eq!(preview_text("multi\nline", 50), "multi line");
    }
}
