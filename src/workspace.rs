//! Workspace path confinement.
//!
//! Every caller-supplied relative path is mapped to an absolute path
//! guaranteed to lie inside the workspace root, or rejected. Models
//! sometimes echo the workspace directory name in their own paths, so a
//! normalization step strips any number of leading `workspace/` segments
//! before resolution.

use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

/// Strip a redundant leading `workspace/` prefix (repeated any number of
/// times, case-insensitively) from a relative path. Absolute paths are
/// returned untouched so the resolver can reject them.
pub fn normalize_rel_path(p: &str) -> String {
    let p = p.trim();
    if p.is_empty() || Path::new(p).is_absolute() {
        return p.to_string();
    }
    let mut s = p.replace('\\', "/");
    s = s.trim_start_matches('/').to_string();
    while let Some(rest) = strip_workspace_prefix(&s) {
        s = rest.trim_start_matches('/').to_string();
    }
    s
}

/// Char-wise case-insensitive strip of one `workspace/` prefix. Byte
/// offsets derived from a lowercased copy would be wrong for characters
/// whose lowercase form changes length (U+212A KELVIN SIGN is `k`).
fn strip_workspace_prefix(s: &str) -> Option<&str> {
    const PREFIX: &str = "workspace/";
    let mut chars = s.char_indices();
    for expected in PREFIX.chars() {
        let (_, c) = chars.next()?;
        if !c.eq_ignore_ascii_case(&expected) {
            return None;
        }
    }
    match chars.next() {
        Some((i, _)) => Some(&s[i..]),
        None => Some(""),
    }
}

/// Lexically clean a relative path: drop `.` components and resolve
/// interior `..` against preceding segments. A `..` that cannot be
/// resolved is kept, signalling traversal to the caller.
fn clean_rel(p: &str) -> PathBuf {
    let mut stack: Vec<Component> = Vec::new();
    for comp in Path::new(p).components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(stack.last(), Some(Component::Normal(_))) {
                    stack.pop();
                } else {
                    stack.push(comp);
                }
            }
            other => stack.push(other),
        }
    }
    stack.iter().collect()
}

/// Map a caller-supplied path string to a canonical absolute path inside
/// `workspace`, or fail with a path violation.
pub fn resolve_workspace_path(workspace: &Path, p: &str) -> Result<PathBuf, ToolError> {
    if p.contains('\0') {
        return Err(ToolError::PathViolation("invalid path".into()));
    }
    let p = normalize_rel_path(p);
    if p.is_empty() {
        return Err(ToolError::PathViolation("empty path".into()));
    }
    if Path::new(&p).is_absolute() {
        return Err(ToolError::PathViolation(
            "absolute paths are not allowed".into(),
        ));
    }
    let clean = clean_rel(&p);
    if clean.as_os_str().is_empty() {
        return Err(ToolError::PathViolation("invalid path".into()));
    }
    if clean
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ToolError::PathViolation(
            "path traversal is not allowed".into(),
        ));
    }

    let workspace_abs = absolutize(workspace)?;
    let target = absolutize(&workspace_abs.join(&clean))?;

    // Second line of defense against separator/prefix edge cases the
    // lexical check missed.
    if !target.starts_with(&workspace_abs) {
        return Err(ToolError::PathViolation("path escapes workspace".into()));
    }
    Ok(target)
}

fn absolutize(p: &Path) -> Result<PathBuf, ToolError> {
    if p.is_absolute() {
        return Ok(clean_abs(p));
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ToolError::PathViolation(format!("cannot resolve workspace: {e}")))?;
    Ok(clean_abs(&cwd.join(p)))
}

/// Lexical normalization of an absolute path (no symlink resolution,
/// mirroring the relative clean).
fn clean_abs(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
