//! Skill installation from `.zip` archives.
//!
//! The archive size is checked before the file is even opened. Every
//! entry path is validated against zip-slip shapes (absolute paths,
//! drive-letter colons, `..` segments), declared sizes are checked
//! against the per-file cap, and extraction copies through a limited
//! reader so a lying entry cannot exceed the cap either. Entries are
//! staged into a temporary directory and installed from there; nothing
//! lands under the workspace until the whole archive extracted cleanly.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ExecConfig;
use crate::error::ToolError;
use crate::skills::install::{install_skills_from_path_with_origin, is_ignored_dir};

/// Extract `zip_path` into a staging directory and install the result.
pub fn install_skills_from_zip(
    workspace: &Path,
    zip_path: &Path,
    origin: Option<&str>,
    default_layer: &str,
    cfg: &ExecConfig,
) -> Result<Vec<String>, ToolError> {
    let archive_size = std::fs::metadata(zip_path).map_err(ToolError::from)?.len();
    if cfg.skills_max_zip_bytes > 0 && archive_size > cfg.skills_max_zip_bytes {
        return Err(ToolError::ResourceLimitExceeded(format!(
            "zip is {archive_size} bytes, limit {}",
            cfg.skills_max_zip_bytes
        )));
    }

    let file = std::fs::File::open(zip_path).map_err(ToolError::from)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ToolError::Other(format!("open zip: {e}")))?;

    let staging = tempfile::tempdir().map_err(ToolError::from)?;
    let max_file = cfg.skills_max_file_bytes;
    let max_total = cfg.skills_max_total_bytes;
    let mut total_copied: u64 = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ToolError::Other(format!("read zip entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let rel = safe_zip_rel_path(entry.name()).ok_or_else(|| {
            ToolError::PathViolation(format!("unsafe zip entry path: {}", entry.name()))
        })?;
        if has_ignored_segment(&rel) {
            continue;
        }

        let declared = entry.size();
        if max_file > 0 && declared > max_file {
            return Err(ToolError::ResourceLimitExceeded(format!(
                "zip entry {} declares {declared} bytes, per-file limit {max_file}",
                rel.display()
            )));
        }
        if max_total > 0 && total_copied >= max_total {
            return Err(ToolError::ResourceLimitExceeded(format!(
                "zip contents exceed total limit {max_total}"
            )));
        }

        let dst = staging.path().join(&rel);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(ToolError::from)?;
        }

        // Copy at most one byte past the tightest cap; landing past a
        // cap proves the declared size lied.
        let mut limit = u64::MAX;
        if max_file > 0 {
            limit = limit.min(max_file + 1);
        }
        if max_total > 0 {
            limit = limit.min(max_total - total_copied + 1);
        }
        let mut out = std::fs::File::create(&dst).map_err(ToolError::from)?;
        let copied = std::io::copy(&mut (&mut entry).take(limit), &mut out)
            .map_err(ToolError::from)?;

        if max_file > 0 && copied > max_file {
            return Err(ToolError::ResourceLimitExceeded(format!(
                "zip entry {} exceeds per-file limit {max_file}",
                rel.display()
            )));
        }
        total_copied += copied;
        if max_total > 0 && total_copied > max_total {
            return Err(ToolError::ResourceLimitExceeded(format!(
                "zip contents exceed total limit {max_total}"
            )));
        }
    }

    debug!(bytes = total_copied, "zip staged, installing");
    install_skills_from_path_with_origin(workspace, staging.path(), origin, default_layer, cfg)
}

/// Normalize one zip entry name into a safe relative path: leading
/// slashes are stripped, `.` segments dropped. Rejects empty names,
/// drive-letter colons, and any `..` segment.
pub(crate) fn safe_zip_rel_path(name: &str) -> Option<PathBuf> {
    let n = name.replace('\\', "/");
    let n = n.trim_start_matches('/');
    if n.is_empty() || n.contains(':') {
        return None;
    }
    let mut parts = Vec::new();
    for seg in n.split('/') {
        match seg {
            "" | "." => {}
            ".." => return None,
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}

fn has_ignored_segment(rel: &Path) -> bool {
    rel.components().any(|c| {
        matches!(c, std::path::Component::Normal(s) if is_ignored_dir(&s.to_string_lossy()))
    })
}
