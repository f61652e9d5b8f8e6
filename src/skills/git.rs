//! Skill installation from a git repository.
//!
//! Disabled unless the git feature flag is set. Only `https://` URLs
//! are accepted, the clone is shallow, and it lands in a throwaway
//! temporary directory that is removed whether or not the install
//! succeeds.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::config::ExecConfig;
use crate::error::ToolError;
use crate::exec::sandbox::find_on_path;
use crate::exec::{run_bounded, ExecutorPool};
use crate::skills::install::install_skills_from_path_with_origin;

/// Wall-clock budget for the clone.
const CLONE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Clone `url` shallowly and install whatever skills it contains.
pub async fn install_skills_from_git_url(
    workspace: &Path,
    url: &str,
    default_layer: &str,
    cfg: &ExecConfig,
    pool: &ExecutorPool,
) -> Result<Vec<String>, ToolError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ToolError::MalformedArgs("empty git url".into()));
    }
    if !cfg.git_enabled {
        return Err(ToolError::FeatureDisabled(
            "git install is disabled".into(),
        ));
    }
    if !is_safe_git_url(url) {
        return Err(ToolError::MalformedArgs(
            "git url denied (only https:// URLs are allowed)".into(),
        ));
    }
    let git = find_on_path(if cfg!(windows) { "git.exe" } else { "git" })
        .ok_or_else(|| ToolError::Other("git not found in PATH".into()))?;

    let staging = tempfile::tempdir().map_err(ToolError::from)?;
    let argv = vec![
        git.to_string_lossy().into_owned(),
        "clone".to_string(),
        "--depth".to_string(),
        "1".to_string(),
        url.to_string(),
        staging.path().to_string_lossy().into_owned(),
    ];
    let outcome = run_bounded(&argv, workspace, CLONE_TIMEOUT, cfg.max_output_bytes, pool)
        .await
        .map_err(|e| ToolError::Other(e.to_string()))?;
    if let Some(err) = outcome.error {
        let stderr = outcome.stderr.trim();
        let detail = if stderr.is_empty() {
            err.to_string()
        } else {
            format!("{err}: {stderr}")
        };
        return Err(ToolError::ProcessFailure(format!(
            "git clone failed: {detail}"
        )));
    }

    info!(%url, "cloned skill repository");
    install_skills_from_path_with_origin(workspace, staging.path(), Some(url), default_layer, cfg)
}

/// Accept only `https://` URLs without whitespace or control bytes.
pub fn is_safe_git_url(url: &str) -> bool {
    let u = url.trim();
    if u.is_empty() || u.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    u.to_lowercase().starts_with("https://")
}
