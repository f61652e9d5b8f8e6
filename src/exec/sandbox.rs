//! Optional external sandbox wrapper.
//!
//! When sandboxing is enabled, every spawned argv is prefixed with the
//! configured sandbox executable. If the executable cannot be located
//! the call fails — there is never a silent unsandboxed fallback.

use std::path::{Path, PathBuf};

use crate::config::SandboxConfig;
use crate::error::ToolError;

/// Rewrite `argv` to route through the sandbox binary, or pass it
/// through untouched when sandboxing is disabled.
pub fn wrap_with_sandbox(
    argv: Vec<String>,
    cfg: &SandboxConfig,
) -> Result<Vec<String>, ToolError> {
    if !cfg.enabled {
        return Ok(argv);
    }
    if argv.is_empty() {
        return Err(ToolError::ProcessFailure("empty command argv".into()));
    }
    let bin = cfg.bin.trim();
    if Path::new(bin).is_absolute() {
        if !Path::new(bin).is_file() {
            return Err(ToolError::SandboxUnavailable(format!(
                "sandbox binary not found: {bin}"
            )));
        }
    } else if find_on_path(bin).is_none() {
        return Err(ToolError::SandboxUnavailable(format!(
            "sandbox enabled but {bin} not found in PATH"
        )));
    }
    let mut wrapped = Vec::with_capacity(argv.len() + 1);
    wrapped.push(bin.to_string());
    wrapped.extend(argv);
    Ok(wrapped)
}

/// Resolve a bare executable name against `PATH`.
pub(crate) fn find_on_path(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(bin);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    p.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(p: &Path) -> bool {
    p.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv() -> Vec<String> {
        vec!["echo".into(), "hi".into()]
    }

    #[test]
    fn test_disabled_passes_through() {
        let cfg = SandboxConfig {
            enabled: false,
            bin: "nope".into(),
        };
        assert_eq!(wrap_with_sandbox(argv(), &cfg).unwrap(), argv());
    }

    #[test]
    fn test_missing_binary_fails_closed() {
        let cfg = SandboxConfig {
            enabled: true,
            bin: "definitely-not-a-sandbox-binary-404".into(),
        };
        let err = wrap_with_sandbox(argv(), &cfg).unwrap_err();
        assert!(matches!(err, ToolError::SandboxUnavailable(_)));
    }

    #[test]
    fn test_missing_absolute_binary_fails_closed() {
        let cfg = SandboxConfig {
            enabled: true,
            bin: "/nonexistent/dir/sandbox".into(),
        };
        let err = wrap_with_sandbox(argv(), &cfg).unwrap_err();
        assert!(matches!(err, ToolError::SandboxUnavailable(_)));
    }

    #[test]
    fn test_found_binary_is_prefixed() {
        // `sh` exists on any unix PATH.
        let cfg = SandboxConfig {
            enabled: true,
            bin: "sh".into(),
        };
        let wrapped = wrap_with_sandbox(argv(), &cfg).unwrap();
        assert_eq!(wrapped[0], "sh");
        assert_eq!(&wrapped[1..], argv().as_slice());
    }

    #[test]
    fn test_empty_argv_rejected_when_enabled() {
        let cfg = SandboxConfig {
            enabled: true,
            bin: "sh".into(),
        };
        assert!(wrap_with_sandbox(Vec::new(), &cfg).is_err());
    }
}
