//! Runtime knobs, resolved once from the environment into an immutable
//! [`ExecConfig`] value at construction time. Handlers never read the
//! environment directly.

use std::time::Duration;

/// Default per-stream output cap: 256 KiB.
const DEFAULT_MAX_OUTPUT_BYTES: usize = 256 * 1024;
/// Default number of concurrently running external processes.
const DEFAULT_MAX_CONCURRENT: usize = 2;
/// Default per-file cap for skill installs: 5 MiB.
const DEFAULT_SKILLS_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
/// Default total-bytes-copied cap for a single install: 20 MiB.
const DEFAULT_SKILLS_MAX_TOTAL_BYTES: u64 = 20 * 1024 * 1024;
/// Default maximum zip archive size, checked before opening: 50 MiB.
const DEFAULT_SKILLS_MAX_ZIP_BYTES: u64 = 50 * 1024 * 1024;

/// External sandbox wrapper settings.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// When true, every spawned argv is routed through `bin`.
    pub enabled: bool,
    /// Sandbox executable — bare name (resolved on PATH) or absolute path.
    pub bin: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bin: default_sandbox_bin(),
        }
    }
}

fn default_sandbox_bin() -> String {
    if cfg!(windows) {
        "toolcage-sandbox.exe".to_string()
    } else {
        "toolcage-sandbox".to_string()
    }
}

/// Resolved execution configuration.
///
/// Built once (typically via [`ExecConfig::from_env`]) and carried
/// immutably inside [`ExecContext`](crate::tools::ExecContext).
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Master switch for `runtime.exec`. When off, only the narrow
    /// read-only safelist of commands is permitted.
    pub exec_enabled: bool,
    /// Feature flag for `skill.exec`.
    pub skills_enabled: bool,
    /// Feature flag for git-sourced skill installation.
    pub git_enabled: bool,
    /// When set, the approval gate is bypassed entirely.
    pub auto_approve: bool,
    pub sandbox: SandboxConfig,
    /// Per-stream (stdout, stderr) capture cap in bytes.
    pub max_output_bytes: usize,
    /// Maximum concurrently running external processes.
    pub max_concurrent: usize,
    /// Per-file byte cap for skill installs.
    pub skills_max_file_bytes: u64,
    /// Total-bytes-copied cap for directory and zip installs.
    pub skills_max_total_bytes: u64,
    /// Maximum zip archive size before even opening it.
    pub skills_max_zip_bytes: u64,
    /// Forced install layer (`local` or `upstream`); overrides the
    /// source-dependent default when set.
    pub install_layer: Option<String>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            exec_enabled: false,
            skills_enabled: false,
            git_enabled: false,
            auto_approve: false,
            sandbox: SandboxConfig::default(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            skills_max_file_bytes: DEFAULT_SKILLS_MAX_FILE_BYTES,
            skills_max_total_bytes: DEFAULT_SKILLS_MAX_TOTAL_BYTES,
            skills_max_zip_bytes: DEFAULT_SKILLS_MAX_ZIP_BYTES,
            install_layer: None,
        }
    }
}

impl ExecConfig {
    /// Snapshot the `TOOLCAGE_*` environment into a resolved config.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.exec_enabled = env_flag("TOOLCAGE_ENABLE_EXEC", cfg.exec_enabled);
        cfg.skills_enabled = env_flag("TOOLCAGE_ENABLE_SKILLS", cfg.skills_enabled);
        cfg.git_enabled = env_flag("TOOLCAGE_ENABLE_GIT", cfg.git_enabled);
        cfg.auto_approve = env_flag("TOOLCAGE_AUTO_APPROVE", cfg.auto_approve);
        cfg.sandbox.enabled = env_flag("TOOLCAGE_EXEC_SANDBOX", cfg.sandbox.enabled);
        if let Some(bin) = env_string("TOOLCAGE_SANDBOX_BIN") {
            cfg.sandbox.bin = bin;
        }
        if let Some(n) = env_number("TOOLCAGE_EXEC_MAX_OUTPUT_BYTES") {
            cfg.max_output_bytes = (n as usize).clamp(1024, 8 * 1024 * 1024);
        }
        if let Some(n) = env_number("TOOLCAGE_EXEC_MAX_CONCURRENT") {
            cfg.max_concurrent = (n as usize).clamp(1, 32);
        }
        if let Some(n) = env_number("TOOLCAGE_SKILLS_MAX_FILE_BYTES") {
            cfg.skills_max_file_bytes = n;
        }
        if let Some(n) = env_number("TOOLCAGE_SKILLS_MAX_TOTAL_BYTES") {
            cfg.skills_max_total_bytes = n;
        }
        if let Some(n) = env_number("TOOLCAGE_SKILLS_MAX_ZIP_BYTES") {
            cfg.skills_max_zip_bytes = n;
        }
        if let Some(layer) = env_string("TOOLCAGE_SKILLS_INSTALL_LAYER") {
            cfg.install_layer = Some(layer.to_lowercase());
        }
        cfg
    }

    /// Default timeout for `runtime.exec` / `skill.exec` when the caller
    /// does not supply one.
    pub fn default_exec_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Hard ceiling on any per-call timeout.
    pub fn max_exec_timeout(&self) -> Duration {
        Duration::from_secs(10 * 60)
    }

    /// Clamp a caller-supplied `timeoutSeconds` into the allowed range,
    /// substituting the default for missing/non-positive values.
    pub fn clamp_exec_timeout(&self, timeout_seconds: Option<i64>) -> Duration {
        let secs = timeout_seconds.unwrap_or(0);
        if secs <= 0 {
            return self.default_exec_timeout();
        }
        Duration::from_secs(secs as u64).min(self.max_exec_timeout())
    }
}

/// Permissive boolean: `1/true/yes/y/on` vs `0/false/no/n/off`; anything
/// else keeps the default.
pub(crate) fn parse_bool(v: &str, default: bool) -> bool {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => parse_bool(&v, default),
        _ => default,
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_number(name: &str) -> Option<u64> {
    env_string(name)?.parse::<u64>().ok().filter(|n| *n > 0)
}
