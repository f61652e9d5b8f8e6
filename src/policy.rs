//! Layered permission policy gating tool availability and approval.
//!
//! Resolution is an explicit three-layer merge — defaults, then the
//! workspace policy file, then environment overrides — producing one
//! immutable [`ToolPolicy`] value. The merge itself is a pure function
//! so precedence is testable without touching the filesystem.

use std::path::Path;

use tracing::debug;

use crate::config::parse_bool;

/// Resolved, immutable-after-construction permission table.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    pub allow_fs_write: bool,
    pub allow_runtime_exec: bool,
    pub allow_skill_exec: bool,
    pub require_fs_write: bool,
    pub require_runtime_exec: bool,
    pub require_skill_exec: bool,

    /// First-token allowlist for `runtime.exec` command lines.
    pub allowed_runtime_prefixes: Vec<String>,
    /// Path-prefix allowlist for `fs.write`.
    pub allowed_write_prefixes: Vec<String>,
    /// Skill-name allowlist for `skill.exec` (`*` = any).
    pub allowed_skill_names: Vec<String>,
    /// Script allowlist: bare script name or `skill/script` (`*` = any).
    pub allowed_skill_scripts: Vec<String>,
}

impl Default for ToolPolicy {
    /// All tools allowed, all destructive tools require approval, writes
    /// restricted to `memory/`, `skills/`, `logs/`.
    fn default() -> Self {
        Self {
            allow_fs_write: true,
            allow_runtime_exec: true,
            allow_skill_exec: true,
            require_fs_write: true,
            require_runtime_exec: true,
            require_skill_exec: true,
            allowed_runtime_prefixes: Vec::new(),
            allowed_write_prefixes: vec![
                "memory/".to_string(),
                "skills/".to_string(),
                "logs/".to_string(),
            ],
            allowed_skill_names: Vec::new(),
            allowed_skill_scripts: Vec::new(),
        }
    }
}

impl ToolPolicy {
    /// Availability lookup by canonical tool family. Reads and memory
    /// operations are unconditionally allowed.
    pub fn allows_tool(&self, tool: &str) -> bool {
        match tool {
            "fs.write" | "file_write" => self.allow_fs_write,
            "runtime.exec" | "shell_exec" => self.allow_runtime_exec,
            "skill.exec" | "skill_exec" => self.allow_skill_exec,
            _ => true,
        }
    }

    /// Approval-requirement lookup. Skill installation shares the skill
    /// require-flag. Unknown tools never require approval (they may
    /// still be denied by [`allows_tool`](Self::allows_tool)).
    pub fn requires_approval(&self, tool: &str) -> bool {
        match tool {
            "fs.write" | "file_write" => self.require_fs_write,
            "runtime.exec" | "shell_exec" => self.require_runtime_exec,
            "skill.exec" | "skill_exec" | "skills.install" | "install_skill"
            | "skill_store_install" => self.require_skill_exec,
            _ => false,
        }
    }

    /// Match the first shell token of `command` against the runtime
    /// prefix allowlist, case-insensitively. No allowlist = allow all.
    pub fn allows_runtime_command(&self, command: &str) -> bool {
        if self.allowed_runtime_prefixes.is_empty() {
            return true;
        }
        let tokens = shell_words::split(command).unwrap_or_default();
        let Some(first) = tokens.first() else {
            return false;
        };
        let first = first.trim().to_lowercase();
        self.allowed_runtime_prefixes
            .iter()
            .map(|p| p.trim().to_lowercase())
            .any(|p| !p.is_empty() && first == p)
    }

    /// Case-insensitive prefix match of a workspace-relative path against
    /// the write allowlist. No allowlist = allow all; `*` = allow all.
    pub fn allows_write_path(&self, rel_path: &str) -> bool {
        if self.allowed_write_prefixes.is_empty() {
            return true;
        }
        let path = rel_path
            .trim()
            .replace('\\', "/")
            .trim_start_matches('/')
            .to_lowercase();
        if path.is_empty() {
            return false;
        }
        self.allowed_write_prefixes.iter().any(|pref| {
            let pref = pref.trim().replace('\\', "/");
            let pref = pref.trim_start_matches('/');
            pref == "*" || (!pref.is_empty() && path.starts_with(&pref.to_lowercase()))
        })
    }

    /// Check a skill/script pair against the skill allowlists.
    pub fn allows_skill_exec(&self, skill: &str, script: &str) -> bool {
        let skill = skill.trim().to_lowercase();
        let script = script.trim().to_lowercase();
        if skill.is_empty() || script.is_empty() {
            return false;
        }
        if !self.allowed_skill_names.is_empty() {
            let named = self
                .allowed_skill_names
                .iter()
                .map(|it| it.trim().to_lowercase())
                .any(|it| it == "*" || it == skill);
            if !named {
                return false;
            }
        }
        if self.allowed_skill_scripts.is_empty() {
            return true;
        }
        let key = format!("{skill}/{script}");
        self.allowed_skill_scripts
            .iter()
            .map(|it| it.trim().to_lowercase())
            .any(|it| it == "*" || it == script || it == key)
    }
}

/// Optional overrides parsed from one policy source (file or env).
/// `None` fields leave the lower layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyOverrides {
    pub allow_fs_write: Option<bool>,
    pub allow_runtime_exec: Option<bool>,
    pub allow_skill_exec: Option<bool>,
    pub require_fs_write: Option<bool>,
    pub require_runtime_exec: Option<bool>,
    pub require_skill_exec: Option<bool>,
    pub allowed_runtime_prefixes: Vec<String>,
    pub allowed_write_prefixes: Vec<String>,
    pub allowed_skill_names: Vec<String>,
    pub allowed_skill_scripts: Vec<String>,
}

impl PolicyOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Read the `TOOLCAGE_POLICY_ALLOW_*` environment overrides.
    pub fn from_env() -> Self {
        let mut o = Self::default();
        o.allow_fs_write = env_bool("TOOLCAGE_POLICY_ALLOW_FS_WRITE");
        o.allow_runtime_exec = env_bool("TOOLCAGE_POLICY_ALLOW_RUNTIME_EXEC");
        o.allow_skill_exec = env_bool("TOOLCAGE_POLICY_ALLOW_SKILL_EXEC");
        o
    }
}

fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(parse_bool(&v, true)),
        _ => None,
    }
}

/// Apply one override layer on top of a base policy. Precedence is the
/// caller's application order: env > file > default.
pub fn merge_policy(base: ToolPolicy, layer: &PolicyOverrides) -> ToolPolicy {
    let mut p = base;
    if let Some(v) = layer.allow_fs_write {
        p.allow_fs_write = v;
    }
    if let Some(v) = layer.allow_runtime_exec {
        p.allow_runtime_exec = v;
    }
    if let Some(v) = layer.allow_skill_exec {
        p.allow_skill_exec = v;
    }
    if let Some(v) = layer.require_fs_write {
        p.require_fs_write = v;
    }
    if let Some(v) = layer.require_runtime_exec {
        p.require_runtime_exec = v;
    }
    if let Some(v) = layer.require_skill_exec {
        p.require_skill_exec = v;
    }
    if !layer.allowed_runtime_prefixes.is_empty() {
        p.allowed_runtime_prefixes = layer.allowed_runtime_prefixes.clone();
    }
    if !layer.allowed_write_prefixes.is_empty() {
        p.allowed_write_prefixes = layer.allowed_write_prefixes.clone();
    }
    if !layer.allowed_skill_names.is_empty() {
        p.allowed_skill_names = layer.allowed_skill_names.clone();
    }
    if !layer.allowed_skill_scripts.is_empty() {
        p.allowed_skill_scripts = layer.allowed_skill_scripts.clone();
    }
    p
}

/// Parse the line-oriented policy file format: `key = value` pairs,
/// quotes stripped, permissive booleans, comma-separated lists. Section
/// headers and `#` comments are skipped. Returns `None` when nothing
/// recognized was found.
pub fn parse_policy_file(content: &str) -> Option<PolicyOverrides> {
    let mut o = PolicyOverrides::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let Some((key, val)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim().trim_matches('"').trim_matches('\'');
        match key {
            "allow_fs_write" => o.allow_fs_write = Some(parse_bool(val, true)),
            "allow_runtime_exec" => o.allow_runtime_exec = Some(parse_bool(val, true)),
            "allow_skill_exec" => o.allow_skill_exec = Some(parse_bool(val, true)),
            "require_approval_fs_write" => o.require_fs_write = Some(parse_bool(val, true)),
            "require_approval_runtime_exec" => {
                o.require_runtime_exec = Some(parse_bool(val, true))
            }
            "require_approval_skill_exec" => o.require_skill_exec = Some(parse_bool(val, true)),
            "allowed_runtime_prefixes" => o.allowed_runtime_prefixes = split_csv(val),
            "allowed_write_prefixes" => o.allowed_write_prefixes = split_csv(val),
            "allowed_skill_names" => o.allowed_skill_names = split_csv(val),
            "allowed_skill_scripts" => o.allowed_skill_scripts = split_csv(val),
            _ => {}
        }
    }
    if o.is_empty() {
        return None;
    }
    Some(o)
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|it| it.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|it| !it.is_empty())
        .collect()
}

/// Resolve the effective policy for a workspace: defaults, then
/// `data/policy.toml` if present, then environment overrides.
pub fn load_tool_policy(workspace: &Path) -> ToolPolicy {
    let mut policy = ToolPolicy::default();
    let path = workspace.join("data").join("policy.toml");
    if let Ok(content) = std::fs::read_to_string(&path) {
        if let Some(file_layer) = parse_policy_file(&content) {
            debug!("applying policy file {}", path.display());
            policy = merge_policy(policy, &file_layer);
        }
    }
    merge_policy(policy, &PolicyOverrides::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let p = ToolPolicy::default();
        assert!(p.allows_tool("fs.write"));
        assert!(p.allows_tool("runtime.exec"));
        assert!(p.allows_tool("skill.exec"));
        assert!(p.allows_tool("fs.read"));
        assert!(p.requires_approval("fs.write"));
        assert!(p.requires_approval("runtime.exec"));
        assert!(p.requires_approval("skill.exec"));
        assert!(p.requires_approval("skills.install"));
        assert!(!p.requires_approval("fs.read"));
        assert!(!p.requires_approval("memory.store"));
    }

    #[test]
    fn test_synonyms_map_to_same_family() {
        let p = ToolPolicy {
            allow_runtime_exec: false,
            ..Default::default()
        };
        assert!(!p.allows_tool("runtime.exec"));
        assert!(!p.allows_tool("shell_exec"));
        assert!(p.allows_tool("fs.write"));
    }

    #[test]
    fn test_unknown_tool_allowed_but_never_requires_approval() {
        let p = ToolPolicy::default();
        assert!(p.allows_tool("something.else"));
        assert!(!p.requires_approval("something.else"));
    }

    // ── allows_runtime_command ──────────────────────────

    #[test]
    fn test_runtime_command_no_allowlist_allows_all() {
        let p = ToolPolicy::default();
        assert!(p.allows_runtime_command("rm -rf /"));
    }

    #[test]
    fn test_runtime_command_first_token_match() {
        let p = ToolPolicy {
            allowed_runtime_prefixes: vec!["git".into(), "ls".into()],
            ..Default::default()
        };
        assert!(p.allows_runtime_command("git status"));
        assert!(p.allows_runtime_command("LS -la"));
        assert!(!p.allows_runtime_command("rm -rf x"));
        assert!(!p.allows_runtime_command(""));
    }

    #[test]
    fn test_runtime_command_quote_aware() {
        let p = ToolPolicy {
            allowed_runtime_prefixes: vec!["echo".into()],
            ..Default::default()
        };
        assert!(p.allows_runtime_command(r#"echo "rm -rf""#));
        // Unbalanced quoting tokenizes to nothing and is denied.
        assert!(!p.allows_runtime_command(r#""unterminated"#));
    }

    // ── allows_write_path ───────────────────────────────

    #[test]
    fn test_write_path_exact_entry() {
        let p = ToolPolicy {
            allowed_write_prefixes: vec!["memory/notes.md".into()],
            ..Default::default()
        };
        assert!(p.allows_write_path("memory/notes.md"));
        assert!(!p.allows_write_path("memory/facts.md"));
    }

    #[test]
    fn test_write_path_wildcard_and_prefix() {
        let star = ToolPolicy {
            allowed_write_prefixes: vec!["*".into()],
            ..Default::default()
        };
        assert!(star.allows_write_path("anything/at/all.md"));

        let p = ToolPolicy::default();
        assert!(p.allows_write_path("memory/x.md"));
        assert!(p.allows_write_path("/memory/x.md"));
        assert!(p.allows_write_path("Memory/x.md"));
        assert!(!p.allows_write_path("secrets/x.md"));
        assert!(!p.allows_write_path(""));
    }

    // ── allows_skill_exec ───────────────────────────────

    #[test]
    fn test_skill_exec_empty_allowlists_allow_any() {
        let p = ToolPolicy::default();
        assert!(p.allows_skill_exec("weather", "get.sh"));
        assert!(!p.allows_skill_exec("", "get.sh"));
        assert!(!p.allows_skill_exec("weather", ""));
    }

    #[test]
    fn test_skill_exec_name_allowlist() {
        let p = ToolPolicy {
            allowed_skill_names: vec!["weather".into()],
            ..Default::default()
        };
        assert!(p.allows_skill_exec("Weather", "get.sh"));
        assert!(!p.allows_skill_exec("other", "get.sh"));

        let star = ToolPolicy {
            allowed_skill_names: vec!["*".into()],
            ..Default::default()
        };
        assert!(star.allows_skill_exec("anything", "get.sh"));
    }

    #[test]
    fn test_skill_exec_script_allowlist() {
        let p = ToolPolicy {
            allowed_skill_scripts: vec!["get.sh".into(), "weather/fetch.sh".into()],
            ..Default::default()
        };
        assert!(p.allows_skill_exec("any", "get.sh"));
        assert!(p.allows_skill_exec("weather", "fetch.sh"));
        assert!(!p.allows_skill_exec("other", "fetch.sh"));
    }

    // ── policy file parsing ─────────────────────────────

    #[test]
    fn test_parse_policy_file_basic() {
        let content = r#"
# permissions
[tools]
allow_runtime_exec = false
require_approval_fs_write = "no"
allowed_write_prefixes = "memory/, logs/"
allowed_skill_names = 'weather, backup'
"#;
        let o = parse_policy_file(content).unwrap();
        assert_eq!(o.allow_runtime_exec, Some(false));
        assert_eq!(o.require_fs_write, Some(false));
        assert_eq!(o.allowed_write_prefixes, vec!["memory/", "logs/"]);
        assert_eq!(o.allowed_skill_names, vec!["weather", "backup"]);
        assert_eq!(o.allow_fs_write, None);
    }

    #[test]
    fn test_parse_policy_file_unrecognized_returns_none() {
        assert!(parse_policy_file("").is_none());
        assert!(parse_policy_file("# only comments\nfoo = bar\n").is_none());
    }

    // ── layered merge ───────────────────────────────────

    #[test]
    fn test_merge_file_over_default() {
        let file = PolicyOverrides {
            allow_runtime_exec: Some(false),
            allowed_write_prefixes: vec!["data/".into()],
            ..Default::default()
        };
        let p = merge_policy(ToolPolicy::default(), &file);
        assert!(!p.allow_runtime_exec);
        assert!(p.allow_fs_write);
        assert_eq!(p.allowed_write_prefixes, vec!["data/"]);
    }

    #[test]
    fn test_merge_env_over_file() {
        let file = PolicyOverrides {
            allow_runtime_exec: Some(false),
            ..Default::default()
        };
        let env = PolicyOverrides {
            allow_runtime_exec: Some(true),
            ..Default::default()
        };
        let p = merge_policy(merge_policy(ToolPolicy::default(), &file), &env);
        assert!(p.allow_runtime_exec);
    }

    #[test]
    fn test_merge_empty_layer_is_identity() {
        let p = merge_policy(ToolPolicy::default(), &PolicyOverrides::default());
        let d = ToolPolicy::default();
        assert_eq!(p.allow_fs_write, d.allow_fs_write);
        assert_eq!(p.allowed_write_prefixes, d.allowed_write_prefixes);
    }
}
