//! Skill installation from a local directory tree.
//!
//! The installer accepts several source shapes — a repo with a
//! `skills/` root, a single skill directory, a bare `scripts/`
//! directory, or a directory of skill directories — and copies into
//! the workspace `skills/` tree under byte budgets. Symlinks and VCS
//! noise directories are never copied, and an existing skill is never
//! replaced.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::config::ExecConfig;
use crate::error::ToolError;
use crate::skills::SOURCE_META_FILE;

/// Directories skipped during copy and zip extraction.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".github",
    ".idea",
    ".vscode",
    "node_modules",
    "dist",
    "build",
    "target",
    "vendor",
    ".venv",
    "venv",
    "__pycache__",
];

pub(crate) fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIRS.contains(&name.trim().to_lowercase().as_str())
}

/// Running byte budget shared by every file copied in one install.
pub(crate) struct CopyBudget {
    pub max_file: u64,
    pub max_total: u64,
    pub copied: u64,
}

impl CopyBudget {
    pub fn new(cfg: &ExecConfig) -> Self {
        Self {
            max_file: cfg.skills_max_file_bytes,
            max_total: cfg.skills_max_total_bytes,
            copied: 0,
        }
    }

    /// Charge `n` bytes for `what`, failing when either cap is blown.
    pub fn charge(&mut self, n: u64, what: &str) -> Result<(), ToolError> {
        if self.max_file > 0 && n > self.max_file {
            return Err(ToolError::ResourceLimitExceeded(format!(
                "{what}: {n} bytes exceeds per-file limit {}",
                self.max_file
            )));
        }
        self.copied += n;
        if self.max_total > 0 && self.copied > self.max_total {
            return Err(ToolError::ResourceLimitExceeded(format!(
                "install total exceeds limit {}",
                self.max_total
            )));
        }
        Ok(())
    }
}

/// Install from a directory or `.zip`, defaulting to the `local` layer.
pub fn install_skills_from_path(
    workspace: &Path,
    src: &Path,
    cfg: &ExecConfig,
) -> Result<Vec<String>, ToolError> {
    install_skills_from_path_with_origin(workspace, src, None, "local", cfg)
}

/// Install from `src`, recording `origin` in each installed skill's
/// provenance sidecar. `default_layer` applies unless the config forces
/// a layer.
pub fn install_skills_from_path_with_origin(
    workspace: &Path,
    src: &Path,
    origin: Option<&str>,
    default_layer: &str,
    cfg: &ExecConfig,
) -> Result<Vec<String>, ToolError> {
    let src = src
        .canonicalize()
        .map_err(|e| ToolError::Other(format!("source {}: {e}", src.display())))?;
    let origin = origin
        .map(str::to_string)
        .unwrap_or_else(|| src.display().to_string());

    let layer = cfg
        .install_layer
        .as_deref()
        .unwrap_or(default_layer)
        .trim()
        .to_lowercase();
    let mut dst_root = workspace.join("skills");
    if layer == "upstream" {
        dst_root = dst_root.join("_upstream");
    }
    std::fs::create_dir_all(&dst_root).map_err(ToolError::from)?;

    if !src.is_dir() {
        if src
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
        {
            return super::archive::install_skills_from_zip(
                workspace,
                &src,
                Some(&origin),
                default_layer,
                cfg,
            );
        }
        return Err(ToolError::Other(format!(
            "source is not a directory: {}",
            src.display()
        )));
    }

    let mut budget = CopyBudget::new(cfg);

    // Shape 1: repo carrying a skills/ root.
    if src.join("skills").is_dir() {
        let installed = install_from_skills_root(&dst_root, &src.join("skills"), &mut budget)?;
        for name in &installed {
            write_skill_source_meta(&dst_root.join(name), &origin, &layer)?;
        }
        info!(count = installed.len(), "installed skills from skills/ root");
        return Ok(installed);
    }

    // Shape 2: a single skill directory.
    if src.join("scripts").is_dir() {
        let name = base_name(&src)?;
        install_one_skill_dir(&dst_root, &src, &name, &mut budget)?;
        write_skill_source_meta(&dst_root.join(&name), &origin, &layer)?;
        return Ok(vec![name]);
    }

    // Shape 3: a bare scripts/ directory; synthesize the skill around it.
    if src
        .file_name()
        .is_some_and(|n| n.eq_ignore_ascii_case("scripts"))
    {
        let skill_dir = src
            .parent()
            .ok_or_else(|| ToolError::Other("scripts directory has no parent".into()))?;
        let name = base_name(skill_dir)?;
        let staging = tempfile::tempdir().map_err(ToolError::from)?;
        let stage_skill = staging.path().join(&name);
        copy_dir(&src, &stage_skill.join("scripts"), &mut budget)?;
        ensure_default_skill_md(&stage_skill, &name)?;
        install_one_skill_dir(&dst_root, &stage_skill, &name, &mut budget)?;
        write_skill_source_meta(&dst_root.join(&name), &origin, &layer)?;
        return Ok(vec![name]);
    }

    // Shape 4: a directory of skill directories.
    let mut installed = Vec::new();
    for entry in std::fs::read_dir(&src).map_err(ToolError::from)? {
        let entry = entry.map_err(ToolError::from)?;
        let path = entry.path();
        if !path.is_dir() || !path.join("scripts").is_dir() {
            continue;
        }
        let name = base_name(&path)?;
        install_one_skill_dir(&dst_root, &path, &name, &mut budget)?;
        write_skill_source_meta(&dst_root.join(&name), &origin, &layer)?;
        installed.push(name);
    }
    if installed.is_empty() {
        return Err(ToolError::Other(format!(
            "no skills found under: {}",
            src.display()
        )));
    }
    installed.sort();
    Ok(installed)
}

fn install_from_skills_root(
    dst_root: &Path,
    skills_root: &Path,
    budget: &mut CopyBudget,
) -> Result<Vec<String>, ToolError> {
    let mut installed = Vec::new();
    for entry in std::fs::read_dir(skills_root).map_err(ToolError::from)? {
        let entry = entry.map_err(ToolError::from)?;
        let path = entry.path();
        let name = base_name(&path)?;
        if !path.is_dir() || is_ignored_dir(&name) || !path.join("scripts").is_dir() {
            continue;
        }
        install_one_skill_dir(dst_root, &path, &name, budget)?;
        installed.push(name);
    }
    if installed.is_empty() {
        return Err(ToolError::Other(format!(
            "no skills found under: {}",
            skills_root.display()
        )));
    }
    installed.sort();
    Ok(installed)
}

fn install_one_skill_dir(
    dst_root: &Path,
    src_skill_dir: &Path,
    name: &str,
    budget: &mut CopyBudget,
) -> Result<(), ToolError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ToolError::Other("empty skill name".into()));
    }
    let dst = dst_root.join(name);
    if dst.exists() {
        return Err(ToolError::Other(format!("skill already exists: {name}")));
    }
    copy_dir(src_skill_dir, &dst, budget)
}

/// Recursive copy: ignored directories and symlinks are skipped, each
/// file is charged against the budget before it is copied.
pub(crate) fn copy_dir(src: &Path, dst: &Path, budget: &mut CopyBudget) -> Result<(), ToolError> {
    std::fs::create_dir_all(dst).map_err(ToolError::from)?;
    for entry in std::fs::read_dir(src).map_err(ToolError::from)? {
        let entry = entry.map_err(ToolError::from)?;
        let name = entry.file_name();
        if is_ignored_dir(&name.to_string_lossy()) {
            continue;
        }
        let file_type = entry.file_type().map_err(ToolError::from)?;
        if file_type.is_symlink() {
            continue;
        }
        let s = entry.path();
        let d = dst.join(&name);
        if file_type.is_dir() {
            copy_dir(&s, &d, budget)?;
        } else {
            let size = entry.metadata().map_err(ToolError::from)?.len();
            budget.charge(size, &s.display().to_string())?;
            std::fs::copy(&s, &d).map_err(ToolError::from)?;
        }
    }
    Ok(())
}

/// Write a stub SKILL.md when the skill carries no documentation.
pub(crate) fn ensure_default_skill_md(skill_dir: &Path, name: &str) -> Result<(), ToolError> {
    let p = skill_dir.join("SKILL.md");
    if p.exists() {
        return Ok(());
    }
    let content = format!("---\nname: {name}\ndescription: Imported skill\n---\n");
    std::fs::write(p, content).map_err(ToolError::from)
}

#[derive(Serialize)]
struct SkillSourceMeta<'a> {
    origin: &'a str,
    layer: &'a str,
    installed_at: String,
}

fn write_skill_source_meta(skill_dir: &Path, origin: &str, layer: &str) -> Result<(), ToolError> {
    let origin = origin.trim();
    if origin.is_empty() {
        return Ok(());
    }
    let meta = SkillSourceMeta {
        origin,
        layer,
        installed_at: chrono::Utc::now().to_rfc3339(),
    };
    let body = serde_json::to_vec(&meta).map_err(|e| ToolError::Other(e.to_string()))?;
    std::fs::write(skill_dir.join(SOURCE_META_FILE), body).map_err(ToolError::from)
}

fn base_name(p: &Path) -> Result<String, ToolError> {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ToolError::Other(format!("no base name for {}", p.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn mk_src_skill(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("scripts")).unwrap();
        std::fs::write(dir.join("scripts/run.sh"), "#!/bin/sh\necho hi\n").unwrap();
        dir
    }

    #[test]
    fn test_install_single_skill_dir() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let skill = mk_src_skill(src_root.path(), "weather");

        let cfg = ExecConfig::default();
        let installed = install_skills_from_path(ws.path(), &skill, &cfg).unwrap();
        assert_eq!(installed, vec!["weather"]);
        assert!(ws.path().join("skills/weather/scripts/run.sh").is_file());
        // provenance sidecar written
        let meta = std::fs::read_to_string(
            ws.path().join("skills/weather").join(SOURCE_META_FILE),
        )
        .unwrap();
        assert!(meta.contains("\"layer\":\"local\""));
    }

    #[test]
    fn test_install_from_skills_root_shape() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let repo = src_root.path().join("repo");
        mk_src_skill(&repo.join("skills"), "alpha");
        mk_src_skill(&repo.join("skills"), "beta");
        std::fs::create_dir_all(repo.join("skills/.git")).unwrap();

        let cfg = ExecConfig::default();
        let installed = install_skills_from_path(ws.path(), &repo, &cfg).unwrap();
        assert_eq!(installed, vec!["alpha", "beta"]);
        assert!(!ws.path().join("skills/.git").exists());
    }

    #[test]
    fn test_install_bare_scripts_dir_synthesizes_skill() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let skill = mk_src_skill(src_root.path(), "backup");

        let cfg = ExecConfig::default();
        let installed =
            install_skills_from_path(ws.path(), &skill.join("scripts"), &cfg).unwrap();
        assert_eq!(installed, vec!["backup"]);
        assert!(ws.path().join("skills/backup/scripts/run.sh").is_file());
        assert!(ws.path().join("skills/backup/SKILL.md").is_file());
    }

    #[test]
    fn test_install_directory_of_skills() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let bundle = src_root.path().join("bundle");
        mk_src_skill(&bundle, "one");
        mk_src_skill(&bundle, "two");
        std::fs::create_dir_all(bundle.join("not-a-skill")).unwrap();

        let cfg = ExecConfig::default();
        let installed = install_skills_from_path(ws.path(), &bundle, &cfg).unwrap();
        assert_eq!(installed, vec!["one", "two"]);
    }

    #[test]
    fn test_existing_skill_is_refused() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let skill = mk_src_skill(src_root.path(), "weather");

        let cfg = ExecConfig::default();
        install_skills_from_path(ws.path(), &skill, &cfg).unwrap();
        let err = install_skills_from_path(ws.path(), &skill, &cfg).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_upstream_layer_from_config() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let skill = mk_src_skill(src_root.path(), "weather");

        let mut cfg = ExecConfig::default();
        cfg.install_layer = Some("upstream".into());
        install_skills_from_path(ws.path(), &skill, &cfg).unwrap();
        assert!(ws
            .path()
            .join("skills/_upstream/weather/scripts/run.sh")
            .is_file());
        assert!(!ws.path().join("skills/weather").exists());
    }

    #[test]
    fn test_symlinks_not_copied() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let skill = mk_src_skill(src_root.path(), "weather");
        #[cfg(unix)]
        std::os::unix::fs::symlink("/etc/passwd", skill.join("scripts/link.sh")).unwrap();

        let cfg = ExecConfig::default();
        install_skills_from_path(ws.path(), &skill, &cfg).unwrap();
        assert!(!ws.path().join("skills/weather/scripts/link.sh").exists());
    }

    #[test]
    fn test_per_file_cap_enforced() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let skill = mk_src_skill(src_root.path(), "big");
        std::fs::write(skill.join("scripts/huge.sh"), vec![b'x'; 4096]).unwrap();

        let mut cfg = ExecConfig::default();
        cfg.skills_max_file_bytes = 1024;
        let err = install_skills_from_path(ws.path(), &skill, &cfg).unwrap_err();
        assert!(matches!(err, ToolError::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_total_cap_enforced() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let bundle = src_root.path().join("bundle");
        for name in ["a", "b", "c"] {
            let s = mk_src_skill(&bundle, name);
            std::fs::write(s.join("scripts/payload.sh"), vec![b'x'; 900]).unwrap();
        }

        let mut cfg = ExecConfig::default();
        cfg.skills_max_total_bytes = 2000;
        let err = install_skills_from_path(ws.path(), &bundle, &cfg).unwrap_err();
        assert!(matches!(err, ToolError::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_no_skills_found() {
        let ws = tempdir().unwrap();
        let src_root = tempdir().unwrap();
        let empty = src_root.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        let cfg = ExecConfig::default();
        let err = install_skills_from_path(ws.path(), &empty, &cfg).unwrap_err();
        assert!(err.to_string().contains("no skills found"));
    }
}
