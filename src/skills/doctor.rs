//! Health checks over installed skills.

use std::path::Path;

use crate::config::ExecConfig;
use crate::skills::{discover_skills, resolve_in_layers};

/// Severity of one finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    Warn,
    Error,
}

/// One finding about one skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillIssue {
    pub skill: String,
    pub level: IssueLevel,
    pub message: String,
}

/// Inspect every discovered skill and report problems: missing
/// scripts, missing metadata, scripts that cannot run on this OS, and
/// scripts over the per-file cap.
pub fn diagnose_skills(workspace: &Path, cfg: &ExecConfig) -> Vec<SkillIssue> {
    let mut issues = Vec::new();
    if !cfg.skills_enabled {
        issues.push(SkillIssue {
            skill: String::new(),
            level: IssueLevel::Warn,
            message: "skill execution is disabled".into(),
        });
    }
    for s in discover_skills(workspace) {
        if s.scripts.is_empty() {
            issues.push(SkillIssue {
                skill: s.name.clone(),
                level: IssueLevel::Warn,
                message: "no executable scripts under scripts/".into(),
            });
        }
        if s.docs.trim().is_empty() {
            issues.push(SkillIssue {
                skill: s.name.clone(),
                level: IssueLevel::Warn,
                message: "no metadata found (SKILL.md/skill.json/skill.yaml)".into(),
            });
        }
        for script in &s.scripts {
            let Some(path) = find_script(workspace, &s.name, script) else {
                issues.push(SkillIssue {
                    skill: s.name.clone(),
                    level: IssueLevel::Error,
                    message: format!("missing script file: {script}"),
                });
                continue;
            };
            if !script_supported_on_this_os(script) {
                issues.push(SkillIssue {
                    skill: s.name.clone(),
                    level: IssueLevel::Warn,
                    message: format!("script may not run on this OS: {script}"),
                });
            }
            if let Ok(meta) = std::fs::metadata(&path) {
                if cfg.skills_max_file_bytes > 0 && meta.len() > cfg.skills_max_file_bytes {
                    issues.push(SkillIssue {
                        skill: s.name.clone(),
                        level: IssueLevel::Warn,
                        message: format!(
                            "script size {} exceeds per-file limit {}: {script}",
                            meta.len(),
                            cfg.skills_max_file_bytes
                        ),
                    });
                }
            }
        }
    }
    issues
}

fn find_script(workspace: &Path, skill: &str, script: &str) -> Option<std::path::PathBuf> {
    resolve_in_layers(workspace, skill, |dir| {
        let p = dir.join("scripts").join(script);
        p.is_file().then_some(p)
    })
}

fn script_supported_on_this_os(script: &str) -> bool {
    let l = script.to_lowercase();
    if cfg!(windows) {
        [".ps1", ".cmd", ".bat", ".exe"].iter().any(|e| l.ends_with(e))
    } else {
        [".sh", ".exe"].iter().any(|e| l.ends_with(e))
    }
}
