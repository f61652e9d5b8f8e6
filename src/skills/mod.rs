//! Skill discovery over the three-layer workspace layout.
//!
//! Skills live under `skills/<name>/` with an optional `_overrides/`
//! layer above and `_upstream/` layer below. Discovery unions skill
//! names across all three layers; metadata comes from the highest
//! layer that has the skill, scripts are the union of every layer.

pub mod archive;
pub mod doctor;
pub mod git;
pub mod install;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Discovered skill with merged metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Rendered documentation fed to the conversation prompt.
    pub docs: String,
    /// Executable script names, unioned across layers, sorted.
    pub scripts: Vec<String>,
    /// Where the metadata came from, plus layer and install origin.
    pub source: String,
}

/// One runnable `skill/script` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SkillScript {
    pub skill: String,
    pub script: String,
}

/// `(overrides, local, upstream)` roots for a workspace.
pub fn skill_roots(workspace: &Path) -> (PathBuf, PathBuf, PathBuf) {
    let local = workspace.join("skills");
    let overrides = local.join("_overrides");
    let upstream = local.join("_upstream");
    (overrides, local, upstream)
}

/// Layer directories for one skill, highest precedence first.
pub fn skill_layer_dirs(workspace: &Path, skill: &str) -> [PathBuf; 3] {
    let (overrides, local, upstream) = skill_roots(workspace);
    [
        overrides.join(skill),
        local.join(skill),
        upstream.join(skill),
    ]
}

/// Resolve a per-skill resource across the layers, highest first. The
/// probe is called with each layer's skill directory; the first `Some`
/// wins. One resolver serves scripts, metadata, and provenance alike.
pub fn resolve_in_layers<T>(
    workspace: &Path,
    skill: &str,
    mut probe: impl FnMut(&Path) -> Option<T>,
) -> Option<T> {
    skill_layer_dirs(workspace, skill)
        .iter()
        .find_map(|dir| probe(dir))
}

/// Enumerate every runnable `skill/script` pair, sorted.
pub fn discover_skill_scripts(workspace: &Path) -> Vec<SkillScript> {
    let (overrides, local, upstream) = skill_roots(workspace);
    let mut out = Vec::new();
    for name in union_skill_names(&[overrides.as_path(), local.as_path(), upstream.as_path()]) {
        let mut scripts = BTreeSet::new();
        for root in [&upstream, &local, &overrides] {
            scripts.extend(scripts_in_dir(&root.join(&name).join("scripts")));
        }
        for script in scripts {
            out.push(SkillScript {
                skill: name.clone(),
                script,
            });
        }
    }
    out.sort();
    out
}

/// Enumerate skills with metadata from the highest layer each lives in.
pub fn discover_skills(workspace: &Path) -> Vec<Skill> {
    let (overrides, local, upstream) = skill_roots(workspace);
    let mut skills = Vec::new();
    for name in union_skill_names(&[overrides.as_path(), local.as_path(), upstream.as_path()]) {
        let [override_dir, local_dir, upstream_dir] = skill_layer_dirs(workspace, &name);

        let (layer, primary) = if override_dir.is_dir() {
            ("override", &override_dir)
        } else if local_dir.is_dir() {
            ("local", &local_dir)
        } else if upstream_dir.is_dir() {
            ("upstream", &upstream_dir)
        } else {
            continue;
        };

        let mut info = load_skill_info(primary, &name);

        let origin = resolve_in_layers(workspace, &name, read_skill_origin);
        let mut parts = Vec::new();
        if !info.source.trim().is_empty() {
            parts.push(info.source.trim().to_string());
        }
        parts.push(format!("layer={layer}"));
        if let Some(origin) = origin {
            parts.push(format!("origin={origin}"));
        }
        info.source = parts.join("; ");

        let mut scripts = BTreeSet::new();
        for dir in [&upstream_dir, &local_dir, &override_dir] {
            scripts.extend(scripts_in_dir(&dir.join("scripts")));
        }
        info.scripts = scripts.into_iter().collect();
        skills.push(info);
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

fn union_skill_names(roots: &[&Path]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for root in roots {
        names.extend(list_skill_dirs(root));
    }
    names
}

/// Immediate subdirectories, excluding hidden and layer dirs.
fn list_skill_dirs(root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| !n.starts_with('.') && !n.starts_with('_'))
        .collect();
    names.sort();
    names
}

fn scripts_in_dir(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut scripts: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| is_executable_script(n))
        .collect();
    scripts.sort();
    scripts
}

/// Script extensions the runner knows how to launch.
pub fn is_executable_script(name: &str) -> bool {
    let l = name.to_lowercase();
    [".sh", ".ps1", ".bat", ".cmd", ".exe"]
        .iter()
        .any(|ext| l.ends_with(ext))
}

#[derive(Deserialize)]
struct SkillOriginMeta {
    #[serde(default)]
    origin: String,
}

/// Install provenance sidecar, written by the installer.
pub(crate) const SOURCE_META_FILE: &str = ".skill_source.json";

fn read_skill_origin(skill_dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(skill_dir.join(SOURCE_META_FILE)).ok()?;
    let meta: SkillOriginMeta = serde_json::from_str(&raw).ok()?;
    let origin = meta.origin.trim().to_string();
    if origin.is_empty() {
        None
    } else {
        Some(origin)
    }
}

#[derive(Deserialize)]
struct JsonSkillManifest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: String,
}

/// Load metadata for one skill directory. Precedence: SKILL.md, then
/// JSON manifests, then flat YAML, then package.json, then a stub.
fn load_skill_info(skill_dir: &Path, fallback_name: &str) -> Skill {
    let mut s = Skill {
        name: fallback_name.to_string(),
        display_name: fallback_name.to_string(),
        source: "directory".to_string(),
        ..Default::default()
    };

    for file in ["SKILL.md", "skill.md"] {
        if let Ok(raw) = std::fs::read_to_string(skill_dir.join(file)) {
            s.docs = parse_skill_md(&raw);
            s.source = file.to_string();
            let (name, desc) = parse_skill_doc_header(&s.docs);
            s.display_name = if name.is_empty() {
                fallback_name.to_string()
            } else {
                name
            };
            s.description = desc;
            return s;
        }
    }

    for file in ["skill.json", "manifest.json", "skill.manifest.json"] {
        let Ok(raw) = std::fs::read_to_string(skill_dir.join(file)) else {
            continue;
        };
        let Ok(m) = serde_json::from_str::<JsonSkillManifest>(&raw) else {
            continue;
        };
        if !m.name.trim().is_empty() {
            s.name = m.name.trim().to_string();
        }
        s.display_name = if m.display_name.trim().is_empty() {
            s.name.clone()
        } else {
            m.display_name.trim().to_string()
        };
        s.description = m.description.trim().to_string();
        s.source = file.to_string();
        s.docs = format_skill_doc(&s.display_name, &s.description);
        return s;
    }

    for file in ["skill.yaml", "skill.yml", "manifest.yaml", "manifest.yml"] {
        let Ok(raw) = std::fs::read_to_string(skill_dir.join(file)) else {
            continue;
        };
        let m = parse_flat_yaml(&raw);
        if let Some(v) = m.get("name").filter(|v| !v.is_empty()) {
            s.name = v.clone();
        }
        s.display_name = m
            .get("display_name")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| s.name.clone());
        s.description = m.get("description").cloned().unwrap_or_default();
        s.source = file.to_string();
        s.docs = format_skill_doc(&s.display_name, &s.description);
        return s;
    }

    if let Ok(raw) = std::fs::read_to_string(skill_dir.join("package.json")) {
        #[derive(Deserialize)]
        struct Pkg {
            #[serde(default)]
            name: String,
            #[serde(default)]
            description: String,
        }
        if let Ok(pkg) = serde_json::from_str::<Pkg>(&raw) {
            if !pkg.name.trim().is_empty() {
                s.name = pkg.name.trim().to_string();
                s.display_name = s.name.clone();
            }
            s.description = pkg.description.trim().to_string();
            s.source = "package.json".to_string();
            s.docs = format_skill_doc(&s.display_name, &s.description);
            return s;
        }
    }

    s.docs = format_skill_doc(&s.display_name, &s.description);
    s
}

/// Render a SKILL.md: frontmatter `name:`/`description:` become header
/// lines, the body follows verbatim.
pub fn parse_skill_md(content: &str) -> String {
    let mut frontmatter = Vec::new();
    let mut body = Vec::new();
    let mut in_frontmatter = false;
    let mut frontmatter_done = false;
    for line in content.replace("\r\n", "\n").replace('\r', "\n").lines() {
        if line.trim() == "---" && !frontmatter_done {
            if !in_frontmatter {
                in_frontmatter = true;
            } else {
                in_frontmatter = false;
                frontmatter_done = true;
            }
            continue;
        }
        if in_frontmatter {
            frontmatter.push(line.to_string());
        } else {
            body.push(line.to_string());
        }
    }

    let mut name = String::new();
    let mut description = String::new();
    for l in &frontmatter {
        let l = l.trim();
        if let Some(v) = l.strip_prefix("name:") {
            name = v.trim().to_string();
        } else if let Some(v) = l.strip_prefix("description:") {
            description = v.trim().to_string();
        }
    }

    let mut out = format_skill_doc(&name, &description);
    let body = body.join("\n");
    let body = body.trim();
    if !body.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(body);
    }
    out
}

/// Extract `name:`/`description:` header lines from rendered docs.
pub fn parse_skill_doc_header(doc: &str) -> (String, String) {
    let mut name = String::new();
    let mut desc = String::new();
    for line in doc.lines() {
        let l = line.trim();
        let low = l.to_lowercase();
        if name.is_empty() && low.starts_with("name:") {
            name = l["name:".len()..].trim().to_string();
        } else if desc.is_empty() && low.starts_with("description:") {
            desc = l["description:".len()..].trim().to_string();
        }
    }
    (name, desc)
}

/// Minimal flat `key: value` YAML subset used by skill manifests.
pub(crate) fn parse_flat_yaml(content: &str) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();
    for line in content.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let l = line.trim();
        if l.is_empty() || l.starts_with('#') || l.starts_with("---") {
            continue;
        }
        let Some((k, v)) = l.split_once(':') else {
            continue;
        };
        let k = k.trim().to_lowercase();
        let v = v.trim().trim_matches('"').trim_matches('\'').to_string();
        if !k.is_empty() {
            out.insert(k, v);
        }
    }
    out
}

fn format_skill_doc(name: &str, desc: &str) -> String {
    let mut b = String::new();
    if !name.trim().is_empty() {
        b.push_str(&format!("Name: {}\n", name.trim()));
    }
    if !desc.trim().is_empty() {
        b.push_str(&format!("Description: {}\n", desc.trim()));
    }
    b.trim_end_matches('\n').to_string()
}
