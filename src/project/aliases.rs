//! Alias registry — grouping identifier variants of one physical project.
//!
//! The same project is observed under up to three identifier forms depending
//! on which editor detected it first and whether git metadata was readable
//! at the time. The registry proves which ids refer to the same project so
//! search never loses observations written before canonicalization.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MemorixError, Result};
use crate::fsio;
use crate::project::{id_priority, ProjectInfo};

/// Registry format version. Unknown versions are rejected without touching
/// the file.
const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasGroup {
    /// Highest-priority id in the group.
    pub canonical: String,
    /// Every id known for this project, canonical included.
    pub aliases: Vec<String>,
    /// Normalized absolute root paths this project was seen at.
    #[serde(default)]
    pub root_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_remote: Option<String>,
}

impl AliasGroup {
    fn recompute_canonical(&mut self) {
        if let Some(best) = self
            .aliases
            .iter()
            .max_by_key(|id| id_priority(id))
            .cloned()
        {
            self.canonical = best;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    groups: Vec<AliasGroup>,
}

#[derive(Debug, Default)]
pub struct AliasRegistry {
    groups: Vec<AliasGroup>,
}

impl AliasRegistry {
    /// Load `.project-aliases.json`. Missing file is an empty registry; an
    /// unknown version number is rejected without damaging the file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(MemorixError::io("read", path, e)),
        };

        let file: RegistryFile =
            serde_json::from_str(&contents).map_err(|source| MemorixError::Integrity {
                path: path.to_path_buf(),
                source,
            })?;

        if file.version != REGISTRY_VERSION {
            return Err(MemorixError::Conflict(format!(
                "unsupported alias registry version {} (expected {REGISTRY_VERSION})",
                file.version
            )));
        }

        Ok(Self {
            groups: file.groups,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = RegistryFile {
            version: REGISTRY_VERSION,
            groups: self.groups.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).expect("registry serializes");
        fsio::atomic_write(path, &json)
    }

    pub fn groups(&self) -> &[AliasGroup] {
        &self.groups
    }

    /// Register a detection. Finds an existing group by id, normalized root
    /// path, or git remote; unions the detection into it and recomputes the
    /// canonical member. Creates a fresh group otherwise. Returns the
    /// canonical id.
    pub fn register(&mut self, info: &ProjectInfo) -> String {
        let root = normalize_root_path(&info.root_path.to_string_lossy());

        let found = self.groups.iter_mut().find(|g| {
            g.aliases.iter().any(|a| a == &info.id)
                || g.root_paths.iter().any(|p| p == &root)
                || (g.git_remote.is_some() && g.git_remote == info.git_remote)
        });

        match found {
            Some(group) => {
                if !group.aliases.contains(&info.id) {
                    group.aliases.push(info.id.clone());
                }
                if !group.root_paths.contains(&root) {
                    group.root_paths.push(root);
                }
                if group.git_remote.is_none() {
                    group.git_remote = info.git_remote.clone();
                }
                group.recompute_canonical();
                group.canonical.clone()
            }
            None => {
                let group = AliasGroup {
                    canonical: info.id.clone(),
                    aliases: vec![info.id.clone()],
                    root_paths: vec![root],
                    git_remote: info.git_remote.clone(),
                };
                self.groups.push(group);
                info.id.clone()
            }
        }
    }

    /// Every id in the group containing `id`, or just `[id]` when unknown.
    pub fn resolve_aliases(&self, id: &str) -> Vec<String> {
        self.groups
            .iter()
            .find(|g| g.aliases.iter().any(|a| a == id))
            .map(|g| g.aliases.clone())
            .unwrap_or_else(|| vec![id.to_string()])
    }

    /// Canonical id for `id`, or `id` itself when no group contains it.
    pub fn canonical_for(&self, id: &str) -> String {
        self.groups
            .iter()
            .find(|g| g.aliases.iter().any(|a| a == id))
            .map(|g| g.canonical.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Merge groups (and loose ids) whose members differ only in prefix.
    ///
    /// `placeholder/foo`, `local/foo`, and `acme/foo` all describe the same
    /// basename `foo`; one editor may have written observations before
    /// another learned the git remote. Extra ids come from observed
    /// project ids that are in no group yet.
    pub fn auto_merge_by_basename(&mut self, observed_ids: &[String]) -> bool {
        let mut changed = false;

        // Adopt loose observed ids into singleton groups first.
        for id in observed_ids {
            if id == crate::project::INVALID_PROJECT_ID {
                continue;
            }
            let known = self.groups.iter().any(|g| g.aliases.iter().any(|a| a == id));
            if !known {
                self.groups.push(AliasGroup {
                    canonical: id.clone(),
                    aliases: vec![id.clone()],
                    root_paths: vec![],
                    git_remote: None,
                });
                changed = true;
            }
        }

        // Union groups sharing a member basename.
        let mut i = 0;
        while i < self.groups.len() {
            let mut j = i + 1;
            while j < self.groups.len() {
                let share = {
                    let basenames_i: HashSet<&str> = self.groups[i]
                        .aliases
                        .iter()
                        .filter_map(|a| a.rsplit('/').next())
                        .collect();
                    self.groups[j]
                        .aliases
                        .iter()
                        .filter_map(|a| a.rsplit('/').next())
                        .any(|b| basenames_i.contains(b))
                };
                if share {
                    let merged = self.groups.remove(j);
                    let target = &mut self.groups[i];
                    for alias in merged.aliases {
                        if !target.aliases.contains(&alias) {
                            target.aliases.push(alias);
                        }
                    }
                    for path in merged.root_paths {
                        if !target.root_paths.contains(&path) {
                            target.root_paths.push(path);
                        }
                    }
                    if target.git_remote.is_none() {
                        target.git_remote = merged.git_remote;
                    }
                    target.recompute_canonical();
                    changed = true;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }

        changed
    }
}

/// Forward slashes, no trailing slash, lowercased on case-insensitive
/// filesystems (macOS and Windows).
pub fn normalize_root_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let normalized = normalized.trim_end_matches('/').to_string();
    if cfg!(any(target_os = "macos", target_os = "windows")) {
        normalized.to_lowercase()
    } else {
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn info(id: &str, root: &str, remote: Option<&str>) -> ProjectInfo {
        ProjectInfo {
            id: id.to_string(),
            name: id.rsplit('/').next().unwrap_or(id).to_string(),
            root_path: PathBuf::from(root),
            git_remote: remote.map(String::from),
        }
    }

    #[test]
    fn register_creates_then_unions() {
        let mut registry = AliasRegistry::default();

        let canonical = registry.register(&info("placeholder/app", "/work/app", None));
        assert_eq!(canonical, "placeholder/app");

        // Same root path, better id form: union into the same group.
        let canonical = registry.register(&info(
            "acme/app",
            "/work/app",
            Some("git@github.com:acme/app.git"),
        ));
        assert_eq!(canonical, "acme/app");
        assert_eq!(registry.groups().len(), 1);

        let aliases = registry.resolve_aliases("placeholder/app");
        assert!(aliases.contains(&"acme/app".to_string()));
        assert!(aliases.contains(&"placeholder/app".to_string()));
    }

    #[test]
    fn register_finds_group_by_git_remote() {
        let mut registry = AliasRegistry::default();
        registry.register(&info(
            "acme/app",
            "/home/a/app",
            Some("git@github.com:acme/app.git"),
        ));
        // Different checkout of the same remote.
        registry.register(&info(
            "acme/app",
            "/home/b/src/app",
            Some("git@github.com:acme/app.git"),
        ));

        assert_eq!(registry.groups().len(), 1);
        assert_eq!(registry.groups()[0].root_paths.len(), 2);
    }

    #[test]
    fn resolve_unknown_id_returns_itself() {
        let registry = AliasRegistry::default();
        assert_eq!(registry.resolve_aliases("local/solo"), vec!["local/solo"]);
    }

    #[test]
    fn auto_merge_unifies_prefix_variants() {
        let mut registry = AliasRegistry::default();
        registry.register(&info("local/app", "/work/app", None));

        let observed = vec!["placeholder/app".to_string(), "acme/app".to_string()];
        let changed = registry.auto_merge_by_basename(&observed);

        assert!(changed);
        assert_eq!(registry.groups().len(), 1);
        assert_eq!(registry.canonical_for("placeholder/app"), "acme/app");
        assert_eq!(registry.resolve_aliases("acme/app").len(), 3);
    }

    #[test]
    fn save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".project-aliases.json");

        let mut registry = AliasRegistry::default();
        registry.register(&info(
            "acme/app",
            "/work/app",
            Some("git@github.com:acme/app.git"),
        ));
        registry.save(&path).unwrap();

        let loaded = AliasRegistry::load(&path).unwrap();
        assert_eq!(loaded.groups().len(), 1);
        assert_eq!(loaded.groups()[0].canonical, "acme/app");
    }

    #[test]
    fn unknown_version_is_rejected_without_damage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".project-aliases.json");
        std::fs::write(&path, r#"{"version":99,"groups":[]}"#).unwrap();

        assert!(AliasRegistry::load(&path).is_err());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"version":99,"groups":[]}"#
        );
    }

    #[test]
    fn normalize_root_path_strips_trailing_slash() {
        assert_eq!(normalize_root_path("/work/app/"), "/work/app");
        assert_eq!(normalize_root_path("C:\\work\\app"), "C:/work/app");
    }
}
