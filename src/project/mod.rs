//! Project detection — mapping a working directory to a stable identifier.
//!
//! Identifier forms, highest priority first:
//!
//! 1. `owner/repo` from a normalized git origin remote
//! 2. `local/<dir>` when a project marker file is present
//! 3. `placeholder/<dir>` for anything else that looks like a real directory
//!
//! Home and system directories detect as [`INVALID_PROJECT_ID`]; callers
//! refuse to initialize against those.

pub mod aliases;

use std::path::{Path, PathBuf};

/// Sentinel id for directories that must not own observations.
pub const INVALID_PROJECT_ID: &str = "__invalid__";

/// Marker files that promote a directory to a `local/*` project.
const PROJECT_MARKERS: [&str; 4] = ["package.json", "Cargo.toml", "go.mod", "pyproject.toml"];

#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    pub root_path: PathBuf,
    pub git_remote: Option<String>,
}

impl ProjectInfo {
    pub fn is_invalid(&self) -> bool {
        self.id == INVALID_PROJECT_ID
    }
}

/// Priority rank of an identifier form: git-remote > local > placeholder.
pub fn id_priority(id: &str) -> u8 {
    if id.starts_with("placeholder/") {
        1
    } else if id.starts_with("local/") {
        2
    } else {
        3
    }
}

/// Detect the project owning `cwd`.
pub fn detect_project(cwd: &Path) -> ProjectInfo {
    if let Some(git_root) = find_git_root(cwd) {
        let name = basename(&git_root);
        if let Some(remote_url) = read_origin_url(&git_root) {
            if let Some(id) = normalize_remote(&remote_url) {
                return ProjectInfo {
                    name: id.rsplit('/').next().unwrap_or(&name).to_string(),
                    id,
                    root_path: git_root,
                    git_remote: Some(remote_url),
                };
            }
        }
        // A git repo without a readable origin still beats a placeholder.
        return ProjectInfo {
            id: format!("local/{name}"),
            name,
            root_path: git_root,
            git_remote: None,
        };
    }

    if PROJECT_MARKERS.iter().any(|m| cwd.join(m).is_file()) {
        let name = basename(cwd);
        return ProjectInfo {
            id: format!("local/{name}"),
            name,
            root_path: cwd.to_path_buf(),
            git_remote: None,
        };
    }

    if is_system_path(cwd) {
        return ProjectInfo {
            id: INVALID_PROJECT_ID.to_string(),
            name: basename(cwd),
            root_path: cwd.to_path_buf(),
            git_remote: None,
        };
    }

    let name = basename(cwd);
    ProjectInfo {
        id: format!("placeholder/{name}"),
        name,
        root_path: cwd.to_path_buf(),
        git_remote: None,
    }
}

/// Normalize a git remote URL to `owner/repo`.
///
/// Handles `git@host:owner/repo.git`, `https://host/owner/repo.git`,
/// `ssh://git@host/owner/repo`, and deeper paths (last two segments win).
pub fn normalize_remote(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    // Strip scheme, then userinfo and host.
    let without_scheme = match url.split_once("://") {
        Some((_, rest)) => {
            let rest = rest.split_once('@').map(|(_, r)| r).unwrap_or(rest);
            rest.split_once('/').map(|(_, path)| path).unwrap_or("")
        }
        // scp-like syntax: git@host:owner/repo.git
        None => match url.split_once(':') {
            Some((_, path)) => path,
            None => url,
        },
    };

    let path = without_scheme
        .trim_matches('/')
        .trim_end_matches(".git")
        .trim_matches('/');
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    let owner = segments[segments.len() - 2];
    let repo = segments[segments.len() - 1];
    Some(format!("{owner}/{repo}"))
}

/// Walk up from `start` to the first directory containing `.git`.
fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".git").is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Read the origin remote URL for a git root.
///
/// Prefers `git config` (with `safe.directory=*` so differing file ownership
/// does not fail the lookup); falls back to parsing `.git/config` directly
/// when git itself cannot run.
fn read_origin_url(git_root: &Path) -> Option<String> {
    let output = std::process::Command::new("git")
        .arg("-c")
        .arg("safe.directory=*")
        .arg("config")
        .arg("--get")
        .arg("remote.origin.url")
        .current_dir(git_root)
        .output();

    if let Ok(out) = output {
        if out.status.success() {
            let url = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if !url.is_empty() {
                return Some(url);
            }
        }
    }

    parse_git_config(&git_root.join(".git").join("config"))
}

/// Minimal `.git/config` parse: find `url = …` inside `[remote "origin"]`.
fn parse_git_config(config_path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(config_path).ok()?;
    let mut in_origin = false;
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_origin = line.replace(' ', "") == "[remote\"origin\"]";
            continue;
        }
        if in_origin {
            if let Some(value) = line.strip_prefix("url") {
                let url = value.trim_start().strip_prefix('=')?.trim();
                if !url.is_empty() {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}

/// Home, filesystem root, and system-level paths must not own observations.
fn is_system_path(path: &Path) -> bool {
    if path.parent().is_none() {
        return true;
    }
    if let Some(home) = dirs::home_dir() {
        if path == home {
            return true;
        }
    }
    const SYSTEM_PREFIXES: [&str; 4] = ["/usr", "/etc", "/bin", "/sbin"];
    let as_str = path.to_string_lossy();
    SYSTEM_PREFIXES
        .iter()
        .any(|p| as_str.as_ref() == *p || as_str.starts_with(&format!("{p}/")))
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalizes_common_remote_forms() {
        assert_eq!(
            normalize_remote("git@github.com:acme/app.git").as_deref(),
            Some("acme/app")
        );
        assert_eq!(
            normalize_remote("https://github.com/acme/app.git").as_deref(),
            Some("acme/app")
        );
        assert_eq!(
            normalize_remote("https://github.com/acme/app").as_deref(),
            Some("acme/app")
        );
        assert_eq!(
            normalize_remote("ssh://git@gitlab.example.com/group/sub/app.git").as_deref(),
            Some("sub/app")
        );
        assert_eq!(normalize_remote(""), None);
        assert_eq!(normalize_remote("not-a-remote"), None);
    }

    #[test]
    fn marker_file_makes_local_project() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Cargo.toml"), "[package]").unwrap();

        let info = detect_project(tmp.path());
        assert!(info.id.starts_with("local/"));
        assert_eq!(info.root_path, tmp.path());
        assert!(info.git_remote.is_none());
    }

    #[test]
    fn bare_directory_is_placeholder() {
        let tmp = TempDir::new().unwrap();
        let info = detect_project(tmp.path());
        assert!(info.id.starts_with("placeholder/"));
    }

    #[test]
    fn git_root_with_origin_wins() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(
            git_dir.join("config"),
            "[core]\n\trepositoryformatversion = 0\n[remote \"origin\"]\n\turl = git@github.com:acme/app.git\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n",
        )
        .unwrap();

        // Detection from a nested directory walks up to the git root.
        let nested = tmp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let info = detect_project(&nested);
        assert_eq!(info.id, "acme/app");
        assert_eq!(info.root_path, tmp.path());
        assert_eq!(info.git_remote.as_deref(), Some("git@github.com:acme/app.git"));
    }

    #[test]
    fn git_root_without_origin_is_local() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();

        let info = detect_project(tmp.path());
        assert!(info.id.starts_with("local/"));
    }

    #[test]
    fn home_and_system_paths_are_invalid() {
        if let Some(home) = dirs::home_dir() {
            assert!(detect_project(&home).is_invalid());
        }
        assert!(detect_project(Path::new("/")).is_invalid());
        assert!(detect_project(Path::new("/usr/lib")).is_invalid());
        assert!(detect_project(Path::new("/etc")).is_invalid());
    }

    #[test]
    fn priority_ranks_forms() {
        assert!(id_priority("acme/app") > id_priority("local/app"));
        assert!(id_priority("local/app") > id_priority("placeholder/app"));
    }
}
