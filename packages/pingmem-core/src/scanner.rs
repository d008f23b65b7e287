//! ProjectScanner: walk a directory, hash every in-scope file, and
//! compute a deterministic `ProjectManifest`.

use crate::error::{CoreError, Result};
use crate::git::{SafeGit, SafeGitConfig};
use crate::hashing::{sha256_hex, sha256_joined};
use crate::model::{FileHashEntry, ProjectManifest, MANIFEST_SCHEMA_VERSION};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Directories skipped by default, plus their cross-ecosystem analogs.
pub fn default_ignore_dirs() -> HashSet<&'static str> {
    [
        ".git",
        "node_modules",
        "dist",
        "build",
        ".next",
        ".cache",
        "venv",
        ".venv",
        "__pycache__",
        ".ping-mem",
        "target",
        ".tox",
        ".mypy_cache",
        ".pytest_cache",
        "vendor",
        "bin",
        "obj",
    ]
    .into_iter()
    .collect()
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub ignore_dirs: HashSet<String>,
    /// When set, only files whose extension is in this set are scanned.
    pub extension_allow_list: Option<HashSet<String>>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: default_ignore_dirs().into_iter().map(String::from).collect(),
            extension_allow_list: None,
        }
    }
}

pub struct ProjectScanner {
    config: ScannerConfig,
}

impl ProjectScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Walks `root_path`, hashes every in-scope file, and returns the
    /// resulting manifest along with whether it differs from
    /// `previous_manifest`.
    pub fn scan(
        &self,
        root_path: &Path,
        previous_manifest: Option<&ProjectManifest>,
    ) -> Result<(ProjectManifest, bool)> {
        let root_path = root_path
            .canonicalize()
            .map_err(|e| CoreError::io(root_path.display().to_string(), e))?;

        let mut entries = Vec::new();
        self.walk_dir(&root_path, &root_path, &mut entries)?;
        entries.sort_by(|a: &FileHashEntry, b: &FileHashEntry| a.rel_path.cmp(&b.rel_path));

        let tree_hash = compute_tree_hash(&entries);
        let project_id = self.compute_project_id(&root_path);

        let manifest = ProjectManifest {
            project_id,
            root_path: root_path.display().to_string(),
            tree_hash: tree_hash.clone(),
            files: entries,
            generated_at: Utc::now(),
            schema_version: MANIFEST_SCHEMA_VERSION,
        };

        let has_changes = match previous_manifest {
            None => true,
            Some(prev) => prev.tree_hash != tree_hash,
        };

        Ok((manifest, has_changes))
    }

    fn walk_dir(&self, root: &Path, dir: &Path, out: &mut Vec<FileHashEntry>) -> Result<()> {
        let mut children: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| CoreError::io(dir.display().to_string(), e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        children.sort();

        for path in children {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            if path.is_dir() {
                if self.config.ignore_dirs.contains(&name) {
                    continue;
                }
                self.walk_dir(root, &path, out)?;
                continue;
            }

            if name.starts_with('.') && name != ".env" && self.config.ignore_dirs.contains(&name) {
                continue;
            }

            if let Some(allow) = &self.config.extension_allow_list {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if !allow.contains(ext) {
                    continue;
                }
            }

            let bytes = std::fs::read(&path).map_err(|e| CoreError::io(path.display().to_string(), e))?;
            let sha256 = sha256_hex(&bytes);
            let rel_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");

            out.push(FileHashEntry {
                rel_path,
                sha256,
                bytes: bytes.len() as u64,
            });
        }

        Ok(())
    }

    /// Stable across renames iff a git remote exists.
    fn compute_project_id(&self, root_path: &Path) -> String {
        let git = SafeGit::new(root_path, SafeGitConfig::default());

        if let Some(git_root) = git.get_git_root() {
            if let Some(remote_url) = git.get_remote_origin_url() {
                let posix_root = git_root.to_string_lossy().replace('\\', "/");
                let key = format!("{posix_root}::{remote_url}");
                return sha256_hex(key.as_bytes());
            }
        }

        let posix_root = root_path.to_string_lossy().replace('\\', "/");
        sha256_hex(posix_root.as_bytes())
    }
}

/// `SHA256(⟂ over sorted files of relPath ‖ "\n" ‖ sha256 ‖ "\n")`.
fn compute_tree_hash(entries: &[FileHashEntry]) -> String {
    let mut parts = Vec::with_capacity(entries.len() * 2);
    for e in entries {
        parts.push(e.rel_path.as_str());
        parts.push(e.sha256.as_str());
    }
    sha256_joined(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_two_file_project_produces_expected_hashes() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.ts", "const x = 1;\n");
        write_file(dir.path(), "b.py", "# c\nprint(1)\n");

        let scanner = ProjectScanner::new(ScannerConfig::default());
        let (manifest, has_changes) = scanner.scan(dir.path(), None).unwrap();

        assert!(has_changes);
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].rel_path, "a.ts");
        assert_eq!(manifest.files[1].rel_path, "b.py");
        assert_eq!(manifest.files[0].sha256, sha256_hex(b"const x = 1;\n"));
        assert_eq!(manifest.files[1].sha256, sha256_hex(b"# c\nprint(1)\n"));
        assert_eq!(manifest.files[0].bytes, 13);
        assert_eq!(manifest.files[1].bytes, 12);

        let expected_tree_hash = sha256_joined([
            "a.ts",
            sha256_hex(b"const x = 1;\n").as_str(),
            "b.py",
            sha256_hex(b"# c\nprint(1)\n").as_str(),
        ]);
        assert_eq!(manifest.tree_hash, expected_tree_hash);
    }

    #[test]
    fn scan_is_deterministic_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.ts", "const x = 1;\n");

        let scanner = ProjectScanner::new(ScannerConfig::default());
        let (m1, _) = scanner.scan(dir.path(), None).unwrap();
        let (m2, _) = scanner.scan(dir.path(), None).unwrap();

        assert_eq!(m1.tree_hash, m2.tree_hash);
        assert_eq!(m1.project_id, m2.project_id);
    }

    #[test]
    fn scan_detects_content_change() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.ts", "const x = 1;\n");

        let scanner = ProjectScanner::new(ScannerConfig::default());
        let (m1, _) = scanner.scan(dir.path(), None).unwrap();

        write_file(dir.path(), "a.ts", "const x = 2;\n");
        let (m2, has_changes) = scanner.scan(dir.path(), Some(&m1)).unwrap();

        assert!(has_changes);
        assert_ne!(m1.tree_hash, m2.tree_hash);
    }

    #[test]
    fn scan_no_changes_when_tree_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.ts", "const x = 1;\n");

        let scanner = ProjectScanner::new(ScannerConfig::default());
        let (m1, _) = scanner.scan(dir.path(), None).unwrap();
        let (_, has_changes) = scanner.scan(dir.path(), Some(&m1)).unwrap();

        assert!(!has_changes);
    }

    #[test]
    fn scan_skips_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/main.rs", "fn main() {}\n");
        write_file(dir.path(), "node_modules/pkg/index.js", "module.exports = {};\n");

        let scanner = ProjectScanner::new(ScannerConfig::default());
        let (manifest, _) = scanner.scan(dir.path(), None).unwrap();

        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].rel_path, "src/main.rs");
    }

    #[test]
    fn scan_respects_extension_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.ts", "x");
        write_file(dir.path(), "b.md", "y");

        let mut config = ScannerConfig::default();
        config.extension_allow_list = Some(["ts".to_string()].into_iter().collect());

        let scanner = ProjectScanner::new(config);
        let (manifest, _) = scanner.scan(dir.path(), None).unwrap();

        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].rel_path, "a.ts");
    }

    #[test]
    fn project_id_stable_without_git_remote() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.ts", "x");

        let scanner = ProjectScanner::new(ScannerConfig::default());
        let (m1, _) = scanner.scan(dir.path(), None).unwrap();
        let (m2, _) = scanner.scan(dir.path(), None).unwrap();

        assert_eq!(m1.project_id, m2.project_id);
    }
}
