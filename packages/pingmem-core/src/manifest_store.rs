//! ManifestStore: persist/load the last manifest for a project
//! directory at `<rootPath>/.ping-mem/manifest.json`.

use crate::error::{CoreError, Result};
use crate::model::{ProjectManifest, MANIFEST_SCHEMA_VERSION};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_DIR: &str = ".ping-mem";
const MANIFEST_FILE: &str = "manifest.json";

pub struct ManifestStore;

impl ManifestStore {
    pub fn manifest_path(root_path: &Path) -> PathBuf {
        root_path.join(MANIFEST_DIR).join(MANIFEST_FILE)
    }

    /// Returns `None` if the manifest is missing or its schema version
    /// does not match `MANIFEST_SCHEMA_VERSION`.
    pub fn load(root_path: &Path) -> Result<Option<ProjectManifest>> {
        let path = Self::manifest_path(root_path);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::io(path.display().to_string(), e)),
        };

        let manifest: ProjectManifest = match serde_json::from_slice(&bytes) {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };

        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Ok(None);
        }

        Ok(Some(manifest))
    }

    /// Atomic write: write to a temp file in the same directory, then
    /// rename over the destination.
    pub fn save(root_path: &Path, manifest: &ProjectManifest) -> Result<()> {
        let dir = root_path.join(MANIFEST_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(dir.display().to_string(), e))?;

        let json = canonical_json(manifest)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| CoreError::io(dir.display().to_string(), e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| CoreError::io(dir.display().to_string(), e))?;
        tmp.flush()
            .map_err(|e| CoreError::io(dir.display().to_string(), e))?;

        let dest = Self::manifest_path(root_path);
        tmp.persist(&dest)
            .map_err(|e| CoreError::io(dest.display().to_string(), e.error))?;

        Ok(())
    }
}

/// Serializes the manifest with a fixed key order
/// (`projectId, rootPath, treeHash, files, generatedAt, schemaVersion`),
/// `files` ordered by `path` ascending, `\n` line endings, UTF-8.
fn canonical_json(manifest: &ProjectManifest) -> Result<String> {
    let mut files = manifest.files.clone();
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    let ordered = serde_json::json!({
        "projectId": manifest.project_id,
        "rootPath": manifest.root_path,
        "treeHash": manifest.tree_hash,
        "files": files.iter().map(|f| serde_json::json!({
            "path": f.rel_path,
            "sha256": f.sha256,
            "bytes": f.bytes,
        })).collect::<Vec<_>>(),
        "generatedAt": manifest.generated_at.to_rfc3339(),
        "schemaVersion": manifest.schema_version,
    });

    let mut text = serde_json::to_string_pretty(&ordered).map_err(|e| CoreError::parse(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileHashEntry;
    use chrono::Utc;

    fn sample_manifest() -> ProjectManifest {
        ProjectManifest {
            project_id: "a".repeat(64),
            root_path: "/tmp/proj".to_string(),
            tree_hash: "b".repeat(64),
            files: vec![
                FileHashEntry {
                    rel_path: "b.py".to_string(),
                    sha256: "c".repeat(64),
                    bytes: 10,
                },
                FileHashEntry {
                    rel_path: "a.ts".to_string(),
                    sha256: "d".repeat(64),
                    bytes: 20,
                },
            ],
            generated_at: Utc::now(),
            schema_version: MANIFEST_SCHEMA_VERSION,
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample_manifest();

        ManifestStore::save(dir.path(), &manifest).unwrap();
        let loaded = ManifestStore::load(dir.path()).unwrap().unwrap();

        assert_eq!(loaded.project_id, manifest.project_id);
        assert_eq!(loaded.tree_hash, manifest.tree_hash);
        assert_eq!(loaded.files.len(), 2);
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ManifestStore::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn load_rejects_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = sample_manifest();
        manifest.schema_version = 999;
        ManifestStore::save(dir.path(), &manifest).unwrap();
        assert!(ManifestStore::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn saved_file_list_is_sorted_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample_manifest();
        ManifestStore::save(dir.path(), &manifest).unwrap();

        let raw = std::fs::read_to_string(ManifestStore::manifest_path(dir.path())).unwrap();
        let a_pos = raw.find("a.ts").unwrap();
        let b_pos = raw.find("b.py").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn saved_file_ends_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample_manifest();
        ManifestStore::save(dir.path(), &manifest).unwrap();
        let raw = std::fs::read_to_string(ManifestStore::manifest_path(dir.path())).unwrap();
        assert!(raw.ends_with('\n'));
    }
}
