//! IngestionOrchestrator: the single entry point that turns a
//! project directory into an `IngestionRecord`, short-circuiting when the
//! tree is unchanged.

use crate::chunker::Chunker;
use crate::error::{CoreError, Result};
use crate::git::{GitHistoryReader, SafeGit, SafeGitConfig};
use crate::manifest_store::ManifestStore;
use crate::model::{FileRecord, GitHistory, IngestionRecord};
use crate::scanner::{ProjectScanner, ScannerConfig};
use crate::symbols::SymbolExtractor;
use chrono::Utc;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Re-ingest even if the scanned tree hash matches the stored manifest.
    pub force_reingest: bool,
}

pub struct IngestionOrchestrator {
    scanner: ProjectScanner,
}

impl IngestionOrchestrator {
    pub fn new(scanner_config: ScannerConfig) -> Self {
        Self {
            scanner: ProjectScanner::new(scanner_config),
        }
    }

    /// Scans `project_dir`, and if the tree changed (or `force_reingest`
    /// is set) re-chunks and re-extracts symbols for every file, reads
    /// git history, and atomically persists the new manifest. Returns
    /// `None` when nothing changed and re-ingestion was not forced.
    pub fn ingest(&self, project_dir: &Path, opts: &IngestOptions) -> Result<Option<IngestionRecord>> {
        let previous = ManifestStore::load(project_dir)?;
        let (manifest, has_changes) = self.scanner.scan(project_dir, previous.as_ref())?;

        if !has_changes && !opts.force_reingest {
            debug!(project_id = %manifest.project_id, "tree unchanged, skipping ingestion");
            return Ok(None);
        }

        info!(project_id = %manifest.project_id, files = manifest.files.len(), "ingesting project");

        let root = Path::new(&manifest.root_path);
        let mut code_files = Vec::with_capacity(manifest.files.len());
        for entry in &manifest.files {
            let abs_path = root.join(&entry.rel_path);
            let bytes = std::fs::read(&abs_path).map_err(|e| CoreError::io(abs_path.display().to_string(), e))?;
            let content = String::from_utf8_lossy(&bytes).into_owned();

            let chunks = Chunker::chunk_file(&entry.rel_path, &entry.sha256, &content);
            let symbols = SymbolExtractor::extract(&entry.rel_path, &content);

            code_files.push(FileRecord {
                rel_path: entry.rel_path.clone(),
                sha256: entry.sha256.clone(),
                chunks,
                symbols,
            });
        }

        let git_history = self.read_git_history(root)?;

        ManifestStore::save(project_dir, &manifest)?;

        Ok(Some(IngestionRecord {
            manifest,
            code_files,
            git_history,
            ingested_at: Utc::now(),
            has_changes,
        }))
    }

    /// Re-scans `project_dir` and compares the fresh tree hash to the
    /// stored manifest's. `false` if no manifest has ever been saved.
    pub fn verify(&self, project_dir: &Path) -> Result<bool> {
        let previous = match ManifestStore::load(project_dir)? {
            Some(p) => p,
            None => return Ok(false),
        };

        let (fresh, _) = self.scanner.scan(project_dir, None)?;
        Ok(fresh.tree_hash == previous.tree_hash)
    }

    fn read_git_history(&self, root: &Path) -> Result<GitHistory> {
        let git = SafeGit::new(root, SafeGitConfig::default());
        let reader = GitHistoryReader::new(&git);
        reader.read_history()
    }
}
