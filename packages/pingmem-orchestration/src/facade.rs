//! IngestionFacade: composes the orchestrator, graph sink and
//! vector sink behind the six operations external callers use.

use crate::error::{FacadeError, Result};
use crate::why::extract_why;
use chrono::{DateTime, Utc};
use pingmem_core::{IngestOptions, IngestionOrchestrator, ManifestStore, ProjectScanner, ScannerConfig};
use pingmem_storage::{
    FileHistoryEntry, GraphSink, ListProjectsOptions, ProjectSummary, SearchFilters, SearchResult,
    VectorSink, Vectorizer,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct IngestProjectOptions {
    pub project_dir: String,
    pub force_reingest: bool,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub project_id: String,
    pub tree_hash: String,
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub commits_indexed: usize,
    pub ingested_at: DateTime<Utc>,
    pub had_changes: bool,
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub project_id: String,
    pub valid: bool,
    pub manifest_tree_hash: Option<String>,
    pub current_tree_hash: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub commit_hash: String,
    pub change_type: String,
    pub old_path: Option<String>,
    pub committer_date: DateTime<Utc>,
    pub why: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueryTimelineOptions {
    pub project_id: String,
    pub file_path: Option<String>,
    pub limit: u32,
}

/// Orchestrates ingestion into the graph and vector sinks and exposes
/// the read-mostly surface that client applications embed.
pub struct IngestionFacade {
    orchestrator: IngestionOrchestrator,
    scanner_config: ScannerConfig,
    graph: Arc<dyn GraphSink>,
    vector: Arc<dyn VectorSink>,
}

impl IngestionFacade {
    pub fn new(scanner_config: ScannerConfig, graph: Arc<dyn GraphSink>, vector: Arc<dyn VectorSink>) -> Self {
        Self {
            orchestrator: IngestionOrchestrator::new(scanner_config.clone()),
            scanner_config,
            graph,
            vector,
        }
    }

    /// Runs ingestion and persists into both sinks. A failed vector
    /// write does not abort a successful graph write: content-addressed
    /// IDs let the next ingest reconcile.
    pub fn ingest_project(
        &self,
        opts: IngestProjectOptions,
        vectorizer: &dyn Vectorizer,
    ) -> Result<Option<IngestOutcome>> {
        let project_dir = Path::new(&opts.project_dir);
        let record = self
            .orchestrator
            .ingest(project_dir, &IngestOptions { force_reingest: opts.force_reingest })
            .map_err(|e| FacadeError::core("ingestProject", e))?;

        let Some(record) = record else {
            return Ok(None);
        };

        self.graph.persist(&record).map_err(|e| FacadeError::storage("ingestProject: persist graph", e))?;

        let chunks_by_path: Vec<(String, pingmem_core::Chunk)> = record
            .code_files
            .iter()
            .flat_map(|f| f.chunks.iter().map(move |c| (f.rel_path.clone(), c.clone())))
            .collect();
        let sha256_index: std::collections::HashMap<String, String> =
            record.code_files.iter().map(|f| (f.rel_path.clone(), f.sha256.clone())).collect();

        if let Err(e) = self.vector.upsert_chunks(
            &record.manifest.project_id,
            &|path: &str| sha256_index.get(path).cloned().unwrap_or_default(),
            &chunks_by_path,
            vectorizer,
            record.ingested_at,
            pingmem_storage::DataType::Code,
        ) {
            tracing::warn!(error = %e, "ingestProject: vector sink persist failed, graph store still consistent");
        }

        Ok(Some(IngestOutcome {
            project_id: record.manifest.project_id,
            tree_hash: record.manifest.tree_hash,
            files_indexed: record.code_files.len(),
            chunks_indexed: chunks_by_path.len(),
            commits_indexed: record.git_history.commits.len(),
            ingested_at: record.ingested_at,
            had_changes: record.has_changes,
        }))
    }

    pub fn verify_project(&self, project_dir: &str) -> Result<VerifyOutcome> {
        let path = Path::new(project_dir);
        let valid = self.orchestrator.verify(path).map_err(|e| FacadeError::core("verifyProject", e))?;

        let manifest =
            ManifestStore::load(path).map_err(|e| FacadeError::core("verifyProject: load manifest", e))?;

        let (fresh, _) = ProjectScanner::new(self.scanner_config.clone())
            .scan(path, None)
            .map_err(|e| FacadeError::core("verifyProject: rescan", e))?;

        let message = if valid {
            "manifest matches current tree".to_string()
        } else {
            "tree has changed since last ingest".to_string()
        };

        Ok(VerifyOutcome {
            project_id: fresh.project_id.clone(),
            valid,
            manifest_tree_hash: manifest.map(|m| m.tree_hash),
            current_tree_hash: fresh.tree_hash,
            message,
        })
    }

    /// Vector search with client-side filtering on
    /// `projectId / filePath / type`, since the search engine itself
    /// is out of scope here.
    pub fn search_code(&self, query_vector: &[f32], filters: &SearchFilters, limit: u32) -> Result<Vec<SearchResult>> {
        self.vector.search(query_vector, filters, limit).map_err(|e| FacadeError::storage("searchCode", e))
    }

    /// Joins `queryFileHistory`/`queryCommitHistory` with a
    /// deterministic `why` extracted from the commit message.
    pub fn query_timeline(&self, opts: QueryTimelineOptions) -> Result<Vec<TimelineEntry>> {
        let commits = self
            .graph
            .query_commit_history(&opts.project_id, opts.limit)
            .map_err(|e| FacadeError::storage("queryTimeline: query commit history", e))?;
        let commit_why: std::collections::HashMap<String, String> =
            commits.iter().map(|c| (c.hash.clone(), extract_why(&c.message))).collect();

        let history: Vec<FileHistoryEntry> = match &opts.file_path {
            Some(path) => self
                .graph
                .query_file_history(&opts.project_id, path)
                .map_err(|e| FacadeError::storage("queryTimeline: query file history", e))?,
            None => commits
                .iter()
                .map(|c| FileHistoryEntry {
                    commit_hash: c.hash.clone(),
                    change_type: pingmem_core::ChangeType::M,
                    old_path: None,
                    committer_date: c.committer_date,
                })
                .collect(),
        };

        let entries = history
            .into_iter()
            .take(opts.limit.max(1) as usize)
            .map(|h| TimelineEntry {
                why: commit_why.get(&h.commit_hash).cloned().unwrap_or_default(),
                commit_hash: h.commit_hash,
                change_type: format!("{:?}", h.change_type),
                old_path: h.old_path,
                committer_date: h.committer_date,
            })
            .collect();

        Ok(entries)
    }

    /// Cascades the delete into both the graph and vector sinks.
    pub fn delete_project(&self, project_id: &str) -> Result<()> {
        self.graph.delete_project(project_id).map_err(|e| FacadeError::storage("deleteProject: graph", e))?;
        self.vector.delete_project(project_id).map_err(|e| FacadeError::storage("deleteProject: vector", e))?;
        Ok(())
    }

    pub fn list_projects(&self, opts: &ListProjectsOptions) -> Result<Vec<ProjectSummary>> {
        self.graph.list_projects(opts).map_err(|e| FacadeError::storage("listProjects", e))
    }
}
