//! Deterministic, content-addressed project ingestion: scan a project
//! tree, hash it into a manifest, split files into chunks, extract
//! symbols, and read git history, all without an external store.

pub mod chunker;
pub mod error;
pub mod git;
pub mod hashing;
pub mod manifest_store;
pub mod model;
pub mod orchestrator;
pub mod scanner;
pub mod symbols;

pub use chunker::Chunker;
pub use error::{CoreError, Result};
pub use git::{validate_commit_hash, GitHistoryReader, SafeGit, SafeGitConfig};
pub use manifest_store::ManifestStore;
pub use model::*;
pub use orchestrator::{IngestOptions, IngestionOrchestrator};
pub use scanner::{default_ignore_dirs, ProjectScanner, ScannerConfig};
pub use symbols::SymbolExtractor;
