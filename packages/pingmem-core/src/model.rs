//! Shared data model.
//!
//! Types are plain records with serde derives so they cross the
//! manifest-file / bincode-checkpoint / JSON-payload boundaries without
//! bespoke (de)serialization code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MANIFEST_SCHEMA_VERSION: i32 = 1;

/// One file's content hash, as recorded in a `ProjectManifest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashEntry {
    pub rel_path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// The persistent record of what the scanner last observed about a
/// project tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub project_id: String,
    pub root_path: String,
    pub tree_hash: String,
    pub files: Vec<FileHashEntry>,
    pub generated_at: DateTime<Utc>,
    pub schema_version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Code,
    Comment,
    Docstring,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Code => "code",
            ChunkType::Comment => "comment",
            ChunkType::Docstring => "docstring",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A maximal contiguous byte range of a file sharing one classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub chunk_type: ChunkType,
    pub start: usize,
    pub end: usize,
    pub line_start: u32,
    pub line_end: u32,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Variable,
    Constant,
    Enum,
    TypeAlias,
    Method,
    Property,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Enum => "enum",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Best-effort function/class/etc. extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub symbol_id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    A,
    M,
    D,
    R,
    C,
}

impl ChangeType {
    pub fn from_git_status_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(ChangeType::A),
            'M' => Some(ChangeType::M),
            'D' => Some(ChangeType::D),
            'R' => Some(ChangeType::R),
            'C' => Some(ChangeType::C),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub short_hash: String,
    pub author_name: String,
    pub author_email: String,
    pub author_date: DateTime<Utc>,
    pub committer_name: String,
    pub committer_email: String,
    pub committer_date: DateTime<Utc>,
    pub message: String,
    pub parent_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub commit_hash: String,
    pub file_path: String,
    pub change_type: ChangeType,
    pub old_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub hunk_id: String,
    pub commit_hash: String,
    pub file_path: String,
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub content: String,
}

impl DiffHunk {
    pub fn compute_id(commit_hash: &str, file_path: &str, new_start: u32, new_lines: u32) -> String {
        crate::hashing::sha256_joined([
            commit_hash,
            file_path,
            new_start.to_string().as_str(),
            new_lines.to_string().as_str(),
        ])
    }
}

/// Per-file chunks and symbols extracted during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub rel_path: String,
    pub sha256: String,
    pub chunks: Vec<Chunk>,
    pub symbols: Vec<Symbol>,
}

/// Git history bundled into an ingestion record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHistory {
    pub commits: Vec<Commit>,
    pub file_changes: Vec<FileChange>,
    pub diff_hunks: Vec<DiffHunk>,
}

/// Bundles a manifest, per-file chunks/symbols, git history and an
/// ingestion timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub manifest: ProjectManifest,
    pub code_files: Vec<FileRecord>,
    pub git_history: GitHistory,
    pub ingested_at: DateTime<Utc>,
    /// Whether the scanned tree hash actually differed from the stored
    /// manifest. `false` when this record exists only because
    /// `force_reingest` was set on an otherwise-unchanged tree.
    pub has_changes: bool,
}
