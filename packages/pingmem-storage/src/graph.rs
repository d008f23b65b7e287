//! TemporalGraphSink: persists an `IngestionRecord` into a property
//! graph (node+edge schema), idempotently. Queries flow
//! read-only out of the same store.
//!
//! Modeled as a `GraphSink` trait so a future Bolt-backed adapter can be
//! swapped in without touching callers.

use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use pingmem_core::{ChangeType, Chunk, Commit, FileChange, IngestionRecord, Symbol};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct GraphSinkConfig {
    pub db_path: PathBuf,
}

impl Default for GraphSinkConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("ping-mem-graph.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub root_path: String,
    pub tree_hash: String,
    pub last_ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ListProjectsOptions {
    pub project_id: Option<String>,
    pub limit: Option<u32>,
    pub sort_by_last_ingested_desc: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAtTime {
    pub rel_path: String,
    pub sha256: String,
    pub last_ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHistoryEntry {
    pub commit_hash: String,
    pub change_type: ChangeType,
    pub old_path: Option<String>,
    pub committer_date: DateTime<Utc>,
}

/// Port: persist and query the temporal property graph. Implementations
/// MUST make `persist` idempotent.
pub trait GraphSink: Send + Sync {
    fn persist(&self, record: &IngestionRecord) -> Result<()>;
    fn list_projects(&self, opts: &ListProjectsOptions) -> Result<Vec<ProjectSummary>>;
    fn query_files_at_time(&self, project_id: &str, tree_hash: Option<&str>) -> Result<Vec<FileAtTime>>;
    fn query_file_chunks(&self, project_id: &str, rel_path: &str) -> Result<Vec<Chunk>>;
    fn query_commit_history(&self, project_id: &str, limit: u32) -> Result<Vec<Commit>>;
    fn query_file_history(&self, project_id: &str, rel_path: &str) -> Result<Vec<FileHistoryEntry>>;
    fn delete_project(&self, project_id: &str) -> Result<()>;
}

/// SQLite-backed `GraphSink`. The property graph is modeled relationally:
/// node tables (`projects`, `files`, `chunks`, `symbols`, `commits`) plus
/// join tables for each edge kind, carrying `ingested_at` where the
/// edge itself is timestamped.
pub struct SqliteGraphSink {
    conn: Mutex<Connection>,
}

impl SqliteGraphSink {
    pub fn open(config: &GraphSinkConfig) -> Result<Self> {
        let conn = Connection::open(&config.db_path)?;
        Self::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS projects (
                project_id TEXT PRIMARY KEY,
                root_path TEXT NOT NULL,
                tree_hash TEXT NOT NULL,
                last_ingested_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                file_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(project_id),
                path TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                last_ingested_at TEXT NOT NULL,
                UNIQUE(project_id, path)
            );
            CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id);

            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL REFERENCES files(file_id),
                type TEXT NOT NULL,
                start INTEGER NOT NULL,
                end INTEGER NOT NULL,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                content TEXT NOT NULL,
                last_ingested_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);

            CREATE TABLE IF NOT EXISTS symbols (
                symbol_id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL REFERENCES files(file_id),
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                signature TEXT,
                last_ingested_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);

            CREATE TABLE IF NOT EXISTS commits (
                hash TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(project_id),
                short_hash TEXT NOT NULL,
                author_name TEXT NOT NULL,
                author_email TEXT NOT NULL,
                author_date TEXT NOT NULL,
                committer_name TEXT NOT NULL,
                committer_email TEXT NOT NULL,
                committer_date TEXT NOT NULL,
                message TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_commits_project ON commits(project_id, committer_date);

            CREATE TABLE IF NOT EXISTS has_file (
                project_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (project_id, file_id)
            );
            CREATE TABLE IF NOT EXISTS has_chunk (
                project_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (project_id, file_id, chunk_id)
            );
            CREATE TABLE IF NOT EXISTS defines_symbol (
                file_id TEXT NOT NULL,
                symbol_id TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (file_id, symbol_id)
            );
            CREATE TABLE IF NOT EXISTS contains_symbol (
                chunk_id TEXT NOT NULL,
                symbol_id TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (chunk_id, symbol_id)
            );
            CREATE TABLE IF NOT EXISTS has_commit (
                project_id TEXT NOT NULL,
                commit_hash TEXT NOT NULL,
                PRIMARY KEY (project_id, commit_hash)
            );
            CREATE TABLE IF NOT EXISTS parent_of (
                commit_hash TEXT NOT NULL,
                parent_hash TEXT NOT NULL,
                PRIMARY KEY (commit_hash, parent_hash)
            );
            CREATE TABLE IF NOT EXISTS modifies (
                commit_hash TEXT NOT NULL,
                file_id TEXT NOT NULL,
                change_type TEXT NOT NULL,
                old_path TEXT,
                PRIMARY KEY (commit_hash, file_id)
            );
            CREATE TABLE IF NOT EXISTS changes (
                commit_hash TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                hunk_id TEXT NOT NULL,
                old_start INTEGER NOT NULL,
                old_lines INTEGER NOT NULL,
                new_start INTEGER NOT NULL,
                new_lines INTEGER NOT NULL,
                PRIMARY KEY (commit_hash, chunk_id, hunk_id)
            );
            ",
        )?;
        Ok(())
    }

    fn file_id(rel_path: &str) -> String {
        pingmem_core::hashing::sha256_hex(rel_path.as_bytes())
    }
}

impl GraphSink for SqliteGraphSink {
    fn persist(&self, record: &IngestionRecord) -> Result<()> {
        let conn = self.conn.lock().expect("graph connection poisoned");
        let manifest = &record.manifest;
        let now = record.ingested_at.to_rfc3339();

        conn.execute(
            "INSERT INTO projects (project_id, root_path, tree_hash, last_ingested_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_id) DO UPDATE SET
                root_path = excluded.root_path,
                tree_hash = excluded.tree_hash,
                last_ingested_at = excluded.last_ingested_at",
            params![manifest.project_id, manifest.root_path, manifest.tree_hash, now],
        )?;

        for file in &record.code_files {
            let file_id = Self::file_id(&file.rel_path);

            conn.execute(
                "INSERT INTO files (file_id, project_id, path, sha256, last_ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(file_id) DO UPDATE SET
                    sha256 = excluded.sha256,
                    last_ingested_at = excluded.last_ingested_at",
                params![file_id, manifest.project_id, file.rel_path, file.sha256, now],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO has_file (project_id, file_id, sha256, ingested_at) VALUES (?1, ?2, ?3, ?4)",
                params![manifest.project_id, file_id, file.sha256, now],
            )?;

            for chunk in &file.chunks {
                conn.execute(
                    "INSERT INTO chunks (chunk_id, file_id, type, start, end, line_start, line_end, content, last_ingested_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(chunk_id) DO UPDATE SET last_ingested_at = excluded.last_ingested_at",
                    params![
                        chunk.chunk_id,
                        file_id,
                        chunk.chunk_type.as_str(),
                        chunk.start as i64,
                        chunk.end as i64,
                        chunk.line_start,
                        chunk.line_end,
                        chunk.content,
                        now,
                    ],
                )?;
                conn.execute(
                    "INSERT OR REPLACE INTO has_chunk (project_id, file_id, chunk_id, ingested_at) VALUES (?1, ?2, ?3, ?4)",
                    params![manifest.project_id, file_id, chunk.chunk_id, now],
                )?;
            }

            for symbol in &file.symbols {
                conn.execute(
                    "INSERT INTO symbols (symbol_id, file_id, name, kind, start_line, end_line, signature, last_ingested_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(symbol_id) DO UPDATE SET last_ingested_at = excluded.last_ingested_at",
                    params![
                        symbol.symbol_id,
                        file_id,
                        symbol.name,
                        symbol.kind.as_str(),
                        symbol.start_line,
                        symbol.end_line,
                        symbol.signature,
                        now,
                    ],
                )?;
                conn.execute(
                    "INSERT OR REPLACE INTO defines_symbol (file_id, symbol_id, ingested_at) VALUES (?1, ?2, ?3)",
                    params![file_id, symbol.symbol_id, now],
                )?;

                for chunk in &file.chunks {
                    if chunk.line_start <= symbol.end_line && chunk.line_end >= symbol.start_line {
                        conn.execute(
                            "INSERT OR REPLACE INTO contains_symbol (chunk_id, symbol_id, ingested_at) VALUES (?1, ?2, ?3)",
                            params![chunk.chunk_id, symbol.symbol_id, now],
                        )?;
                    }
                }
            }
        }

        for commit in &record.git_history.commits {
            conn.execute(
                "INSERT INTO commits (hash, project_id, short_hash, author_name, author_email, author_date,
                                      committer_name, committer_email, committer_date, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(hash) DO NOTHING",
                params![
                    commit.hash,
                    manifest.project_id,
                    commit.short_hash,
                    commit.author_name,
                    commit.author_email,
                    commit.author_date.to_rfc3339(),
                    commit.committer_name,
                    commit.committer_email,
                    commit.committer_date.to_rfc3339(),
                    commit.message,
                ],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO has_commit (project_id, commit_hash) VALUES (?1, ?2)",
                params![manifest.project_id, commit.hash],
            )?;
            for parent in &commit.parent_hashes {
                conn.execute(
                    "INSERT OR REPLACE INTO parent_of (commit_hash, parent_hash) VALUES (?1, ?2)",
                    params![commit.hash, parent],
                )?;
            }
        }

        for change in &record.git_history.file_changes {
            let file_id = Self::file_id(&change.file_path);
            conn.execute(
                "INSERT OR REPLACE INTO modifies (commit_hash, file_id, change_type, old_path) VALUES (?1, ?2, ?3, ?4)",
                params![change.commit_hash, file_id, format!("{:?}", change.change_type), change.old_path],
            )?;
        }

        for hunk in &record.git_history.diff_hunks {
            let chunks = self.query_file_chunks_locked(&conn, &manifest.project_id, &hunk.file_path)?;
            for chunk in chunks {
                if hunk.new_start <= chunk.line_end && hunk.new_start + hunk.new_lines.max(1) - 1 >= chunk.line_start {
                    conn.execute(
                        "INSERT OR REPLACE INTO changes (commit_hash, chunk_id, hunk_id, old_start, old_lines, new_start, new_lines)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            hunk.commit_hash,
                            chunk.chunk_id,
                            hunk.hunk_id,
                            hunk.old_start,
                            hunk.old_lines,
                            hunk.new_start,
                            hunk.new_lines,
                        ],
                    )?;
                }
            }
        }

        debug!(project_id = %manifest.project_id, "graph persist complete");
        info!(project_id = %manifest.project_id, files = record.code_files.len(), "persisted ingestion record to graph");
        Ok(())
    }

    fn list_projects(&self, opts: &ListProjectsOptions) -> Result<Vec<ProjectSummary>> {
        let conn = self.conn.lock().expect("graph connection poisoned");
        let order = if opts.sort_by_last_ingested_desc { "DESC" } else { "ASC" };
        let limit = opts.limit.unwrap_or(u32::MAX);

        let sql = format!(
            "SELECT project_id, root_path, tree_hash, last_ingested_at FROM projects
             WHERE (?1 IS NULL OR project_id = ?1)
             ORDER BY last_ingested_at {order}
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![opts.project_id, limit], |row| {
            Ok(ProjectSummary {
                project_id: row.get(0)?,
                root_path: row.get(1)?,
                tree_hash: row.get(2)?,
                last_ingested_at: parse_rfc3339(row.get::<_, String>(3)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn query_files_at_time(&self, project_id: &str, tree_hash: Option<&str>) -> Result<Vec<FileAtTime>> {
        let conn = self.conn.lock().expect("graph connection poisoned");
        if let Some(expected) = tree_hash {
            let actual: Option<String> = conn
                .query_row("SELECT tree_hash FROM projects WHERE project_id = ?1", params![project_id], |r| r.get(0))
                .optional()?;
            if actual.as_deref() != Some(expected) {
                return Ok(Vec::new());
            }
        }

        let mut stmt = conn.prepare(
            "SELECT f.path, hf.sha256, hf.ingested_at
             FROM files f
             JOIN has_file hf ON hf.file_id = f.file_id
             WHERE hf.project_id = ?1
             ORDER BY f.path",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(FileAtTime {
                rel_path: row.get(0)?,
                sha256: row.get(1)?,
                last_ingested_at: parse_rfc3339(row.get::<_, String>(2)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn query_file_chunks(&self, project_id: &str, rel_path: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().expect("graph connection poisoned");
        self.query_file_chunks_locked(&conn, project_id, rel_path)
    }

    fn query_commit_history(&self, project_id: &str, limit: u32) -> Result<Vec<Commit>> {
        let conn = self.conn.lock().expect("graph connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT c.hash, c.short_hash, c.author_name, c.author_email, c.author_date,
                    c.committer_name, c.committer_email, c.committer_date, c.message
             FROM commits c
             JOIN has_commit hc ON hc.commit_hash = c.hash
             WHERE hc.project_id = ?1
             ORDER BY c.committer_date DESC
             LIMIT ?2",
        )?;
        let mut commits = Vec::new();
        let mut query = stmt.query(params![project_id, limit])?;
        while let Some(row) = query.next()? {
            let hash: String = row.get(0)?;
            let mut parent_stmt = conn.prepare("SELECT parent_hash FROM parent_of WHERE commit_hash = ?1")?;
            let parent_hashes = parent_stmt
                .query_map(params![hash], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            commits.push(Commit {
                hash,
                short_hash: row.get(1)?,
                author_name: row.get(2)?,
                author_email: row.get(3)?,
                author_date: parse_rfc3339(row.get::<_, String>(4)?),
                committer_name: row.get(5)?,
                committer_email: row.get(6)?,
                committer_date: parse_rfc3339(row.get::<_, String>(7)?),
                message: row.get(8)?,
                parent_hashes,
            });
        }
        Ok(commits)
    }

    fn query_file_history(&self, project_id: &str, rel_path: &str) -> Result<Vec<FileHistoryEntry>> {
        let conn = self.conn.lock().expect("graph connection poisoned");
        let file_id = Self::file_id(rel_path);
        let mut stmt = conn.prepare(
            "SELECT m.commit_hash, m.change_type, m.old_path, c.committer_date
             FROM modifies m
             JOIN commits c ON c.hash = m.commit_hash
             JOIN has_commit hc ON hc.commit_hash = c.hash
             WHERE m.file_id = ?1 AND hc.project_id = ?2
             ORDER BY c.committer_date DESC",
        )?;
        let rows = stmt.query_map(params![file_id, project_id], |row| {
            let change_type_str: String = row.get(1)?;
            Ok(FileHistoryEntry {
                commit_hash: row.get(0)?,
                change_type: parse_change_type(&change_type_str),
                old_path: row.get(2)?,
                committer_date: parse_rfc3339(row.get::<_, String>(3)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    fn delete_project(&self, project_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("graph connection poisoned");
        let p = params![project_id];

        conn.execute("DELETE FROM changes WHERE commit_hash IN (SELECT commit_hash FROM has_commit WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM modifies WHERE commit_hash IN (SELECT commit_hash FROM has_commit WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM parent_of WHERE commit_hash IN (SELECT commit_hash FROM has_commit WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM commits WHERE hash IN (SELECT commit_hash FROM has_commit WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM has_commit WHERE project_id = ?1", p)?;
        conn.execute("DELETE FROM contains_symbol WHERE file_id IN (SELECT file_id FROM files WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM defines_symbol WHERE file_id IN (SELECT file_id FROM files WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM symbols WHERE file_id IN (SELECT file_id FROM files WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM has_chunk WHERE file_id IN (SELECT file_id FROM files WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM chunks WHERE file_id IN (SELECT file_id FROM files WHERE project_id = ?1)", p)?;
        conn.execute("DELETE FROM has_file WHERE project_id = ?1", p)?;
        conn.execute("DELETE FROM files WHERE project_id = ?1", p)?;
        conn.execute("DELETE FROM projects WHERE project_id = ?1", p)?;
        Ok(())
    }
}

impl SqliteGraphSink {
    fn query_file_chunks_locked(&self, conn: &Connection, project_id: &str, rel_path: &str) -> Result<Vec<Chunk>> {
        let file_id = Self::file_id(rel_path);
        let mut stmt = conn.prepare(
            "SELECT ch.chunk_id, ch.type, ch.start, ch.end, ch.line_start, ch.line_end, ch.content
             FROM chunks ch
             JOIN has_chunk hc ON hc.chunk_id = ch.chunk_id AND hc.file_id = ch.file_id
             WHERE ch.file_id = ?1 AND hc.project_id = ?2
             ORDER BY ch.start ASC",
        )?;
        let rows = stmt.query_map(params![file_id, project_id], |row| {
            let type_str: String = row.get(1)?;
            Ok(Chunk {
                chunk_id: row.get(0)?,
                chunk_type: parse_chunk_type(&type_str),
                start: row.get::<_, i64>(2)? as usize,
                end: row.get::<_, i64>(3)? as usize,
                line_start: row.get(4)?,
                line_end: row.get(5)?,
                content: row.get(6)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(StorageError::from)
    }
}

fn parse_rfc3339(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_chunk_type(s: &str) -> pingmem_core::ChunkType {
    match s {
        "comment" => pingmem_core::ChunkType::Comment,
        "docstring" => pingmem_core::ChunkType::Docstring,
        _ => pingmem_core::ChunkType::Code,
    }
}

fn parse_change_type(s: &str) -> ChangeType {
    match s {
        "M" => ChangeType::M,
        "D" => ChangeType::D,
        "R" => ChangeType::R,
        "C" => ChangeType::C,
        _ => ChangeType::A,
    }
}
