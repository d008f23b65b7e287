//! VectorSink: upserts per-chunk vectors into a single-collection
//! vector index. The `Vectorizer` capability that turns
//! chunk content into a vector is injected and out of scope; only the
//! upsert/delete/search surface is implemented here.

use crate::error::Result;
use chrono::{DateTime, Utc};
use pingmem_core::Chunk;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct VectorSinkConfig {
    pub db_path: PathBuf,
    pub collection_name: String,
    pub vector_dimensions: usize,
}

impl Default for VectorSinkConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("ping-mem-vectors.sqlite3"),
            collection_name: "ping_mem_chunks".to_string(),
            vector_dimensions: 384,
        }
    }
}

/// Produces an embedding for a chunk of text. Model selection itself
/// is out of scope here; this is the trait boundary an external model
/// lives behind.
pub trait Vectorizer: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataType {
    Code,
    Document,
}

impl DataType {
    fn as_str(&self) -> &'static str {
        match self {
            DataType::Code => "code",
            DataType::Document => "document",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub project_id: String,
    pub file_path: String,
    pub chunk_id: String,
    pub sha256: String,
    pub chunk_type: String,
    pub content: String,
    pub ingested_at: DateTime<Utc>,
    pub data_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub project_id: Option<String>,
    pub file_path: Option<String>,
    pub chunk_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub point_id: String,
    pub score: f32,
    pub payload: VectorPayload,
}

pub trait VectorSink: Send + Sync {
    /// Point ID is the chunk's content hash re-formatted as a UUID
    /// string; upserting a chunk whose `chunkId` already exists is a
    /// no-op.
    fn upsert_chunks(&self, project_id: &str, sha256_by_path: &dyn Fn(&str) -> String, chunks: &[(String, Chunk)], vectorizer: &dyn Vectorizer, ingested_at: DateTime<Utc>, data_type: DataType) -> Result<()>;
    fn delete_project(&self, project_id: &str) -> Result<()>;
    fn search(&self, query_vector: &[f32], filters: &SearchFilters, limit: u32) -> Result<Vec<SearchResult>>;
}

pub struct SqliteVectorSink {
    conn: Mutex<Connection>,
    collection_name: String,
}

impl SqliteVectorSink {
    pub fn open(config: &VectorSinkConfig) -> Result<Self> {
        let conn = Connection::open(&config.db_path)?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            collection_name: config.collection_name.clone(),
        })
    }

    pub fn open_in_memory(collection_name: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            collection_name: collection_name.into(),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS vector_points (
                point_id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                project_id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                chunk_type TEXT NOT NULL,
                content TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                data_type TEXT NOT NULL,
                vector BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_vector_points_project ON vector_points(project_id);
            ",
        )?;
        Ok(())
    }

    fn encode_vector(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn decode_vector(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

/// Content hash re-formatted as a UUID string: the first 32 hex chars
/// of the chunk ID, hyphenated into UUID layout.
pub fn chunk_id_to_point_id(chunk_id: &str) -> String {
    let h = &chunk_id[..32.min(chunk_id.len())];
    format!("{}-{}-{}-{}-{}", &h[0..8], &h[8..12], &h[12..16], &h[16..20], &h[20..32])
}

impl VectorSink for SqliteVectorSink {
    fn upsert_chunks(
        &self,
        project_id: &str,
        sha256_by_path: &dyn Fn(&str) -> String,
        chunks: &[(String, Chunk)],
        vectorizer: &dyn Vectorizer,
        ingested_at: DateTime<Utc>,
        data_type: DataType,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("vector connection poisoned");
        for (file_path, chunk) in chunks {
            let point_id = chunk_id_to_point_id(&chunk.chunk_id);
            let vector = vectorizer.embed(&chunk.content);
            let sha256 = sha256_by_path(file_path);

            conn.execute(
                "INSERT INTO vector_points
                    (point_id, collection, project_id, file_path, chunk_id, sha256, chunk_type, content, ingested_at, data_type, vector)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(point_id) DO NOTHING",
                params![
                    point_id,
                    self.collection_name,
                    project_id,
                    file_path,
                    chunk.chunk_id,
                    sha256,
                    chunk.chunk_type.as_str(),
                    chunk.content,
                    ingested_at.to_rfc3339(),
                    data_type.as_str(),
                    Self::encode_vector(&vector),
                ],
            )?;
        }
        debug!(project_id, count = chunks.len(), "upserted chunks into vector index");
        Ok(())
    }

    fn delete_project(&self, project_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("vector connection poisoned");
        conn.execute("DELETE FROM vector_points WHERE project_id = ?1", params![project_id])?;
        Ok(())
    }

    fn search(&self, query_vector: &[f32], filters: &SearchFilters, limit: u32) -> Result<Vec<SearchResult>> {
        let conn = self.conn.lock().expect("vector connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT point_id, project_id, file_path, chunk_id, sha256, chunk_type, content, ingested_at, data_type, vector
             FROM vector_points
             WHERE (?1 IS NULL OR project_id = ?1)
               AND (?2 IS NULL OR file_path = ?2)
               AND (?3 IS NULL OR chunk_type = ?3)",
        )?;
        let rows = stmt.query_map(
            params![filters.project_id, filters.file_path, filters.chunk_type],
            |row| {
                let vector_bytes: Vec<u8> = row.get(9)?;
                Ok(SearchResult {
                    point_id: row.get(0)?,
                    score: 0.0,
                    payload: VectorPayload {
                        project_id: row.get(1)?,
                        file_path: row.get(2)?,
                        chunk_id: row.get(3)?,
                        sha256: row.get(4)?,
                        chunk_type: row.get(5)?,
                        content: row.get(6)?,
                        ingested_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                        data_type: row.get(8)?,
                    },
                }
                .with_score(Self::cosine_similarity(query_vector, &Self::decode_vector(&vector_bytes))))
            },
        )?;

        let mut results: Vec<SearchResult> = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit as usize);
        Ok(results)
    }
}

impl SearchResult {
    fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingmem_core::ChunkType;

    struct FakeVectorizer;
    impl Vectorizer for FakeVectorizer {
        fn embed(&self, text: &str) -> Vec<f32> {
            vec![text.len() as f32, 1.0, 0.0]
        }
    }

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            chunk_type: ChunkType::Code,
            start: 0,
            end: content.len(),
            line_start: 1,
            line_end: 1,
            content: content.to_string(),
        }
    }

    #[test]
    fn point_id_is_uuid_shaped() {
        let id = chunk_id_to_point_id(&"a".repeat(64));
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
    }

    #[test]
    fn upsert_is_idempotent_on_chunk_id() {
        let sink = SqliteVectorSink::open_in_memory("test").unwrap();
        let c = chunk(&"b".repeat(64), "const x = 1;");
        let vectorizer = FakeVectorizer;

        sink.upsert_chunks("proj1", &|_| "filehash".to_string(), &[("a.ts".to_string(), c.clone())], &vectorizer, Utc::now(), DataType::Code).unwrap();
        sink.upsert_chunks("proj1", &|_| "filehash".to_string(), &[("a.ts".to_string(), c.clone())], &vectorizer, Utc::now(), DataType::Code).unwrap();

        let results = sink.search(&[1.0, 1.0, 0.0], &SearchFilters::default(), 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn delete_project_removes_all_its_points() {
        let sink = SqliteVectorSink::open_in_memory("test").unwrap();
        let c = chunk(&"c".repeat(64), "const x = 1;");
        let vectorizer = FakeVectorizer;
        sink.upsert_chunks("proj1", &|_| "filehash".to_string(), &[("a.ts".to_string(), c)], &vectorizer, Utc::now(), DataType::Code).unwrap();

        sink.delete_project("proj1").unwrap();
        let results = sink.search(&[1.0, 1.0, 0.0], &SearchFilters::default(), 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn search_filters_by_project() {
        let sink = SqliteVectorSink::open_in_memory("test").unwrap();
        let vectorizer = FakeVectorizer;
        sink.upsert_chunks("proj1", &|_| "filehash".to_string(), &[("a.ts".to_string(), chunk(&"d".repeat(64), "x"))], &vectorizer, Utc::now(), DataType::Code).unwrap();
        sink.upsert_chunks("proj2", &|_| "filehash".to_string(), &[("b.ts".to_string(), chunk(&"e".repeat(64), "y"))], &vectorizer, Utc::now(), DataType::Code).unwrap();

        let filters = SearchFilters {
            project_id: Some("proj1".to_string()),
            ..Default::default()
        };
        let results = sink.search(&[1.0, 1.0, 0.0], &filters, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload.project_id, "proj1");
    }
}
