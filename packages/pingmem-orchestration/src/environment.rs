//! Reads the runtime's environment inputs once into explicit config
//! records. The core crates never read environment variables
//! directly — this is the one place that does.

use pingmem_storage::{GraphSinkConfig, VectorSinkConfig};
use std::path::PathBuf;

/// `NEO4J_URI/USERNAME/PASSWORD/DATABASE/MAX_POOL_SIZE` — carried for
/// forward compatibility with a Bolt-backed `GraphSink`; this build
/// only ships the SQLite adapter, so these fields are currently unused
/// by `SqliteGraphSink` (see DESIGN.md).
#[derive(Debug, Clone, Default)]
pub struct Neo4jEnv {
    pub uri: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub max_pool_size: Option<u32>,
}

/// `QDRANT_URL/COLLECTION_NAME/API_KEY/VECTOR_DIMENSIONS`.
#[derive(Debug, Clone, Default)]
pub struct QdrantEnv {
    pub url: Option<String>,
    pub collection_name: Option<String>,
    pub api_key: Option<String>,
    pub vector_dimensions: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RuntimeEnvironment {
    pub neo4j: Neo4jEnv,
    pub qdrant: QdrantEnv,
    pub db_path: Option<PathBuf>,
}

pub struct EnvironmentLoader;

impl EnvironmentLoader {
    pub fn load() -> RuntimeEnvironment {
        RuntimeEnvironment {
            neo4j: Neo4jEnv {
                uri: std::env::var("NEO4J_URI").ok(),
                username: std::env::var("NEO4J_USERNAME").ok(),
                password: std::env::var("NEO4J_PASSWORD").ok(),
                database: std::env::var("NEO4J_DATABASE").ok(),
                max_pool_size: std::env::var("NEO4J_MAX_POOL_SIZE").ok().and_then(|v| v.parse().ok()),
            },
            qdrant: QdrantEnv {
                url: std::env::var("QDRANT_URL").ok(),
                collection_name: std::env::var("QDRANT_COLLECTION_NAME").ok(),
                api_key: std::env::var("QDRANT_API_KEY").ok(),
                vector_dimensions: std::env::var("QDRANT_VECTOR_DIMENSIONS").ok().and_then(|v| v.parse().ok()),
            },
            db_path: std::env::var("PING_MEM_DB_PATH").ok().map(PathBuf::from),
        }
    }

    /// Resolves the SQLite-backed graph sink's storage location: the
    /// explicit `PING_MEM_DB_PATH` override, or the sink's own default.
    pub fn graph_sink_config(env: &RuntimeEnvironment) -> GraphSinkConfig {
        match &env.db_path {
            Some(base) => GraphSinkConfig { db_path: base.join("graph.sqlite3") },
            None => GraphSinkConfig::default(),
        }
    }

    pub fn vector_sink_config(env: &RuntimeEnvironment) -> VectorSinkConfig {
        let mut config = VectorSinkConfig::default();
        if let Some(base) = &env.db_path {
            config.db_path = base.join("vectors.sqlite3");
        }
        if let Some(name) = &env.qdrant.collection_name {
            config.collection_name = name.clone();
        }
        if let Some(dims) = env.qdrant.vector_dimensions {
            config.vector_dimensions = dims;
        }
        config
    }
}
