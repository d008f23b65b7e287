//! Persistence layer: the property graph, vector index, and diagnostics
//! store sinks that the orchestration layer feeds ingestion output into.

pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod vector;

pub use error::{Result, StorageError};

pub use diagnostics::{
    compute_analysis_id, normalize_findings, parse_sarif, AnalysisDiff, DiagnosticRun,
    DiagnosticsStore, DiagnosticsStoreConfig, FindingInput, GetLatestRunOptions,
    NormalizedFinding, Severity,
};
pub use graph::{
    FileAtTime, FileHistoryEntry, GraphSink, GraphSinkConfig, ListProjectsOptions,
    ProjectSummary, SqliteGraphSink,
};
pub use vector::{
    chunk_id_to_point_id, DataType, SearchFilters, SearchResult, SqliteVectorSink, VectorPayload,
    VectorSink, VectorSinkConfig, Vectorizer,
};
