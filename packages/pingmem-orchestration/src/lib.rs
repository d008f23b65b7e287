//! IngestionFacade: the single entry point embedding
//! applications use — ingest, verify, search, timeline, delete, list.

mod environment;
mod error;
mod facade;
mod why;

pub use environment::{EnvironmentLoader, Neo4jEnv, QdrantEnv, RuntimeEnvironment};
pub use error::{FacadeError, Result};
pub use facade::{
    IngestOutcome, IngestProjectOptions, IngestionFacade, QueryTimelineOptions, TimelineEntry,
    VerifyOutcome,
};
pub use why::extract_why;
