//! Tabular ingestion pipeline (§4.2): TSV parsing, per-row validation,
//! dependency-aware clearing, and transactional batch persistence.

pub mod artifacts;
pub mod clearing;
pub mod handler;
pub mod pipeline;
pub mod tsv;
pub mod validate;

pub use artifacts::IngestionArtifacts;
pub use handler::{DownloadHandler, IngestUploadHandler};
pub use pipeline::{IngestKind, IngestOutcome, ingest};
