pub mod config;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod path;
pub mod reducer;
pub mod schema;
pub mod shredder;
pub mod source;
pub mod storage;
pub mod store;
pub mod warehouse;

// Re-export commonly used items
pub use config::{FieldPolicy, ProcessArrayPolicy, RunConfig, WriteDisposition};
pub use error::{Error, RejectionReason, Result};
pub use orchestrator::{Orchestrator, RunSummary};
pub use schema::{BaseType, Mode, ResolvedSchema, SchemaEntry, TypeMode};
pub use shredder::{shred_document, ScalarValue, ShredOutcome};
pub use source::{DocumentRecord, DocumentSource, InMemoryDocumentSource, NdjsonFileSource};
pub use storage::{LocalFsStorage, Storage};
pub use store::{InMemorySchemaStore, SchemaStore};
pub use warehouse::{ColumnDef, LocalWarehouseDriver, WarehouseDriver};
