pub mod aggregates;
pub mod data_service;
pub mod excel_export;
pub mod query;
pub mod scheduler;
pub mod snapshot_cache;

pub use data_service::{DataService, Orchestrator, SnapshotSink};
pub use excel_export::ExcelExporter;
pub use query::QueryError;
pub use scheduler::Scheduler;
pub use snapshot_cache::{NotReady, Published, SnapshotCache};
