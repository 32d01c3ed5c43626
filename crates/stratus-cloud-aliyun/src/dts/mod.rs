//! Data Transmission Service

pub mod service;
pub mod synchronization_job;

pub use service::{DtsService, Endpoint, MigrationMode, SyncJob, normalize_source_engine};
pub use synchronization_job::{DtsSynchronizationJob, SyncJobConfig};
