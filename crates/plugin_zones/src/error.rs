use thiserror::Error;
use warden_event_system::{StorageError, ZoneId};

/// Failures of the administrative zone operations.
#[derive(Error, Debug)]
pub enum ZoneError {
    #[error("Zone {0} already exists")]
    AlreadyExists(ZoneId),
    #[error("Zone {0} not found")]
    NotFound(ZoneId),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
