use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] vestry_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown entity '{0}'; expected account, event, task, or message")]
    UnknownEntity(String),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("No payload provided; pass JSON inline or pipe it on stdin")]
    MissingPayload,
    #[error("Payload is not valid JSON: {0}")]
    InvalidPayload(String),
    #[error("Invalid conflict ID: {0}")]
    InvalidConflictId(String),
    #[error("Invalid queue item ID: {0}")]
    InvalidQueueItemId(String),
    #[error("Encryption key problem: {0}")]
    EncryptionKey(String),
    #[error("Refusing to wipe offline data without --yes")]
    ResetNotConfirmed,
}
