pub mod queue;
pub mod rest;
pub mod retry;

use std::path::Path;

use heft_types::Result;

pub use queue::{
    MalformedKind, QueueOptions, Transfer, TransferError, TransferEvent, TransferObserver,
    TransferQueue,
};
pub use rest::{
    BatchObjectResult, BatchObjectSpec, LockOwner, ObjectActions, ObjectError, RemoteLock,
    RestClient, UploadEndpoint,
};

/// Retry policy for remote HTTP operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            retry_max_delay_ms: 10_000,
        }
    }
}

/// How object bytes reach the remote store.
///
/// The production implementation is [`RestClient`]; tests substitute
/// in-memory doubles.
pub trait ObjectTransport: Send + Sync {
    /// Announce a batch of oids for upload. The server answers per object:
    /// an upload action, an error, or neither (it already has the object).
    fn batch_upload(&self, objects: &[BatchObjectSpec]) -> Result<Vec<BatchObjectResult>>;

    /// Send one object's bytes to the location the batch returned.
    fn upload(&self, endpoint: &UploadEndpoint, path: &Path, size: u64) -> Result<()>;
}

/// Read access to the remote's path locks.
pub trait LockClient: Send + Sync {
    /// All locks the server will verify for a push of `refspec`
    /// (all locks when `None`).
    fn list_locks(&self, refspec: Option<&str>) -> Result<Vec<RemoteLock>>;
}
