pub mod git_scan;

pub use git_scan::GitPointerSource;

use heft_types::{HeftError, Result};

use crate::pointer::PointerRecord;

/// One delivery from a scan: a pointer candidate or a per-object failure.
/// An error does not stop the scan; remaining objects keep arriving.
pub enum ScanItem {
    Record(PointerRecord),
    Err(HeftError),
}

/// Callback receiving scan deliveries. Invoked from multiple resolver
/// threads concurrently, so implementations must be Sync.
pub type ScanCallback<'a> = dyn Fn(ScanItem) + Send + Sync + 'a;

/// Walks commit ranges and yields the pointer files they reference.
///
/// Scans are driven from a producer thread while the session consumes, so
/// sources must be shareable across threads.
pub trait PointerSource: Sync {
    /// Scan the full history reachable from `tip`, including objects only
    /// referenced by since-deleted files.
    fn scan_ref_with_deleted(&self, tip: &str, cb: &ScanCallback<'_>) -> Result<()>;

    /// Scan history reachable from `tip` but not from any of `exclude`.
    fn scan_multi_range(
        &self,
        tip: &str,
        exclude: &[String],
        cb: &ScanCallback<'_>,
    ) -> Result<()>;
}
