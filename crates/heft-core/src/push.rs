use std::sync::Arc;

use crossbeam_channel::bounded;
use tracing::debug;

use heft_remote::{LockClient, ObjectTransport, TransferQueue};
use heft_types::{HeftError, Result};

use crate::git::is_zero_sha;
use crate::pointer::PointerRecord;
use crate::scan::{PointerSource, ScanItem};
use crate::session::UploadSession;

const SCAN_CHANNEL: usize = 256;

/// One proposed ref change in the push being served.
#[derive(Debug, Clone)]
pub struct RefUpdate {
    /// Local ref being pushed, e.g. `refs/heads/main`.
    pub local_name: String,
    pub local_sha: String,
    /// Destination ref on the remote.
    pub remote_name: String,
    /// Sha the remote currently has, all zeros for a ref it lacks.
    pub remote_sha: String,
}

/// Upload every object the given ref updates need, one update at a time.
///
/// Lock state is fetched up front for all updates. Each update then gets a
/// fresh transfer queue: scan, stream admitted descriptors into the queue,
/// drain, classify. The first failing update stops the loop, but its queue
/// is still drained so partial results reach the report.
pub fn push_ref_updates(
    session: &mut UploadSession,
    source: &dyn PointerSource,
    transport: Arc<dyn ObjectTransport>,
    lock_client: &dyn LockClient,
    updates: &[RefUpdate],
    push_all: bool,
) -> Result<()> {
    for update in updates {
        session
            .locks_mut()
            .refresh(lock_client, Some(&update.remote_name))?;
    }

    // Remote tips that differ from what we are pushing are already present
    // on the server; incremental scans stop walking at them.
    let exclude: Vec<String> = updates
        .iter()
        .filter(|u| u.remote_sha != u.local_sha && !is_zero_sha(&u.remote_sha))
        .map(|u| u.remote_sha.clone())
        .collect();

    for update in updates {
        debug!(local = %update.local_name, remote = %update.remote_name, "pushing ref update");
        let mut queue = session.new_queue(transport.clone());
        let result = scan_update(session, source, &queue, update, &exclude, push_all);
        session.collect_errors(&mut queue);
        if let Err(e) = result {
            // Local-store read failures already name the object and are
            // fatal for the push as a whole, not for one ref.
            return match e {
                e @ HeftError::ObjectRead { .. } => Err(e),
                other => Err(HeftError::for_ref(&update.local_name, other)),
            };
        }
    }
    Ok(())
}

/// Drive one scan, bridging the scanner's concurrent callbacks into the
/// session through a channel with a single consuming loop.
///
/// Only the scan error sink is written from the callback threads; records
/// cross the channel so all remaining session state stays single-writer.
fn scan_update(
    session: &mut UploadSession,
    source: &dyn PointerSource,
    queue: &TransferQueue,
    update: &RefUpdate,
    exclude: &[String],
    push_all: bool,
) -> Result<()> {
    let sink = session.scan_errors();
    let (record_tx, record_rx) = bounded::<PointerRecord>(SCAN_CHANNEL);

    std::thread::scope(|s| -> Result<()> {
        let producer = s.spawn(move || {
            let cb = move |item: ScanItem| match item {
                ScanItem::Record(record) => {
                    let _ = record_tx.send(record);
                }
                ScanItem::Err(e) => sink.record(e),
            };
            if push_all {
                source.scan_ref_with_deleted(&update.local_sha, &cb)
            } else {
                source.scan_multi_range(&update.local_sha, exclude, &cb)
            }
        });

        let mut fatal = None;
        for record in record_rx.iter() {
            if fatal.is_none() {
                if let Err(e) = session.enqueue(queue, record) {
                    // Keep draining so the producer never blocks on a full
                    // channel; the error surfaces after it exits.
                    fatal = Some(e);
                }
            }
        }

        let scan_result = producer
            .join()
            .map_err(|_| HeftError::Scan("scanner thread panicked".into()))?;
        scan_result?;
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })?;

    let scan_errors = session.take_scan_errors();
    if !scan_errors.is_empty() {
        return Err(HeftError::scan_failed(&scan_errors));
    }
    Ok(())
}
