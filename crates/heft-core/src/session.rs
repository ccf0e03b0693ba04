use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use heft_remote::{
    MalformedKind, ObjectTransport, QueueOptions, Transfer, TransferError, TransferQueue,
};
use heft_types::{HeftError, Oid, Result};

use crate::config::PushConfig;
use crate::locks::{LockVerifier, VerifyMode};
use crate::pointer::PointerRecord;
use crate::progress::{Meter, transfer_observer};
use crate::store::LocalStore;

/// Per-object scan failures, recorded straight from the scanner's resolver
/// threads. The only session state touched concurrently, hence the lock.
#[derive(Clone, Default)]
pub struct ScanErrorSink(Arc<Mutex<Vec<HeftError>>>);

impl ScanErrorSink {
    pub fn record(&self, err: HeftError) {
        if let Ok(mut errors) = self.0.lock() {
            errors.push(err);
        }
    }

    pub fn take(&self) -> Vec<HeftError> {
        self.0
            .lock()
            .map(|mut errors| std::mem::take(&mut *errors))
            .unwrap_or_default()
    }
}

/// Session state for one push: what has been queued, what the transfers
/// reported, and which lock conflicts were seen.
///
/// Apart from [`ScanErrorSink`] every field is mutated only from the single
/// thread driving the filter pipeline and queue drains. Ref updates run
/// sequentially, so no further synchronization is layered on top; keep it
/// that way if the update loop ever changes.
pub struct UploadSession {
    dry_run: bool,
    allow_incomplete: bool,
    batch_size: usize,
    workers: usize,
    uploaded: HashSet<Oid>,
    store: LocalStore,
    meter: Arc<Meter>,
    locks: LockVerifier,
    scan_errors: ScanErrorSink,
    // Both keyed by path: a later ref update overwrites the verdict an
    // earlier one recorded for the same path.
    missing: BTreeMap<String, Oid>,
    corrupt: BTreeMap<String, Oid>,
    other_errors: Vec<TransferError>,
    out: Box<dyn Write + Send>,
}

impl UploadSession {
    pub fn new(
        config: &PushConfig,
        store: LocalStore,
        meter: Arc<Meter>,
        out: Box<dyn Write + Send>,
    ) -> Self {
        let locks = LockVerifier::new(config.locks_verify, config.committer_name.clone());
        Self {
            dry_run: config.dry_run,
            allow_incomplete: config.allow_incomplete_push,
            batch_size: config.batch_size,
            workers: config.concurrent_transfers,
            uploaded: HashSet::new(),
            store,
            meter,
            locks,
            scan_errors: ScanErrorSink::default(),
            missing: BTreeMap::new(),
            corrupt: BTreeMap::new(),
            other_errors: Vec::new(),
            out,
        }
    }

    pub fn locks_mut(&mut self) -> &mut LockVerifier {
        &mut self.locks
    }

    /// Handle for recording scan failures from resolver threads.
    pub fn scan_errors(&self) -> ScanErrorSink {
        self.scan_errors.clone()
    }

    pub fn take_scan_errors(&mut self) -> Vec<HeftError> {
        self.scan_errors.take()
    }

    /// A transfer queue configured the way this session wants every ref
    /// update's queue: shared meter, session batch size, dry-run mode.
    pub fn new_queue(&self, transport: Arc<dyn ObjectTransport>) -> TransferQueue {
        TransferQueue::new(transport, QueueOptions {
            batch_size: self.batch_size,
            workers: self.workers,
            dry_run: self.dry_run,
            allow_incomplete: self.allow_incomplete,
            observer: Some(transfer_observer(self.meter.clone())),
        })
    }

    pub fn has_uploaded(&self, oid: Oid) -> bool {
        self.uploaded.contains(&oid)
    }

    /// Mark an oid as queued in this process so no later ref update queues
    /// it again.
    pub fn set_uploaded(&mut self, oid: Oid) {
        self.uploaded.insert(oid);
    }

    /// Filter a batch of candidates down to the transfers worth queueing.
    ///
    /// Order matters: duplicate oids (within the batch or already queued)
    /// and zero-size records drop out before the lock stage, so lock state
    /// is only consulted and recorded for records still in play. Admitted
    /// sizes feed the meter immediately; the estimate tracks intent, not
    /// outcome.
    pub fn admit(&mut self, candidates: Vec<PointerRecord>) -> Result<Vec<Transfer>> {
        let mut admitted = Vec::with_capacity(candidates.len());
        let mut batch_oids = HashSet::new();
        for record in candidates {
            if batch_oids.contains(&record.oid)
                || self.uploaded.contains(&record.oid)
                || record.size == 0
            {
                continue;
            }
            batch_oids.insert(record.oid);

            let mut can_upload = true;
            if self.locks.check(&record.name) {
                // Conflicts only block when verification is explicitly
                // enabled; disabled and undefined both let the record pass.
                can_upload = !self.locks.enforcing();
            }
            if can_upload {
                self.meter.add(record.size);
                admitted.push(self.transfer_for(&record)?);
            }
        }
        Ok(admitted)
    }

    /// Build the transfer descriptor for one record.
    ///
    /// An absent local object is only an error at this stage when the stat
    /// itself fails; plain absence marks the descriptor missing (or not,
    /// under allow-incomplete) and lets the transfer engine decide.
    pub fn transfer_for(&self, record: &PointerRecord) -> Result<Transfer> {
        let path = self.store.object_path(&record.oid);
        let mut missing = false;
        match std::fs::metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => missing = !self.allow_incomplete,
            Err(e) => {
                return Err(HeftError::ObjectRead {
                    name: record.name.clone(),
                    oid: record.oid,
                    source: e,
                });
            }
        }
        Ok(Transfer {
            name: record.name.clone(),
            path,
            oid: record.oid,
            size: record.size,
            missing,
        })
    }

    /// Feed one scanned record into the pipeline: dry-run note or filter,
    /// descriptor build, enqueue, then dedup bookkeeping.
    pub fn enqueue(&mut self, queue: &TransferQueue, record: PointerRecord) -> Result<()> {
        if self.dry_run {
            return self.dry_run_note(&record);
        }
        for transfer in self.admit(vec![record])? {
            let oid = transfer.oid;
            queue.add(transfer);
            self.set_uploaded(oid);
        }
        Ok(())
    }

    /// Announce what a real push would queue, once per oid across the whole
    /// session. Dry run bypasses the filters; it reports referenced objects,
    /// not upload decisions.
    fn dry_run_note(&mut self, record: &PointerRecord) -> Result<()> {
        if self.uploaded.contains(&record.oid) {
            return Ok(());
        }
        writeln!(self.out, "push {} => {}", record.oid, record.name)?;
        self.uploaded.insert(record.oid);
        Ok(())
    }

    /// Drain a ref update's queue and sort its errors into the buckets.
    /// Runs after every scan, including aborted ones, so partial results
    /// still reach the report.
    pub fn collect_errors(&mut self, queue: &mut TransferQueue) {
        queue.wait();
        for err in queue.errors() {
            match err {
                TransferError::Malformed {
                    name,
                    oid,
                    kind: MalformedKind::Absent,
                } => {
                    self.missing.insert(name.clone(), *oid);
                }
                TransferError::Malformed {
                    name,
                    oid,
                    kind: MalformedKind::Corrupt,
                } => {
                    self.corrupt.insert(name.clone(), *oid);
                }
                other => self.other_errors.push(other.clone()),
            }
        }
    }

    /// Close out the session: stop the meter and hand the accumulated state
    /// to the reporter.
    pub fn finish(self) -> PushSummary {
        self.meter.finish();
        let unowned_locks = self
            .locks
            .unowned_locks()
            .iter()
            .map(|(path, lock)| (path.clone(), lock.owner_name().to_string()))
            .collect();
        let owned_locks = self.locks.owned_locks().keys().cloned().collect();
        PushSummary {
            missing: self.missing,
            corrupt: self.corrupt,
            other_errors: self.other_errors,
            allow_incomplete: self.allow_incomplete,
            lock_mode: self.locks.mode(),
            unowned_locks,
            owned_locks,
        }
    }
}

/// Everything the reporter needs, detached from the live session.
pub struct PushSummary {
    pub missing: BTreeMap<String, Oid>,
    pub corrupt: BTreeMap<String, Oid>,
    pub other_errors: Vec<TransferError>,
    pub allow_incomplete: bool,
    pub lock_mode: VerifyMode,
    /// `(path, owner)` pairs for conflicts with other users, path-ordered.
    pub unowned_locks: Vec<(String, String)>,
    /// Pushed paths the current user still holds locks on, path-ordered.
    pub owned_locks: Vec<String>,
}
