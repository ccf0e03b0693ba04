use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use heft_types::Oid;

use crate::ObjectTransport;
use crate::rest::{BatchObjectResult, BatchObjectSpec, UploadEndpoint};

/// One object handed to the transfer engine. Ownership moves on enqueue;
/// the session does not touch a descriptor again.
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Repository-relative path, kept for reporting.
    pub name: String,
    /// Local object file.
    pub path: PathBuf,
    pub oid: Oid,
    pub size: u64,
    /// Absent locally and the push does not allow incomplete uploads.
    pub missing: bool,
}

/// Which way a local object failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    Absent,
    Corrupt,
}

/// Terminal failure for one transfer, surfaced after the queue drains.
#[derive(Debug, Clone)]
pub enum TransferError {
    /// The local object could not back the upload.
    Malformed {
        name: String,
        oid: Oid,
        kind: MalformedKind,
    },
    /// The transfer itself failed: server rejection, exhausted retries.
    Failed {
        name: String,
        oid: Oid,
        message: String,
    },
    /// A whole batch could not be announced.
    Batch { message: String },
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Malformed {
                name,
                oid,
                kind: MalformedKind::Absent,
            } => write!(f, "{name} ({oid}): local object missing"),
            TransferError::Malformed {
                name,
                oid,
                kind: MalformedKind::Corrupt,
            } => write!(f, "{name} ({oid}): local object does not match its oid"),
            TransferError::Failed { name, oid, message } => {
                write!(f, "{name} ({oid}): {message}")
            }
            TransferError::Batch { message } => write!(f, "batch: {message}"),
        }
    }
}

/// Progress notifications from the engine's worker pool.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Started { name: String, size: u64 },
    Finished { name: String, size: u64 },
    Failed { name: String },
}

pub type TransferObserver = Arc<dyn Fn(TransferEvent) + Send + Sync>;

#[derive(Clone)]
pub struct QueueOptions {
    /// Objects per batch announcement.
    pub batch_size: usize,
    /// Upload worker threads per batch.
    pub workers: usize,
    /// Pass descriptors through without any network activity.
    pub dry_run: bool,
    /// Skip objects that are absent at upload time instead of failing them.
    pub allow_incomplete: bool,
    pub observer: Option<TransferObserver>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            workers: 8,
            dry_run: false,
            allow_incomplete: false,
            observer: None,
        }
    }
}

/// The transfer engine: a collector thread groups incoming descriptors into
/// batch announcements and uploads whatever the server asks for on a scoped
/// worker pool. Errors are held back until [`TransferQueue::wait`].
pub struct TransferQueue {
    tx: Option<Sender<Transfer>>,
    collector: Option<JoinHandle<Vec<TransferError>>>,
    errors: Vec<TransferError>,
}

impl TransferQueue {
    pub fn new(transport: Arc<dyn ObjectTransport>, options: QueueOptions) -> Self {
        let (tx, rx) = bounded(options.batch_size.max(1) * 2);
        let collector = thread::spawn(move || collect(rx, transport, options));
        Self {
            tx: Some(tx),
            collector: Some(collector),
            errors: Vec::new(),
        }
    }

    /// Hand one descriptor to the engine. Blocks only on channel backpressure.
    pub fn add(&self, transfer: Transfer) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(transfer);
        }
    }

    /// Close the queue and block until every in-flight transfer resolves.
    pub fn wait(&mut self) {
        self.tx = None;
        if let Some(collector) = self.collector.take() {
            match collector.join() {
                Ok(errors) => self.errors = errors,
                Err(_) => self.errors.push(TransferError::Batch {
                    message: "transfer collector panicked".into(),
                }),
            }
        }
    }

    /// Errors accumulated by the drained queue. Empty before `wait`.
    pub fn errors(&self) -> &[TransferError] {
        &self.errors
    }
}

fn collect(
    rx: Receiver<Transfer>,
    transport: Arc<dyn ObjectTransport>,
    options: QueueOptions,
) -> Vec<TransferError> {
    let flush_at = options.batch_size.max(1);
    let mut errors = Vec::new();
    let mut batch = Vec::with_capacity(flush_at);
    for transfer in rx.iter() {
        batch.push(transfer);
        if batch.len() >= flush_at {
            run_batch(std::mem::take(&mut batch), transport.as_ref(), &options, &mut errors);
        }
    }
    if !batch.is_empty() {
        run_batch(batch, transport.as_ref(), &options, &mut errors);
    }
    errors
}

fn run_batch(
    batch: Vec<Transfer>,
    transport: &dyn ObjectTransport,
    options: &QueueOptions,
    errors: &mut Vec<TransferError>,
) {
    if options.dry_run {
        for t in &batch {
            emit(options, TransferEvent::Finished {
                name: t.name.clone(),
                size: t.size,
            });
        }
        return;
    }

    let specs: Vec<BatchObjectSpec> = batch
        .iter()
        .map(|t| BatchObjectSpec {
            oid: t.oid,
            size: t.size,
        })
        .collect();
    debug!(objects = specs.len(), "announcing batch");
    let results = match transport.batch_upload(&specs) {
        Ok(results) => results,
        Err(e) => {
            for t in &batch {
                emit(options, TransferEvent::Failed {
                    name: t.name.clone(),
                });
            }
            errors.push(TransferError::Batch {
                message: e.to_string(),
            });
            return;
        }
    };
    let mut verdicts: HashMap<Oid, BatchObjectResult> =
        results.into_iter().map(|r| (r.oid, r)).collect();

    let mut jobs: Vec<(Transfer, UploadEndpoint)> = Vec::new();
    for t in batch {
        let Some(verdict) = verdicts.remove(&t.oid) else {
            emit(options, TransferEvent::Failed {
                name: t.name.clone(),
            });
            errors.push(TransferError::Failed {
                name: t.name,
                oid: t.oid,
                message: "server response does not mention this object".into(),
            });
            continue;
        };
        if let Some(object_error) = verdict.error {
            emit(options, TransferEvent::Failed {
                name: t.name.clone(),
            });
            errors.push(TransferError::Failed {
                name: t.name,
                oid: t.oid,
                message: format!(
                    "server refused object: {} (code {})",
                    object_error.message, object_error.code
                ),
            });
            continue;
        }
        match verdict.actions.and_then(|a| a.upload) {
            Some(endpoint) => jobs.push((t, endpoint)),
            None => {
                // Server already has it.
                debug!(name = %t.name, oid = %t.oid, "object already present on remote");
                emit(options, TransferEvent::Finished {
                    name: t.name.clone(),
                    size: t.size,
                });
            }
        }
    }
    if jobs.is_empty() {
        return;
    }

    let workers = options.workers.clamp(1, jobs.len());
    let (work_tx, work_rx) = bounded::<(Transfer, UploadEndpoint)>(workers * 2);
    let (done_tx, done_rx) = bounded::<Option<TransferError>>(workers * 2);
    thread::scope(|s| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            s.spawn(move || {
                for (transfer, endpoint) in work_rx.iter() {
                    let outcome = upload_one(&transfer, &endpoint, transport, options);
                    if done_tx.send(outcome).is_err() {
                        return;
                    }
                }
            });
        }
        drop(work_rx);
        drop(done_tx);
        s.spawn(move || {
            for job in jobs {
                if work_tx.send(job).is_err() {
                    return;
                }
            }
        });
        for outcome in done_rx.iter() {
            if let Some(err) = outcome {
                errors.push(err);
            }
        }
    });
}

enum LocalCheck {
    Ready,
    SkippedAbsent,
    Bad(TransferError),
}

fn upload_one(
    transfer: &Transfer,
    endpoint: &UploadEndpoint,
    transport: &dyn ObjectTransport,
    options: &QueueOptions,
) -> Option<TransferError> {
    emit(options, TransferEvent::Started {
        name: transfer.name.clone(),
        size: transfer.size,
    });
    if transfer.missing {
        emit(options, TransferEvent::Failed {
            name: transfer.name.clone(),
        });
        return Some(TransferError::Malformed {
            name: transfer.name.clone(),
            oid: transfer.oid,
            kind: MalformedKind::Absent,
        });
    }
    match check_local(transfer, options.allow_incomplete) {
        LocalCheck::Ready => {}
        LocalCheck::SkippedAbsent => {
            emit(options, TransferEvent::Finished {
                name: transfer.name.clone(),
                size: transfer.size,
            });
            return None;
        }
        LocalCheck::Bad(err) => {
            emit(options, TransferEvent::Failed {
                name: transfer.name.clone(),
            });
            return Some(err);
        }
    }
    match transport.upload(endpoint, &transfer.path, transfer.size) {
        Ok(()) => {
            emit(options, TransferEvent::Finished {
                name: transfer.name.clone(),
                size: transfer.size,
            });
            None
        }
        Err(e) => {
            emit(options, TransferEvent::Failed {
                name: transfer.name.clone(),
            });
            Some(TransferError::Failed {
                name: transfer.name.clone(),
                oid: transfer.oid,
                message: e.to_string(),
            })
        }
    }
}

/// Validate the local file against the descriptor before spending network on it.
fn check_local(transfer: &Transfer, allow_incomplete: bool) -> LocalCheck {
    let md = match std::fs::metadata(&transfer.path) {
        Ok(md) => md,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if allow_incomplete {
                warn!(
                    name = %transfer.name,
                    oid = %transfer.oid,
                    "local object absent; continuing without it"
                );
                return LocalCheck::SkippedAbsent;
            }
            return LocalCheck::Bad(TransferError::Malformed {
                name: transfer.name.clone(),
                oid: transfer.oid,
                kind: MalformedKind::Absent,
            });
        }
        Err(e) => {
            return LocalCheck::Bad(TransferError::Failed {
                name: transfer.name.clone(),
                oid: transfer.oid,
                message: format!("stat {}: {e}", transfer.path.display()),
            });
        }
    };
    if md.len() != transfer.size {
        return LocalCheck::Bad(TransferError::Malformed {
            name: transfer.name.clone(),
            oid: transfer.oid,
            kind: MalformedKind::Corrupt,
        });
    }
    match hash_file(&transfer.path) {
        Ok(oid) if oid == transfer.oid => LocalCheck::Ready,
        Ok(_) => LocalCheck::Bad(TransferError::Malformed {
            name: transfer.name.clone(),
            oid: transfer.oid,
            kind: MalformedKind::Corrupt,
        }),
        Err(e) => LocalCheck::Bad(TransferError::Failed {
            name: transfer.name.clone(),
            oid: transfer.oid,
            message: format!("read {}: {e}", transfer.path.display()),
        }),
    }
}

fn hash_file(path: &Path) -> io::Result<Oid> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Ok(Oid(out))
}

fn emit(options: &QueueOptions, event: TransferEvent) {
    if let Some(observer) = &options.observer {
        observer(event);
    }
}
