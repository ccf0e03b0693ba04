use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use heft_remote::{TransferEvent, TransferObserver};

/// Point-in-time copy of the meter counters, handed to the observer.
#[derive(Debug, Clone, Default)]
pub struct MeterSnapshot {
    pub total_objects: u64,
    pub total_bytes: u64,
    pub done_objects: u64,
    pub done_bytes: u64,
    /// Name of the most recently started transfer.
    pub current: String,
}

/// Shared transfer progress across every ref update in a push.
///
/// Totals grow as the scan admits objects while done counters trail behind
/// from the worker pool; a snapshot is only ever an estimate. All counter
/// updates are atomic; only the current-object label takes a lock.
pub struct Meter {
    total_objects: AtomicU64,
    total_bytes: AtomicU64,
    done_objects: AtomicU64,
    done_bytes: AtomicU64,
    current: Mutex<String>,
    observer: Option<Box<dyn Fn(MeterSnapshot) + Send + Sync>>,
}

impl Meter {
    pub fn new(observer: impl Fn(MeterSnapshot) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            total_objects: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            done_objects: AtomicU64::new(0),
            done_bytes: AtomicU64::new(0),
            current: Mutex::new(String::new()),
            observer: Some(Box::new(observer)),
        })
    }

    /// A meter that counts but never notifies anyone.
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self {
            total_objects: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            done_objects: AtomicU64::new(0),
            done_bytes: AtomicU64::new(0),
            current: Mutex::new(String::new()),
            observer: None,
        })
    }

    /// Count one admitted object towards the expected totals.
    pub fn add(&self, size: u64) {
        self.total_objects.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        self.notify();
    }

    pub fn start_object(&self, name: &str) {
        if let Ok(mut current) = self.current.lock() {
            current.clear();
            current.push_str(name);
        }
        self.notify();
    }

    pub fn finish_object(&self, size: u64) {
        self.done_objects.fetch_add(1, Ordering::Relaxed);
        self.done_bytes.fetch_add(size, Ordering::Relaxed);
        self.notify();
    }

    /// Failed transfers still count as settled so the meter can reach its end.
    pub fn fail_object(&self) {
        self.done_objects.fetch_add(1, Ordering::Relaxed);
        self.notify();
    }

    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            current.clear();
        }
        self.notify();
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            total_objects: self.total_objects.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            done_objects: self.done_objects.load(Ordering::Relaxed),
            done_bytes: self.done_bytes.load(Ordering::Relaxed),
            current: self
                .current
                .lock()
                .map(|c| c.clone())
                .unwrap_or_default(),
        }
    }

    fn notify(&self) {
        if let Some(observer) = &self.observer {
            observer(self.snapshot());
        }
    }
}

/// Bridge transfer engine events into the meter.
pub fn transfer_observer(meter: Arc<Meter>) -> TransferObserver {
    Arc::new(move |event| match event {
        TransferEvent::Started { name, .. } => meter.start_object(&name),
        TransferEvent::Finished { size, .. } => meter.finish_object(size),
        TransferEvent::Failed { .. } => meter.fail_object(),
    })
}
