use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use heft_remote::rest::{
    BatchObjectResult, BatchObjectSpec, LockOwner, ObjectActions, ObjectError, RemoteLock,
    UploadEndpoint,
};
use heft_remote::{LockClient, ObjectTransport};
use heft_types::{HeftError, Oid, Result};

use crate::pointer::{Pointer, PointerRecord};
use crate::scan::{PointerSource, ScanCallback, ScanItem};
use crate::store::LocalStore;

/// Temporary git repository driven through the real git binary.
pub struct GitFixture {
    dir: tempfile::TempDir,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let fx = Self { dir };
        fx.git(&["init", "-b", "main"]);
        fx.git(&["config", "user.name", "A Dev"]);
        fx.git(&["config", "user.email", "dev@example.com"]);
        fx.git(&["config", "commit.gpgsign", "false"]);
        fx
    }

    /// A bare repository, usable as a push destination.
    pub fn bare() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let fx = Self { dir };
        fx.git(&["init", "--bare"]);
        fx
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .arg("-C")
            .arg(self.dir.path())
            .args(args)
            .output()
            .expect("failed to run git");
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Write a file, commit it, return the commit sha.
    pub fn commit_file(&self, name: &str, content: &str) -> String {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(&path, content).expect("failed to write file");
        self.git(&["add", "."]);
        self.git(&["commit", "-m", &format!("add {name}")]);
        self.head()
    }

    /// Commit a pointer file standing for `content` and return its record.
    pub fn commit_pointer(&self, name: &str, content: &[u8]) -> PointerRecord {
        let pointer = Pointer {
            oid: Oid::compute(content),
            size: content.len() as u64,
        };
        self.commit_file(name, &pointer.to_string());
        PointerRecord {
            name: name.to_string(),
            oid: pointer.oid,
            size: pointer.size,
        }
    }

    /// Place `content` into the local object store, as a clean checkout
    /// with fully present objects would have it.
    pub fn store_object(&self, content: &[u8]) -> Oid {
        let oid = Oid::compute(content);
        let store = LocalStore::new(&self.dir.path().join(".git"));
        let path = store.object_path(&oid);
        std::fs::create_dir_all(path.parent().expect("object path has no parent"))
            .expect("failed to create store dirs");
        std::fs::write(&path, content).expect("failed to write object");
        oid
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"]).trim().to_string()
    }
}

/// Transport double: records announcements and uploads, with switches for
/// the failure modes the session must classify.
#[derive(Default)]
pub struct MemoryTransport {
    pub stored: Mutex<HashSet<Oid>>,
    pub uploaded: Mutex<Vec<Oid>>,
    pub batches: Mutex<Vec<usize>>,
    pub reject: Mutex<HashSet<Oid>>,
    pub fail_uploads: Mutex<HashSet<Oid>>,
}

impl MemoryTransport {
    pub fn uploaded(&self) -> Vec<Oid> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

impl ObjectTransport for MemoryTransport {
    fn batch_upload(&self, objects: &[BatchObjectSpec]) -> Result<Vec<BatchObjectResult>> {
        self.batches.lock().unwrap().push(objects.len());
        Ok(objects
            .iter()
            .map(|o| {
                let (actions, error) = if self.reject.lock().unwrap().contains(&o.oid) {
                    (
                        None,
                        Some(ObjectError {
                            code: 422,
                            message: "rejected by test".into(),
                        }),
                    )
                } else if self.stored.lock().unwrap().contains(&o.oid) {
                    (None, None)
                } else {
                    (
                        Some(ObjectActions {
                            upload: Some(UploadEndpoint {
                                href: format!("mem://{}", o.oid),
                                header: HashMap::new(),
                            }),
                        }),
                        None,
                    )
                };
                BatchObjectResult {
                    oid: o.oid,
                    size: o.size,
                    actions,
                    error,
                }
            })
            .collect())
    }

    fn upload(&self, endpoint: &UploadEndpoint, _path: &Path, _size: u64) -> Result<()> {
        let hex = endpoint.href.strip_prefix("mem://").unwrap();
        let oid = Oid::from_hex(hex).unwrap();
        if self.fail_uploads.lock().unwrap().contains(&oid) {
            return Err(HeftError::Remote("upload refused by test".into()));
        }
        self.uploaded.lock().unwrap().push(oid);
        Ok(())
    }
}

/// Lock client double serving a fixed lock set.
#[derive(Default)]
pub struct StaticLockClient {
    pub locks: Vec<RemoteLock>,
    pub fail: bool,
    pub requests: Mutex<Vec<Option<String>>>,
}

impl StaticLockClient {
    pub fn with_locks(locks: Vec<RemoteLock>) -> Self {
        Self {
            locks,
            ..Default::default()
        }
    }
}

impl LockClient for StaticLockClient {
    fn list_locks(&self, refspec: Option<&str>) -> Result<Vec<RemoteLock>> {
        self.requests
            .lock()
            .unwrap()
            .push(refspec.map(str::to_string));
        if self.fail {
            return Err(HeftError::Remote("lock listing unavailable".into()));
        }
        Ok(self.locks.clone())
    }
}

pub fn lock(id: &str, path: &str, owner: Option<&str>) -> RemoteLock {
    RemoteLock {
        id: id.to_string(),
        path: path.to_string(),
        owner: owner.map(|name| LockOwner {
            name: name.to_string(),
        }),
    }
}

/// Scanner double replaying scripted deliveries, one batch per scan call.
/// With `concurrent` set, each batch is delivered from two threads at once.
#[derive(Default)]
pub struct ScriptedScanner {
    pub batches: Mutex<VecDeque<Vec<ScriptItem>>>,
    pub concurrent: bool,
    pub calls: Mutex<Vec<ScanCall>>,
}

pub enum ScriptItem {
    Record(PointerRecord),
    Err(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCall {
    pub tip: String,
    pub exclude: Vec<String>,
    pub push_all: bool,
}

impl ScriptedScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, items: Vec<ScriptItem>) {
        self.batches.lock().unwrap().push_back(items);
    }

    fn deliver(&self, cb: &ScanCallback<'_>) {
        let Some(batch) = self.batches.lock().unwrap().pop_front() else {
            return;
        };
        let items: Vec<ScanItem> = batch
            .into_iter()
            .map(|item| match item {
                ScriptItem::Record(record) => ScanItem::Record(record),
                ScriptItem::Err(msg) => ScanItem::Err(HeftError::Scan(msg)),
            })
            .collect();
        if self.concurrent {
            let halfway = items.len() / 2;
            let mut first: Vec<ScanItem> = items;
            let second = first.split_off(halfway);
            std::thread::scope(|s| {
                s.spawn(|| {
                    for item in first {
                        cb(item);
                    }
                });
                s.spawn(|| {
                    for item in second {
                        cb(item);
                    }
                });
            });
        } else {
            for item in items {
                cb(item);
            }
        }
    }
}

impl PointerSource for ScriptedScanner {
    fn scan_ref_with_deleted(&self, tip: &str, cb: &ScanCallback<'_>) -> Result<()> {
        self.calls.lock().unwrap().push(ScanCall {
            tip: tip.to_string(),
            exclude: Vec::new(),
            push_all: true,
        });
        self.deliver(cb);
        Ok(())
    }

    fn scan_multi_range(
        &self,
        tip: &str,
        exclude: &[String],
        cb: &ScanCallback<'_>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(ScanCall {
            tip: tip.to_string(),
            exclude: exclude.to_vec(),
            push_all: false,
        });
        self.deliver(cb);
        Ok(())
    }
}

/// Clonable write sink for capturing dry-run output.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
