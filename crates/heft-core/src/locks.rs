use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use heft_remote::{LockClient, RemoteLock};
use heft_types::{HeftError, Result};

/// Lock verification policy for a push, from `heft.locksverify`.
///
/// `Undefined` means the user never chose: locks are still consulted and
/// conflicts reported, but they do not block the push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    Enabled,
    Disabled,
    Undefined,
}

impl VerifyMode {
    pub fn from_config(value: Option<&str>) -> Result<VerifyMode> {
        match value {
            None => Ok(VerifyMode::Undefined),
            Some(v) => match crate::config::parse_git_bool(v) {
                Some(true) => Ok(VerifyMode::Enabled),
                Some(false) => Ok(VerifyMode::Disabled),
                None => Err(HeftError::Config(format!(
                    "heft.locksverify: invalid boolean {v:?}"
                ))),
            },
        }
    }
}

/// Tracks which pushed paths are covered by server-side file locks.
///
/// Locks are fetched once per push and split by ownership against the local
/// committer identity. Every path that reaches the lock stage is matched so
/// the report can list both our own stale locks and conflicts with others.
pub struct LockVerifier {
    mode: VerifyMode,
    user: Option<String>,
    ours: HashMap<String, RemoteLock>,
    theirs: HashMap<String, RemoteLock>,
    owned_seen: BTreeMap<String, RemoteLock>,
    unowned_seen: BTreeMap<String, RemoteLock>,
}

impl LockVerifier {
    pub fn new(mode: VerifyMode, user: Option<String>) -> Self {
        Self {
            mode,
            user,
            ours: HashMap::new(),
            theirs: HashMap::new(),
            owned_seen: BTreeMap::new(),
            unowned_seen: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> VerifyMode {
        self.mode
    }

    /// Whether lock conflicts block the push.
    pub fn enforcing(&self) -> bool {
        self.mode == VerifyMode::Enabled
    }

    /// Fetch the current lock set for `refspec` and split it by ownership.
    ///
    /// With `Disabled` this is a no-op. A fetch failure is fatal only when
    /// the user explicitly enabled verification; otherwise the push proceeds
    /// as if no locks existed.
    pub fn refresh(&mut self, client: &dyn LockClient, refspec: Option<&str>) -> Result<()> {
        if self.mode == VerifyMode::Disabled {
            return Ok(());
        }
        let locks = match client.list_locks(refspec) {
            Ok(locks) => locks,
            Err(e) if self.mode == VerifyMode::Enabled => {
                return Err(HeftError::LockVerification(format!(
                    "cannot verify locks: {e}"
                )));
            }
            Err(e) => {
                warn!("lock listing failed, continuing without lock data: {e}");
                return Ok(());
            }
        };
        for lock in locks {
            let owned = match (&self.user, lock.owner.as_ref()) {
                (Some(user), Some(owner)) => owner.name == *user,
                _ => false,
            };
            if owned {
                self.ours.insert(lock.path.clone(), lock);
            } else {
                self.theirs.insert(lock.path.clone(), lock);
            }
        }
        Ok(())
    }

    /// Match one pushed path against the lock set, recording any hit.
    /// Returns true when someone else holds a lock on the path.
    pub fn check(&mut self, path: &str) -> bool {
        if self.mode == VerifyMode::Disabled {
            return false;
        }
        if let Some(lock) = self.ours.get(path) {
            self.owned_seen.insert(path.to_string(), lock.clone());
        }
        if let Some(lock) = self.theirs.get(path) {
            self.unowned_seen
                .insert(path.to_string(), lock.clone());
            return true;
        }
        false
    }

    /// Pushed paths we hold locks on, ordered by path.
    pub fn owned_locks(&self) -> &BTreeMap<String, RemoteLock> {
        &self.owned_seen
    }

    /// Pushed paths someone else holds locks on, ordered by path.
    pub fn unowned_locks(&self) -> &BTreeMap<String, RemoteLock> {
        &self.unowned_seen
    }
}
