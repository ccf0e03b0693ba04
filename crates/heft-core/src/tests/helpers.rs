use std::sync::Arc;

use heft_types::Oid;

use crate::config::PushConfig;
use crate::locks::VerifyMode;
use crate::pointer::PointerRecord;
use crate::progress::Meter;
use crate::session::UploadSession;
use crate::store::LocalStore;
use crate::testutil::{GitFixture, SharedBuf};

pub fn test_config() -> PushConfig {
    PushConfig {
        remote: "origin".into(),
        endpoint: "https://example.com/store".into(),
        token: None,
        allow_incomplete_push: false,
        batch_size: 100,
        concurrent_transfers: 2,
        retries: 0,
        locks_verify: VerifyMode::Undefined,
        committer_name: Some("A Dev".into()),
        committer_email: Some("dev@example.com".into()),
        dry_run: false,
    }
}

/// Session over the fixture's object store, with handles on the meter and
/// the dry-run output.
pub fn build_session(fx: &GitFixture, config: &PushConfig) -> (UploadSession, Arc<Meter>, SharedBuf) {
    let store = LocalStore::new(&fx.path().join(".git"));
    let meter = Meter::disabled();
    let out = SharedBuf::new();
    let session = UploadSession::new(config, store, meter.clone(), Box::new(out.clone()));
    (session, meter, out)
}

/// A pointer record whose oid and size match `data`.
pub fn record(name: &str, data: &[u8]) -> PointerRecord {
    PointerRecord {
        name: name.to_string(),
        oid: Oid::compute(data),
        size: data.len() as u64,
    }
}

/// A pointer record with an arbitrary size field, detached from any content.
pub fn record_sized(name: &str, data: &[u8], size: u64) -> PointerRecord {
    PointerRecord {
        name: name.to_string(),
        oid: Oid::compute(data),
        size,
    }
}
