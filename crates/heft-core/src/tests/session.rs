use std::sync::Arc;

use heft_types::{HeftError, Oid};

use crate::locks::VerifyMode;
use crate::store::LocalStore;
use crate::testutil::{GitFixture, MemoryTransport, StaticLockClient, lock};

use super::helpers::{build_session, record, record_sized, test_config};

#[test]
fn admit_dedups_oids_within_batch() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    fx.store_object(b"bravo");
    let (mut session, _, _) = build_session(&fx, &test_config());

    let transfers = session
        .admit(vec![
            record("one/a.bin", b"alpha"),
            record("two/a.bin", b"alpha"),
            record("b.bin", b"bravo"),
        ])
        .unwrap();
    let names: Vec<&str> = transfers.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["one/a.bin", "b.bin"]);
}

#[test]
fn admit_skips_already_uploaded_oid() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let (mut session, _, _) = build_session(&fx, &test_config());

    session.set_uploaded(Oid::compute(b"alpha"));
    let transfers = session.admit(vec![record("a.bin", b"alpha")]).unwrap();
    assert!(transfers.is_empty());
}

#[test]
fn enqueue_dedups_across_calls() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let transport = Arc::new(MemoryTransport::default());
    let (mut session, _, _) = build_session(&fx, &test_config());
    let mut queue = session.new_queue(transport.clone());

    session.enqueue(&queue, record("a.bin", b"alpha")).unwrap();
    session
        .enqueue(&queue, record("same/object.bin", b"alpha"))
        .unwrap();
    session.collect_errors(&mut queue);

    assert!(session.finish().other_errors.is_empty());
    assert_eq!(transport.uploaded().len(), 1);
}

#[test]
fn admit_skips_zero_size_records() {
    let fx = GitFixture::new();
    let (mut session, _, _) = build_session(&fx, &test_config());

    let transfers = session
        .admit(vec![record_sized("empty.bin", b"ignored", 0)])
        .unwrap();
    assert!(transfers.is_empty());
}

#[test]
fn enabled_lock_verification_blocks_conflicting_path() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let mut config = test_config();
    config.locks_verify = VerifyMode::Enabled;
    let (mut session, _, _) = build_session(&fx, &config);

    let client = StaticLockClient::with_locks(vec![lock("1", "a.bin", Some("Someone Else"))]);
    session.locks_mut().refresh(&client, None).unwrap();

    let transfers = session.admit(vec![record("a.bin", b"alpha")]).unwrap();
    assert!(transfers.is_empty());

    let summary = session.finish();
    assert_eq!(
        summary.unowned_locks,
        vec![("a.bin".to_string(), "Someone Else".to_string())]
    );
}

#[test]
fn undefined_mode_admits_conflicting_path_but_records_it() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let (mut session, _, _) = build_session(&fx, &test_config());

    let client = StaticLockClient::with_locks(vec![lock("1", "a.bin", Some("Someone Else"))]);
    session.locks_mut().refresh(&client, None).unwrap();

    let transfers = session.admit(vec![record("a.bin", b"alpha")]).unwrap();
    assert_eq!(transfers.len(), 1);

    let summary = session.finish();
    assert_eq!(summary.unowned_locks.len(), 1);
}

#[test]
fn disabled_mode_never_consults_the_lock_client() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let mut config = test_config();
    config.locks_verify = VerifyMode::Disabled;
    let (mut session, _, _) = build_session(&fx, &config);

    let client = StaticLockClient::with_locks(vec![lock("1", "a.bin", Some("Someone Else"))]);
    session.locks_mut().refresh(&client, None).unwrap();
    assert!(client.requests.lock().unwrap().is_empty());

    let transfers = session.admit(vec![record("a.bin", b"alpha")]).unwrap();
    assert_eq!(transfers.len(), 1);
    assert!(session.finish().unowned_locks.is_empty());
}

#[test]
fn own_lock_is_recorded_but_never_blocks() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let mut config = test_config();
    config.locks_verify = VerifyMode::Enabled;
    let (mut session, _, _) = build_session(&fx, &config);

    let client = StaticLockClient::with_locks(vec![lock("1", "a.bin", Some("A Dev"))]);
    session.locks_mut().refresh(&client, None).unwrap();

    let transfers = session.admit(vec![record("a.bin", b"alpha")]).unwrap();
    assert_eq!(transfers.len(), 1);

    let summary = session.finish();
    assert_eq!(summary.owned_locks, vec!["a.bin".to_string()]);
    assert!(summary.unowned_locks.is_empty());
}

#[test]
fn absent_object_marks_descriptor_missing() {
    let fx = GitFixture::new();
    let (session, _, _) = build_session(&fx, &test_config());

    let transfer = session.transfer_for(&record("a.bin", b"never stored")).unwrap();
    assert!(transfer.missing);
}

#[test]
fn absent_object_with_allowance_is_not_missing() {
    let fx = GitFixture::new();
    let mut config = test_config();
    config.allow_incomplete_push = true;
    let (session, _, _) = build_session(&fx, &config);

    let transfer = session.transfer_for(&record("a.bin", b"never stored")).unwrap();
    assert!(!transfer.missing);
}

#[test]
fn present_object_is_not_missing() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let (session, _, _) = build_session(&fx, &test_config());

    let transfer = session.transfer_for(&record("a.bin", b"alpha")).unwrap();
    assert!(!transfer.missing);
    assert!(transfer.path.is_file());
}

#[test]
fn unreadable_store_path_is_fatal() {
    let fx = GitFixture::new();
    let (session, _, _) = build_session(&fx, &test_config());

    // A regular file where the first fan-out directory should be makes the
    // stat fail with something other than NotFound.
    let rec = record("a.bin", b"alpha");
    let store = LocalStore::new(&fx.path().join(".git"));
    let fanout = store.object_path(&rec.oid);
    let blocker = fanout.parent().unwrap().parent().unwrap();
    std::fs::create_dir_all(blocker.parent().unwrap()).unwrap();
    std::fs::write(blocker, b"not a directory").unwrap();

    let err = session.transfer_for(&rec).unwrap_err();
    assert!(matches!(err, HeftError::ObjectRead { .. }), "got: {err}");
}

#[test]
fn meter_counts_admitted_sizes_immediately() {
    let fx = GitFixture::new();
    let (mut session, meter, _) = build_session(&fx, &test_config());

    // One present object, one absent: both are admitted, both count.
    fx.store_object(b"alpha");
    session
        .admit(vec![
            record("a.bin", b"alpha"),
            record("gone.bin", b"never stored"),
            record_sized("empty.bin", b"ignored", 0),
        ])
        .unwrap();

    let snap = meter.snapshot();
    assert_eq!(snap.total_objects, 2);
    assert_eq!(snap.total_bytes, 5 + 12);
}

#[test]
fn lock_blocked_records_do_not_feed_the_meter() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let mut config = test_config();
    config.locks_verify = VerifyMode::Enabled;
    let (mut session, meter, _) = build_session(&fx, &config);

    let client = StaticLockClient::with_locks(vec![lock("1", "a.bin", Some("Someone Else"))]);
    session.locks_mut().refresh(&client, None).unwrap();
    session.admit(vec![record("a.bin", b"alpha")]).unwrap();

    assert_eq!(meter.snapshot().total_objects, 0);
}

#[test]
fn dry_run_prints_once_per_oid_and_never_queues() {
    let fx = GitFixture::new();
    fx.store_object(b"alpha");
    let mut config = test_config();
    config.dry_run = true;
    let transport = Arc::new(MemoryTransport::default());
    let (mut session, _, out) = build_session(&fx, &config);
    let mut queue = session.new_queue(transport.clone());

    let a = record("a.bin", b"alpha");
    session.enqueue(&queue, a.clone()).unwrap();
    session.enqueue(&queue, record("copy/a.bin", b"alpha")).unwrap();
    session.enqueue(&queue, record("b.bin", b"bravo")).unwrap();
    session.collect_errors(&mut queue);

    let text = out.contents();
    let lines: Vec<&str> = text.lines().collect();
    let first = format!("push {} => a.bin", a.oid);
    let second = format!("push {} => b.bin", Oid::compute(b"bravo"));
    assert_eq!(lines, vec![first.as_str(), second.as_str()]);
    assert!(transport.batches().is_empty());
    assert!(transport.uploaded().is_empty());
}

#[test]
fn collect_errors_sorts_kinds_into_buckets() {
    let fx = GitFixture::new();
    let transport = Arc::new(MemoryTransport::default());
    let (mut session, _, _) = build_session(&fx, &test_config());
    let mut queue = session.new_queue(transport.clone());

    // Absent object: no local file at all.
    let absent = record("absent.bin", b"nowhere");
    // Corrupt object: right size, wrong bytes.
    let corrupt = record("corrupt.bin", b"good content");
    let store = LocalStore::new(&fx.path().join(".git"));
    let path = store.object_path(&corrupt.oid);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"evil content").unwrap();
    // Rejected object: server refuses it at announcement.
    let rejected = record("rejected.bin", b"forbidden");
    fx.store_object(b"forbidden");
    transport.reject.lock().unwrap().insert(rejected.oid);

    session.enqueue(&queue, absent.clone()).unwrap();
    session.enqueue(&queue, corrupt.clone()).unwrap();
    session.enqueue(&queue, rejected.clone()).unwrap();
    session.collect_errors(&mut queue);

    let summary = session.finish();
    assert_eq!(summary.missing.get("absent.bin"), Some(&absent.oid));
    assert_eq!(summary.corrupt.get("corrupt.bin"), Some(&corrupt.oid));
    assert_eq!(summary.other_errors.len(), 1);
    assert!(
        summary.other_errors[0].to_string().contains("rejected"),
        "got: {}",
        summary.other_errors[0]
    );
}

#[test]
fn session_overwrites_bucket_for_path_across_updates() {
    let fx = GitFixture::new();
    let transport = Arc::new(MemoryTransport::default());
    let (mut session, _, _) = build_session(&fx, &test_config());

    // Two sequential ref updates classify the same path; the second verdict
    // is the one the report sees.
    let first = record("media/clip.bin", b"version one");
    let mut queue = session.new_queue(transport.clone());
    session.enqueue(&queue, first.clone()).unwrap();
    session.collect_errors(&mut queue);

    let second = record("media/clip.bin", b"version two");
    let mut queue = session.new_queue(transport.clone());
    session.enqueue(&queue, second.clone()).unwrap();
    session.collect_errors(&mut queue);

    let summary = session.finish();
    assert_eq!(summary.missing.len(), 1);
    assert_eq!(summary.missing.get("media/clip.bin"), Some(&second.oid));
}

#[test]
fn finish_carries_policy_flags() {
    let fx = GitFixture::new();
    let mut config = test_config();
    config.allow_incomplete_push = true;
    config.locks_verify = VerifyMode::Enabled;
    let (session, _, _) = build_session(&fx, &config);

    let summary = session.finish();
    assert!(summary.allow_incomplete);
    assert_eq!(summary.lock_mode, VerifyMode::Enabled);
}
