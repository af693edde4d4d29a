//! Many callers working on one CA at the same time.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ledgerca::ca::{AuthorityLock, CertStatus, IndexLedger};
use ledgerca::commons::error::Error;

use common::{crl_serials, TestCa, NONE};

const THREADS: usize = 8;

#[test]
fn concurrent_issuance_yields_distinct_serials() {
    let ca = TestCa::new();
    let context = Arc::new(ca.open());

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let context = context.clone();
            thread::spawn(move || {
                context
                    .issue(&format!("host{}.example.net", i), &NONE, &NONE)
                    .unwrap()
                    .serial
            })
        })
        .collect();
    let serials: HashSet<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    assert_eq!(serials.len(), THREADS);
    assert_eq!(context.ledger().all().unwrap().len(), THREADS);
    assert_eq!(context.list(false).unwrap().count(), THREADS);
}

#[test]
fn separate_contexts_share_the_lock() {
    let ca = TestCa::new();
    let contexts: Vec<_> = (0..THREADS).map(|_| Arc::new(ca.open())).collect();

    let handles: Vec<_> = contexts
        .iter()
        .enumerate()
        .map(|(i, context)| {
            let context = context.clone();
            thread::spawn(move || {
                let record = context.issue(&format!("node{}.example.net", i), &NONE, &NONE).unwrap();
                if i % 2 == 0 {
                    context.revoke(record.serial.as_str()).unwrap();
                }
                record.serial
            })
        })
        .collect();
    let serials: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    assert_eq!(serials.iter().collect::<HashSet<_>>().len(), THREADS);

    let context = ca.open();
    let records = context.ledger().all().unwrap();
    assert_eq!(records.len(), THREADS);
    let revoked: HashSet<_> = records
        .iter()
        .filter(|record| record.status() == CertStatus::Revoked)
        .map(|record| record.serial.to_string())
        .collect();
    assert_eq!(revoked.len(), THREADS / 2);

    let on_crl: HashSet<_> = crl_serials(&context.current_crl().unwrap(), &ca.ca_cert())
        .into_iter()
        .collect();
    assert_eq!(on_crl, revoked);
}

#[test]
fn contended_lock_times_out() {
    let ca = TestCa::with_config(|config| config.lock_timeout_seconds = 1);
    let context = Arc::new(ca.open());

    let holder = AuthorityLock::new(&ca.config.lock_file(), Duration::from_secs(1));
    let result = holder.run(|| {
        let context = context.clone();
        let blocked = thread::spawn(move || context.issue("late.example.net", &NONE, &NONE));
        Ok(blocked.join().unwrap())
    });

    match result.unwrap() {
        Err(Error::LockTimeout(timeout)) => assert_eq!(timeout, Duration::from_secs(1)),
        other => panic!("expected a lock timeout, got {:?}", other.map(|record| record.serial)),
    }
    assert!(context.ledger().all().unwrap().is_empty());

    context.issue("later.example.net", &NONE, &NONE).unwrap();
}

#[test]
fn listing_runs_while_issuing() {
    let ca = TestCa::new();
    let context = Arc::new(ca.open());
    context.issue("seed.example.net", &NONE, &NONE).unwrap();

    let writer = {
        let context = context.clone();
        thread::spawn(move || {
            for i in 0..4 {
                context.issue(&format!("w{}.example.net", i), &NONE, &NONE).unwrap();
            }
        })
    };
    for _ in 0..4 {
        for view in context.list(true).unwrap() {
            assert!(view.note.is_none(), "{:?}", view.note);
        }
    }
    writer.join().unwrap();
    assert_eq!(context.list(false).unwrap().count(), 5);
}
