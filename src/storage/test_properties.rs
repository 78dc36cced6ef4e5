//! Property-based tests for allocator conservation invariants.
//!
//! Arbitrary sequences of commits and abandoned writes must never lose or
//! duplicate an identifier, and the capacity counter must always match what
//! is actually on disk.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;

use super::allocator::Allocator;
use super::id_pool::{is_valid_id, total_ids};
use crate::core::config::StorageConfig;

// ──────────────────── strategies ────────────────────

#[derive(Debug, Clone)]
enum Op {
    Commit(usize),
    Abandon,
    HoldThenCommit(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1usize..=40).prop_map(Op::Commit),
        2 => Just(Op::Abandon),
        1 => (1usize..=40).prop_map(Op::HoldThenCommit),
    ]
}

// ──────────────────── helpers ────────────────────

fn disk_state(dir: &Path, id_length: usize) -> (HashSet<String>, u64) {
    let mut ids = HashSet::new();
    let mut bytes = 0;
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        bytes += entry.metadata().unwrap().len();
        if is_valid_id(&name, id_length) {
            ids.insert(name);
        }
    }
    (ids, bytes)
}

fn write_and_commit(alloc: &Arc<Allocator>, bytes: usize) -> String {
    let lease = alloc.lease().unwrap();
    let before = alloc.stats();
    assert!(
        before.current_bytes < before.max_bytes,
        "acquired while at capacity: {before:?}"
    );
    fs::write(alloc.item_path(lease.id()), vec![b'p'; bytes]).unwrap();
    lease.commit(bytes as u64)
}

// ──────────────────── properties ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn identifiers_and_bytes_are_conserved(
        max_dir_size in 20u64..200,
        ops in prop::collection::vec(arb_op(), 1..80),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            directory: tmp.path().to_path_buf(),
            max_dir_size,
            max_item_size: 40,
            id_length: 1,
            gc: true,
        };
        let alloc = Arc::new(Allocator::open(&config, None).unwrap());
        let universe = total_ids(1);

        for op in ops {
            match op {
                Op::Commit(bytes) => {
                    write_and_commit(&alloc, bytes);
                }
                Op::Abandon => {
                    let lease = alloc.lease().unwrap();
                    drop(lease);
                }
                Op::HoldThenCommit(bytes) => {
                    // An in-flight identifier must survive eviction by another writer.
                    let held = alloc.lease().unwrap();
                    let held_id = held.id().to_string();
                    write_and_commit(&alloc, bytes);
                    fs::write(alloc.item_path(&held_id), b"h").unwrap();
                    held.commit(1);
                }
            }

            let stats = alloc.stats();
            let (on_disk, bytes) = disk_state(tmp.path(), 1);
            prop_assert_eq!(stats.in_flight, 0);
            prop_assert_eq!(stats.free_ids + on_disk.len(), universe);
            prop_assert_eq!(stats.current_bytes, bytes);
        }
    }

    #[test]
    fn concurrent_leases_are_distinct(count in 1usize..=36) {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            directory: tmp.path().to_path_buf(),
            max_dir_size: 1_000,
            max_item_size: 10,
            id_length: 1,
            gc: false,
        };
        let alloc = Arc::new(Allocator::open(&config, None).unwrap());

        let leases: Vec<_> = (0..count).map(|_| alloc.lease().unwrap()).collect();
        let ids: HashSet<&str> = leases.iter().map(|l| l.id()).collect();
        prop_assert_eq!(ids.len(), count);
        prop_assert_eq!(alloc.stats().in_flight, count);
        prop_assert_eq!(alloc.stats().free_ids, 36 - count);

        drop(leases);
        prop_assert_eq!(alloc.stats().free_ids, 36);
    }
}
