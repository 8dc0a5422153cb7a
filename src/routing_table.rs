// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Concurrent routing table (C3).
//!
//! A single immutable snapshot of [`RouteEntry`] values is referenced by an
//! [`ArcSwap`] pointer. Readers load the current snapshot and scan it
//! lock-free; writers serialize on a [`parking_lot::Mutex`], build a new
//! snapshot by copy-on-write, publish it, then drain any reader still
//! holding the retired snapshot before it is dropped.
//!
//! Mutation is rare relative to lookup (capability advertisements trickle
//! in over gossip; lookups happen on every forwarded frame), so the
//! asymmetry between a lock-free read path and a mutex-serialized write
//! path is the right tradeoff here, matching the reference implementation's
//! own RCU-style double buffer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::node_id::NodeId;
use crate::offload::{NullOffload, OffloadClient};
use crate::sad::Sad;
use crate::scoring::{self, ResolveResult, ScoringWeights};

/// Default capacity a freshly created table's first snapshot is sized for.
/// Chosen to cover a small fabric without an immediate reallocation; the
/// table grows by doubling past this point.
pub const DEFAULT_CAPACITY: usize = 64;

/// A node's advertised capabilities plus its live, gossip-maintained metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub node_id: NodeId,
    /// The node's capability SAD, as received in its last `ADVERTISE`.
    pub capabilities: Sad,
    pub latency_us: u32,
    /// Normalized load in `[0, 1]`.
    pub load_factor: f32,
    pub cost_milli: u32,
    pub trust_level: u8,
    pub region_code: u16,
    /// Monotonic nanosecond timestamp of the last write to this entry.
    pub last_updated: u64,
    /// 0 means permanent; otherwise the entry expires `ttl_ns` after
    /// `last_updated`.
    pub ttl_ns: u64,
}

impl RouteEntry {
    /// True if this entry has an expiring TTL and has outlived it as of
    /// `now_ns`.
    fn is_expired(&self, now_ns: u64) -> bool {
        self.ttl_ns != 0 && now_ns.saturating_sub(self.last_updated) > self.ttl_ns
    }
}

/// An immutable, published array of route entries. Readers bump `readers`
/// on acquire and drop it on release; a writer retiring this snapshot
/// spins (yielding) until `readers` returns to zero before letting it go.
struct Snapshot {
    entries: Vec<RouteEntry>,
    readers: AtomicUsize,
}

impl Snapshot {
    fn new(entries: Vec<RouteEntry>) -> Self {
        Snapshot {
            entries,
            readers: AtomicUsize::new(0),
        }
    }
}

/// RAII guard bumping and releasing a snapshot's reader count around a
/// lock-free lookup. The increment happens-before the scan and the
/// decrement happens-after it, so a concurrent drain never observes a
/// reader mid-scan as "gone".
struct ReaderGuard(Arc<Snapshot>);

impl ReaderGuard {
    fn acquire(snap: Arc<Snapshot>) -> Self {
        snap.readers.fetch_add(1, Ordering::AcqRel);
        ReaderGuard(snap)
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The concurrent routing table. Lock-free lookup, mutex-serialized
/// mutation, quiescence-based reclamation of retired snapshots. Every
/// successful mutation is mirrored onto an injected [`OffloadClient`]
/// (a [`NullOffload`] no-op by default).
pub struct RoutingTable {
    current: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
    weights: ScoringWeights,
    offload: Arc<dyn OffloadClient>,
}

impl RoutingTable {
    /// Create an empty table with the default scoring weights and no
    /// offload collaborator.
    pub fn new() -> Self {
        Self::with_weights(ScoringWeights::default())
    }

    /// Create an empty table using custom scoring weights for every lookup.
    pub fn with_weights(weights: ScoringWeights) -> Self {
        RoutingTable {
            current: ArcSwap::new(Arc::new(Snapshot::new(Vec::with_capacity(
                DEFAULT_CAPACITY,
            )))),
            write_lock: Mutex::new(()),
            weights,
            offload: Arc::new(NullOffload),
        }
    }

    /// Wire in an offload collaborator to mirror every mutation onto
    /// (builder style).
    pub fn with_offload(mut self, offload: Arc<dyn OffloadClient>) -> Self {
        self.offload = offload;
        self
    }

    fn acquire(&self) -> ReaderGuard {
        ReaderGuard::acquire(self.current.load_full())
    }

    /// Publish `next` as the current snapshot and drain the retired one.
    /// Must be called with `write_lock` held.
    fn publish(&self, next: Vec<RouteEntry>) {
        let old = self.current.swap(Arc::new(Snapshot::new(next)));
        // Drain: wait until every reader that observed `old` has released
        // it. Yielding rather than busy-spinning keeps progress possible
        // on a single-core scheduler.
        while old.readers.load(Ordering::Acquire) > 0 {
            std::thread::yield_now();
        }
    }

    /// Insert a new entry, or replace the existing entry for the same
    /// node id in place. Returns `true` if this was a fresh insert. Mirrors
    /// the write onto the offload collaborator as `sad_table_add` +
    /// `node_forward_add` (port 0, matching this crate's port contract —
    /// see DESIGN.md Open Question 2).
    pub fn insert(&self, entry: RouteEntry) -> bool {
        let _guard = self.write_lock.lock();
        let cur = self.current.load_full();

        let mut next = Vec::with_capacity(cur.entries.len().max(DEFAULT_CAPACITY) * 2 / 2);
        next.extend(cur.entries.iter().cloned());

        let fresh = match next.iter_mut().find(|e| e.node_id == entry.node_id) {
            Some(slot) => {
                *slot = entry.clone();
                false
            }
            None => {
                next.push(entry.clone());
                true
            }
        };

        self.publish(next);
        let _ = self.offload.sad_table_add(&entry.capabilities, entry.node_id);
        let _ = self.offload.node_forward_add(entry.node_id, 0);
        fresh
    }

    /// Remove the entry for `node_id`, if present, by swap-with-last.
    /// Returns `true` if an entry was removed. Mirrors the removal onto
    /// the offload collaborator as `sad_table_delete` + `node_forward_delete`.
    pub fn remove(&self, node_id: &NodeId) -> bool {
        let _guard = self.write_lock.lock();
        let cur = self.current.load_full();

        let idx = match cur.entries.iter().position(|e| &e.node_id == node_id) {
            Some(idx) => idx,
            None => return false,
        };

        let removed = cur.entries[idx].clone();
        let mut next: Vec<RouteEntry> = cur.entries.clone();
        let last = next.len() - 1;
        next.swap(idx, last);
        next.pop();

        self.publish(next);
        let _ = self.offload.sad_table_delete(&removed.capabilities);
        let _ = self.offload.node_forward_delete(*node_id);
        true
    }

    /// Update the live metrics (latency, load) for an existing entry in
    /// place. Returns `true` if the node id was found.
    pub fn update_metrics(&self, node_id: &NodeId, latency_us: u32, load_factor: f32) -> bool {
        let _guard = self.write_lock.lock();
        let cur = self.current.load_full();

        if !cur.entries.iter().any(|e| &e.node_id == node_id) {
            return false;
        }

        let mut next: Vec<RouteEntry> = cur.entries.clone();
        for e in next.iter_mut().filter(|e| &e.node_id == node_id) {
            e.latency_us = latency_us;
            e.load_factor = load_factor;
        }

        self.publish(next);
        true
    }

    /// Remove every entry whose TTL has expired as of `now_ns`. Permanent
    /// entries (`ttl_ns == 0`) always survive. Returns the number of
    /// entries evicted. Mirrors each eviction onto the offload collaborator
    /// the same way [`RoutingTable::remove`] does.
    pub fn gc(&self, now_ns: u64) -> usize {
        let _guard = self.write_lock.lock();
        let cur = self.current.load_full();

        let evicted: Vec<RouteEntry> = cur
            .entries
            .iter()
            .filter(|e| e.is_expired(now_ns))
            .cloned()
            .collect();
        if evicted.is_empty() {
            return 0;
        }

        let next: Vec<RouteEntry> = cur
            .entries
            .iter()
            .filter(|e| !e.is_expired(now_ns))
            .cloned()
            .collect();

        self.publish(next);
        for e in &evicted {
            let _ = self.offload.sad_table_delete(&e.capabilities);
            let _ = self.offload.node_forward_delete(e.node_id);
        }
        evicted.len()
    }

    /// Resolve `query` against the current snapshot, returning up to
    /// `top_k` best matches. Lock-free.
    pub fn lookup(&self, query: &Sad, top_k: usize) -> Vec<ResolveResult> {
        let guard = self.acquire();
        scoring::find_best(query, &guard.0.entries, &self.weights, top_k)
    }

    /// Current number of live entries. Lock-free.
    pub fn size(&self) -> usize {
        let guard = self.acquire();
        guard.0.entries.len()
    }

    /// A point-in-time copy of every live entry. Lock-free.
    pub fn snapshot(&self) -> Vec<RouteEntry> {
        let guard = self.acquire();
        guard.0.entries.clone()
    }

    /// True if `node_id` is present in the current snapshot. Lock-free.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        let guard = self.acquire();
        guard.0.entries.iter().any(|e| &e.node_id == node_id)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sad::Sad;
    use std::sync::atomic::AtomicU32;
    use std::sync::Barrier;

    fn entry(id: u8, ttl_ns: u64, last_updated: u64) -> RouteEntry {
        RouteEntry {
            node_id: NodeId::new([id; 16]),
            capabilities: Sad::new(),
            latency_us: 1000,
            load_factor: 0.0,
            cost_milli: 0,
            trust_level: 0,
            region_code: 0,
            last_updated,
            ttl_ns,
        }
    }

    #[test]
    fn insert_and_remove_track_size() {
        let rt = RoutingTable::new();
        assert_eq!(rt.size(), 0);
        assert!(rt.insert(entry(1, 0, 0)));
        assert!(rt.insert(entry(2, 0, 0)));
        assert_eq!(rt.size(), 2);
        assert!(rt.remove(&NodeId::new([1; 16])));
        assert_eq!(rt.size(), 1);
        assert!(!rt.remove(&NodeId::new([1; 16])));
    }

    #[test]
    fn insert_existing_node_id_replaces_in_place() {
        let rt = RoutingTable::new();
        assert!(rt.insert(entry(1, 0, 0)));
        assert_eq!(rt.size(), 1);
        let fresh = rt.insert(RouteEntry {
            latency_us: 42,
            ..entry(1, 0, 0)
        });
        assert!(!fresh);
        assert_eq!(rt.size(), 1);
        let snap = rt.snapshot();
        assert_eq!(snap[0].latency_us, 42);
    }

    #[test]
    fn scenario_ttl_gc() {
        let rt = RoutingTable::new();
        let t0 = 1_000_000_000u64;
        rt.insert(entry(1, 30_000_000_000, t0)); // 30s TTL
        rt.insert(entry(2, 0, t0)); // permanent
        rt.insert(entry(3, 1_000_000_000, t0)); // 1s TTL
        assert_eq!(rt.size(), 3);

        let evicted = rt.gc(t0 + 20_000_000_000);
        assert_eq!(evicted, 1);
        assert_eq!(rt.size(), 2);

        let evicted = rt.gc(t0 + 35_000_000_000);
        assert_eq!(evicted, 1);
        assert_eq!(rt.size(), 1);

        let survivor = rt.snapshot();
        assert_eq!(survivor[0].node_id, NodeId::new([2; 16]));
    }

    #[test]
    fn gc_is_noop_when_nothing_expired() {
        let rt = RoutingTable::new();
        rt.insert(entry(1, 0, 0));
        assert_eq!(rt.gc(1_000_000), 0);
        assert_eq!(rt.size(), 1);
    }

    #[test]
    fn mutations_mirror_onto_the_offload_collaborator() {
        use crate::offload::OffloadError;
        use std::sync::Mutex as StdMutex;

        #[derive(Default)]
        struct Counting {
            adds: StdMutex<u32>,
            deletes: StdMutex<u32>,
        }

        impl OffloadClient for Counting {
            fn sad_table_add(&self, _sad: &Sad, _node_id: NodeId) -> Result<(), OffloadError> {
                *self.adds.lock().unwrap() += 1;
                Ok(())
            }
            fn sad_table_delete(&self, _sad: &Sad) -> Result<(), OffloadError> {
                *self.deletes.lock().unwrap() += 1;
                Ok(())
            }
            fn node_forward_add(&self, _node_id: NodeId, _port: u16) -> Result<(), OffloadError> {
                Ok(())
            }
            fn node_forward_delete(&self, _node_id: NodeId) -> Result<(), OffloadError> {
                Ok(())
            }
        }

        let offload = Arc::new(Counting::default());
        let rt = RoutingTable::new().with_offload(offload.clone());

        rt.insert(entry(1, 0, 0));
        rt.insert(entry(1, 0, 5)); // replace, still an add
        assert_eq!(*offload.adds.lock().unwrap(), 2);

        rt.remove(&NodeId::new([1; 16]));
        assert_eq!(*offload.deletes.lock().unwrap(), 1);

        rt.insert(entry(2, 1_000, 0));
        let evicted = rt.gc(10_000);
        assert_eq!(evicted, 1);
        assert_eq!(*offload.deletes.lock().unwrap(), 2);
    }

    #[test]
    fn update_metrics_mutates_in_place_without_changing_size() {
        let rt = RoutingTable::new();
        rt.insert(entry(1, 0, 0));
        assert!(rt.update_metrics(&NodeId::new([1; 16]), 555, 0.75));
        assert_eq!(rt.size(), 1);
        let snap = rt.snapshot();
        assert_eq!(snap[0].latency_us, 555);
        assert_eq!(snap[0].load_factor, 0.75);
        assert!(!rt.update_metrics(&NodeId::new([9; 16]), 1, 0.0));
    }

    #[test]
    fn concurrent_readers_never_observe_a_torn_entry() {
        let rt = Arc::new(RoutingTable::new());
        rt.insert(entry(1, 0, 0));

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mismatches = Arc::new(AtomicU32::new(0));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let rt = rt.clone();
            let stop = stop.clone();
            let mismatches = mismatches.clone();
            readers.push(std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    for e in rt.snapshot() {
                        // latency_us and load_factor are written together;
                        // a torn read would show them inconsistent.
                        let expected_load = (e.latency_us as f32) / 100_000.0;
                        if (e.load_factor - expected_load).abs() > 1e-6 {
                            mismatches.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }));
        }

        for i in 0..200u32 {
            let latency = 1000 + i;
            rt.update_metrics(&NodeId::new([1; 16]), latency, latency as f32 / 100_000.0);
        }

        stop.store(true, Ordering::Relaxed);
        for r in readers {
            r.join().unwrap();
        }

        assert_eq!(mismatches.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn scenario_concurrency_n_readers_one_writer() {
        let rt = Arc::new(RoutingTable::new());
        for i in 1..=5u8 {
            rt.insert(entry(i, 0, 0));
        }

        let barrier = Arc::new(Barrier::new(5));
        let mut readers = Vec::new();
        for _ in 0..4 {
            let rt = rt.clone();
            let barrier = barrier.clone();
            readers.push(std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..1000 {
                    let _ = rt.lookup(&Sad::new(), 3);
                }
            }));
        }

        let writer = {
            let rt = rt.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                for i in 10..30u8 {
                    rt.insert(entry(i, 0, 0));
                }
                for i in 10..20u8 {
                    rt.remove(&NodeId::new([i; 16]));
                }
            })
        };

        for r in readers {
            r.join().unwrap();
        }
        writer.join().unwrap();

        assert_eq!(rt.size(), 5 + 20 - 10);
    }
}
