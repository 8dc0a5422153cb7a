// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwarding engine (C4): per-frame SAD resolution and next-hop rewrite.
//!
//! The engine never interprets a frame's payload beyond the options region
//! that carries its SAD. Framing, reassembly, and transport delivery are
//! the caller's responsibility; this module only flips `dst_node_id` and
//! hands the frame to a [`SendSink`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::node_id::{NodeId, NODE_ID_LEN};
use crate::rng::SharedRng;
use crate::routing_table::RoutingTable;
use crate::sad::{Sad, SadError};

/// Encoded size of [`FrameHeader`] on the wire.
pub const FRAME_HEADER_LEN: usize = 64;
/// Maximum total frame size (header + payload), per the transport contract.
pub const MAX_FRAME_LEN: usize = 9216;

/// Default number of top-K candidates the engine considers per frame.
pub const DEFAULT_MAX_MULTIPATH: usize = 3;
/// Hard cap on `max_multipath`, matching `FWD_MAX_NEXT_HOPS` in the
/// reference implementation.
pub const MAX_MULTIPATH_CAP: usize = 8;

/// The fixed 64-byte frame header supplied by the transport layer. The
/// forwarding engine reads `ttl`, `options_offset`, `options_length`, and
/// `dst_node_id`, and writes `ttl` and `dst_node_id`; every other field
/// passes through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub frame_type: u8,
    pub payload_length: u16,
    pub sequence: u32,
    pub src_node_id: NodeId,
    pub dst_node_id: NodeId,
    pub stream_id: [u8; 8],
    pub options_offset: u16,
    pub options_length: u16,
    pub ttl: u8,
    pub priority: u8,
    pub flags: u8,
    pub reserved: [u8; 9],
}

impl FrameHeader {
    /// Serialize to the wire's 64-byte layout, big-endian for multi-byte
    /// fields.
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        buf[0] = self.version;
        buf[1] = self.frame_type;
        buf[2..4].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        buf[8..24].copy_from_slice(self.src_node_id.as_bytes());
        buf[24..40].copy_from_slice(self.dst_node_id.as_bytes());
        buf[40..48].copy_from_slice(&self.stream_id);
        buf[48..50].copy_from_slice(&self.options_offset.to_be_bytes());
        buf[50..52].copy_from_slice(&self.options_length.to_be_bytes());
        buf[52] = self.ttl;
        buf[53] = self.priority;
        buf[54] = self.flags;
        buf[55..64].copy_from_slice(&self.reserved);
        buf
    }

    /// Parse a 64-byte header. Fails only if `buf` is short; field values
    /// are not otherwise validated here (bounds-checking the options
    /// region against the payload happens in [`extract_sad`]).
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ForwardingError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(ForwardingError::ShortHeader);
        }
        Ok(FrameHeader {
            version: buf[0],
            frame_type: buf[1],
            payload_length: u16::from_be_bytes([buf[2], buf[3]]),
            sequence: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            src_node_id: NodeId::from_slice(&buf[8..24]).ok_or(ForwardingError::ShortHeader)?,
            dst_node_id: NodeId::from_slice(&buf[24..40]).ok_or(ForwardingError::ShortHeader)?,
            stream_id: buf[40..48].try_into().unwrap(),
            options_offset: u16::from_be_bytes([buf[48], buf[49]]),
            options_length: u16::from_be_bytes([buf[50], buf[51]]),
            ttl: buf[52],
            priority: buf[53],
            flags: buf[54],
            reserved: buf[55..64].try_into().unwrap(),
        })
    }
}

/// A frame as handed to the forwarding engine: a parsed header plus the
/// raw payload bytes (which contain the options region the SAD lives in).
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// Errors surfaced by header parsing. Frame-processing outcomes during
/// forwarding are reported via [`Outcome`]/counters rather than `Result`,
/// matching the "no error is fatal" design of C7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwardingError {
    #[error("frame header shorter than {FRAME_HEADER_LEN} bytes")]
    ShortHeader,
}

/// Capability record for delivering a (possibly rewritten) frame onward.
/// Modeled as a trait rather than a raw function pointer + context, per
/// the reference's callback-polymorphism design note; `port` is always 0
/// from this engine (see [`ForwardingEngine::process_frame`]).
pub trait SendSink: Send + Sync {
    fn send(&self, port: u16, frame: &Frame) -> Result<(), SendFailure>;
}

/// Opaque send failure. The engine treats any failure identically: count
/// it and drop the frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("send callback reported failure")]
pub struct SendFailure;

/// Why a frame was dropped, for diagnostics only; all drop reasons are
/// folded into the single `frames_dropped` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TtlExpired,
    NoSad,
    ResolveFailed,
    SendFailed,
}

/// Outcome of processing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `dst_node_id` already named this node; not forwarded.
    SelfDelivered,
    /// Forwarded to the given next hop.
    Forwarded(NodeId),
    Dropped(DropReason),
}

/// Monotonically increasing forwarding counters, read from any thread.
#[derive(Debug, Default)]
pub struct ForwardingStats {
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
    frames_resolved: AtomicU64,
    resolve_failures: AtomicU64,
}

/// Point-in-time copy of [`ForwardingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardingStatsSnapshot {
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
    pub frames_resolved: u64,
    pub resolve_failures: u64,
}

impl ForwardingStats {
    pub fn snapshot(&self) -> ForwardingStatsSnapshot {
        ForwardingStatsSnapshot {
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_resolved: self.frames_resolved.load(Ordering::Relaxed),
            resolve_failures: self.resolve_failures.load(Ordering::Relaxed),
        }
    }
}

/// Bounds-check the options region against the payload and decode the SAD
/// stored there.
fn extract_sad(header: &FrameHeader, payload: &[u8]) -> Result<Sad, SadError> {
    let off = header.options_offset as usize;
    let len = header.options_length as usize;
    if len == 0 || off.saturating_add(len) > payload.len() {
        return Err(SadError::Truncated);
    }
    Sad::decode(&payload[off..off + len])
}

/// Weighted-random pick among `scores`, biased by magnitude. A single
/// candidate bypasses the RNG entirely. `r` must already be scaled into
/// `[0, sum(scores))`.
fn select_weighted(scores: &[f32], r: f32) -> usize {
    if scores.len() <= 1 {
        return 0;
    }
    let mut acc = 0.0f32;
    for (i, s) in scores.iter().enumerate() {
        acc += s;
        if r < acc {
            return i;
        }
    }
    scores.len() - 1
}

/// Per-frame hot path: extract SAD, resolve, weighted-select, rewrite,
/// send.
pub struct ForwardingEngine<S: SendSink> {
    self_id: NodeId,
    table: Arc<RoutingTable>,
    sink: S,
    rng: SharedRng,
    max_multipath: usize,
    stats: ForwardingStats,
}

impl<S: SendSink> ForwardingEngine<S> {
    pub fn new(self_id: NodeId, table: Arc<RoutingTable>, sink: S) -> Self {
        Self::with_max_multipath(self_id, table, sink, DEFAULT_MAX_MULTIPATH)
    }

    pub fn with_max_multipath(
        self_id: NodeId,
        table: Arc<RoutingTable>,
        sink: S,
        max_multipath: usize,
    ) -> Self {
        ForwardingEngine {
            self_id,
            table,
            sink,
            rng: SharedRng::seeded(),
            max_multipath: max_multipath.clamp(1, MAX_MULTIPATH_CAP),
            stats: ForwardingStats::default(),
        }
    }

    pub fn stats(&self) -> ForwardingStatsSnapshot {
        self.stats.snapshot()
    }

    /// Process one inbound frame, mutating it in place when forwarded.
    pub fn process_frame(&self, frame: &mut Frame) -> Outcome {
        if frame.header.dst_node_id == self.self_id {
            return Outcome::SelfDelivered;
        }

        if frame.header.ttl == 0 {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return Outcome::Dropped(DropReason::TtlExpired);
        }
        frame.header.ttl -= 1;

        let query = match extract_sad(&frame.header, &frame.payload) {
            Ok(sad) => sad,
            Err(_) => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                return Outcome::Dropped(DropReason::NoSad);
            }
        };

        let results = self.table.lookup(&query, self.max_multipath);
        if results.is_empty() {
            self.stats
                .resolve_failures
                .fetch_add(1, Ordering::Relaxed);
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return Outcome::Dropped(DropReason::ResolveFailed);
        }
        self.stats.frames_resolved.fetch_add(1, Ordering::Relaxed);

        let scores: Vec<f32> = results.iter().map(|r| r.score.max(0.0)).collect();
        let total: f32 = scores.iter().sum();
        let r = if total > 0.0 {
            self.rng.next_f32() * total
        } else {
            0.0
        };
        let chosen = &results[select_weighted(&scores, r)];

        frame.header.dst_node_id = chosen.entry.node_id;

        if let Err(SendFailure) = self.sink.send(0, frame) {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return Outcome::Dropped(DropReason::SendFailed);
        }

        self.stats.frames_forwarded.fetch_add(1, Ordering::Relaxed);
        Outcome::Forwarded(chosen.entry.node_id)
    }
}
