// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hardware-offload control-plane shadow (C6).
//!
//! The routing table above is the authoritative, in-memory source of
//! truth; this module exists only to mirror its mutations onto an
//! optional external collaborator (a P4/eBPF dataplane, a smartNIC, or
//! similar) so that hot-path traffic can eventually bypass software
//! forwarding entirely. When no collaborator is wired up, every call is a
//! no-op that logs and succeeds, matching the reference implementation's
//! stub build mode.

use thiserror::Error;
use tracing::debug;

use crate::node_id::NodeId;
use crate::sad::Sad;

/// Error codes mirroring the reference control-plane client's return
/// codes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OffloadError {
    #[error("connection to offload collaborator failed or was lost")]
    Connection,
    #[error("no matching table entry")]
    NotFound,
    #[error("invalid argument")]
    Invalid,
    #[error("table is full")]
    Full,
    #[error("generic offload failure")]
    Generic,
}

/// The two operation families the core emits against an optional
/// hardware/software offload collaborator: SAD-keyed ternary-match
/// routing, and node-id-to-port forwarding. Both are exact-match (masks
/// of all-ones) in this core; wildcard ternary entries are a future
/// extension left to a richer client.
pub trait OffloadClient: Send + Sync {
    /// Install a ternary-match entry mapping `sad`'s `(model_arch,
    /// capability_bitset, context_window)` fields to `node_id`.
    fn sad_table_add(&self, sad: &Sad, node_id: NodeId) -> Result<(), OffloadError>;

    /// Remove the ternary-match entry keyed by `sad`.
    fn sad_table_delete(&self, sad: &Sad) -> Result<(), OffloadError>;

    /// Install a `node_id -> port` forwarding entry.
    fn node_forward_add(&self, node_id: NodeId, port: u16) -> Result<(), OffloadError>;

    /// Remove the forwarding entry for `node_id`.
    fn node_forward_delete(&self, node_id: NodeId) -> Result<(), OffloadError>;
}

/// Default collaborator: every operation logs and succeeds. Used when no
/// offload hardware is configured, and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOffload;

impl OffloadClient for NullOffload {
    fn sad_table_add(&self, _sad: &Sad, node_id: NodeId) -> Result<(), OffloadError> {
        debug!(%node_id, "offload stub: sad_table_add");
        Ok(())
    }

    fn sad_table_delete(&self, _sad: &Sad) -> Result<(), OffloadError> {
        debug!("offload stub: sad_table_delete");
        Ok(())
    }

    fn node_forward_add(&self, node_id: NodeId, port: u16) -> Result<(), OffloadError> {
        debug!(%node_id, port, "offload stub: node_forward_add");
        Ok(())
    }

    fn node_forward_delete(&self, node_id: NodeId) -> Result<(), OffloadError> {
        debug!(%node_id, "offload stub: node_forward_delete");
        Ok(())
    }
}
