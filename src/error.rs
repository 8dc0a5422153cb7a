// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Aggregate error type for call sites (mainly `main.rs`) that need a
//! single `Result` across the per-component error enums.

use thiserror::Error;

use crate::config::ConfigError;
use crate::gossip::GossipError;
use crate::offload::OffloadError;
use crate::sad::SadError;

/// A single error type composing every subsystem's own error enum.
/// Library code should generally propagate the specific per-component
/// error; this exists for call sites that need to unify them.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("SAD codec error: {0}")]
    Sad(#[from] SadError),

    #[error("gossip protocol error: {0}")]
    Gossip(#[from] GossipError),

    #[error("offload collaborator error: {0}")]
    Offload(#[from] OffloadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
