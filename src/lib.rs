// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Strandroute: a semantic routing fabric for AI-model dispatch.
//!
//! A frame arrives carrying a Semantic Address Descriptor (SAD) instead of
//! a fixed destination: a TLV bag of required capabilities, context-window
//! and latency/cost budgets, trust and region preferences. This crate
//! resolves that descriptor against a live, gossip-maintained table of
//! peer capabilities and rewrites the frame onto a weighted-random
//! next hop.
//!
//! # Architecture
//!
//! - [`sad`] (C1): the TLV wire codec for Semantic Address Descriptors.
//! - [`scoring`] (C2): hard-constraint filtering plus weighted soft scoring,
//!   and top-K candidate selection.
//! - [`routing_table`] (C3): the concurrent, RCU-style table of peer
//!   capabilities that scoring resolves against.
//! - [`forwarding`] (C4): per-frame header parsing, SAD extraction, and
//!   next-hop rewrite.
//! - [`gossip`] (C5): HyParView-style membership maintenance and
//!   capability dissemination between peers.
//! - [`offload`] (C6): an optional shadow client mirroring routing-table
//!   mutations onto an external hardware/software dataplane.
//!
//! # Quick Start
//!
//! ```bash
//! # Generate a starter config, then run a node from it
//! strandrouted gen-config --output fabric.toml
//! strandrouted --config fabric.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! name = "edge-node-1"
//! self_node_id = "0102030405060708090a0b0c0d0e0f10"
//! listen_port = 7900
//! bootstrap_peers = ["1112131415161718191a1b1c1d1e1f20"]
//!
//! [weights]
//! capability = 0.30
//! latency = 0.25
//! cost = 0.20
//! context_window = 0.15
//! trust = 0.10
//! ```

pub mod config;
pub mod error;
pub mod forwarding;
pub mod gossip;
pub mod node_id;
pub mod offload;
pub mod rng;
pub mod routing_table;
pub mod sad;
pub mod scoring;

pub use config::{ConfigError, FabricConfig};
pub use error::FabricError;
pub use forwarding::{
    DropReason, Frame, FrameHeader, ForwardingEngine, ForwardingError, ForwardingStats,
    ForwardingStatsSnapshot, Outcome, SendFailure, SendSink,
};
pub use gossip::{
    AdvertisedMetrics, GossipError, GossipMessage, GossipState, GossipTransport, MessageType,
    PeerDescriptor, Signer, Verifier,
};
pub use node_id::NodeId;
pub use offload::{NullOffload, OffloadClient, OffloadError};
pub use rng::{SharedRng, XorShiftRng};
pub use routing_table::{RouteEntry, RoutingTable};
pub use sad::{FieldTag, Sad, SadError, SadField};
pub use scoring::{ResolveResult, ScoringWeights};
