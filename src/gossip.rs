// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HyParView-style gossip membership and capability dissemination (C5).
//!
//! Each node maintains a small *active view* (peers it keeps a live
//! connection to) and a larger *passive view* (a reserve used to heal
//! active-view churn). `JOIN`/`FORWARD_JOIN`/`DISCONNECT` maintain the
//! views; `SHUFFLE`/`SHUFFLE_REPLY` periodically exchange passive-view
//! entries to keep the overlay connected; `ADVERTISE` carries a node's own
//! capability [`Sad`] and live metrics into the local [`RoutingTable`].
//!
//! Reference: Leitao et al., "HyParView: A Membership Protocol for
//! Reliable Gossip-Based Broadcast", DSN 2007.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::node_id::NodeId;
use crate::rng::SharedRng;
use crate::routing_table::{RouteEntry, RoutingTable};
use crate::sad::{Sad, SadError};

/// Maximum size of the active view.
pub const MAX_ACTIVE: usize = 5;
/// Maximum size of the passive view.
pub const MAX_PASSIVE: usize = 30;
/// Entries exchanged per shuffle round.
pub const SHUFFLE_LEN: usize = 3;
/// Active Random Walk Length: TTL a `FORWARD_JOIN` starts with.
pub const ARWL: u8 = 6;
/// Passive Random Walk Length: the TTL at which a `FORWARD_JOIN` also
/// admits its origin to the passive view on its way through.
pub const PRWL: u8 = 3;

/// Default shuffle timer period (10 s in nanoseconds).
pub const DEFAULT_SHUFFLE_INTERVAL_NS: u64 = 10_000_000_000;
/// Default advertise timer period (1 s in nanoseconds).
pub const DEFAULT_ADVERTISE_INTERVAL_NS: u64 = 1_000_000_000;

/// A known peer: identity, overlay port, and last-seen timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerDescriptor {
    pub node_id: NodeId,
    pub port: u16,
    pub last_seen: u64,
}

/// The wire message kinds exchanged between gossip peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Join,
    ForwardJoin,
    Disconnect,
    Shuffle,
    ShuffleReply,
    Advertise,
}

impl MessageType {
    fn to_u8(self) -> u8 {
        match self {
            MessageType::Join => 0x01,
            MessageType::ForwardJoin => 0x02,
            MessageType::Disconnect => 0x03,
            MessageType::Shuffle => 0x04,
            MessageType::ShuffleReply => 0x05,
            MessageType::Advertise => 0x06,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(MessageType::Join),
            0x02 => Some(MessageType::ForwardJoin),
            0x03 => Some(MessageType::Disconnect),
            0x04 => Some(MessageType::Shuffle),
            0x05 => Some(MessageType::ShuffleReply),
            0x06 => Some(MessageType::Advertise),
            _ => None,
        }
    }
}

/// Byte length of the fixed message header, signature included.
pub const HEADER_LEN: usize = 1 + 1 + 16 + 16 + 2 + 64;
/// Byte length of the header region that gets signed (everything before
/// the signature field).
const SIGNED_LEN: usize = HEADER_LEN - 64;

/// A parsed gossip message: fixed header plus an opaque payload whose
/// shape depends on `msg_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipMessage {
    pub msg_type: MessageType,
    pub ttl: u8,
    pub sender: NodeId,
    pub origin: NodeId,
    pub signature: [u8; 64],
    pub payload: Vec<u8>,
}

/// Errors decoding a raw gossip message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GossipError {
    #[error("message shorter than the {HEADER_LEN}-byte header")]
    Truncated,
    #[error("unknown message type")]
    UnknownType,
    #[error("payload_len does not match the supplied buffer")]
    LengthMismatch,
    #[error("signature verification failed")]
    BadSignature,
    #[error("malformed advertise payload")]
    BadAdvertise(#[from] SadError),
}

impl GossipMessage {
    /// Serialize to wire bytes: `type | ttl | sender | origin | payload_len
    /// | signature | payload`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.msg_type.to_u8());
        buf.push(self.ttl);
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(self.origin.as_bytes());
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.signature);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, GossipError> {
        if buf.len() < HEADER_LEN {
            return Err(GossipError::Truncated);
        }
        let msg_type = MessageType::from_u8(buf[0]).ok_or(GossipError::UnknownType)?;
        let ttl = buf[1];
        let sender = NodeId::from_slice(&buf[2..18]).ok_or(GossipError::Truncated)?;
        let origin = NodeId::from_slice(&buf[18..34]).ok_or(GossipError::Truncated)?;
        let payload_len = u16::from_be_bytes([buf[34], buf[35]]) as usize;
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&buf[36..100]);
        if buf.len() != HEADER_LEN + payload_len {
            return Err(GossipError::LengthMismatch);
        }
        Ok(GossipMessage {
            msg_type,
            ttl,
            sender,
            origin,
            signature,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }

    /// The byte range covered by a signature: every header field before
    /// the signature itself.
    fn signed_range(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SIGNED_LEN);
        buf.push(self.msg_type.to_u8());
        buf.push(self.ttl);
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(self.origin.as_bytes());
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf
    }
}

/// Signs the region preceding a message's signature field.
pub trait Signer: Send + Sync {
    fn sign(&self, msg: &[u8]) -> [u8; 64];
}

/// Verifies a signature over the same region [`Signer::sign`] covers.
pub trait Verifier: Send + Sync {
    fn verify(&self, msg: &[u8], signature: &[u8; 64]) -> bool;
}

/// Delivers an encoded gossip message to a peer. Send failure is
/// fire-and-forget at this layer, matching the forwarding engine's own
/// send contract.
pub trait GossipTransport: Send + Sync {
    fn send(&self, dst: NodeId, msg: &[u8]);
}

/// Live metrics carried alongside a capability advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdvertisedMetrics {
    pub latency_us: u32,
    pub load_factor: f32,
    pub cost_milli: u32,
    pub trust_level: u8,
    pub region_code: u16,
}

const METRICS_LEN: usize = 8 + 4 + 4 + 4 + 1 + 2;

fn encode_advertise_payload(metrics: &AdvertisedMetrics, ttl_ns: u64, sad: &Sad) -> Vec<u8> {
    let sad_bytes = sad.encode().unwrap_or_default();
    let mut buf = Vec::with_capacity(METRICS_LEN + sad_bytes.len());
    buf.extend_from_slice(&ttl_ns.to_be_bytes());
    buf.extend_from_slice(&metrics.latency_us.to_be_bytes());
    buf.extend_from_slice(&metrics.load_factor.to_bits().to_be_bytes());
    buf.extend_from_slice(&metrics.cost_milli.to_be_bytes());
    buf.push(metrics.trust_level);
    buf.extend_from_slice(&metrics.region_code.to_be_bytes());
    buf.extend_from_slice(&sad_bytes);
    buf
}

fn decode_advertise_payload(
    payload: &[u8],
) -> Result<(u64, AdvertisedMetrics, Sad), GossipError> {
    if payload.len() < METRICS_LEN {
        return Err(GossipError::Truncated);
    }
    let ttl_ns = u64::from_be_bytes(payload[0..8].try_into().unwrap());
    let latency_us = u32::from_be_bytes(payload[8..12].try_into().unwrap());
    let load_factor = f32::from_bits(u32::from_be_bytes(payload[12..16].try_into().unwrap()));
    let cost_milli = u32::from_be_bytes(payload[16..20].try_into().unwrap());
    let trust_level = payload[20];
    let region_code = u16::from_be_bytes(payload[21..23].try_into().unwrap());
    let sad = Sad::decode(&payload[METRICS_LEN..])?;
    Ok((
        ttl_ns,
        AdvertisedMetrics {
            latency_us,
            load_factor,
            cost_milli,
            trust_level,
            region_code,
        },
        sad,
    ))
}

fn encode_node_list(ids: &[NodeId]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ids.len() * 16);
    for id in ids {
        buf.extend_from_slice(id.as_bytes());
    }
    buf
}

fn decode_node_list(payload: &[u8]) -> Vec<NodeId> {
    payload
        .chunks_exact(16)
        .filter_map(NodeId::from_slice)
        .collect()
}

struct Views {
    active: Vec<PeerDescriptor>,
    passive: Vec<PeerDescriptor>,
}

impl Views {
    fn new() -> Self {
        Views {
            active: Vec::new(),
            passive: Vec::new(),
        }
    }
}

fn view_contains(view: &[PeerDescriptor], node_id: &NodeId) -> bool {
    view.iter().any(|p| &p.node_id == node_id)
}

/// Add `peer` to `view` unless it is self, already present, or the view
/// is full. Returns `true` if added.
fn view_add(
    view: &mut Vec<PeerDescriptor>,
    max: usize,
    self_id: &NodeId,
    peer: PeerDescriptor,
) -> bool {
    if &peer.node_id == self_id || view.len() >= max || view_contains(view, &peer.node_id) {
        return false;
    }
    view.push(peer);
    true
}

/// Remove by swap-with-last; returns the removed entry.
fn view_remove(view: &mut Vec<PeerDescriptor>, node_id: &NodeId) -> Option<PeerDescriptor> {
    let idx = view.iter().position(|p| &p.node_id == node_id)?;
    Some(view.swap_remove(idx))
}

/// HyParView membership state plus capability dissemination for one node.
pub struct GossipState<T: GossipTransport> {
    self_id: NodeId,
    table: Arc<RoutingTable>,
    views: Mutex<Views>,
    rng: SharedRng,
    transport: T,
    signer: Option<Arc<dyn Signer>>,
    verifier: Option<Arc<dyn Verifier>>,
    shuffle_interval_ns: u64,
    advertise_interval_ns: u64,
    last_shuffle_ns: Mutex<u64>,
    last_advertise_ns: Mutex<u64>,
    local: Mutex<(Sad, AdvertisedMetrics, u64)>,
}

impl<T: GossipTransport> GossipState<T> {
    pub fn new(self_id: NodeId, table: Arc<RoutingTable>, transport: T) -> Self {
        GossipState {
            self_id,
            table,
            views: Mutex::new(Views::new()),
            rng: SharedRng::seeded(),
            transport,
            signer: None,
            verifier: None,
            shuffle_interval_ns: DEFAULT_SHUFFLE_INTERVAL_NS,
            advertise_interval_ns: DEFAULT_ADVERTISE_INTERVAL_NS,
            last_shuffle_ns: Mutex::new(0),
            last_advertise_ns: Mutex::new(0),
            local: Mutex::new((
                Sad::new(),
                AdvertisedMetrics {
                    latency_us: 0,
                    load_factor: 0.0,
                    cost_milli: 0,
                    trust_level: 0,
                    region_code: 0,
                },
                0,
            )),
        }
    }

    pub fn with_auth(
        mut self,
        signer: Option<Arc<dyn Signer>>,
        verifier: Option<Arc<dyn Verifier>>,
    ) -> Self {
        self.signer = signer;
        self.verifier = verifier;
        self
    }

    pub fn with_intervals(mut self, shuffle_interval_ns: u64, advertise_interval_ns: u64) -> Self {
        self.shuffle_interval_ns = shuffle_interval_ns;
        self.advertise_interval_ns = advertise_interval_ns;
        self
    }

    /// Set the capabilities and metrics this node advertises to its
    /// active peers.
    pub fn set_local_capabilities(&self, sad: Sad, metrics: AdvertisedMetrics, ttl_ns: u64) {
        *self.local.lock() = (sad, metrics, ttl_ns);
    }

    pub fn active_view(&self) -> Vec<PeerDescriptor> {
        self.views.lock().active.clone()
    }

    pub fn passive_view(&self) -> Vec<PeerDescriptor> {
        self.views.lock().passive.clone()
    }

    fn sign(&self, msg: &mut GossipMessage) {
        if let Some(signer) = &self.signer {
            msg.signature = signer.sign(&msg.signed_range());
        }
    }

    fn send(&self, dst: NodeId, mut msg: GossipMessage) {
        self.sign(&mut msg);
        self.transport.send(dst, &msg.encode());
    }

    // ---- Handlers -------------------------------------------------

    /// A new node wants to join. If the active view is full, evict a
    /// random peer to passive (and tell it to disconnect) before
    /// admitting the newcomer. Relays a `FORWARD_JOIN` to every other
    /// active peer.
    pub fn handle_join(&self, new_node: NodeId, port: u16) {
        if new_node == self.self_id {
            return;
        }

        let evicted = {
            let mut views = self.views.lock();
            if views.active.len() >= MAX_ACTIVE {
                let idx = self.rng.gen_range(views.active.len());
                let evicted = views.active.swap_remove(idx);
                view_add(&mut views.passive, MAX_PASSIVE, &self.self_id, evicted);
                Some(evicted)
            } else {
                None
            }
        };

        if let Some(evicted) = evicted {
            self.send(
                evicted.node_id,
                GossipMessage {
                    msg_type: MessageType::Disconnect,
                    ttl: 0,
                    sender: self.self_id,
                    origin: self.self_id,
                    signature: [0; 64],
                    payload: Vec::new(),
                },
            );
        }

        {
            let mut views = self.views.lock();
            view_add(
                &mut views.active,
                MAX_ACTIVE,
                &self.self_id,
                PeerDescriptor {
                    node_id: new_node,
                    port,
                    last_seen: 0,
                },
            );
        }

        let peers: Vec<NodeId> = self
            .views
            .lock()
            .active
            .iter()
            .filter(|p| p.node_id != new_node)
            .map(|p| p.node_id)
            .collect();
        for peer in peers {
            self.send(
                peer,
                GossipMessage {
                    msg_type: MessageType::ForwardJoin,
                    ttl: ARWL,
                    sender: self.self_id,
                    origin: new_node,
                    signature: [0; 64],
                    payload: Vec::new(),
                },
            );
        }
    }

    /// Received a `FORWARD_JOIN`. Admit `origin` to active view if the
    /// walk has ended or the active view is too sparse to route further;
    /// admit to passive view at exactly `PRWL` hops; otherwise relay to
    /// one more random active peer.
    pub fn handle_forward_join(&self, origin: NodeId, ttl: u8) {
        if origin == self.self_id {
            return;
        }

        let active_len = self.views.lock().active.len();
        if ttl == 0 || active_len <= 1 {
            let mut views = self.views.lock();
            view_add(
                &mut views.active,
                MAX_ACTIVE,
                &self.self_id,
                PeerDescriptor {
                    node_id: origin,
                    port: 0,
                    last_seen: 0,
                },
            );
            return;
        }

        if ttl == PRWL {
            let mut views = self.views.lock();
            view_add(
                &mut views.passive,
                MAX_PASSIVE,
                &self.self_id,
                PeerDescriptor {
                    node_id: origin,
                    port: 0,
                    last_seen: 0,
                },
            );
        }

        let next = {
            let views = self.views.lock();
            let candidates: Vec<NodeId> = views
                .active
                .iter()
                .map(|p| p.node_id)
                .filter(|id| *id != origin && *id != self.self_id)
                .collect();
            if candidates.is_empty() {
                None
            } else {
                Some(candidates[self.rng.gen_range(candidates.len())])
            }
        };

        if let Some(next) = next {
            self.send(
                next,
                GossipMessage {
                    msg_type: MessageType::ForwardJoin,
                    ttl: ttl - 1,
                    sender: self.self_id,
                    origin,
                    signature: [0; 64],
                    payload: Vec::new(),
                },
            );
        }
    }

    /// Remove a disconnected peer from the active view and promote a
    /// random passive peer to fill the gap.
    pub fn handle_disconnect(&self, peer_id: NodeId) {
        let mut views = self.views.lock();
        view_remove(&mut views.active, &peer_id);

        if !views.passive.is_empty() && views.active.len() < MAX_ACTIVE {
            let idx = self.rng.gen_range(views.passive.len());
            let promoted = views.passive.swap_remove(idx);
            view_add(&mut views.active, MAX_ACTIVE, &self.self_id, promoted);
        }
    }

    /// Merge a peer's shuffled passive-view sample into ours, then reply
    /// with a sample of our own.
    pub fn handle_shuffle(&self, sender: NodeId, entries: &[NodeId]) {
        self.merge_into_passive(entries);

        let reply_set = self.sample_passive(SHUFFLE_LEN);
        self.send(
            sender,
            GossipMessage {
                msg_type: MessageType::ShuffleReply,
                ttl: 0,
                sender: self.self_id,
                origin: self.self_id,
                signature: [0; 64],
                payload: encode_node_list(&reply_set),
            },
        );
    }

    /// Merge a shuffle reply into our passive view.
    pub fn handle_shuffle_reply(&self, entries: &[NodeId]) {
        self.merge_into_passive(entries);
    }

    fn merge_into_passive(&self, entries: &[NodeId]) {
        let mut views = self.views.lock();
        for &node_id in entries {
            if node_id == self.self_id {
                continue;
            }
            if view_contains(&views.passive, &node_id) {
                continue;
            }
            if views.passive.len() >= MAX_PASSIVE {
                let idx = self.rng.gen_range(views.passive.len());
                views.passive[idx] = PeerDescriptor {
                    node_id,
                    port: 0,
                    last_seen: 0,
                };
            } else {
                views.passive.push(PeerDescriptor {
                    node_id,
                    port: 0,
                    last_seen: 0,
                });
            }
        }
    }

    fn sample_passive(&self, n: usize) -> Vec<NodeId> {
        let views = self.views.lock();
        let mut out = Vec::with_capacity(n);
        for _ in 0..n.min(views.passive.len()) {
            let idx = self.rng.gen_range(views.passive.len());
            out.push(views.passive[idx].node_id);
        }
        out
    }

    /// Decode and apply a capability advertisement: insert-or-replace the
    /// advertising node's entry in the routing table.
    pub fn handle_advertise(
        &self,
        node_id: NodeId,
        payload: &[u8],
        now_ns: u64,
    ) -> Result<(), GossipError> {
        let (ttl_ns, metrics, sad) = decode_advertise_payload(payload)?;
        self.table.insert(RouteEntry {
            node_id,
            capabilities: sad,
            latency_us: metrics.latency_us,
            load_factor: metrics.load_factor,
            cost_milli: metrics.cost_milli,
            trust_level: metrics.trust_level,
            region_code: metrics.region_code,
            last_updated: now_ns,
            ttl_ns,
        });
        Ok(())
    }

    /// Verify (if a verifier is installed) and dispatch one incoming
    /// wire message. A failed verification is dropped silently, with no
    /// view or table mutation.
    pub fn handle_message(&self, raw: &[u8], now_ns: u64) -> Result<(), GossipError> {
        let msg = GossipMessage::decode(raw)?;

        if let Some(verifier) = &self.verifier {
            if !verifier.verify(&msg.signed_range(), &msg.signature) {
                warn!("dropping gossip message with invalid signature");
                return Err(GossipError::BadSignature);
            }
        }

        match msg.msg_type {
            MessageType::Join => {
                let port = msg
                    .payload
                    .get(0..2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .unwrap_or(0);
                self.handle_join(msg.origin, port);
            }
            MessageType::ForwardJoin => self.handle_forward_join(msg.origin, msg.ttl),
            MessageType::Disconnect => self.handle_disconnect(msg.sender),
            MessageType::Shuffle => {
                self.handle_shuffle(msg.sender, &decode_node_list(&msg.payload))
            }
            MessageType::ShuffleReply => self.handle_shuffle_reply(&decode_node_list(&msg.payload)),
            MessageType::Advertise => {
                self.handle_advertise(msg.origin, &msg.payload, now_ns)?;
            }
        }
        debug!(msg_type = ?msg.msg_type, "processed gossip message");
        Ok(())
    }

    // ---- Active-side operations ------------------------------------

    /// Initiate a join against a bootstrap peer we already know about.
    pub fn join(&self, bootstrap: NodeId, our_port: u16) {
        self.send(
            bootstrap,
            GossipMessage {
                msg_type: MessageType::Join,
                ttl: 0,
                sender: self.self_id,
                origin: self.self_id,
                signature: [0; 64],
                payload: our_port.to_be_bytes().to_vec(),
            },
        );
    }

    /// Pick a random active peer and exchange a sample of our passive
    /// view with it.
    pub fn do_shuffle(&self) {
        let target = {
            let views = self.views.lock();
            if views.active.is_empty() {
                return;
            }
            views.active[self.rng.gen_range(views.active.len())].node_id
        };

        let mut set = self.sample_passive(SHUFFLE_LEN);
        if set.len() < SHUFFLE_LEN {
            set.push(self.self_id);
        }

        self.send(
            target,
            GossipMessage {
                msg_type: MessageType::Shuffle,
                ttl: ARWL,
                sender: self.self_id,
                origin: self.self_id,
                signature: [0; 64],
                payload: encode_node_list(&set),
            },
        );
    }

    /// Push our own capabilities to every active peer.
    pub fn do_advertise(&self) {
        let peers = self.views.lock().active.iter().map(|p| p.node_id).collect::<Vec<_>>();
        let (sad, metrics, ttl_ns) = self.local.lock().clone();
        for peer in peers {
            self.send(
                peer,
                GossipMessage {
                    msg_type: MessageType::Advertise,
                    ttl: 0,
                    sender: self.self_id,
                    origin: self.self_id,
                    signature: [0; 64],
                    payload: encode_advertise_payload(&metrics, ttl_ns, &sad),
                },
            );
        }
    }

    /// Drive the shuffle and advertise timers. Call periodically (e.g.
    /// every 100 ms) with a monotonic nanosecond clock.
    pub fn tick(&self, now_ns: u64) {
        let due_shuffle = {
            let mut last = self.last_shuffle_ns.lock();
            if now_ns.saturating_sub(*last) >= self.shuffle_interval_ns {
                *last = now_ns;
                true
            } else {
                false
            }
        };
        if due_shuffle {
            self.do_shuffle();
        }

        let due_advertise = {
            let mut last = self.last_advertise_ns.lock();
            if now_ns.saturating_sub(*last) >= self.advertise_interval_ns {
                *last = now_ns;
                true
            } else {
                false
            }
        };
        if due_advertise {
            self.do_advertise();
        }
    }
}
