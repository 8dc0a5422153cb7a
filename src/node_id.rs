// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-width node identifier shared by every subsystem.

use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length in bytes of a node identifier (matches the overlay link layer's
/// 128-bit address space).
pub const NODE_ID_LEN: usize = 16;

/// A 16-byte opaque node identifier. Zero is a reserved sentinel meaning
/// "no node" / "unset".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub [u8; NODE_ID_LEN]);

impl NodeId {
    /// The reserved zero sentinel.
    pub const ZERO: NodeId = NodeId([0u8; NODE_ID_LEN]);

    /// Build from a byte slice, panicking if the length does not match.
    /// Intended for tests and literal construction; production code should
    /// use `from_slice` and handle the `None` case.
    pub fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        NodeId(bytes)
    }

    /// Build from a byte slice of arbitrary length, returning `None` unless
    /// it is exactly `NODE_ID_LEN` bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != NODE_ID_LEN {
            return None;
        }
        let mut out = [0u8; NODE_ID_LEN];
        out.copy_from_slice(bytes);
        Some(NodeId(out))
    }

    /// True if this is the reserved zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; NODE_ID_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for NodeId {
    type Err = &'static str;

    /// Parse a lowercase or uppercase hex string of exactly 32 characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != NODE_ID_LEN * 2 {
            return Err("node id must be exactly 32 hex characters");
        }
        let mut out = [0u8; NODE_ID_LEN];
        for (i, chunk) in out.iter_mut().enumerate() {
            let byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| "node id contains non-hex characters")?;
            *chunk = byte;
        }
        Ok(NodeId(out))
    }
}

/// Config files and gossip debugging output represent a [`NodeId`] as its
/// hex string, matching `Display`.
impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}
