// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Semantic Address Descriptor (SAD) binary codec.
//!
//! A SAD is a small TLV-encoded constraint set, used both as a query
//! (a request's semantic destination) and as a node's own capability
//! advertisement. The wire format is fixed and versioned; unknown field
//! tags are preserved verbatim so older and newer nodes can interoperate.
//!
//! ```text
//! Header (4 bytes): version:u8 | flags:u8 | num_fields:u16
//! Per field:        tag:u8 | length:u16 | value[length]
//! ```

use thiserror::Error;

/// Current wire version. A decode of any other version is rejected.
pub const SAD_VERSION: u8 = 1;
/// Maximum number of fields a SAD may carry.
pub const SAD_MAX_FIELDS: usize = 16;
/// Maximum total encoded size in bytes.
pub const SAD_MAX_SIZE: usize = 512;
/// Maximum length in bytes of a single field's value.
pub const SAD_MAX_FIELD_VALUE: usize = 64;

const SAD_HEADER_SIZE: usize = 4;
const SAD_FIELD_HDR: usize = 3;

/// The kind of constraint a SAD field expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    ModelArch,
    Capability,
    ContextWindow,
    MaxLatencyMs,
    MaxCostMilli,
    TrustLevel,
    RegionPrefer,
    RegionExclude,
    PublisherId,
    MinBenchmark,
    Custom,
    /// A tag value not recognized by this build. Preserved for forward
    /// compatibility but never validated or matched against.
    Unknown(u8),
}

impl FieldTag {
    fn to_u8(self) -> u8 {
        match self {
            FieldTag::ModelArch => 0x01,
            FieldTag::Capability => 0x02,
            FieldTag::ContextWindow => 0x03,
            FieldTag::MaxLatencyMs => 0x04,
            FieldTag::MaxCostMilli => 0x05,
            FieldTag::TrustLevel => 0x06,
            FieldTag::RegionPrefer => 0x07,
            FieldTag::RegionExclude => 0x08,
            FieldTag::PublisherId => 0x09,
            FieldTag::MinBenchmark => 0x0A,
            FieldTag::Custom => 0x0B,
            FieldTag::Unknown(v) => v,
        }
    }

    fn from_u8(v: u8) -> FieldTag {
        match v {
            0x01 => FieldTag::ModelArch,
            0x02 => FieldTag::Capability,
            0x03 => FieldTag::ContextWindow,
            0x04 => FieldTag::MaxLatencyMs,
            0x05 => FieldTag::MaxCostMilli,
            0x06 => FieldTag::TrustLevel,
            0x07 => FieldTag::RegionPrefer,
            0x08 => FieldTag::RegionExclude,
            0x09 => FieldTag::PublisherId,
            0x0A => FieldTag::MinBenchmark,
            0x0B => FieldTag::Custom,
            other => FieldTag::Unknown(other),
        }
    }
}

/// A single TLV field within a SAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SadField {
    pub tag: FieldTag,
    pub value: Vec<u8>,
}

/// A decoded Semantic Address Descriptor: version, flags, and an ordered
/// list of fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sad {
    pub version: u8,
    pub flags: u8,
    pub fields: Vec<SadField>,
}

/// Failure modes for codec operations. Every failure drops the offending
/// input; the core never produces a partial SAD.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SadError {
    #[error("unsupported SAD version")]
    InvalidVersion,
    #[error("too many fields (max {SAD_MAX_FIELDS})")]
    TooManyFields,
    #[error("field value too large (max {SAD_MAX_FIELD_VALUE} bytes)")]
    FieldTooLarge,
    #[error("buffer truncated")]
    Truncated,
    #[error("wrong fixed length for known tag")]
    BadFixedLength,
    #[error("encoded SAD exceeds {SAD_MAX_SIZE} bytes")]
    Oversized,
}

impl Sad {
    /// An empty SAD with the current wire version and no fields. Matches
    /// scores as a wildcard against every candidate.
    pub fn new() -> Self {
        Sad {
            version: SAD_VERSION,
            flags: 0,
            fields: Vec::new(),
        }
    }

    /// True if this SAD carries no constraints (the wildcard shortcut).
    pub fn is_wildcard(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append a raw field. Fails if the field count or value length would
    /// exceed the wire limits.
    pub fn add_field(&mut self, tag: FieldTag, value: Vec<u8>) -> Result<(), SadError> {
        if self.fields.len() >= SAD_MAX_FIELDS {
            return Err(SadError::TooManyFields);
        }
        if value.len() > SAD_MAX_FIELD_VALUE {
            return Err(SadError::FieldTooLarge);
        }
        self.fields.push(SadField { tag, value });
        Ok(())
    }

    /// Convenience builder: append a 32-bit big-endian field.
    pub fn add_u32(&mut self, tag: FieldTag, value: u32) -> Result<(), SadError> {
        self.add_field(tag, value.to_be_bytes().to_vec())
    }

    /// Convenience builder: append an 8-bit field.
    pub fn add_u8(&mut self, tag: FieldTag, value: u8) -> Result<(), SadError> {
        self.add_field(tag, vec![value])
    }

    /// Convenience builder: append a list of 16-bit region codes.
    pub fn add_regions(&mut self, tag: FieldTag, regions: &[u16]) -> Result<(), SadError> {
        if regions.is_empty() {
            return Err(SadError::FieldTooLarge);
        }
        let mut buf = Vec::with_capacity(regions.len() * 2);
        for r in regions {
            buf.extend_from_slice(&r.to_be_bytes());
        }
        self.add_field(tag, buf)
    }

    /// Find the first field with the given tag, matching the reference
    /// codec's linear `sad_find_field`.
    pub fn find(&self, tag: FieldTag) -> Option<&SadField> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Read a field as a big-endian u32, or 0 if absent or too short.
    /// Callers that must distinguish "absent" from "zero" should use
    /// `find` directly.
    pub fn get_u32(&self, tag: FieldTag) -> u32 {
        match self.find(tag) {
            Some(f) if f.value.len() >= 4 => {
                u32::from_be_bytes([f.value[0], f.value[1], f.value[2], f.value[3]])
            }
            _ => 0,
        }
    }

    /// Read a field as a u8, or 0 if absent.
    pub fn get_u8(&self, tag: FieldTag) -> u8 {
        match self.find(tag) {
            Some(f) if !f.value.is_empty() => f.value[0],
            _ => 0,
        }
    }

    /// Read a region-list field as a vector of u16 codes.
    pub fn get_regions(&self, tag: FieldTag) -> Vec<u16> {
        match self.find(tag) {
            Some(f) => f
                .value
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Serialize in declaration order. Fails if the result would exceed
    /// `SAD_MAX_SIZE`.
    pub fn encode(&self) -> Result<Vec<u8>, SadError> {
        let total = SAD_HEADER_SIZE
            + self
                .fields
                .iter()
                .map(|f| SAD_FIELD_HDR + f.value.len())
                .sum::<usize>();
        if total > SAD_MAX_SIZE {
            return Err(SadError::Oversized);
        }

        let mut buf = Vec::with_capacity(total);
        buf.push(self.version);
        buf.push(self.flags);
        buf.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());

        for f in &self.fields {
            buf.push(f.tag.to_u8());
            buf.extend_from_slice(&(f.value.len() as u16).to_be_bytes());
            buf.extend_from_slice(&f.value);
        }

        Ok(buf)
    }

    /// Decode a SAD from its wire representation.
    pub fn decode(buf: &[u8]) -> Result<Sad, SadError> {
        if buf.len() < SAD_HEADER_SIZE {
            return Err(SadError::Truncated);
        }

        let version = buf[0];
        let flags = buf[1];
        let num_fields = u16::from_be_bytes([buf[2], buf[3]]) as usize;

        if version != SAD_VERSION {
            return Err(SadError::InvalidVersion);
        }
        if num_fields > SAD_MAX_FIELDS {
            return Err(SadError::TooManyFields);
        }

        let mut off = SAD_HEADER_SIZE;
        let mut fields = Vec::with_capacity(num_fields);

        for _ in 0..num_fields {
            if off + SAD_FIELD_HDR > buf.len() {
                return Err(SadError::Truncated);
            }
            let tag = FieldTag::from_u8(buf[off]);
            let len = u16::from_be_bytes([buf[off + 1], buf[off + 2]]) as usize;
            off += SAD_FIELD_HDR;

            if len > SAD_MAX_FIELD_VALUE {
                return Err(SadError::FieldTooLarge);
            }
            if off + len > buf.len() {
                return Err(SadError::Truncated);
            }

            fields.push(SadField {
                tag,
                value: buf[off..off + len].to_vec(),
            });
            off += len;
        }

        Ok(Sad {
            version,
            flags,
            fields,
        })
    }

    /// Non-destructive pre-check: validates structure and, for known tags,
    /// their fixed lengths, without building a `Sad`. Unknown tags pass
    /// with any length (forward compatibility).
    pub fn validate(buf: &[u8]) -> Result<(), SadError> {
        if buf.len() < SAD_HEADER_SIZE {
            return Err(SadError::Truncated);
        }

        let version = buf[0];
        if version != SAD_VERSION {
            return Err(SadError::InvalidVersion);
        }

        let num_fields = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if num_fields > SAD_MAX_FIELDS {
            return Err(SadError::TooManyFields);
        }

        let mut off = SAD_HEADER_SIZE;
        for _ in 0..num_fields {
            if off + SAD_FIELD_HDR > buf.len() {
                return Err(SadError::Truncated);
            }
            let tag = buf[off];
            let len = u16::from_be_bytes([buf[off + 1], buf[off + 2]]) as usize;
            off += SAD_FIELD_HDR;

            if len > SAD_MAX_FIELD_VALUE {
                return Err(SadError::FieldTooLarge);
            }
            if off + len > buf.len() {
                return Err(SadError::Truncated);
            }

            match FieldTag::from_u8(tag) {
                FieldTag::ModelArch
                | FieldTag::Capability
                | FieldTag::ContextWindow
                | FieldTag::MaxLatencyMs
                | FieldTag::MaxCostMilli
                | FieldTag::MinBenchmark => {
                    if len != 4 {
                        return Err(SadError::BadFixedLength);
                    }
                }
                FieldTag::TrustLevel => {
                    if len != 1 {
                        return Err(SadError::BadFixedLength);
                    }
                }
                FieldTag::PublisherId => {
                    if len != 16 {
                        return Err(SadError::BadFixedLength);
                    }
                }
                FieldTag::RegionPrefer | FieldTag::RegionExclude => {
                    if len == 0 || len % 2 != 0 {
                        return Err(SadError::BadFixedLength);
                    }
                }
                FieldTag::Custom | FieldTag::Unknown(_) => {
                    // Any length is valid; forward-compatible pass-through.
                }
            }

            off += len;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sad() -> Sad {
        let mut s = Sad::new();
        s.add_u32(FieldTag::ModelArch, 1).unwrap();
        s.add_u32(FieldTag::Capability, 0x03).unwrap();
        s.add_u32(FieldTag::ContextWindow, 65536).unwrap();
        s.add_u32(FieldTag::MaxLatencyMs, 100).unwrap();
        s.add_u32(FieldTag::MaxCostMilli, 5000).unwrap();
        s.add_u8(FieldTag::TrustLevel, 1).unwrap();
        s.add_regions(FieldTag::RegionPrefer, &[840, 124]).unwrap();
        s
    }

    #[test]
    fn empty_sad_is_four_bytes() {
        let s = Sad::new();
        let bytes = s.encode().unwrap();
        assert_eq!(bytes.len(), 4);
        let decoded = Sad::decode(&bytes).unwrap();
        assert_eq!(decoded.fields.len(), 0);
        assert!(decoded.is_wildcard());
    }

    #[test]
    fn scenario_sad_round_trip() {
        let s = sample_sad();
        let bytes = s.encode().unwrap();
        // header(4) + 5 u32 fields * (hdr 3 + val 4) + trust_level (hdr 3 + val 1)
        // + region_prefer (hdr 3 + val 4) = 4 + 35 + 4 + 7 = 50 bytes.
        assert_eq!(bytes.len(), 50);
        Sad::validate(&bytes).expect("validate ok");
        let decoded = Sad::decode(&bytes).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn round_trip_is_field_wise_equal() {
        let s = sample_sad();
        let bytes = s.encode().unwrap();
        let decoded = Sad::decode(&bytes).unwrap();
        assert_eq!(decoded.fields, s.fields);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bytes = Sad::new().encode().unwrap();
        bytes[0] = 2;
        assert_eq!(Sad::decode(&bytes), Err(SadError::InvalidVersion));
        assert_eq!(Sad::validate(&bytes), Err(SadError::InvalidVersion));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let s = sample_sad();
        let bytes = s.encode().unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert_eq!(Sad::decode(truncated), Err(SadError::Truncated));
        assert_eq!(Sad::validate(truncated), Err(SadError::Truncated));
    }

    #[test]
    fn rejects_bad_fixed_length_for_known_tag() {
        let mut s = Sad::new();
        // trust_level must be exactly 1 byte.
        s.add_field(FieldTag::TrustLevel, vec![1, 2]).unwrap();
        let bytes = s.encode().unwrap();
        assert_eq!(Sad::validate(&bytes), Err(SadError::BadFixedLength));
    }

    #[test]
    fn unknown_tag_round_trips_with_any_length() {
        let mut s = Sad::new();
        s.add_field(FieldTag::Unknown(0x42), vec![9, 9, 9]).unwrap();
        let bytes = s.encode().unwrap();
        Sad::validate(&bytes).expect("unknown tags pass validate");
        let decoded = Sad::decode(&bytes).unwrap();
        assert_eq!(decoded.fields[0].value, vec![9, 9, 9]);
    }

    #[test]
    fn find_distinguishes_absent_from_zero() {
        let mut s = Sad::new();
        assert!(s.find(FieldTag::ContextWindow).is_none());
        assert_eq!(s.get_u32(FieldTag::ContextWindow), 0);
        s.add_u32(FieldTag::ContextWindow, 0).unwrap();
        assert!(s.find(FieldTag::ContextWindow).is_some());
        assert_eq!(s.get_u32(FieldTag::ContextWindow), 0);
    }

    #[test]
    fn too_many_fields_rejected() {
        let mut s = Sad::new();
        for i in 0..SAD_MAX_FIELDS {
            s.add_u8(FieldTag::Custom, i as u8).unwrap();
        }
        assert_eq!(
            s.add_u8(FieldTag::Custom, 99),
            Err(SadError::TooManyFields)
        );
    }

    #[test]
    fn oversized_field_rejected() {
        let mut s = Sad::new();
        let big = vec![0u8; SAD_MAX_FIELD_VALUE + 1];
        assert_eq!(
            s.add_field(FieldTag::Custom, big),
            Err(SadError::FieldTooLarge)
        );
    }
}
