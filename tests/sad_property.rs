// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property-style round-trip checks for the SAD codec, driven by randomized
//! field sets rather than a fixed table of examples.

use strandroute::{FieldTag, Sad};

fn random_known_tag() -> FieldTag {
    match fastrand::usize(..9) {
        0 => FieldTag::ModelArch,
        1 => FieldTag::Capability,
        2 => FieldTag::ContextWindow,
        3 => FieldTag::MaxLatencyMs,
        4 => FieldTag::MaxCostMilli,
        5 => FieldTag::TrustLevel,
        6 => FieldTag::RegionPrefer,
        7 => FieldTag::RegionExclude,
        _ => FieldTag::PublisherId,
    }
}

fn add_random_field(sad: &mut Sad, tag: FieldTag) -> bool {
    let result = match tag {
        FieldTag::ModelArch
        | FieldTag::Capability
        | FieldTag::ContextWindow
        | FieldTag::MaxLatencyMs
        | FieldTag::MaxCostMilli => sad.add_u32(tag, fastrand::u32(..)),
        FieldTag::TrustLevel => sad.add_u8(tag, fastrand::u8(..)),
        FieldTag::RegionPrefer | FieldTag::RegionExclude => {
            let regions: Vec<u16> = (0..1 + fastrand::usize(..4))
                .map(|_| fastrand::u16(..))
                .collect();
            sad.add_regions(tag, &regions)
        }
        FieldTag::PublisherId => sad.add_field(tag, (0..16).map(|_| fastrand::u8(..)).collect()),
        FieldTag::Custom | FieldTag::Unknown(_) => unreachable!("random_known_tag never yields this"),
    };
    result.is_ok()
}

#[test]
fn random_valid_sads_round_trip_exactly() {
    for _ in 0..200 {
        let mut sad = Sad::new();
        let mut used = std::collections::HashSet::new();

        let field_count = fastrand::usize(..=9);
        for _ in 0..field_count {
            let tag = random_known_tag();
            // At most one instance of each known tag, per the SAD invariant.
            if !used.insert(format!("{tag:?}")) {
                continue;
            }
            add_random_field(&mut sad, tag);
        }

        let bytes = sad.encode().expect("within size limits");
        assert!(bytes.len() <= strandroute::sad::SAD_MAX_SIZE);
        Sad::validate(&bytes).expect("a builder-constructed SAD always validates");
        let decoded = Sad::decode(&bytes).expect("a builder-constructed SAD always decodes");
        assert_eq!(decoded, sad);
    }
}

#[test]
fn random_truncated_buffers_are_never_accepted() {
    for _ in 0..100 {
        let mut sad = Sad::new();
        for _ in 0..1 + fastrand::usize(..6) {
            let tag = random_known_tag();
            add_random_field(&mut sad, tag);
        }
        let bytes = sad.encode().expect("within size limits");
        if bytes.len() <= 4 {
            continue;
        }
        let cut = 1 + fastrand::usize(..bytes.len() - 1);
        let truncated = &bytes[..cut];
        assert!(Sad::decode(truncated).is_err(), "a strictly shorter buffer must never decode");
    }
}
