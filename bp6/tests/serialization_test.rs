// Copyright (C) 2023 Felix Huettner
//
// This file is part of DTND.
//
// DTND is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// DTND is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use bp6::{
    block::{Block, CanonicalBlock, payload_block::PayloadBlock},
    blockflags::BlockFlags,
    bundle::Bundle,
    bundleflags::BundleFlags,
    cos::Priority,
    endpoint::EndpointId,
    primaryblock::{PrimaryBlock, BP_VERSION},
    time::{CreationTimestamp, DtnTime},
    SerializationError,
};

const BUNDLE_SRC: &[u8] = &[
    0x9F, // indefinite-length bundle array
    0x8A, // primary block, 10 elements
    0x06, // version
    0x10, // flags: singleton destination
    0x01, // priority: normal
    0x82, 0x01, 0x67, 0x2F, 0x2F, 0x62, 0x2F, 0x61, 0x70, 0x70, // dtn://b/app
    0x82, 0x01, 0x67, 0x2F, 0x2F, 0x61, 0x2F, 0x61, 0x70, 0x70, // dtn://a/app
    0x82, 0x01, 0x00, // replyto: dtn:none
    0x82, 0x01, 0x00, // custodian: dtn:none
    0x82, 0x01, 0x00, // report_to: dtn:none
    0x82, 0x1A, 0x29, 0xB9, 0x27, 0x00, 0x05, // creation timestamp [700000000, 5]
    0x19, 0x0E, 0x10, // lifetime 3600
    0x83, 0x01, 0x08, 0x44, 0x41, 0x42, 0x43, 0x44, // payload block "ABCD"
    0xFF, // end of bundle array
];

fn expected_bundle() -> Bundle {
    Bundle {
        primary_block: PrimaryBlock {
            version: BP_VERSION,
            bundle_processing_flags: BundleFlags::SINGLETON_DEST,
            priority: Priority::Normal,
            destination_endpoint: EndpointId::new("dtn://b/app").unwrap(),
            source_node: EndpointId::new("dtn://a/app").unwrap(),
            replyto: EndpointId::null_endpoint(),
            custodian: EndpointId::null_endpoint(),
            report_to: EndpointId::null_endpoint(),
            creation_timestamp: CreationTimestamp {
                creation_time: DtnTime {
                    timestamp: 700_000_000,
                },
                sequence_number: 5,
            },
            lifetime: 3600,
            fragment_offset: None,
            total_data_length: None,
        },
        blocks: vec![CanonicalBlock {
            block: Block::Payload(PayloadBlock {
                data: b"ABCD".to_vec(),
            }),
            block_flags: BlockFlags::LAST_BLOCK,
        }],
    }
}

#[test]
fn decode_known_bundle() -> Result<(), SerializationError> {
    let recovered = Bundle::try_from(BUNDLE_SRC)?;
    assert_eq!(recovered, expected_bundle());
    Ok(())
}

#[test]
fn reencode_known_bundle() -> Result<(), SerializationError> {
    let recovered = Bundle::try_from(BUNDLE_SRC)?;
    let reserialized: Vec<u8> = (&recovered).try_into()?;
    assert_eq!(reserialized, BUNDLE_SRC);
    Ok(())
}

#[test]
fn fragment_roundtrip() -> Result<(), SerializationError> {
    let mut bundle = expected_bundle();
    bundle.primary_block.bundle_processing_flags |= BundleFlags::IS_FRAGMENT;
    bundle.primary_block.fragment_offset = Some(512);
    bundle.primary_block.total_data_length = Some(2048);
    let bytes: Vec<u8> = (&bundle).try_into()?;
    let back = Bundle::try_from(bytes.as_slice())?;
    assert_eq!(bundle, back);
    Ok(())
}
