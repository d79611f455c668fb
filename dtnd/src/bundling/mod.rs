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

pub mod bundle;
pub mod fwdlog;
pub mod list;
pub mod payload;

pub use bundle::{Bundle, BundleIdentity, BundleRef, BUNDLEID_UNASSIGNED};
pub use list::{BundleList, SortOrder};

#[cfg(test)]
pub(crate) mod testutil {
    use bp6::{
        block::CanonicalBlock,
        bundle::Bundle as WireBundle,
        bundleflags::BundleFlags,
        cos::Priority,
        endpoint::EndpointId,
        primaryblock::{PrimaryBlock, BP_VERSION},
        time::{CreationTimestamp, DtnTime},
    };

    use super::bundle::{Bundle, BundleRef};

    pub struct TestBundleOpts {
        pub bundleid: u32,
        pub source: &'static str,
        pub dest: &'static str,
        pub priority: Priority,
        pub flags: BundleFlags,
        pub lifetime: u64,
        pub frag_offset: Option<u64>,
        pub payload: Vec<u8>,
    }

    impl Default for TestBundleOpts {
        fn default() -> Self {
            TestBundleOpts {
                bundleid: 0,
                source: "dtn://a/app",
                dest: "dtn://b/app",
                priority: Priority::Normal,
                flags: BundleFlags::SINGLETON_DEST,
                lifetime: 3600,
                frag_offset: None,
                payload: b"testdata".to_vec(),
            }
        }
    }

    pub fn test_bundle_with(opts: TestBundleOpts) -> BundleRef {
        let mut flags = opts.flags;
        let (frag_offset, total) = match opts.frag_offset {
            Some(offset) => {
                flags |= BundleFlags::IS_FRAGMENT;
                (Some(offset), Some(1 << 20))
            }
            None => (None, None),
        };
        let wire = WireBundle {
            primary_block: PrimaryBlock {
                version: BP_VERSION,
                bundle_processing_flags: flags,
                priority: opts.priority,
                destination_endpoint: EndpointId::new(opts.dest).unwrap(),
                source_node: EndpointId::new(opts.source).unwrap(),
                replyto: EndpointId::null_endpoint(),
                custodian: EndpointId::null_endpoint(),
                report_to: EndpointId::null_endpoint(),
                creation_timestamp: CreationTimestamp {
                    creation_time: DtnTime {
                        timestamp: 700_000_000,
                    },
                    sequence_number: u64::from(opts.bundleid),
                },
                lifetime: opts.lifetime,
                fragment_offset: frag_offset,
                total_data_length: total,
            },
            blocks: vec![CanonicalBlock::payload(opts.payload)],
        };
        let bundle = Bundle::from_wire(&wire).unwrap();
        bundle.assign_bundleid(opts.bundleid);
        std::sync::Arc::new(bundle)
    }

    pub fn test_bundle(bundleid: u32, source: &'static str, dest: &'static str) -> BundleRef {
        test_bundle_with(TestBundleOpts {
            bundleid,
            source,
            dest,
            ..TestBundleOpts::default()
        })
    }
}
