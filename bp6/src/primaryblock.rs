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

use serde::{de::Error, de::Visitor, ser::SerializeSeq, Deserialize, Serialize};

use crate::{
    bundleflags::BundleFlags, cos::Priority, endpoint::EndpointId, time::CreationTimestamp,
    Validate,
};

pub const BP_VERSION: u64 = 6;

/// The primary block of a bundle.
///
/// Serialized as a CBOR array of 10 elements, or 12 when the fragment
/// fields are present.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PrimaryBlock {
    pub version: u64,
    pub bundle_processing_flags: BundleFlags,
    pub priority: Priority,
    pub destination_endpoint: EndpointId,
    pub source_node: EndpointId,
    pub replyto: EndpointId,
    pub custodian: EndpointId,
    pub report_to: EndpointId,
    pub creation_timestamp: CreationTimestamp,
    pub lifetime: u64,
    pub fragment_offset: Option<u64>,
    pub total_data_length: Option<u64>,
}

impl Serialize for PrimaryBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let len = if self.fragment_offset.is_none() { 10 } else { 12 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.version)?;
        seq.serialize_element(&self.bundle_processing_flags)?;
        seq.serialize_element(&self.priority)?;
        seq.serialize_element(&self.destination_endpoint)?;
        seq.serialize_element(&self.source_node)?;
        seq.serialize_element(&self.replyto)?;
        seq.serialize_element(&self.custodian)?;
        seq.serialize_element(&self.report_to)?;
        seq.serialize_element(&self.creation_timestamp)?;
        seq.serialize_element(&self.lifetime)?;
        if self.fragment_offset.is_some() {
            seq.serialize_element(&self.fragment_offset.unwrap())?;
            seq.serialize_element(&self.total_data_length.unwrap())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for PrimaryBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrimaryBlockVisitor;
        impl<'de> Visitor<'de> for PrimaryBlockVisitor {
            type Value = PrimaryBlock;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("primary block")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let size = seq.size_hint().unwrap_or(0);
                if size != 10 && size != 12 {
                    return Err(Error::invalid_length(
                        size,
                        &"Primary block has 10 or 12 elements",
                    ));
                }
                let version = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'version'"))?;
                let bundle_processing_flags = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'bundle_processing_flags'"))?;
                let priority = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'priority'"))?;
                let destination_endpoint = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'destination_endpoint'"))?;
                let source_node = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'source_node'"))?;
                let replyto = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'replyto'"))?;
                let custodian = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'custodian'"))?;
                let report_to = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'report_to'"))?;
                let creation_timestamp = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'creation_timestamp'"))?;
                let lifetime = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'lifetime'"))?;

                let (fragment_offset, total_data_length) = if size == 12 {
                    (
                        Some(
                            seq.next_element()?
                                .ok_or(Error::custom("Error for field 'fragment_offset'"))?,
                        ),
                        Some(
                            seq.next_element()?
                                .ok_or(Error::custom("Error for field 'total_data_length'"))?,
                        ),
                    )
                } else {
                    (None, None)
                };

                Ok(PrimaryBlock {
                    version,
                    bundle_processing_flags,
                    priority,
                    destination_endpoint,
                    source_node,
                    replyto,
                    custodian,
                    report_to,
                    creation_timestamp,
                    lifetime,
                    fragment_offset,
                    total_data_length,
                })
            }
        }
        deserializer.deserialize_seq(PrimaryBlockVisitor)
    }
}

impl Validate for PrimaryBlock {
    fn validate(&self) -> bool {
        if self.version != BP_VERSION {
            return false;
        }
        if !self.bundle_processing_flags.validate() {
            return false;
        }
        if self
            .bundle_processing_flags
            .contains(BundleFlags::IS_FRAGMENT)
            && (self.fragment_offset.is_none() || self.total_data_length.is_none())
        {
            return false;
        }
        if !self
            .bundle_processing_flags
            .contains(BundleFlags::IS_FRAGMENT)
            && self.fragment_offset.is_some()
        {
            return false;
        }
        self.destination_endpoint.validate()
            && self.source_node.validate()
            && self.replyto.validate()
            && self.custodian.validate()
            && self.report_to.validate()
    }
}

impl PrimaryBlock {
    /// True if both blocks describe the same bundle identity, the tuple
    /// used for duplicate detection.
    pub fn same_identity(&self, other: &PrimaryBlock) -> bool {
        self.source_node == other.source_node
            && self.creation_timestamp == other.creation_timestamp
            && self.fragment_offset == other.fragment_offset
            && self.total_data_length == other.total_data_length
    }
}

#[cfg(test)]
mod tests {
    use super::{PrimaryBlock, BP_VERSION};
    use crate::{
        bundleflags::BundleFlags,
        cos::Priority,
        endpoint::EndpointId,
        time::{CreationTimestamp, DtnTime},
        Validate,
    };

    fn block() -> PrimaryBlock {
        PrimaryBlock {
            version: BP_VERSION,
            bundle_processing_flags: BundleFlags::SINGLETON_DEST,
            priority: Priority::Normal,
            destination_endpoint: EndpointId::new("dtn://b/app").unwrap(),
            source_node: EndpointId::new("dtn://a/app").unwrap(),
            replyto: EndpointId::null_endpoint(),
            custodian: EndpointId::null_endpoint(),
            report_to: EndpointId::new("dtn://a/app").unwrap(),
            creation_timestamp: CreationTimestamp {
                creation_time: DtnTime {
                    timestamp: 700_000_000,
                },
                sequence_number: 1,
            },
            lifetime: 3600,
            fragment_offset: None,
            total_data_length: None,
        }
    }

    #[test]
    fn roundtrip() -> Result<(), serde_cbor::Error> {
        let pb = block();
        let bytes = serde_cbor::to_vec(&pb)?;
        let back: PrimaryBlock = serde_cbor::from_slice(&bytes)?;
        assert_eq!(pb, back);
        Ok(())
    }

    #[test]
    fn roundtrip_fragment() -> Result<(), serde_cbor::Error> {
        let mut pb = block();
        pb.bundle_processing_flags |= BundleFlags::IS_FRAGMENT;
        pb.fragment_offset = Some(1024);
        pb.total_data_length = Some(4096);
        let bytes = serde_cbor::to_vec(&pb)?;
        let back: PrimaryBlock = serde_cbor::from_slice(&bytes)?;
        assert_eq!(pb, back);
        Ok(())
    }

    #[test]
    fn validate_fragment_fields() {
        let mut pb = block();
        assert!(pb.validate());
        pb.fragment_offset = Some(0);
        assert!(!pb.validate());
        pb.bundle_processing_flags |= BundleFlags::IS_FRAGMENT;
        pb.total_data_length = Some(10);
        assert!(pb.validate());
    }

    #[test]
    fn identity_ignores_mutable_fields() {
        let a = block();
        let mut b = block();
        b.custodian = EndpointId::new("dtn://c").unwrap();
        b.lifetime = 60;
        assert!(a.same_identity(&b));
        b.creation_timestamp.sequence_number = 2;
        assert!(!a.same_identity(&b));
    }
}
