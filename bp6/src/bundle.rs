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

use std::{
    cmp::min,
    convert::{TryFrom, TryInto},
};

use serde::{de::Error, de::Visitor, ser::SerializeSeq, Deserialize, Serialize};

use crate::{
    administrative_record::AdministrativeRecord,
    block::{Block, CanonicalBlock},
    bundleflags::BundleFlags,
    primaryblock::PrimaryBlock,
    SerializationError, Validate,
};

/// A whole bundle: primary block plus at least one canonical block, of
/// which exactly one must be the payload block.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Bundle {
    pub primary_block: PrimaryBlock,
    pub blocks: Vec<CanonicalBlock>,
}

impl Serialize for Bundle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(None)?;
        seq.serialize_element(&self.primary_block)?;
        for block in &self.blocks {
            seq.serialize_element(&block)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Bundle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BundleVisitor;
        impl<'de> Visitor<'de> for BundleVisitor {
            type Value = Bundle;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("bundle")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut blocks: Vec<CanonicalBlock> = match seq.size_hint() {
                    Some(v) => Vec::with_capacity(v),
                    None => Vec::new(),
                };
                let primary_block = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'primary_block'"))?;
                while let Some(block) = seq.next_element()? {
                    blocks.push(block);
                }

                if blocks.is_empty() {
                    return Err(Error::invalid_length(0, &"must have at least one block"));
                }

                Ok(Bundle {
                    primary_block,
                    blocks,
                })
            }
        }
        deserializer.deserialize_seq(BundleVisitor)
    }
}

impl Validate for Bundle {
    fn validate(&self) -> bool {
        if !self.primary_block.validate() {
            return false;
        }
        for block in &self.blocks {
            if !block.validate() {
                return false;
            }
        }
        self.payload().is_some()
    }
}

impl TryFrom<&[u8]> for Bundle {
    type Error = SerializationError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        serde_cbor::from_slice(value).map_err(SerializationError::SerializationError)
    }
}

impl TryFrom<Bundle> for Vec<u8> {
    type Error = SerializationError;

    fn try_from(value: Bundle) -> Result<Self, Self::Error> {
        (&value).try_into()
    }
}

impl TryFrom<&Bundle> for Vec<u8> {
    type Error = SerializationError;

    fn try_from(value: &Bundle) -> Result<Self, Self::Error> {
        serde_cbor::to_vec(value).map_err(SerializationError::SerializationError)
    }
}

impl Bundle {
    pub fn payload(&self) -> Option<&[u8]> {
        self.blocks.iter().find_map(|cb| match &cb.block {
            Block::Payload(b) => Some(b.data.as_slice()),
            Block::Unkown(_) => None,
        })
    }

    pub fn is_admin_record(&self) -> bool {
        self.primary_block
            .bundle_processing_flags
            .contains(BundleFlags::IS_ADMIN)
    }

    /// Decode the payload as an administrative record. Only valid on
    /// bundles with the admin flag set.
    pub fn administrative_record(&self) -> Result<AdministrativeRecord, SerializationError> {
        let payload = self.payload().ok_or(SerializationError::ConversionError)?;
        AdministrativeRecord::try_from(payload)
    }

    /// The number of bytes this bundle occupies on the wire.
    pub fn formatted_length(&self) -> Result<u64, SerializationError> {
        let bytes: Vec<u8> = self.try_into()?;
        Ok(bytes.len() as u64)
    }
}

/// Serialises a bundle once and hands out caller-sized windows of the
/// result, for convergence layers that push data in segments.
pub struct BundleProducer {
    data: Vec<u8>,
}

impl BundleProducer {
    pub fn new(bundle: &Bundle) -> Result<Self, SerializationError> {
        Ok(BundleProducer {
            data: bundle.try_into()?,
        })
    }

    pub fn total_length(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns the bytes at `[offset, offset + max)` (clamped) and
    /// whether the window reaches the end of the bundle.
    pub fn produce(&self, offset: usize, max: usize) -> (&[u8], bool) {
        let start = min(offset, self.data.len());
        let end = min(start + max, self.data.len());
        (&self.data[start..end], end == self.data.len())
    }
}

/// Accumulates byte chunks from a convergence layer until a whole
/// bundle can be decoded.
#[derive(Default)]
pub struct BundleConsumer {
    buffer: Vec<u8>,
}

impl BundleConsumer {
    pub fn new() -> Self {
        BundleConsumer::default()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed the next chunk. Returns the decoded bundle once enough data
    /// has arrived, `None` while the data is still incomplete.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Bundle>, SerializationError> {
        self.buffer.extend_from_slice(chunk);
        match serde_cbor::from_slice::<Bundle>(&self.buffer) {
            Ok(bundle) => {
                self.buffer.clear();
                Ok(Some(bundle))
            }
            Err(e) if e.is_eof() => Ok(None),
            Err(e) => Err(SerializationError::SerializationError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Bundle, BundleConsumer, BundleProducer};
    use crate::{
        block::CanonicalBlock,
        bundleflags::BundleFlags,
        cos::Priority,
        endpoint::EndpointId,
        primaryblock::{PrimaryBlock, BP_VERSION},
        time::{CreationTimestamp, DtnTime},
        Validate,
    };

    fn bundle(payload: &[u8]) -> Bundle {
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
                    sequence_number: 0,
                },
                lifetime: 3600,
                fragment_offset: None,
                total_data_length: None,
            },
            blocks: vec![CanonicalBlock::payload(payload.to_vec())],
        }
    }

    #[test]
    fn roundtrip() {
        let b = bundle(b"hello bundle");
        let bytes: Vec<u8> = (&b).try_into().unwrap();
        let back = Bundle::try_from(bytes.as_slice()).unwrap();
        assert_eq!(b, back);
        assert!(back.validate());
        assert_eq!(back.payload().unwrap(), b"hello bundle");
    }

    #[test]
    fn formatted_length_matches_serialization() {
        let b = bundle(&[0u8; 100]);
        let bytes: Vec<u8> = (&b).try_into().unwrap();
        assert_eq!(b.formatted_length().unwrap(), bytes.len() as u64);
    }

    #[test]
    fn producer_windows_cover_serialization() {
        let b = bundle(&[7u8; 64]);
        let bytes: Vec<u8> = (&b).try_into().unwrap();
        let producer = BundleProducer::new(&b).unwrap();
        assert_eq!(producer.total_length(), bytes.len() as u64);

        let mut assembled = Vec::new();
        let mut offset = 0;
        loop {
            let (window, done) = producer.produce(offset, 10);
            assembled.extend_from_slice(window);
            offset += window.len();
            if done {
                break;
            }
        }
        assert_eq!(assembled, bytes);
    }

    #[test]
    fn consumer_handles_chunked_input() {
        let b = bundle(b"fragmented arrival");
        let bytes: Vec<u8> = (&b).try_into().unwrap();
        let mut consumer = BundleConsumer::new();
        for chunk in bytes.chunks(7) {
            if let Some(decoded) = consumer.push(chunk).unwrap() {
                assert_eq!(decoded, b);
                assert_eq!(consumer.buffered(), 0);
                return;
            }
        }
        panic!("consumer never produced a bundle");
    }

    #[test]
    fn consumer_rejects_garbage() {
        let mut consumer = BundleConsumer::new();
        // a definite-length map is not a bundle
        assert!(consumer.push(&[0xA1, 0x01, 0x02]).is_err());
    }
}
