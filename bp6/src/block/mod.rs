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

use std::convert::TryFrom;

use serde::{de::Error, de::Visitor, ser::SerializeSeq, Deserialize, Serialize};

use crate::{blockflags::BlockFlags, Validate};

use self::{payload_block::PayloadBlock, unkown_block::UnkownBlock};
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub mod payload_block;
pub mod unkown_block;

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u64)]
enum BlockType {
    Payload = 1,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Block {
    Payload(PayloadBlock),
    Unkown(UnkownBlock),
}

impl Block {
    pub fn block_data(&self) -> &[u8] {
        match self {
            Block::Payload(b) => &b.data,
            Block::Unkown(b) => &b.data,
        }
    }
}

/// A canonical (non-primary) block: type code, processing flags, body.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CanonicalBlock {
    pub block: Block,
    pub block_flags: BlockFlags,
}

impl Serialize for CanonicalBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(3))?;
        let blocktype: u64 = match &self.block {
            Block::Payload(_) => BlockType::Payload.into(),
            Block::Unkown(b) => b.block_type,
        };
        seq.serialize_element(&blocktype)?;
        seq.serialize_element(&self.block_flags)?;
        match &self.block {
            Block::Payload(b) => seq.serialize_element(&b)?,
            Block::Unkown(b) => seq.serialize_element(&b)?,
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for CanonicalBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BlockVisitor;
        impl<'de> Visitor<'de> for BlockVisitor {
            type Value = CanonicalBlock;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("block")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let block_type_num: u64 = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'block_type'"))?;
                let block_flags = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'block_flags'"))?;
                let data_bytes: &[u8] = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'data'"))?;
                let data = Vec::from(data_bytes);

                let block = match BlockType::try_from(block_type_num) {
                    Ok(BlockType::Payload) => Block::Payload(PayloadBlock { data }),
                    Err(_) => Block::Unkown(UnkownBlock {
                        block_type: block_type_num,
                        data,
                    }),
                };

                Ok(CanonicalBlock { block, block_flags })
            }
        }
        deserializer.deserialize_seq(BlockVisitor)
    }
}

impl Validate for CanonicalBlock {
    fn validate(&self) -> bool {
        self.block_flags.validate()
    }
}

impl CanonicalBlock {
    pub fn payload(data: Vec<u8>) -> Self {
        CanonicalBlock {
            block: Block::Payload(PayloadBlock { data }),
            block_flags: BlockFlags::LAST_BLOCK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Block, CanonicalBlock};
    use crate::blockflags::BlockFlags;

    #[test]
    fn payload_roundtrip() -> Result<(), serde_cbor::Error> {
        let cb = CanonicalBlock::payload(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let bytes = serde_cbor::to_vec(&cb)?;
        // [1, flags, h'DEADBEEF']
        assert_eq!(bytes, [0x83, 0x01, 0x08, 0x44, 0xDE, 0xAD, 0xBE, 0xEF]);
        let back: CanonicalBlock = serde_cbor::from_slice(&bytes)?;
        assert_eq!(cb, back);
        Ok(())
    }

    #[test]
    fn unknown_type_preserved() -> Result<(), serde_cbor::Error> {
        let bytes = [0x83, 0x18, 0xC7, 0x00, 0x42, 0x01, 0x02];
        let cb: CanonicalBlock = serde_cbor::from_slice(&bytes)?;
        match &cb.block {
            Block::Unkown(b) => {
                assert_eq!(b.block_type, 199);
                assert_eq!(b.data, vec![1, 2]);
            }
            Block::Payload(_) => panic!("should not decode as payload"),
        }
        assert_eq!(cb.block_flags, BlockFlags::empty());
        assert_eq!(serde_cbor::to_vec(&cb)?, bytes);
        Ok(())
    }
}
