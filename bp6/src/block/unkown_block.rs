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

use std::fmt::Debug;

use serde::Serialize;

use crate::Validate;

/// A block with a type code we do not understand. The body is carried
/// opaquely so the block survives forwarding unmodified.
#[derive(PartialEq, Eq, Clone)]
pub struct UnkownBlock {
    pub block_type: u64,
    pub data: Vec<u8>,
}

impl Debug for UnkownBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnkownBlock")
            .field("block_type", &self.block_type)
            .field("data (length)", &self.data.len())
            .finish()
    }
}

impl Serialize for UnkownBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.data)
    }
}

impl Validate for UnkownBlock {
    fn validate(&self) -> bool {
        true
    }
}
