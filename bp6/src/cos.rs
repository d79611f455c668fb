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

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Bundle class of service.
#[derive(
    Debug,
    Serialize_repr,
    Deserialize_repr,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u64)]
pub enum Priority {
    Bulk = 0,
    Normal = 1,
    Expedited = 2,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Bulk => f.write_str("bulk"),
            Priority::Normal => f.write_str("normal"),
            Priority::Expedited => f.write_str("expedited"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Priority;

    #[test]
    fn ordering() {
        assert!(Priority::Bulk < Priority::Normal);
        assert!(Priority::Normal < Priority::Expedited);
    }

    #[test]
    fn serialization() -> Result<(), serde_cbor::Error> {
        assert_eq!(serde_cbor::to_vec(&Priority::Expedited)?, [0x02]);
        let p: Priority = serde_cbor::from_slice(&[0x00])?;
        assert_eq!(p, Priority::Bulk);
        Ok(())
    }
}
