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

use bitflags::bitflags;
use serde::{de::Visitor, Deserialize, Serialize};

use crate::Validate;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Bundle Processing Control Flags
    pub struct BundleFlags: u64 {
        /// The bundle is a fragment.
        const IS_FRAGMENT = 0x0000_0001;
        /// The bundle's payload is an administrative record.
        const IS_ADMIN = 0x0000_0002;
        /// The bundle must not be fragmented.
        const DO_NOT_FRAGMENT = 0x0000_0004;
        /// Custody transfer is requested.
        const CUSTODY_REQUESTED = 0x0000_0008;
        /// The destination endpoint is a singleton.
        const SINGLETON_DEST = 0x0000_0010;
        /// Request reporting of bundle reception.
        const RECEIVE_RCPT = 0x0000_0100;
        /// Request reporting of custody acceptance.
        const CUSTODY_RCPT = 0x0000_0200;
        /// Request reporting of bundle forwarding.
        const FORWARD_RCPT = 0x0000_0400;
        /// Request reporting of bundle delivery.
        const DELIVERY_RCPT = 0x0000_0800;
        /// Request reporting of bundle deletion.
        const DELETION_RCPT = 0x0000_1000;
    }
}

impl Serialize for BundleFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for BundleFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BundleFlagsVisitor;
        impl Visitor<'_> for BundleFlagsVisitor {
            type Value = BundleFlags;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("Bundle Flags")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(BundleFlags::from_bits_truncate(v))
            }
        }
        deserializer.deserialize_u64(BundleFlagsVisitor)
    }
}

impl Validate for BundleFlags {
    fn validate(&self) -> bool {
        if self.contains(BundleFlags::IS_ADMIN)
            && self.intersects(
                BundleFlags::RECEIVE_RCPT
                    | BundleFlags::CUSTODY_RCPT
                    | BundleFlags::FORWARD_RCPT
                    | BundleFlags::DELIVERY_RCPT
                    | BundleFlags::DELETION_RCPT,
            )
        {
            return false;
        }
        if self.contains(BundleFlags::IS_FRAGMENT | BundleFlags::DO_NOT_FRAGMENT) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::BundleFlags;
    use crate::Validate;

    #[test]
    fn serialization() -> Result<(), serde_cbor::Error> {
        let flags = BundleFlags::CUSTODY_REQUESTED | BundleFlags::DELIVERY_RCPT;
        assert_eq!(serde_cbor::to_vec(&flags)?, [0x19, 0x08, 0x08]);
        let back: BundleFlags = serde_cbor::from_slice(&[0x19, 0x08, 0x08])?;
        assert_eq!(back, flags);
        Ok(())
    }

    #[test]
    fn admin_records_request_no_reports() {
        let flags = BundleFlags::IS_ADMIN | BundleFlags::DELIVERY_RCPT;
        assert!(!flags.validate());
        assert!(BundleFlags::IS_ADMIN.validate());
    }

    #[test]
    fn fragment_conflicts_with_do_not_fragment() {
        assert!(!(BundleFlags::IS_FRAGMENT | BundleFlags::DO_NOT_FRAGMENT).validate());
    }
}
