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

use serde::{
    de::{Error, Visitor},
    ser::SerializeSeq,
    Deserialize, Serialize,
};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    endpoint::EndpointId,
    time::{CreationTimestamp, DtnTime},
};

/// One asserted-or-not status flag plus the time it was asserted.
#[derive(Debug, PartialEq, Eq)]
pub struct BundleStatusItem {
    pub is_asserted: bool,
    pub timestamp: Option<DtnTime>,
}

impl BundleStatusItem {
    pub fn asserted_at(now: DtnTime) -> Self {
        BundleStatusItem {
            is_asserted: true,
            timestamp: Some(now),
        }
    }

    pub fn not_asserted() -> Self {
        BundleStatusItem {
            is_asserted: false,
            timestamp: None,
        }
    }
}

impl Serialize for BundleStatusItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let length = if self.is_asserted && self.timestamp.is_some() {
            2
        } else {
            1
        };
        let mut seq = serializer.serialize_seq(Some(length))?;
        seq.serialize_element(&self.is_asserted)?;
        if length == 2 {
            seq.serialize_element(&self.timestamp)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for BundleStatusItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BundleStatusItemVisitor;
        impl<'de> Visitor<'de> for BundleStatusItemVisitor {
            type Value = BundleStatusItem;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("bundle status item")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let length = seq.size_hint().ok_or(Error::custom(
                    "CBOR Array for BundleStatusItem must have a size hint",
                ))?;
                if length > 2 {
                    Err(Error::invalid_length(
                        length,
                        &"A BundleStatusItem must have 1 or 2 elements",
                    ))?;
                }
                let is_asserted = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'is_asserted'"))?;
                let timestamp = if length == 2 && is_asserted {
                    seq.next_element()?
                        .ok_or(Error::custom("Error for field 'timestamp'"))?
                } else {
                    None
                };
                Ok(BundleStatusItem {
                    is_asserted,
                    timestamp,
                })
            }
        }
        deserializer.deserialize_seq(BundleStatusItemVisitor)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u64)]
pub enum BundleStatusReason {
    NoAdditionalInformation = 0,
    LifetimeExpired = 1,
    ForwardedOverUnidirectionalLink = 2,
    TransmissionCancelled = 3,
    DepletedStorage = 4,
    DestinationEndpointUnintelligible = 5,
    NoKnownRouteToDestination = 6,
    NoTimelyContactWithNextNode = 7,
    BlockUnintelligible = 8,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BundleStatusInformation {
    pub received_bundle: BundleStatusItem,
    pub custody_accepted_bundle: BundleStatusItem,
    pub forwarded_bundle: BundleStatusItem,
    pub delivered_bundle: BundleStatusItem,
    pub deleted_bundle: BundleStatusItem,
}

impl Serialize for BundleStatusInformation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(5))?;
        seq.serialize_element(&self.received_bundle)?;
        seq.serialize_element(&self.custody_accepted_bundle)?;
        seq.serialize_element(&self.forwarded_bundle)?;
        seq.serialize_element(&self.delivered_bundle)?;
        seq.serialize_element(&self.deleted_bundle)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for BundleStatusInformation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BundleStatusInformationVisitor;
        impl<'de> Visitor<'de> for BundleStatusInformationVisitor {
            type Value = BundleStatusInformation;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("bundle status information")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let received_bundle = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'received_bundle'"))?;
                let custody_accepted_bundle = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'custody_accepted_bundle'"))?;
                let forwarded_bundle = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'forwarded_bundle'"))?;
                let delivered_bundle = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'delivered_bundle'"))?;
                let deleted_bundle = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'deleted_bundle'"))?;
                Ok(BundleStatusInformation {
                    received_bundle,
                    custody_accepted_bundle,
                    forwarded_bundle,
                    delivered_bundle,
                    deleted_bundle,
                })
            }
        }
        deserializer.deserialize_seq(BundleStatusInformationVisitor)
    }
}

/// A report about the processing of one bundle, addressed to its
/// report-to endpoint.
#[derive(Debug, PartialEq, Eq)]
pub struct BundleStatusReport {
    pub status_information: BundleStatusInformation,
    pub reason: BundleStatusReason,
    pub bundle_source: EndpointId,
    pub bundle_creation_timestamp: CreationTimestamp,
    pub fragment_offset: Option<u64>,
    pub fragment_length: Option<u64>,
}

impl Serialize for BundleStatusReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let len = if self.fragment_offset.is_none() { 4 } else { 6 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.status_information)?;
        seq.serialize_element(&self.reason)?;
        seq.serialize_element(&self.bundle_source)?;
        seq.serialize_element(&self.bundle_creation_timestamp)?;
        if self.fragment_offset.is_some() {
            seq.serialize_element(&self.fragment_offset.unwrap())?;
            seq.serialize_element(&self.fragment_length.unwrap())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for BundleStatusReport {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BundleStatusReportVisitor;
        impl<'de> Visitor<'de> for BundleStatusReportVisitor {
            type Value = BundleStatusReport;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("bundle status report")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let size = seq.size_hint().unwrap_or(0);
                if size != 4 && size != 6 {
                    return Err(Error::invalid_length(
                        size,
                        &"BundleStatusReport has 4 or 6 elements",
                    ));
                }
                let status_information = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'status_information'"))?;
                let reason = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'reason'"))?;
                let bundle_source = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'bundle_source'"))?;
                let bundle_creation_timestamp = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'bundle_creation_timestamp'"))?;
                let (fragment_offset, fragment_length) = if size == 6 {
                    (
                        Some(
                            seq.next_element()?
                                .ok_or(Error::custom("Error for field 'fragment_offset'"))?,
                        ),
                        Some(
                            seq.next_element()?
                                .ok_or(Error::custom("Error for field 'fragment_length'"))?,
                        ),
                    )
                } else {
                    (None, None)
                };
                Ok(BundleStatusReport {
                    status_information,
                    reason,
                    bundle_source,
                    bundle_creation_timestamp,
                    fragment_offset,
                    fragment_length,
                })
            }
        }
        deserializer.deserialize_seq(BundleStatusReportVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BundleStatusInformation, BundleStatusItem, BundleStatusReason, BundleStatusReport,
    };
    use crate::{
        administrative_record::AdministrativeRecord,
        endpoint::EndpointId,
        time::{CreationTimestamp, DtnTime},
    };

    #[test]
    fn roundtrip() -> Result<(), serde_cbor::Error> {
        let now = DtnTime {
            timestamp: 700_000_123,
        };
        let report = BundleStatusReport {
            status_information: BundleStatusInformation {
                received_bundle: BundleStatusItem::asserted_at(now),
                custody_accepted_bundle: BundleStatusItem::not_asserted(),
                forwarded_bundle: BundleStatusItem::not_asserted(),
                delivered_bundle: BundleStatusItem::not_asserted(),
                deleted_bundle: BundleStatusItem::not_asserted(),
            },
            reason: BundleStatusReason::NoAdditionalInformation,
            bundle_source: EndpointId::new("dtn://a/app").unwrap(),
            bundle_creation_timestamp: CreationTimestamp {
                creation_time: DtnTime {
                    timestamp: 700_000_000,
                },
                sequence_number: 9,
            },
            fragment_offset: None,
            fragment_length: None,
        };
        let record = AdministrativeRecord::BundleStatusReport(report);
        let bytes: Vec<u8> = (&record).try_into().unwrap();
        let back = AdministrativeRecord::try_from(bytes.as_slice()).unwrap();
        assert_eq!(record, back);
        Ok(())
    }
}
