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

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u64)]
pub enum CustodySignalReason {
    NoAdditionalInformation = 0,
    RedundantReception = 3,
    DepletedStorage = 4,
    DestinationEndpointUnintelligible = 5,
    NoKnownRouteToDestination = 6,
    NoTimelyContactWithNextNode = 7,
    BlockUnintelligible = 8,
}

/// Acceptance or refusal of custody for one bundle, addressed to its
/// current custodian.
#[derive(Debug, PartialEq, Eq)]
pub struct CustodySignal {
    pub succeeded: bool,
    pub reason: CustodySignalReason,
    pub signal_time: DtnTime,
    pub bundle_source: EndpointId,
    pub bundle_creation_timestamp: CreationTimestamp,
    pub fragment_offset: Option<u64>,
    pub fragment_length: Option<u64>,
}

impl CustodySignal {
    pub fn accepted(
        now: DtnTime,
        bundle_source: EndpointId,
        bundle_creation_timestamp: CreationTimestamp,
    ) -> Self {
        CustodySignal {
            succeeded: true,
            reason: CustodySignalReason::NoAdditionalInformation,
            signal_time: now,
            bundle_source,
            bundle_creation_timestamp,
            fragment_offset: None,
            fragment_length: None,
        }
    }

    pub fn refused(
        now: DtnTime,
        reason: CustodySignalReason,
        bundle_source: EndpointId,
        bundle_creation_timestamp: CreationTimestamp,
    ) -> Self {
        CustodySignal {
            succeeded: false,
            reason,
            signal_time: now,
            bundle_source,
            bundle_creation_timestamp,
            fragment_offset: None,
            fragment_length: None,
        }
    }
}

impl Serialize for CustodySignal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let len = if self.fragment_offset.is_none() { 5 } else { 7 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.succeeded)?;
        seq.serialize_element(&self.reason)?;
        seq.serialize_element(&self.signal_time)?;
        seq.serialize_element(&self.bundle_source)?;
        seq.serialize_element(&self.bundle_creation_timestamp)?;
        if self.fragment_offset.is_some() {
            seq.serialize_element(&self.fragment_offset.unwrap())?;
            seq.serialize_element(&self.fragment_length.unwrap())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for CustodySignal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct CustodySignalVisitor;
        impl<'de> Visitor<'de> for CustodySignalVisitor {
            type Value = CustodySignal;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("custody signal")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let size = seq.size_hint().unwrap_or(0);
                if size != 5 && size != 7 {
                    return Err(Error::invalid_length(
                        size,
                        &"CustodySignal has 5 or 7 elements",
                    ));
                }
                let succeeded = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'succeeded'"))?;
                let reason = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'reason'"))?;
                let signal_time = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'signal_time'"))?;
                let bundle_source = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'bundle_source'"))?;
                let bundle_creation_timestamp = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'bundle_creation_timestamp'"))?;
                let (fragment_offset, fragment_length) = if size == 7 {
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
                Ok(CustodySignal {
                    succeeded,
                    reason,
                    signal_time,
                    bundle_source,
                    bundle_creation_timestamp,
                    fragment_offset,
                    fragment_length,
                })
            }
        }
        deserializer.deserialize_seq(CustodySignalVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::{CustodySignal, CustodySignalReason};
    use crate::{
        administrative_record::AdministrativeRecord,
        endpoint::EndpointId,
        time::{CreationTimestamp, DtnTime},
    };

    #[test]
    fn roundtrip() {
        let signal = CustodySignal::accepted(
            DtnTime {
                timestamp: 700_000_200,
            },
            EndpointId::new("dtn://a/app").unwrap(),
            CreationTimestamp {
                creation_time: DtnTime {
                    timestamp: 700_000_000,
                },
                sequence_number: 0,
            },
        );
        let record = AdministrativeRecord::CustodySignal(signal);
        let bytes: Vec<u8> = (&record).try_into().unwrap();
        let back = AdministrativeRecord::try_from(bytes.as_slice()).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn refusal_keeps_reason() {
        let signal = CustodySignal::refused(
            DtnTime { timestamp: 1 },
            CustodySignalReason::DepletedStorage,
            EndpointId::new("ipn:3.1").unwrap(),
            CreationTimestamp {
                creation_time: DtnTime { timestamp: 0 },
                sequence_number: 7,
            },
        );
        let record = AdministrativeRecord::CustodySignal(signal);
        let bytes: Vec<u8> = (&record).try_into().unwrap();
        match AdministrativeRecord::try_from(bytes.as_slice()).unwrap() {
            AdministrativeRecord::CustodySignal(s) => {
                assert!(!s.succeeded);
                assert_eq!(s.reason, CustodySignalReason::DepletedStorage);
            }
            AdministrativeRecord::BundleStatusReport(_) => panic!("wrong record type"),
        }
    }
}
