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

use std::fmt::Display;

use serde::{
    de::{Error, Unexpected, Visitor},
    ser::SerializeSeq,
    Deserialize, Serialize,
};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::Validate;

/// Service number standing in for "any service on this node" in an
/// ipn pattern (`ipn:7.*`). Never allocated to a concrete endpoint.
pub const IPN_SERVICE_WILDCARD: u64 = u64::MAX;

#[derive(Debug, Serialize_repr, Deserialize_repr, PartialEq, Eq)]
#[repr(u64)]
enum EndpointScheme {
    Dtn = 1,
    Ipn = 2,
}

/// A bundle endpoint name, either a concrete identifier or a pattern.
///
/// Patterns (`dtn://node/*`, `dtn://*`, `ipn:7.*`) only appear in
/// registrations and route tables. They never name a bundle on the wire.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub enum EndpointId {
    Dtn(DtnEndpoint),
    Ipn(IpnEndpoint),
}

impl Serialize for EndpointId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2))?;
        match self {
            EndpointId::Dtn(e) => {
                seq.serialize_element(&EndpointScheme::Dtn)?;
                seq.serialize_element(e)?;
            }
            EndpointId::Ipn(e) => {
                seq.serialize_element(&EndpointScheme::Ipn)?;
                seq.serialize_element(e)?;
            }
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for EndpointId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EndpointIdVisitor;
        impl<'de> Visitor<'de> for EndpointIdVisitor {
            type Value = EndpointId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("endpoint")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let scheme: EndpointScheme = seq
                    .next_element()?
                    .ok_or(Error::custom("Error for field 'scheme'"))?;
                match scheme {
                    EndpointScheme::Dtn => {
                        let dtn_endpoint: DtnEndpoint = seq
                            .next_element()?
                            .ok_or(Error::custom("Error for field 'dtn_endpoint'"))?;
                        Ok(EndpointId::Dtn(dtn_endpoint))
                    }
                    EndpointScheme::Ipn => {
                        let ipn_endpoint: IpnEndpoint = seq
                            .next_element()?
                            .ok_or(Error::custom("Error for field 'ipn_endpoint'"))?;
                        Ok(EndpointId::Ipn(ipn_endpoint))
                    }
                }
            }
        }
        deserializer.deserialize_seq(EndpointIdVisitor)
    }
}

impl Validate for EndpointId {
    fn validate(&self) -> bool {
        match self {
            EndpointId::Dtn(e) => e.validate(),
            EndpointId::Ipn(e) => e.validate(),
        }
    }
}

impl Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointId::Dtn(e) => e.fmt(f),
            EndpointId::Ipn(e) => e.fmt(f),
        }
    }
}

impl EndpointId {
    pub fn new(uri: &str) -> Option<Self> {
        let (schema, content) = uri.split_once(':')?;
        match schema {
            "dtn" => Some(EndpointId::Dtn(DtnEndpoint::from_str(content)?)),
            "ipn" => Some(EndpointId::Ipn(IpnEndpoint::from_str(content)?)),
            _ => None,
        }
    }

    pub fn null_endpoint() -> Self {
        EndpointId::Dtn(DtnEndpoint {
            uri: String::from("none"),
        })
    }

    pub fn is_null_endpoint(&self) -> bool {
        match self {
            EndpointId::Dtn(e) => e.is_null_endpoint(),
            EndpointId::Ipn(_) => false,
        }
    }

    pub fn is_pattern(&self) -> bool {
        match self {
            EndpointId::Dtn(e) => e.is_pattern(),
            EndpointId::Ipn(e) => e.service == IPN_SERVICE_WILDCARD,
        }
    }

    /// Pattern match against a concrete id. A concrete id matches only
    /// itself.
    pub fn matches(&self, other: &EndpointId) -> bool {
        match self {
            EndpointId::Dtn(s) => matches!(other, EndpointId::Dtn(o) if s.matches(o)),
            EndpointId::Ipn(s) => matches!(other, EndpointId::Ipn(o) if s.matches(o)),
        }
    }

    /// True if both ids name the same node, ignoring the service part.
    pub fn matches_node(&self, other: &EndpointId) -> bool {
        match self {
            EndpointId::Dtn(s) => matches!(other, EndpointId::Dtn(o) if s.matches_node(o)),
            EndpointId::Ipn(s) => matches!(other, EndpointId::Ipn(o) if s.matches_node(o)),
        }
    }

    pub fn node_endpoint(&self) -> EndpointId {
        match self {
            EndpointId::Dtn(s) => EndpointId::Dtn(s.node_endpoint()),
            EndpointId::Ipn(s) => EndpointId::Ipn(s.node_endpoint()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct DtnEndpoint {
    pub uri: String,
}

impl DtnEndpoint {
    fn from_str(uri: &str) -> Option<Self> {
        if uri == "none" {
            return Some(DtnEndpoint {
                uri: String::from(uri),
            });
        }
        if !uri.starts_with("//") {
            return None;
        }
        Some(DtnEndpoint {
            uri: String::from(uri),
        })
    }

    fn is_null_endpoint(&self) -> bool {
        self.uri == "none"
    }

    pub fn node_name(&self) -> &str {
        self.uri[2..]
            .split('/')
            .next()
            .expect("There is always a first element")
    }

    fn is_pattern(&self) -> bool {
        self.uri == "//*" || self.uri.ends_with("/*")
    }

    fn matches(&self, other: &DtnEndpoint) -> bool {
        if !self.is_pattern() {
            return self == other;
        }
        if self.uri == "//*" {
            return !other.is_null_endpoint();
        }
        let prefix = &self.uri[..self.uri.len() - 2];
        other.uri == prefix || other.uri.starts_with(&format!("{prefix}/"))
    }

    pub fn matches_node(&self, other: &DtnEndpoint) -> bool {
        self.node_name() == other.node_name()
    }

    pub fn node_endpoint(&self) -> DtnEndpoint {
        DtnEndpoint::from_str(&("//".to_owned() + self.node_name())).unwrap()
    }
}

impl Serialize for DtnEndpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.is_null_endpoint() {
            serializer.serialize_u64(0)
        } else {
            serializer.serialize_str(&self.uri)
        }
    }
}

impl<'de> Deserialize<'de> for DtnEndpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct DtnEndpointVisitor;
        impl<'de> Visitor<'de> for DtnEndpointVisitor {
            type Value = DtnEndpoint;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("DTN Endpoint")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                if v == 0 {
                    return Ok(DtnEndpoint {
                        uri: String::from("none"),
                    });
                }
                Err(Error::invalid_value(
                    Unexpected::Unsigned(v),
                    &"DTN Endpoints may only have 0 as a value",
                ))
            }

            fn visit_borrowed_str<E>(self, v: &'de str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(DtnEndpoint {
                    uri: String::from(v),
                })
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(DtnEndpoint {
                    uri: String::from(v),
                })
            }
        }
        deserializer.deserialize_any(DtnEndpointVisitor)
    }
}

impl Validate for DtnEndpoint {
    fn validate(&self) -> bool {
        if self.uri != "none" && !self.uri.starts_with("//") {
            return false;
        }
        true
    }
}

impl Display for DtnEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("dtn:{}", self.uri))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Clone, Copy, Hash)]
pub struct IpnEndpoint {
    pub node: u64,
    pub service: u64,
}

impl Validate for IpnEndpoint {
    fn validate(&self) -> bool {
        true
    }
}

impl IpnEndpoint {
    fn from_str(hier: &str) -> Option<Self> {
        let (node, service) = hier.split_once('.')?;
        let node_id = node.parse().ok()?;
        let service_id = if service == "*" {
            IPN_SERVICE_WILDCARD
        } else {
            service.parse().ok()?
        };
        Some(IpnEndpoint {
            node: node_id,
            service: service_id,
        })
    }

    fn matches(&self, other: &IpnEndpoint) -> bool {
        if self.service == IPN_SERVICE_WILDCARD {
            return self.node == other.node;
        }
        self == other
    }

    pub fn matches_node(&self, other: &IpnEndpoint) -> bool {
        self.node == other.node
    }

    pub fn node_endpoint(&self) -> IpnEndpoint {
        IpnEndpoint {
            node: self.node,
            service: 0,
        }
    }
}

impl Display for IpnEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.service == IPN_SERVICE_WILDCARD {
            f.write_fmt(format_args!("ipn:{}.*", self.node))
        } else {
            f.write_fmt(format_args!("ipn:{}.{}", self.node, self.service))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EndpointId;

    fn eid(s: &str) -> EndpointId {
        EndpointId::new(s).unwrap()
    }

    #[test]
    fn parse_and_display() {
        for uri in [
            "dtn://node1/app",
            "dtn://node1",
            "dtn:none",
            "ipn:7.42",
            "dtn://node1/*",
            "ipn:7.*",
        ] {
            assert_eq!(eid(uri).to_string(), uri);
        }
        assert!(EndpointId::new("mailto:foo@example.com").is_none());
        assert!(EndpointId::new("dtn:node-without-slashes").is_none());
        assert!(EndpointId::new("ipn:1").is_none());
    }

    #[test]
    fn serialize_concrete_dtn() -> Result<(), serde_cbor::Error> {
        assert_eq!(
            serde_cbor::to_vec(&eid("dtn://node1/app"))?,
            [
                0x82, 0x01, 0x6B, 0x2F, 0x2F, 0x6E, 0x6F, 0x64, 0x65, 0x31, 0x2F, 0x61, 0x70, 0x70
            ]
        );
        Ok(())
    }

    #[test]
    fn serialize_null() -> Result<(), serde_cbor::Error> {
        assert_eq!(
            serde_cbor::to_vec(&EndpointId::null_endpoint())?,
            [0x82, 0x01, 0x00]
        );
        Ok(())
    }

    #[test]
    fn serialize_ipn() -> Result<(), serde_cbor::Error> {
        assert_eq!(
            serde_cbor::to_vec(&eid("ipn:7.42"))?,
            [0x82, 0x02, 0x82, 0x07, 0x18, 0x2A]
        );
        Ok(())
    }

    #[test]
    fn roundtrip() -> Result<(), serde_cbor::Error> {
        for uri in ["dtn://node1/app", "dtn:none", "ipn:7.42"] {
            let e = eid(uri);
            let bytes = serde_cbor::to_vec(&e)?;
            let back: EndpointId = serde_cbor::from_slice(&bytes)?;
            assert_eq!(e, back);
        }
        Ok(())
    }

    #[test]
    fn pattern_matching() {
        let cases = [
            ("dtn://node1/app", "dtn://node1/app", true),
            ("dtn://node1/app", "dtn://node1/other", false),
            ("dtn://node1/*", "dtn://node1/app", true),
            ("dtn://node1/*", "dtn://node1", true),
            ("dtn://node1/*", "dtn://node1/app/sub", true),
            ("dtn://node1/*", "dtn://node10/app", false),
            ("dtn://*", "dtn://anything/at/all", true),
            ("dtn://*", "dtn:none", false),
            ("ipn:7.*", "ipn:7.42", true),
            ("ipn:7.*", "ipn:8.42", false),
            ("ipn:7.42", "ipn:7.42", true),
            ("ipn:7.42", "ipn:7.43", false),
            ("dtn://node1/*", "ipn:7.42", false),
        ];
        for (pattern, concrete, expected) in cases {
            assert_eq!(
                eid(pattern).matches(&eid(concrete)),
                expected,
                "{pattern} vs {concrete}"
            );
        }
    }

    #[test]
    fn node_matching() {
        assert!(eid("dtn://node1/app").matches_node(&eid("dtn://node1/other")));
        assert!(!eid("dtn://node1/app").matches_node(&eid("dtn://node2/app")));
        assert_eq!(eid("dtn://node1/app").node_endpoint(), eid("dtn://node1"));
        assert_eq!(eid("ipn:7.42").node_endpoint(), eid("ipn:7.0"));
    }
}
