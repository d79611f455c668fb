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

use bp6::{bundleflags::BundleFlags, cos::Priority, endpoint::EndpointId};
use tokio::sync::mpsc;

use crate::{
    bundling::BundleRef,
    contacts::{LinkKind, LinkParams, LinkRef, LinkState, LinkStateReason},
    registration::FailureAction,
};

/// Sender half of the daemon's event queue. Everything that changes
/// daemon state goes through one of these.
pub type EventSender = mpsc::Sender<BundleEvent>;

/// Where a received bundle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleSource {
    /// A local application handed it in.
    App,
    /// A convergence layer received it from a peer.
    Peer,
    /// Re-read from the persistent store during recovery.
    Store,
    /// Produced by reassembly or fragmentation.
    Fragmentation,
}

/// Fields of a locally sourced bundle, handed in by the console or an
/// application. The daemon fills in source defaults, the creation
/// timestamp sequence and the bundleid.
#[derive(Debug, Clone)]
pub struct InjectSpec {
    pub source: Option<EndpointId>,
    pub dest: EndpointId,
    pub replyto: Option<EndpointId>,
    pub lifetime: u64,
    pub priority: Priority,
    pub flags: BundleFlags,
    pub payload: Vec<u8>,
}

/// Every state-changing stimulus the daemon reacts to.
#[derive(Debug, Clone)]
pub enum BundleEvent {
    // -- bundle lifecycle
    BundleReceived {
        bundle: BundleRef,
        source: BundleSource,
    },
    BundleTransmitted {
        bundle: BundleRef,
        link: LinkRef,
        bytes_sent: u64,
        reliably_sent: u64,
    },
    BundleTransmitFailed {
        bundle: BundleRef,
        link: LinkRef,
        reason: LinkStateReason,
    },
    BundleExpired {
        bundle: BundleRef,
    },
    /// The last reference to an evicted bundle is about to go away.
    BundleFree {
        bundle: BundleRef,
    },
    CustodyTimeout {
        bundle: BundleRef,
        link: LinkRef,
    },
    /// A custody signal addressed to this node was received and parsed.
    CustodyReleased {
        bundle: BundleRef,
        succeeded: bool,
    },

    // -- registrations
    RegistrationAdded {
        regid: u32,
    },
    RegistrationRemoved {
        regid: u32,
    },

    // -- links and contacts
    LinkCreated {
        link: LinkRef,
    },
    LinkDeleted {
        name: String,
    },
    LinkAvailable {
        link: LinkRef,
    },
    LinkUnavailable {
        link: LinkRef,
    },
    /// Posted by a convergence layer when it observed a state change
    /// on its own (connection lost, flow control, reconnect).
    LinkStateChange {
        link: LinkRef,
        state: LinkState,
        reason: LinkStateReason,
    },
    ContactUp {
        link: LinkRef,
    },
    ContactDown {
        link: LinkRef,
        reason: LinkStateReason,
    },
    /// A convergence layer saw an incoming contact from a peer no link
    /// points at; the contact manager will synthesise one.
    PeerContactDiscovered {
        cl_name: String,
        nexthop: String,
        remote_eid: Option<EndpointId>,
    },

    // -- console / control requests
    LinkCreateRequest {
        name: String,
        kind: LinkKind,
        cl_name: String,
        nexthop: String,
        params: LinkParams,
    },
    LinkOpenRequest {
        name: String,
    },
    LinkCloseRequest {
        name: String,
        reason: LinkStateReason,
    },
    LinkDeleteRequest {
        name: String,
    },
    InterfaceCreateRequest {
        name: String,
        addr: String,
    },
    InterfaceDestroyRequest {
        name: String,
    },
    BundleInject(InjectSpec),
    RouteAddRequest {
        pattern: EndpointId,
        link: String,
    },
    RouteDelRequest {
        pattern: EndpointId,
    },
    RegistrationAddRequest {
        endpoint: EndpointId,
        failure_action: FailureAction,
        script: Option<String>,
        expiration: u64,
    },
    RegistrationRemoveRequest {
        regid: u32,
    },
}

impl BundleEvent {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            BundleEvent::BundleReceived { .. } => "BundleReceived",
            BundleEvent::BundleTransmitted { .. } => "BundleTransmitted",
            BundleEvent::BundleTransmitFailed { .. } => "BundleTransmitFailed",
            BundleEvent::BundleExpired { .. } => "BundleExpired",
            BundleEvent::BundleFree { .. } => "BundleFree",
            BundleEvent::CustodyTimeout { .. } => "CustodyTimeout",
            BundleEvent::CustodyReleased { .. } => "CustodyReleased",
            BundleEvent::RegistrationAdded { .. } => "RegistrationAdded",
            BundleEvent::RegistrationRemoved { .. } => "RegistrationRemoved",
            BundleEvent::LinkCreated { .. } => "LinkCreated",
            BundleEvent::LinkDeleted { .. } => "LinkDeleted",
            BundleEvent::LinkAvailable { .. } => "LinkAvailable",
            BundleEvent::LinkUnavailable { .. } => "LinkUnavailable",
            BundleEvent::LinkStateChange { .. } => "LinkStateChange",
            BundleEvent::ContactUp { .. } => "ContactUp",
            BundleEvent::ContactDown { .. } => "ContactDown",
            BundleEvent::PeerContactDiscovered { .. } => "PeerContactDiscovered",
            BundleEvent::LinkCreateRequest { .. } => "LinkCreateRequest",
            BundleEvent::LinkOpenRequest { .. } => "LinkOpenRequest",
            BundleEvent::LinkCloseRequest { .. } => "LinkCloseRequest",
            BundleEvent::LinkDeleteRequest { .. } => "LinkDeleteRequest",
            BundleEvent::InterfaceCreateRequest { .. } => "InterfaceCreateRequest",
            BundleEvent::InterfaceDestroyRequest { .. } => "InterfaceDestroyRequest",
            BundleEvent::BundleInject(_) => "BundleInject",
            BundleEvent::RouteAddRequest { .. } => "RouteAddRequest",
            BundleEvent::RouteDelRequest { .. } => "RouteDelRequest",
            BundleEvent::RegistrationAddRequest { .. } => "RegistrationAddRequest",
            BundleEvent::RegistrationRemoveRequest { .. } => "RegistrationRemoveRequest",
        }
    }
}
