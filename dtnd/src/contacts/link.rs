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
    any::Any,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

use bp6::endpoint::EndpointId;
use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::bundling::BundleList;

use super::contact::ContactRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Kept open whenever it can be.
    AlwaysOn,
    /// Opened when there is something to send.
    OnDemand,
    /// Open during pre-arranged contact windows.
    Scheduled,
    /// Synthesised when an unknown peer showed up.
    Opportunistic,
}

impl LinkKind {
    pub fn parse(s: &str) -> Option<LinkKind> {
        match s {
            "alwayson" => Some(LinkKind::AlwaysOn),
            "ondemand" => Some(LinkKind::OnDemand),
            "scheduled" => Some(LinkKind::Scheduled),
            "opportunistic" => Some(LinkKind::Opportunistic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unavailable,
    Available,
    Opening,
    Open,
    Busy,
    Closed,
    Deleted,
}

/// Why a link or contact changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStateReason {
    NoInfo,
    User,
    Broken,
    Shutdown,
    Reconnect,
    Idle,
    Timeout,
    Unblocked,
}

/// The state transitions the daemon is allowed to perform. `Deleted`
/// is terminal and reachable from everywhere.
pub fn transition_is_legal(from: LinkState, to: LinkState) -> bool {
    use LinkState::{Available, Busy, Closed, Deleted, Open, Opening, Unavailable};
    if to == Deleted {
        return from != Deleted;
    }
    matches!(
        (from, to),
        (Unavailable, Available)
            | (Available, Opening | Unavailable)
            | (Opening, Open | Unavailable)
            | (Open, Closed | Busy)
            | (Busy, Open | Closed)
            | (Closed, Available | Unavailable)
    )
}

#[derive(Debug, Clone, Copy)]
pub struct LinkParams {
    /// Largest bundle the link accepts, 0 for no limit.
    pub mtu: u64,
    /// Close an idle OnDemand link after this many seconds, 0 disables.
    pub idle_close_secs: u32,
    /// Delay before re-opening a closed AlwaysOn link.
    pub min_retry_secs: u32,
    /// The convergence layer acknowledges data end to end.
    pub reliable: bool,
}

impl Default for LinkParams {
    fn default() -> Self {
        LinkParams {
            mtu: 0,
            idle_close_secs: 0,
            min_retry_secs: 5,
            reliable: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct LinkStats {
    pub bundles_inflight: AtomicU32,
    pub bytes_inflight: AtomicU64,
    pub bundles_transmitted: AtomicU32,
    pub bytes_transmitted: AtomicU64,
    pub bundles_cancelled: AtomicU32,
    pub contacts: AtomicU32,
}

impl LinkStats {
    pub fn sent(&self, bytes: u64) {
        self.bundles_inflight.fetch_add(1, Ordering::Relaxed);
        self.bytes_inflight.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn transmitted(&self, queued_bytes: u64, sent_bytes: u64) {
        self.bundles_inflight.fetch_sub(1, Ordering::Relaxed);
        self.bytes_inflight.fetch_sub(queued_bytes, Ordering::Relaxed);
        self.bundles_transmitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_transmitted.fetch_add(sent_bytes, Ordering::Relaxed);
    }

    pub fn cancelled(&self, queued_bytes: u64) {
        self.bundles_inflight.fetch_sub(1, Ordering::Relaxed);
        self.bytes_inflight.fetch_sub(queued_bytes, Ordering::Relaxed);
        self.bundles_cancelled.fetch_add(1, Ordering::Relaxed);
    }
}

pub type LinkRef = Arc<Link>;

/// A logical attachment to a next-hop peer through one convergence
/// layer. The current contact is `Some` exactly while the link is open
/// (or busy, which is open with sends suppressed).
pub struct Link {
    name: String,
    kind: LinkKind,
    cl_name: String,
    nexthop: String,
    params: LinkParams,
    remote_eid: Mutex<Option<EndpointId>>,
    state: Mutex<LinkState>,
    contact: Mutex<Option<ContactRef>>,
    queue: Arc<BundleList>,
    cl_info: Mutex<Option<Box<dyn Any + Send>>>,
    pub stats: LinkStats,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "link {} [{:?} {:?} via {} -> {}]",
            self.name,
            self.kind,
            self.state(),
            self.cl_name,
            self.nexthop
        ))
    }
}

impl Link {
    pub fn new(
        name: &str,
        kind: LinkKind,
        cl_name: &str,
        nexthop: &str,
        params: LinkParams,
    ) -> LinkRef {
        Arc::new(Link {
            name: name.to_string(),
            kind,
            cl_name: cl_name.to_string(),
            nexthop: nexthop.to_string(),
            params,
            remote_eid: Mutex::new(None),
            state: Mutex::new(LinkState::Unavailable),
            contact: Mutex::new(None),
            queue: BundleList::new(&format!("link:{name}")),
            cl_info: Mutex::new(None),
            stats: LinkStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn cl_name(&self) -> &str {
        &self.cl_name
    }

    pub fn nexthop(&self) -> &str {
        &self.nexthop
    }

    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// Move to `new_state` without legality checking. Callers decide
    /// legality via `transition_is_legal`.
    pub fn set_state(&self, new_state: LinkState) {
        let mut state = self.state.lock();
        debug!("link {}: {:?} -> {:?}", self.name, *state, new_state);
        *state = new_state;
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), LinkState::Open | LinkState::Busy)
    }

    pub fn contact(&self) -> Option<ContactRef> {
        self.contact.lock().clone()
    }

    pub fn set_contact(&self, contact: ContactRef) {
        let mut slot = self.contact.lock();
        debug_assert!(slot.is_none(), "link {} already has a contact", self.name);
        *slot = Some(contact);
    }

    pub fn take_contact(&self) -> Option<ContactRef> {
        self.contact.lock().take()
    }

    pub fn queue(&self) -> &Arc<BundleList> {
        &self.queue
    }

    pub fn remote_eid(&self) -> Option<EndpointId> {
        self.remote_eid.lock().clone()
    }

    pub fn set_remote_eid(&self, eid: EndpointId) {
        *self.remote_eid.lock() = Some(eid);
    }

    /// Slot for convergence-layer private state. The core never looks
    /// inside.
    pub fn cl_info(&self) -> MutexGuard<'_, Option<Box<dyn Any + Send>>> {
        self.cl_info.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::{transition_is_legal, LinkState};

    #[test]
    fn transition_table() {
        use LinkState::{Available, Busy, Closed, Deleted, Open, Opening, Unavailable};
        let legal = [
            (Unavailable, Available),
            (Available, Opening),
            (Opening, Open),
            (Opening, Unavailable),
            (Open, Busy),
            (Busy, Open),
            (Open, Closed),
            (Closed, Available),
            (Closed, Unavailable),
            (Open, Deleted),
            (Unavailable, Deleted),
        ];
        for (from, to) in legal {
            assert!(transition_is_legal(from, to), "{from:?} -> {to:?}");
        }
        let illegal = [
            (Unavailable, Open),
            (Available, Open),
            (Open, Opening),
            (Closed, Open),
            (Deleted, Available),
            (Deleted, Deleted),
        ];
        for (from, to) in illegal {
            assert!(!transition_is_legal(from, to), "{from:?} -> {to:?}");
        }
    }
}
