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

use std::collections::HashMap;

use bp6::endpoint::EndpointId;
use log::info;
use parking_lot::Mutex;

pub mod contact;
pub mod link;

pub use contact::{Contact, ContactRef};
pub use link::{Link, LinkKind, LinkParams, LinkRef, LinkState, LinkStateReason};

#[derive(Debug)]
pub enum ContactManagerError {
    DuplicateLink(String),
    NoSuchLink(String),
}

impl std::fmt::Display for ContactManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactManagerError::DuplicateLink(name) => {
                f.write_fmt(format_args!("link {name} already exists"))
            }
            ContactManagerError::NoSuchLink(name) => {
                f.write_fmt(format_args!("no link named {name}"))
            }
        }
    }
}

impl std::error::Error for ContactManagerError {}

/// Registry of every link the daemon knows, keyed by name.
#[derive(Default)]
pub struct ContactManager {
    links: Mutex<HashMap<String, LinkRef>>,
}

impl ContactManager {
    pub fn new() -> Self {
        ContactManager::default()
    }

    /// Register a link. A name collision leaves the existing link
    /// untouched.
    pub fn add_link(&self, link: LinkRef) -> Result<(), ContactManagerError> {
        let mut links = self.links.lock();
        if links.contains_key(link.name()) {
            return Err(ContactManagerError::DuplicateLink(link.name().to_string()));
        }
        info!("adding {link:?}");
        links.insert(link.name().to_string(), link);
        Ok(())
    }

    pub fn del_link(&self, name: &str) -> Option<LinkRef> {
        self.links.lock().remove(name)
    }

    pub fn find_link(&self, name: &str) -> Option<LinkRef> {
        self.links.lock().get(name).cloned()
    }

    /// All links ordered by name, so consumers iterate deterministically.
    pub fn links(&self) -> Vec<LinkRef> {
        let mut links: Vec<LinkRef> = self.links.lock().values().cloned().collect();
        links.sort_by(|a, b| a.name().cmp(b.name()));
        links
    }

    /// Find the link a peer contact belongs to, by convergence layer
    /// and next-hop address.
    pub fn find_link_for_peer(&self, cl_name: &str, nexthop: &str) -> Option<LinkRef> {
        self.links
            .lock()
            .values()
            .find(|l| l.cl_name() == cl_name && l.nexthop() == nexthop)
            .cloned()
    }

    /// Synthesise a link for a contact from a previously unknown peer.
    /// The name counter is persistent, so names stay unique across
    /// restarts.
    pub fn new_opportunistic_link(
        &self,
        cl_name: &str,
        nexthop: &str,
        remote_eid: Option<EndpointId>,
        linkid: u32,
    ) -> Result<LinkRef, ContactManagerError> {
        let name = format!("opportunistic-{linkid}");
        let link = Link::new(
            &name,
            LinkKind::Opportunistic,
            cl_name,
            nexthop,
            LinkParams::default(),
        );
        if let Some(eid) = remote_eid {
            link.set_remote_eid(eid);
        }
        self.add_link(link.clone())?;
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        link::{Link, LinkKind, LinkParams},
        ContactManager, ContactManagerError,
    };

    #[test]
    fn duplicate_names_are_rejected() {
        let cm = ContactManager::new();
        let first = Link::new(
            "l1",
            LinkKind::AlwaysOn,
            "loopback",
            "loopback://peer",
            LinkParams::default(),
        );
        cm.add_link(first.clone()).unwrap();

        let second = Link::new(
            "l1",
            LinkKind::OnDemand,
            "loopback",
            "loopback://other",
            LinkParams::default(),
        );
        match cm.add_link(second) {
            Err(ContactManagerError::DuplicateLink(name)) => assert_eq!(name, "l1"),
            other => panic!("expected duplicate error, got {other:?}"),
        }
        // the original is untouched
        let found = cm.find_link("l1").unwrap();
        assert_eq!(found.kind(), LinkKind::AlwaysOn);
        assert_eq!(found.nexthop(), "loopback://peer");
    }

    #[test]
    fn opportunistic_names_use_the_counter() {
        let cm = ContactManager::new();
        let l7 = cm
            .new_opportunistic_link("loopback", "loopback://p1", None, 7)
            .unwrap();
        assert_eq!(l7.name(), "opportunistic-7");
        assert_eq!(l7.kind(), LinkKind::Opportunistic);
        let l8 = cm
            .new_opportunistic_link("loopback", "loopback://p2", None, 8)
            .unwrap();
        assert_eq!(l8.name(), "opportunistic-8");
        assert!(cm.find_link_for_peer("loopback", "loopback://p1").is_some());
    }
}
