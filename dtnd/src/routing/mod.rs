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

use std::sync::Arc;

use bp6::{administrative_record::bundle_status_report::BundleStatusReason, endpoint::EndpointId};

use crate::{
    bundling::{
        fwdlog::{CustodyTimerSpec, ForwardingAction},
        BundleList, BundleRef,
    },
    contacts::{ContactManager, LinkRef},
    daemon::events::BundleEvent,
};

pub mod static_router;

/// What a router may ask the daemon to do. Routers have no direct
/// access to lists or links; every mutation goes through one of these.
#[derive(Debug)]
pub enum RouterAction {
    Enqueue {
        bundle: BundleRef,
        link: LinkRef,
        action: ForwardingAction,
        custody_timer: Option<CustodyTimerSpec>,
    },
    Cancel {
        bundle: BundleRef,
        link: LinkRef,
    },
    Delete {
        bundle: BundleRef,
        reason: BundleStatusReason,
    },
    StoreAdd {
        bundle: BundleRef,
    },
    StoreUpdate {
        bundle: BundleRef,
    },
    StoreDel {
        bundle: BundleRef,
    },
}

/// Read-only view of daemon state a router may consult while deciding.
pub struct RouterView<'a> {
    pub local_eid: &'a EndpointId,
    pub contacts: &'a ContactManager,
    pub pending: &'a Arc<BundleList>,
}

/// The decision module. Invoked synchronously from the daemon task,
/// one event at a time; it must not block and must be deterministic
/// given the same event sequence, so event replays reproduce the same
/// actions.
pub trait Router: Send {
    fn name(&self) -> &'static str;

    fn handle_event(&mut self, event: &BundleEvent, view: &RouterView<'_>) -> Vec<RouterAction>;
}

#[derive(Debug)]
pub struct UnknownRouterType(pub String);

impl std::fmt::Display for UnknownRouterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("unknown router type: {}", self.0))
    }
}

impl std::error::Error for UnknownRouterType {}

pub fn create_router(kind: &str) -> Result<Box<dyn Router>, UnknownRouterType> {
    match kind {
        "static" => Ok(Box::new(static_router::StaticRouter::new())),
        other => Err(UnknownRouterType(other.to_string())),
    }
}
