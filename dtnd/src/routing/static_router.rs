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

use bp6::{administrative_record::bundle_status_report::BundleStatusReason, endpoint::EndpointId};
use log::{debug, warn};

use crate::{
    bundling::{
        fwdlog::{CustodyTimerSpec, ForwardingAction, ForwardingState},
        BundleRef,
    },
    contacts::LinkRef,
    daemon::events::BundleEvent,
};

use super::{Router, RouterAction, RouterView};

struct RouteEntry {
    pattern: EndpointId,
    link: String,
}

/// Forwards along an explicitly configured table of
/// (destination pattern, link) entries, first match wins. Routes are
/// added and removed through route request events; arrival of a
/// matching bundle, a contact coming up, or a new route each trigger a
/// forwarding pass.
pub struct StaticRouter {
    routes: Vec<RouteEntry>,
}

impl StaticRouter {
    pub fn new() -> StaticRouter {
        StaticRouter { routes: Vec::new() }
    }

    fn find_link(&self, dest: &EndpointId, view: &RouterView<'_>) -> Option<LinkRef> {
        for route in &self.routes {
            if route.pattern.matches(dest) || route.pattern == *dest {
                match view.contacts.find_link(&route.link) {
                    Some(link) => return Some(link),
                    None => {
                        warn!("route for {dest} points at missing link {}", route.link);
                    }
                }
            }
        }
        None
    }

    /// Emit an enqueue for `bundle` if a route leads to an open link
    /// the bundle is not already on.
    fn route_bundle(&self, bundle: &BundleRef, view: &RouterView<'_>) -> Option<RouterAction> {
        if view.local_eid.matches_node(&bundle.dest) {
            // local delivery is the daemon's business
            return None;
        }
        let link = self.find_link(&bundle.dest, view)?;
        // a busy link suppresses further sends until it unblocks
        if link.state() != crate::contacts::LinkState::Open {
            return None;
        }
        match bundle.fwdlog_latest(link.name()) {
            ForwardingState::InFlight
            | ForwardingState::Transmitting
            | ForwardingState::Transmitted
            | ForwardingState::Delivered => return None,
            ForwardingState::None
            | ForwardingState::Cancelled
            | ForwardingState::CustodyTimeout => {}
        }
        debug!("routing {bundle:?} over link {}", link.name());
        Some(RouterAction::Enqueue {
            bundle: bundle.clone(),
            link,
            action: ForwardingAction::ForwardUnique,
            custody_timer: if bundle.custody_requested() {
                Some(CustodyTimerSpec::default())
            } else {
                None
            },
        })
    }

    /// Try every pending bundle again, e.g. after a topology change.
    fn sweep(&self, view: &RouterView<'_>) -> Vec<RouterAction> {
        view.pending
            .snapshot()
            .iter()
            .filter_map(|bundle| self.route_bundle(bundle, view))
            .collect()
    }
}

impl Default for StaticRouter {
    fn default() -> Self {
        StaticRouter::new()
    }
}

impl Router for StaticRouter {
    fn name(&self) -> &'static str {
        "static"
    }

    fn handle_event(&mut self, event: &BundleEvent, view: &RouterView<'_>) -> Vec<RouterAction> {
        match event {
            BundleEvent::BundleReceived { bundle, .. } => {
                self.route_bundle(bundle, view).into_iter().collect()
            }
            BundleEvent::BundleTransmitted { bundle, .. } => {
                // a uniquely forwarded bundle is done here unless we
                // wait for a custody acknowledgement
                if bundle.local_custody() {
                    vec![]
                } else {
                    vec![RouterAction::Delete {
                        bundle: bundle.clone(),
                        reason: BundleStatusReason::NoAdditionalInformation,
                    }]
                }
            }
            BundleEvent::BundleTransmitFailed { bundle, .. } => {
                // if the link is still usable try again, otherwise the
                // bundle stays pending for the next contact
                self.route_bundle(bundle, view).into_iter().collect()
            }
            BundleEvent::CustodyTimeout { bundle, .. } => {
                self.route_bundle(bundle, view).into_iter().collect()
            }
            BundleEvent::CustodyReleased { bundle, succeeded } => {
                if *succeeded {
                    vec![RouterAction::Delete {
                        bundle: bundle.clone(),
                        reason: BundleStatusReason::NoAdditionalInformation,
                    }]
                } else {
                    self.route_bundle(bundle, view).into_iter().collect()
                }
            }
            BundleEvent::ContactUp { .. } | BundleEvent::LinkAvailable { .. } => self.sweep(view),
            BundleEvent::LinkStateChange { state, .. }
                if *state == crate::contacts::LinkState::Open =>
            {
                self.sweep(view)
            }
            BundleEvent::RouteAddRequest { pattern, link } => {
                debug!("adding route {pattern} -> {link}");
                self.routes.push(RouteEntry {
                    pattern: pattern.clone(),
                    link: link.clone(),
                });
                self.sweep(view)
            }
            BundleEvent::RouteDelRequest { pattern } => {
                let before = self.routes.len();
                self.routes.retain(|r| r.pattern != *pattern);
                if self.routes.len() == before {
                    warn!("no route found to remove for {pattern}");
                }
                vec![]
            }
            _ => vec![],
        }
    }
}
