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

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bp6::bundle::{BundleConsumer, BundleProducer};
use log::{debug, error, warn};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    bundling::{Bundle, BundleRef},
    contacts::{ContactRef, LinkRef, LinkStateReason},
    daemon::events::{BundleEvent, BundleSource, EventSender},
};

use super::{ClError, ClRegistry, ConvergenceLayer, InterfaceRef};

pub const LOOPBACK_SCHEME: &str = "loopback";

/// How many wire bytes go out per transfer segment.
const TRANSFER_SEGMENT_SIZE: usize = 1024;

struct Transfer {
    token: CancellationToken,
    bundle: BundleRef,
}

/// Per-contact private state: the transfers currently on the wire.
#[derive(Default)]
struct ContactState {
    transfers: Arc<Mutex<HashMap<u32, Transfer>>>,
}

/// An in-process convergence layer. Contacts are always reachable.
/// Each transfer is pushed through the incremental codec in
/// `TRANSFER_SEGMENT_SIZE` windows, throttled to `bytes_per_sec`, and
/// the re-decoded bundle is optionally injected into a peer daemon's
/// event queue as an arrival from a peer.
///
/// Transfer completion and cancellation race against each other; whoever
/// removes the transfer from the contact registry first owns posting
/// the single outcome event.
pub struct LoopbackCl {
    event_tx: EventSender,
    bytes_per_sec: u64,
    deliver_to: Mutex<Option<EventSender>>,
}

impl LoopbackCl {
    pub fn new(event_tx: EventSender, bytes_per_sec: u64) -> Arc<LoopbackCl> {
        Arc::new(LoopbackCl {
            event_tx,
            bytes_per_sec,
            deliver_to: Mutex::new(None),
        })
    }

    pub fn register(registry: &mut ClRegistry, event_tx: EventSender) -> Arc<LoopbackCl> {
        let cl = LoopbackCl::new(event_tx, 0);
        registry.add(cl.clone());
        cl
    }

    /// Wire transmitted bundles into `peer` as peer arrivals. Used to
    /// connect two in-process daemons back to back.
    pub fn set_deliver_to(&self, peer: Option<EventSender>) {
        *self.deliver_to.lock() = peer;
    }

    /// Post an event without ever blocking the caller. Overflow falls
    /// back to a detached send so the event is delayed, not lost.
    fn post(event_tx: &EventSender, event: BundleEvent) {
        use tokio::sync::mpsc::error::TrySendError;
        match event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("event queue full, posting {} from a task", event.kind());
                let tx = event_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(event).await;
                });
            }
            Err(TrySendError::Closed(event)) => {
                debug!("event queue closed, dropping {}", event.kind());
            }
        }
    }

    fn segment_duration(bytes_per_sec: u64, bytes: usize) -> Duration {
        if bytes_per_sec == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(bytes as f64 / bytes_per_sec as f64)
        }
    }

    fn contact_transfers(contact: &ContactRef) -> Option<Arc<Mutex<HashMap<u32, Transfer>>>> {
        contact
            .cl_info()
            .as_ref()
            .and_then(|info| info.downcast_ref::<ContactState>())
            .map(|state| state.transfers.clone())
    }
}

#[async_trait]
impl ConvergenceLayer for LoopbackCl {
    fn name(&self) -> &'static str {
        LOOPBACK_SCHEME
    }

    async fn init_interface(&self, iface: &InterfaceRef) -> Result<(), ClError> {
        debug!("loopback interface {} ready", iface.name());
        Ok(())
    }

    async fn destroy_interface(&self, iface: &InterfaceRef) {
        debug!("loopback interface {} destroyed", iface.name());
    }

    async fn init_link(&self, link: &LinkRef) -> Result<(), ClError> {
        debug!("loopback link {} initialised", link.name());
        Ok(())
    }

    async fn delete_link(&self, link: &LinkRef) {
        debug!("loopback link {} deleted", link.name());
    }

    async fn open_contact(&self, contact: &ContactRef) -> Result<(), ClError> {
        let Some(link) = contact.link() else {
            return Err(ClError::ContactFailed("link is gone".to_string()));
        };
        *contact.cl_info() = Some(Box::new(ContactState::default()));
        // a loopback peer is always reachable, the contact comes up at
        // once
        Self::post(&self.event_tx, BundleEvent::ContactUp { link });
        Ok(())
    }

    async fn close_contact(&self, contact: &ContactRef, reason: LinkStateReason) {
        let Some(transfers) = Self::contact_transfers(contact) else {
            return;
        };
        let drained: Vec<Transfer> = {
            let mut map = transfers.lock();
            map.drain().map(|(_, t)| t).collect()
        };
        if let Some(link) = contact.link() {
            for transfer in drained {
                transfer.token.cancel();
                Self::post(
                    &self.event_tx,
                    BundleEvent::BundleTransmitFailed {
                        bundle: transfer.bundle,
                        link: link.clone(),
                        reason,
                    },
                );
            }
        }
        *contact.cl_info() = None;
    }

    async fn send_bundle(&self, contact: &ContactRef, bundle: BundleRef) {
        let Some(link) = contact.link() else {
            error!("send on a contact whose link is gone: {bundle:?}");
            return;
        };
        let Some(transfers) = Self::contact_transfers(contact) else {
            Self::post(
                &self.event_tx,
                BundleEvent::BundleTransmitFailed {
                    bundle,
                    link,
                    reason: LinkStateReason::Broken,
                },
            );
            return;
        };

        let wire = match bundle.to_wire() {
            Ok(wire) => wire,
            Err(e) => {
                error!("cannot serialize {bundle:?}: {e}");
                Self::post(
                    &self.event_tx,
                    BundleEvent::BundleTransmitFailed {
                        bundle,
                        link,
                        reason: LinkStateReason::Broken,
                    },
                );
                return;
            }
        };
        let producer = match BundleProducer::new(&wire) {
            Ok(producer) => producer,
            Err(e) => {
                error!("cannot serialize {bundle:?}: {e}");
                Self::post(
                    &self.event_tx,
                    BundleEvent::BundleTransmitFailed {
                        bundle,
                        link,
                        reason: LinkStateReason::Broken,
                    },
                );
                return;
            }
        };

        let bytes = bundle.payload().length();
        let token = CancellationToken::new();
        transfers.lock().insert(
            bundle.bundleid(),
            Transfer {
                token: token.clone(),
                bundle: bundle.clone(),
            },
        );

        let bytes_per_sec = self.bytes_per_sec;
        let reliably_sent = if link.params().reliable { bytes } else { 0 };
        let event_tx = self.event_tx.clone();
        let deliver_to = self.deliver_to.lock().clone();
        tokio::spawn(async move {
            // the receiving side of the wire: segments accumulate until
            // a whole bundle decodes
            let mut consumer = BundleConsumer::new();
            let mut received = None;
            let mut offset = 0;
            loop {
                let (segment, done) = producer.produce(offset, TRANSFER_SEGMENT_SIZE);
                let delay = Self::segment_duration(bytes_per_sec, segment.len());
                tokio::select! {
                    () = token.cancelled() => {
                        // the canceller owns the outcome event
                        return;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                match consumer.push(segment) {
                    Ok(Some(decoded)) => received = Some(decoded),
                    Ok(None) => {}
                    Err(e) => {
                        error!("loopback could not re-read its own bytes: {e}");
                        if transfers.lock().remove(&bundle.bundleid()).is_some() {
                            Self::post(
                                &event_tx,
                                BundleEvent::BundleTransmitFailed {
                                    bundle,
                                    link,
                                    reason: LinkStateReason::Broken,
                                },
                            );
                        }
                        return;
                    }
                }
                offset += segment.len();
                if done {
                    break;
                }
            }

            let claimed = transfers.lock().remove(&bundle.bundleid()).is_some();
            if !claimed {
                return;
            }
            let Some(decoded) = received else {
                error!("transfer of {bundle:?} ended before a whole bundle decoded");
                Self::post(
                    &event_tx,
                    BundleEvent::BundleTransmitFailed {
                        bundle,
                        link,
                        reason: LinkStateReason::Broken,
                    },
                );
                return;
            };
            if let Some(peer) = deliver_to {
                match Bundle::from_wire(&decoded) {
                    Ok(arrival) => {
                        let _ = peer
                            .send(BundleEvent::BundleReceived {
                                bundle: Arc::new(arrival),
                                source: BundleSource::Peer,
                            })
                            .await;
                    }
                    Err(e) => error!("loopback cannot deliver {bundle:?} to its peer: {e}"),
                }
            }
            Self::post(
                &event_tx,
                BundleEvent::BundleTransmitted {
                    bundle,
                    link,
                    bytes_sent: bytes,
                    reliably_sent,
                },
            );
        });
    }

    async fn cancel_bundle(&self, contact: &ContactRef, bundle: &BundleRef) -> bool {
        let Some(transfers) = Self::contact_transfers(contact) else {
            return false;
        };
        let transfer = transfers.lock().remove(&bundle.bundleid());
        match transfer {
            Some(transfer) => {
                transfer.token.cancel();
                if let Some(link) = contact.link() {
                    Self::post(
                        &self.event_tx,
                        BundleEvent::BundleTransmitFailed {
                            bundle: transfer.bundle,
                            link,
                            reason: LinkStateReason::User,
                        },
                    );
                }
                true
            }
            None => false,
        }
    }

    fn is_queued(&self, link: &LinkRef, bundle: &BundleRef) -> bool {
        link.contact()
            .and_then(|contact| Self::contact_transfers(&contact))
            .is_some_and(|transfers| transfers.lock().contains_key(&bundle.bundleid()))
    }
}
