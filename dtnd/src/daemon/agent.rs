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
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use bp6::{
    administrative_record::{
        bundle_status_report::{
            BundleStatusInformation, BundleStatusItem, BundleStatusReason, BundleStatusReport,
        },
        custody_signal::{CustodySignal, CustodySignalReason},
        AdministrativeRecord,
    },
    block::CanonicalBlock,
    bundle::Bundle as WireBundle,
    bundleflags::BundleFlags,
    cos::Priority,
    endpoint::EndpointId,
    primaryblock::{PrimaryBlock, BP_VERSION},
    time::{CreationTimestamp, DtnTime},
};
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};

use crate::{
    bundling::{
        fwdlog::{CustodyTimerSpec, ForwardingAction, ForwardingState},
        payload::PayloadLocation,
        Bundle, BundleList, BundleRef,
    },
    cla::{ClRegistry, Interface, InterfaceRef},
    common::{settings::Settings, shutdown::Shutdown},
    contacts::{
        Contact, ContactManager, Link, LinkKind, LinkParams, LinkRef, LinkState, LinkStateReason,
    },
    daemon::events::{BundleEvent, BundleSource, EventSender, InjectSpec},
    registration::{FailureAction, Registration, RegistrationTable},
    routing::{create_router, Router, RouterAction, RouterView, UnknownRouterType},
    storage::{DataStore, Globals, PutMode, StoreError, Table},
    timers::{TimerHandle, TimerService},
};

/// Pseudo link name used in the forwarding log for local delivery.
const LOCAL_DELIVERY_LINK: &str = "local";

/// Lifetime of generated administrative bundles, in seconds.
const ADMIN_BUNDLE_LIFETIME: u64 = 86400;

#[derive(Debug)]
pub enum DaemonError {
    Store(StoreError),
    Router(UnknownRouterType),
    Config(String),
}

impl From<StoreError> for DaemonError {
    fn from(e: StoreError) -> Self {
        DaemonError::Store(e)
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(e: std::io::Error) -> Self {
        DaemonError::Store(StoreError::Io(e))
    }
}

impl From<UnknownRouterType> for DaemonError {
    fn from(e: UnknownRouterType) -> Self {
        DaemonError::Router(e)
    }
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::Store(e) => f.write_fmt(format_args!("store error: {e}")),
            DaemonError::Router(e) => f.write_fmt(format_args!("router error: {e}")),
            DaemonError::Config(e) => f.write_fmt(format_args!("config error: {e}")),
        }
    }
}

impl std::error::Error for DaemonError {}

/// Shared handles into a running daemon: the event queue plus the
/// structures that are legitimately shared (registries and lists carry
/// their own locks).
#[derive(Clone)]
pub struct DaemonHandle {
    pub local_eid: EndpointId,
    pub event_tx: EventSender,
    pub contact_manager: Arc<ContactManager>,
    pub registrations: Arc<RegistrationTable>,
    pub pending_bundles: Arc<BundleList>,
    pub custody_bundles: Arc<BundleList>,
    pub timers: TimerService,
}

/// The single consumer of the event queue and owner of all authoritative
/// bundle state. Every state transition happens on this task; producers
/// (convergence layers, the timer driver, the console) only post events.
pub struct BundleDaemon {
    local_eid: EndpointId,
    payload_dir: Option<PathBuf>,
    event_tx: EventSender,
    event_rx: mpsc::Receiver<BundleEvent>,
    store: Arc<dyn DataStore>,
    globals: Globals,
    pending_bundles: Arc<BundleList>,
    custody_bundles: Arc<BundleList>,
    contact_manager: Arc<ContactManager>,
    registrations: Arc<RegistrationTable>,
    cl_registry: ClRegistry,
    interfaces: HashMap<String, InterfaceRef>,
    router: Box<dyn Router>,
    timers: TimerService,
    custody_timers: HashMap<(u32, String), TimerHandle>,
    idle_timers: HashMap<String, TimerHandle>,
    last_created_dtn_time: Option<DtnTime>,
    last_sequence_number: u64,
}

impl BundleDaemon {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn DataStore>,
        cl_registry: ClRegistry,
        event_tx: EventSender,
        event_rx: mpsc::Receiver<BundleEvent>,
    ) -> Result<(BundleDaemon, DaemonHandle), DaemonError> {
        let local_eid = EndpointId::new(&settings.my_node_id)
            .ok_or_else(|| DaemonError::Config(format!("bad node id: {}", settings.my_node_id)))?;
        if settings.store_init || settings.store_tidy {
            for table in Table::ALL {
                store.truncate(table)?;
            }
        }
        let globals = Globals::load_or_init(store.clone())?;
        let router = create_router(&settings.router_type)?;
        let timers = TimerService::new();
        let daemon = BundleDaemon {
            local_eid: local_eid.clone(),
            payload_dir: settings.store_payload_path.as_ref().map(PathBuf::from),
            event_tx: event_tx.clone(),
            event_rx,
            store,
            globals,
            pending_bundles: BundleList::new("pending"),
            custody_bundles: BundleList::new("custody"),
            contact_manager: Arc::new(ContactManager::new()),
            registrations: Arc::new(RegistrationTable::new()),
            cl_registry,
            interfaces: HashMap::new(),
            router,
            timers: timers.clone(),
            custody_timers: HashMap::new(),
            idle_timers: HashMap::new(),
            last_created_dtn_time: None,
            last_sequence_number: 0,
        };
        let handle = DaemonHandle {
            local_eid,
            event_tx,
            contact_manager: daemon.contact_manager.clone(),
            registrations: daemon.registrations.clone(),
            pending_bundles: daemon.pending_bundles.clone(),
            custody_bundles: daemon.custody_bundles.clone(),
            timers,
        };
        Ok((daemon, handle))
    }

    pub fn timers(&self) -> TimerService {
        self.timers.clone()
    }

    /// Replay the durable state: globals are already loaded, bundles
    /// and registrations are re-materialised and run through the normal
    /// arrival path (with persistence skipped). Must complete before
    /// convergence layers are brought up.
    pub async fn recover(&mut self) -> Result<(), DaemonError> {
        let mut bundles = 0usize;
        for (key, data) in self.store.iterate(Table::Bundles)? {
            let record = match crate::storage::BundleRecord::decode(&data) {
                Ok(record) => record,
                Err(e) => {
                    error!("skipping undecodable bundle record {key}: {e}");
                    continue;
                }
            };
            match Bundle::from_record(&record, self.payload_dir.as_deref()) {
                Ok(bundle) => {
                    bundles += 1;
                    self.handle_bundle_received(Arc::new(bundle), BundleSource::Store)
                        .await?;
                }
                Err(e) => error!("skipping unloadable bundle {key}: {e}"),
            }
        }
        let mut regs = 0usize;
        for (key, data) in self.store.iterate(Table::Registrations)? {
            let record = match crate::storage::RegistrationRecord::decode(&data) {
                Ok(record) => record,
                Err(e) => {
                    error!("skipping undecodable registration record {key}: {e}");
                    continue;
                }
            };
            match Registration::from_record(&record) {
                Ok(registration) => {
                    regs += 1;
                    let regid = registration.regid();
                    self.registrations.add(registration);
                    self.handle_registration_added(regid).await?;
                }
                Err(e) => error!("skipping unloadable registration {key}: {e}"),
            }
        }
        info!("recovered {bundles} bundles and {regs} registrations");
        Ok(())
    }

    /// The daemon task. Runs until shutdown, then drains the queue.
    pub async fn run(
        mut self,
        shutdown_signal: broadcast::Receiver<()>,
        _sender: mpsc::Sender<()>,
    ) -> Result<(), DaemonError> {
        info!("bundle daemon starting as {}", self.local_eid);
        let mut shutdown = Shutdown::new(shutdown_signal);

        while !shutdown.is_shutdown() {
            tokio::select! {
                res = self.event_rx.recv() => {
                    if let Some(event) = res {
                        self.handle_event(event).await?;
                    } else {
                        info!("bundle daemon can no longer receive events, exiting");
                        return Ok(());
                    }
                }
                () = shutdown.recv() => {
                    info!("bundle daemon received shutdown");
                    self.event_rx.close();
                    info!("bundle daemon will not accept further events");
                }
            }
        }

        while let Some(event) = self.event_rx.recv().await {
            self.handle_event(event).await?;
        }

        self.on_shutdown().await;
        info!("bundle daemon has shutdown. See you");
        // _sender is explicitly dropped here
        Ok(())
    }

    async fn on_shutdown(&mut self) {
        for link in self.contact_manager.links() {
            if link.is_open() || link.state() == LinkState::Opening {
                self.close_link(&link, LinkStateReason::Shutdown).await;
            }
        }
        info!(
            "shutting down with {} pending and {} custody bundles",
            self.pending_bundles.size(),
            self.custody_bundles.size()
        );
    }

    /// Post an event onto our own queue without blocking the daemon
    /// task. Overflow falls back to a detached send.
    fn post_event(&self, event: BundleEvent) {
        use tokio::sync::mpsc::error::TrySendError;
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("event queue full, posting {} from a task", event.kind());
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(event).await;
                });
            }
            Err(TrySendError::Closed(event)) => {
                debug!("event queue closed, dropping {}", event.kind());
            }
        }
    }

    async fn handle_event(&mut self, event: BundleEvent) -> Result<(), DaemonError> {
        debug!("handling {}", event.kind());
        match event {
            BundleEvent::BundleReceived { bundle, source } => {
                self.handle_bundle_received(bundle, source).await
            }
            BundleEvent::BundleTransmitted {
                bundle,
                link,
                bytes_sent,
                reliably_sent,
            } => {
                self.handle_bundle_transmitted(bundle, link, bytes_sent, reliably_sent)
                    .await
            }
            BundleEvent::BundleTransmitFailed {
                bundle,
                link,
                reason,
            } => self.handle_bundle_transmit_failed(bundle, link, reason).await,
            BundleEvent::BundleExpired { bundle } => self.handle_bundle_expired(bundle).await,
            BundleEvent::BundleFree { .. } | BundleEvent::RegistrationRemoved { .. } => {
                self.invoke_router(&event).await
            }
            BundleEvent::CustodyTimeout { bundle, link } => {
                self.custody_timers
                    .remove(&(bundle.bundleid(), link.name().to_string()));
                bundle.fwdlog_update(link.name(), ForwardingState::CustodyTimeout);
                self.invoke_router(&BundleEvent::CustodyTimeout { bundle, link })
                    .await
            }
            BundleEvent::CustodyReleased { .. } => self.invoke_router(&event).await,
            BundleEvent::RegistrationAdded { regid } => {
                self.handle_registration_added(regid).await
            }
            BundleEvent::LinkCreated { .. }
            | BundleEvent::LinkDeleted { .. }
            | BundleEvent::LinkAvailable { .. }
            | BundleEvent::LinkUnavailable { .. } => self.invoke_router(&event).await,
            BundleEvent::LinkStateChange {
                link,
                state,
                reason,
            } => self.handle_link_state_change(link, state, reason).await,
            BundleEvent::ContactUp { link } => self.handle_contact_up(link).await,
            BundleEvent::ContactDown { link, reason } => {
                self.handle_contact_down(link, reason).await
            }
            BundleEvent::PeerContactDiscovered {
                cl_name,
                nexthop,
                remote_eid,
            } => {
                self.handle_peer_contact_discovered(&cl_name, &nexthop, remote_eid)
                    .await
            }
            BundleEvent::LinkCreateRequest {
                name,
                kind,
                cl_name,
                nexthop,
                params,
            } => {
                self.handle_link_create_request(&name, kind, &cl_name, &nexthop, params)
                    .await
            }
            BundleEvent::LinkOpenRequest { name } => {
                match self.contact_manager.find_link(&name) {
                    Some(link) => self.open_link(&link).await,
                    None => error!("cannot open unknown link {name}"),
                }
                Ok(())
            }
            BundleEvent::LinkCloseRequest { name, reason } => {
                match self.contact_manager.find_link(&name) {
                    Some(link) => self.close_link(&link, reason).await,
                    None => error!("cannot close unknown link {name}"),
                }
                Ok(())
            }
            BundleEvent::LinkDeleteRequest { name } => self.handle_link_delete_request(&name).await,
            BundleEvent::InterfaceCreateRequest { name, addr } => {
                self.handle_interface_create_request(&name, &addr).await;
                Ok(())
            }
            BundleEvent::InterfaceDestroyRequest { name } => {
                match self.interfaces.remove(&name) {
                    Some(iface) => {
                        if let Some(cl) = self.cl_registry.find(iface.cl_name()) {
                            cl.destroy_interface(&iface).await;
                        }
                    }
                    None => warn!("cannot destroy unknown interface {name}"),
                }
                Ok(())
            }
            BundleEvent::BundleInject(spec) => self.handle_bundle_inject(spec).await,
            BundleEvent::RouteAddRequest { .. } | BundleEvent::RouteDelRequest { .. } => {
                self.invoke_router(&event).await
            }
            BundleEvent::RegistrationAddRequest {
                endpoint,
                failure_action,
                script,
                expiration,
            } => {
                self.handle_registration_add_request(endpoint, failure_action, script, expiration)
                    .await
            }
            BundleEvent::RegistrationRemoveRequest { regid } => {
                self.handle_registration_remove_request(regid).await
            }
        }
    }

    // ----- bundle lifecycle

    async fn handle_bundle_received(
        &mut self,
        bundle: BundleRef,
        source: BundleSource,
    ) -> Result<(), DaemonError> {
        // duplicate detection on the identity tuple
        if let Some(existing) = self.pending_bundles.find_by_identity(&bundle.identity()) {
            if !Arc::ptr_eq(&existing, &bundle) {
                info!("duplicate arrival of {bundle:?}, keeping the first copy");
                if bundle.custody_requested() && source == BundleSource::Peer {
                    self.send_custody_signal(
                        &bundle,
                        false,
                        CustodySignalReason::RedundantReception,
                    );
                }
                return Ok(());
            }
        }

        if !bundle.has_bundleid() {
            bundle.assign_bundleid(self.globals.next_bundleid()?);
        }
        debug!("received {bundle:?} from {source:?}");

        // persist before acknowledging the bundle in any way; a store
        // failure here is fatal
        if source != BundleSource::Store {
            self.persist_bundle(&bundle, PutMode::CreateOrReplace)?;
        }

        if !self.pending_bundles.contains(&bundle) {
            self.pending_bundles.push_back(&bundle);
        }
        self.start_expiration_timer(&bundle);

        if source == BundleSource::Peer {
            if bundle.wants_report(BundleFlags::RECEIVE_RCPT) {
                self.send_status_report(
                    &bundle,
                    BundleStatusReason::NoAdditionalInformation,
                    StatusAssertion::RECEIVED,
                );
            }
            if bundle.custody_requested() && !bundle.local_custody() {
                self.accept_custody(&bundle);
            }
        }
        if source == BundleSource::Store && bundle.local_custody() {
            self.custody_bundles.push_back(&bundle);
        }

        // administrative records addressed to this node are consumed
        if bundle.is_admin() && self.local_eid.matches_node(&bundle.dest) {
            return self.handle_admin_bundle(&bundle).await;
        }

        let delivered = self.deliver_locally(&bundle);
        self.invoke_router(&BundleEvent::BundleReceived {
            bundle: bundle.clone(),
            source,
        })
        .await?;
        if delivered {
            self.delete_bundle(&bundle, None);
        }
        Ok(())
    }

    async fn handle_bundle_transmitted(
        &mut self,
        bundle: BundleRef,
        link: LinkRef,
        bytes_sent: u64,
        reliably_sent: u64,
    ) -> Result<(), DaemonError> {
        debug!(
            "transmitted {bundle:?} over {} ({bytes_sent} bytes, {reliably_sent} reliable)",
            link.name()
        );
        bundle.fwdlog_update(link.name(), ForwardingState::Transmitted);
        link.stats.transmitted(bundle.payload().length(), bytes_sent);
        link.queue().erase(&bundle);

        if bundle.wants_report(BundleFlags::FORWARD_RCPT) {
            self.send_status_report(
                &bundle,
                BundleStatusReason::NoAdditionalInformation,
                StatusAssertion::FORWARDED,
            );
        }

        // a custody bundle now waits for the next custodian to
        // acknowledge; arm the retransmission timer
        if bundle.local_custody() {
            if let Some(spec) = bundle
                .fwdlog_entry(link.name())
                .and_then(|e| e.custody_spec)
            {
                let timeout = spec.timeout_secs(bundle.expiration);
                let handle = self.timers.schedule_in(
                    Duration::from_secs(timeout),
                    BundleEvent::CustodyTimeout {
                        bundle: bundle.clone(),
                        link: link.clone(),
                    },
                );
                self.custody_timers
                    .insert((bundle.bundleid(), link.name().to_string()), handle);
            }
        }

        self.restart_idle_timer(&link);
        self.invoke_router(&BundleEvent::BundleTransmitted {
            bundle,
            link,
            bytes_sent,
            reliably_sent,
        })
        .await
    }

    async fn handle_bundle_transmit_failed(
        &mut self,
        bundle: BundleRef,
        link: LinkRef,
        reason: LinkStateReason,
    ) -> Result<(), DaemonError> {
        info!(
            "transmission of {bundle:?} over {} failed: {reason:?}",
            link.name()
        );
        if matches!(
            bundle.fwdlog_latest(link.name()),
            ForwardingState::InFlight | ForwardingState::Transmitting
        ) {
            bundle.fwdlog_update(link.name(), ForwardingState::Cancelled);
        }
        if link.queue().erase(&bundle) {
            link.stats.cancelled(bundle.payload().length());
        }
        if let Some(handle) = self
            .custody_timers
            .remove(&(bundle.bundleid(), link.name().to_string()))
        {
            handle.cancel();
        }
        self.invoke_router(&BundleEvent::BundleTransmitFailed {
            bundle,
            link,
            reason,
        })
        .await
    }

    async fn handle_bundle_expired(&mut self, bundle: BundleRef) -> Result<(), DaemonError> {
        if !self.pending_bundles.contains(&bundle) && !self.custody_bundles.contains(&bundle) {
            debug!("stale expiration for {bundle:?}");
            return Ok(());
        }
        info!("lifetime of {bundle:?} expired");
        bundle.take_expiration_timer();
        // the router observes the expiration before the bundle goes away
        self.invoke_router(&BundleEvent::BundleExpired {
            bundle: bundle.clone(),
        })
        .await?;
        self.delete_bundle(&bundle, Some(BundleStatusReason::LifetimeExpired));
        Ok(())
    }

    async fn handle_bundle_inject(&mut self, spec: InjectSpec) -> Result<(), DaemonError> {
        let source = spec.source.unwrap_or_else(|| self.local_eid.clone());
        let creation_timestamp = self.next_creation_timestamp();
        let wire = WireBundle {
            primary_block: PrimaryBlock {
                version: BP_VERSION,
                bundle_processing_flags: spec.flags | BundleFlags::SINGLETON_DEST,
                priority: spec.priority,
                destination_endpoint: spec.dest,
                source_node: source,
                replyto: spec.replyto.unwrap_or_else(EndpointId::null_endpoint),
                custodian: EndpointId::null_endpoint(),
                report_to: self.local_eid.clone(),
                creation_timestamp,
                lifetime: spec.lifetime,
                fragment_offset: None,
                total_data_length: None,
            },
            blocks: vec![CanonicalBlock::payload(spec.payload)],
        };
        match Bundle::from_wire(&wire) {
            Ok(bundle) => {
                self.handle_bundle_received(Arc::new(bundle), BundleSource::App)
                    .await
            }
            Err(e) => {
                error!("cannot build injected bundle: {e}");
                Ok(())
            }
        }
    }

    // ----- local delivery and custody

    /// Hand the bundle to every matching registration. Returns true if
    /// at least one took it.
    fn deliver_locally(&mut self, bundle: &BundleRef) -> bool {
        if !self.local_eid.matches_node(&bundle.dest) {
            return false;
        }
        if bundle.is_fragment() {
            warn!("{bundle:?} is a fragment awaiting reassembly, not deliverable yet");
            return false;
        }
        let matching = self.registrations.matching(&bundle.dest);
        if matching.is_empty() {
            debug!("no registration matches {}", bundle.dest);
            return false;
        }
        let mut delivered = false;
        for registration in matching {
            if registration.is_active() {
                registration.deliver(bundle);
                delivered = true;
                continue;
            }
            match registration.failure_action() {
                FailureAction::Defer => {
                    registration.deliver(bundle);
                    delivered = true;
                }
                FailureAction::Drop => {
                    debug!(
                        "registration {} is passive and drops {bundle:?}",
                        registration.regid()
                    );
                    delivered = true;
                }
                FailureAction::Exec => {
                    if let Some(script) = registration.script() {
                        match tokio::process::Command::new(script).spawn() {
                            Ok(_) => debug!("spawned handler {script}"),
                            Err(e) => error!("cannot spawn handler {script}: {e}"),
                        }
                    }
                    registration.deliver(bundle);
                    delivered = true;
                }
            }
        }
        if delivered {
            bundle.fwdlog_add(
                LOCAL_DELIVERY_LINK,
                ForwardingAction::ForwardUnique,
                ForwardingState::Delivered,
                None,
            );
            if bundle.wants_report(BundleFlags::DELIVERY_RCPT) {
                self.send_status_report(
                    bundle,
                    BundleStatusReason::NoAdditionalInformation,
                    StatusAssertion::DELIVERED,
                );
            }
        }
        delivered
    }

    fn accept_custody(&mut self, bundle: &BundleRef) {
        let previous = bundle.custodian();
        info!("accepting custody of {bundle:?} from {previous}");
        bundle.set_custodian(self.local_eid.clone());
        bundle.set_local_custody(true);
        self.custody_bundles.push_back(bundle);
        self.persist_update(bundle);
        if bundle.wants_report(BundleFlags::CUSTODY_RCPT) {
            self.send_status_report(
                bundle,
                BundleStatusReason::NoAdditionalInformation,
                StatusAssertion::CUSTODY_ACCEPTED,
            );
        }
        if !previous.is_null_endpoint() {
            self.send_custody_signal_to(
                &previous,
                bundle,
                true,
                CustodySignalReason::NoAdditionalInformation,
            );
        }
    }

    async fn handle_admin_bundle(&mut self, bundle: &BundleRef) -> Result<(), DaemonError> {
        match bundle.payload().read().map(|data| {
            AdministrativeRecord::try_from(data.as_slice())
        }) {
            Ok(Ok(AdministrativeRecord::CustodySignal(signal))) => {
                self.handle_custody_signal(&signal);
            }
            Ok(Ok(AdministrativeRecord::BundleStatusReport(report))) => {
                info!(
                    "status report for bundle from {}: reason {:?}",
                    report.bundle_source, report.reason
                );
            }
            Ok(Err(e)) => warn!("undecodable administrative record in {bundle:?}: {e}"),
            Err(e) => warn!("unreadable payload in {bundle:?}: {e}"),
        }
        // the admin bundle itself is consumed
        self.delete_bundle(bundle, None);
        Ok(())
    }

    fn handle_custody_signal(&mut self, signal: &CustodySignal) {
        let subject = self.custody_bundles.snapshot().into_iter().find(|b| {
            b.source == signal.bundle_source && b.creation_ts == signal.bundle_creation_timestamp
        });
        let Some(subject) = subject else {
            warn!(
                "custody signal for unknown bundle from {} at {:?}",
                signal.bundle_source, signal.bundle_creation_timestamp
            );
            return;
        };
        info!(
            "custody signal for {subject:?}: succeeded={} reason={:?}",
            signal.succeeded, signal.reason
        );
        if signal.succeeded {
            self.release_custody(&subject);
        }
        self.post_event(BundleEvent::CustodyReleased {
            bundle: subject,
            succeeded: signal.succeeded,
        });
    }

    fn release_custody(&mut self, bundle: &BundleRef) {
        bundle.set_local_custody(false);
        self.custody_bundles.erase(bundle);
        self.cancel_custody_timers(bundle);
        self.persist_update(bundle);
    }

    fn cancel_custody_timers(&mut self, bundle: &BundleRef) {
        let id = bundle.bundleid();
        self.custody_timers.retain(|(bundleid, _), handle| {
            if *bundleid == id {
                handle.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Remove a bundle from the daemon's authoritative lists and the
    /// store. `report_reason` drives the deletion status report;
    /// delivery lists are left alone so applications can still drain
    /// the bundle.
    fn delete_bundle(&mut self, bundle: &BundleRef, report_reason: Option<BundleStatusReason>) {
        debug!("deleting {bundle:?}");
        if bundle.custody_requested() && !bundle.local_custody() {
            let custodian = bundle.custodian();
            if !custodian.is_null_endpoint() && !self.local_eid.matches_node(&custodian) {
                self.send_custody_signal(
                    bundle,
                    false,
                    CustodySignalReason::NoTimelyContactWithNextNode,
                );
            }
        }
        if let Some(reason) = report_reason {
            if reason != BundleStatusReason::NoAdditionalInformation
                && bundle.wants_report(BundleFlags::DELETION_RCPT)
            {
                self.send_status_report(bundle, reason, StatusAssertion::DELETED);
            }
        }

        if let Some(handle) = bundle.take_expiration_timer() {
            handle.cancel();
        }
        self.cancel_custody_timers(bundle);
        bundle.set_local_custody(false);

        self.pending_bundles.erase(bundle);
        self.custody_bundles.erase(bundle);
        for link in self.contact_manager.links() {
            link.queue().erase(bundle);
        }

        let key = bundle.bundleid().to_string();
        match self.store.del(Table::Bundles, &key) {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => error!("cannot delete bundle {key} from the store: {e}"),
        }
        if let Some(dir) = &self.payload_dir {
            let path =
                crate::bundling::payload::BundlePayload::file_path(dir, bundle.bundleid());
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("cannot remove payload file of {bundle:?}: {e}");
                }
            }
        } else if bundle.payload().location() == PayloadLocation::File {
            if let Err(e) = bundle.payload().discard() {
                warn!("cannot remove payload file of {bundle:?}: {e}");
            }
        }

        if bundle.num_mappings() == 0 {
            self.post_event(BundleEvent::BundleFree {
                bundle: bundle.clone(),
            });
        }
    }

    // ----- links and contacts

    async fn handle_link_create_request(
        &mut self,
        name: &str,
        kind: LinkKind,
        cl_name: &str,
        nexthop: &str,
        params: LinkParams,
    ) -> Result<(), DaemonError> {
        let Some(cl) = self.cl_registry.find(cl_name) else {
            error!("cannot create link {name}: no convergence layer {cl_name}");
            return Ok(());
        };
        let link = Link::new(name, kind, cl_name, nexthop, params);
        if let Err(e) = self.contact_manager.add_link(link.clone()) {
            error!("cannot create link: {e}");
            return Ok(());
        }
        if let Err(e) = cl.init_link(&link).await {
            error!("convergence layer rejected link {name}: {e}");
            self.contact_manager.del_link(name);
            return Ok(());
        }
        self.invoke_router(&BundleEvent::LinkCreated { link: link.clone() })
            .await?;
        // scheduled links wait for their window, everything else is
        // available right away
        if kind != LinkKind::Scheduled {
            link.set_state(LinkState::Available);
            self.invoke_router(&BundleEvent::LinkAvailable { link: link.clone() })
                .await?;
        }
        if kind == LinkKind::AlwaysOn {
            self.open_link(&link).await;
        }
        Ok(())
    }

    async fn open_link(&mut self, link: &LinkRef) {
        match link.state() {
            LinkState::Available => {}
            LinkState::Opening | LinkState::Open | LinkState::Busy => {
                warn!("link {} is already open, ignoring", link.name());
                return;
            }
            state => {
                warn!("cannot open link {} in state {state:?}", link.name());
                return;
            }
        }
        let Some(cl) = self.cl_registry.find(link.cl_name()) else {
            error!("link {} has no convergence layer", link.name());
            return;
        };
        link.set_state(LinkState::Opening);
        let contact = Contact::new(link);
        link.set_contact(contact.clone());
        if let Err(e) = cl.open_contact(&contact).await {
            error!("cannot open contact on {}: {e}", link.name());
            link.take_contact();
            link.set_state(LinkState::Unavailable);
        }
    }

    async fn close_link(&mut self, link: &LinkRef, reason: LinkStateReason) {
        match link.state() {
            LinkState::Opening => {
                // destroy the partial contact, the link never came up
                if let Some(contact) = link.take_contact() {
                    if let Some(cl) = self.cl_registry.find(link.cl_name()) {
                        cl.close_contact(&contact, reason).await;
                    }
                }
                link.set_state(LinkState::Unavailable);
                return;
            }
            LinkState::Open | LinkState::Busy => {}
            state => {
                warn!(
                    "link {} is not open (state {state:?}), ignoring close",
                    link.name()
                );
                return;
            }
        }
        // the convergence layer drains every in-flight transfer into a
        // failure event before we announce the contact as down
        if let Some(contact) = link.take_contact() {
            if let Some(cl) = self.cl_registry.find(link.cl_name()) {
                cl.close_contact(&contact, reason).await;
            }
        }
        link.set_state(LinkState::Closed);
        if let Some(handle) = self.idle_timers.remove(link.name()) {
            handle.cancel();
        }
        self.post_event(BundleEvent::ContactDown {
            link: link.clone(),
            reason,
        });
    }

    async fn handle_contact_up(&mut self, link: LinkRef) -> Result<(), DaemonError> {
        match link.state() {
            LinkState::Opening => {}
            LinkState::Open | LinkState::Busy => {
                warn!("contact up on already-open link {}, ignoring", link.name());
                return Ok(());
            }
            state => {
                warn!(
                    "contact up on link {} in state {state:?}, ignoring",
                    link.name()
                );
                return Ok(());
            }
        }
        info!("contact up on link {}", link.name());
        link.set_state(LinkState::Open);
        link.stats
            .contacts
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.restart_idle_timer(&link);
        self.invoke_router(&BundleEvent::ContactUp { link }).await
    }

    async fn handle_contact_down(
        &mut self,
        link: LinkRef,
        reason: LinkStateReason,
    ) -> Result<(), DaemonError> {
        info!("contact down on link {} ({reason:?})", link.name());
        if link.state() != LinkState::Closed {
            // a convergence layer noticed the loss before we did
            link.take_contact();
            link.set_state(LinkState::Closed);
        }
        self.invoke_router(&BundleEvent::ContactDown {
            link: link.clone(),
            reason,
        })
        .await?;

        match link.kind() {
            LinkKind::AlwaysOn => {
                link.set_state(LinkState::Available);
                if matches!(
                    reason,
                    LinkStateReason::Broken
                        | LinkStateReason::NoInfo
                        | LinkStateReason::Timeout
                        | LinkStateReason::Reconnect
                ) {
                    let retry = Duration::from_secs(u64::from(link.params().min_retry_secs));
                    self.timers.schedule_in(
                        retry,
                        BundleEvent::LinkOpenRequest {
                            name: link.name().to_string(),
                        },
                    );
                }
            }
            LinkKind::OnDemand => link.set_state(LinkState::Available),
            LinkKind::Scheduled | LinkKind::Opportunistic => {
                link.set_state(LinkState::Unavailable);
            }
        }
        Ok(())
    }

    async fn handle_link_state_change(
        &mut self,
        link: LinkRef,
        state: LinkState,
        reason: LinkStateReason,
    ) -> Result<(), DaemonError> {
        debug!(
            "convergence layer reports link {} {:?} -> {state:?} ({reason:?})",
            link.name(),
            link.state()
        );
        match state {
            LinkState::Closed => match link.state() {
                LinkState::Opening => {
                    if let Some(contact) = link.take_contact() {
                        if let Some(cl) = self.cl_registry.find(link.cl_name()) {
                            cl.close_contact(&contact, reason).await;
                        }
                    }
                    link.set_state(LinkState::Unavailable);
                    Ok(())
                }
                LinkState::Open | LinkState::Busy => {
                    self.close_link(&link, reason).await;
                    Ok(())
                }
                other => {
                    warn!(
                        "closed report for link {} in state {other:?}, ignoring",
                        link.name()
                    );
                    Ok(())
                }
            },
            LinkState::Busy => {
                if link.state() == LinkState::Open {
                    link.set_state(LinkState::Busy);
                    self.invoke_router(&BundleEvent::LinkStateChange {
                        link,
                        state,
                        reason,
                    })
                    .await?;
                }
                Ok(())
            }
            LinkState::Open => {
                if link.state() == LinkState::Busy {
                    link.set_state(LinkState::Open);
                    self.invoke_router(&BundleEvent::LinkStateChange {
                        link,
                        state,
                        reason,
                    })
                    .await?;
                }
                Ok(())
            }
            other => {
                warn!("unexpected link state report {other:?} for {}", link.name());
                Ok(())
            }
        }
    }

    async fn handle_link_delete_request(&mut self, name: &str) -> Result<(), DaemonError> {
        let Some(link) = self.contact_manager.find_link(name) else {
            error!("cannot delete unknown link {name}");
            return Ok(());
        };
        if link.is_open() || link.state() == LinkState::Opening {
            self.close_link(&link, LinkStateReason::User).await;
        }
        self.contact_manager.del_link(name);
        if let Some(cl) = self.cl_registry.find(link.cl_name()) {
            cl.delete_link(&link).await;
        }
        link.queue().clear();
        link.set_state(LinkState::Deleted);
        if let Some(handle) = self.idle_timers.remove(name) {
            handle.cancel();
        }
        self.post_event(BundleEvent::LinkDeleted {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn handle_peer_contact_discovered(
        &mut self,
        cl_name: &str,
        nexthop: &str,
        remote_eid: Option<EndpointId>,
    ) -> Result<(), DaemonError> {
        if let Some(existing) = self.contact_manager.find_link_for_peer(cl_name, nexthop) {
            debug!("peer contact matches existing {existing:?}");
            if !existing.is_open() && existing.state() == LinkState::Available {
                self.open_link(&existing).await;
            }
            return Ok(());
        }
        let linkid = self.globals.next_linkid()?;
        let link = match self
            .contact_manager
            .new_opportunistic_link(cl_name, nexthop, remote_eid, linkid)
        {
            Ok(link) => link,
            Err(e) => {
                error!("cannot synthesise opportunistic link: {e}");
                return Ok(());
            }
        };
        if let Some(cl) = self.cl_registry.find(cl_name) {
            if let Err(e) = cl.init_link(&link).await {
                error!("convergence layer rejected {link:?}: {e}");
                self.contact_manager.del_link(link.name());
                return Ok(());
            }
        }
        self.invoke_router(&BundleEvent::LinkCreated { link: link.clone() })
            .await?;
        link.set_state(LinkState::Available);
        self.invoke_router(&BundleEvent::LinkAvailable { link: link.clone() })
            .await?;
        self.open_link(&link).await;
        Ok(())
    }

    async fn handle_interface_create_request(&mut self, name: &str, addr: &str) {
        if self.interfaces.contains_key(name) {
            error!("interface {name} already exists");
            return;
        }
        let cl = match self.cl_registry.find_for_addr(addr) {
            Ok(cl) => cl,
            Err(e) => {
                error!("cannot create interface {name}: {e}");
                return;
            }
        };
        let iface = Interface::new(name, cl.name(), addr);
        match cl.init_interface(&iface).await {
            Ok(()) => {
                info!("created {iface:?}");
                self.interfaces.insert(name.to_string(), iface);
            }
            Err(e) => error!("cannot create interface {name}: {e}"),
        }
    }

    // ----- registrations

    async fn handle_registration_add_request(
        &mut self,
        endpoint: EndpointId,
        failure_action: FailureAction,
        script: Option<String>,
        expiration: u64,
    ) -> Result<(), DaemonError> {
        let regid = self.globals.next_regid()?;
        let registration = Registration::new(regid, endpoint, failure_action, script, expiration);
        self.store.put(
            Table::Registrations,
            &regid.to_string(),
            &registration.to_record().encode()?,
            PutMode::Create,
        )?;
        info!("added {registration:?}");
        self.registrations.add(registration);
        self.handle_registration_added(regid).await
    }

    async fn handle_registration_added(&mut self, regid: u32) -> Result<(), DaemonError> {
        self.invoke_router(&BundleEvent::RegistrationAdded { regid })
            .await?;
        // catch up on pending bundles the new registration matches
        let Some(registration) = self.registrations.get(regid) else {
            return Ok(());
        };
        let mut delivered = Vec::new();
        for bundle in self.pending_bundles.snapshot() {
            if self.local_eid.matches_node(&bundle.dest)
                && registration.matches(&bundle.dest)
                && !bundle.is_fragment()
            {
                registration.deliver(&bundle);
                delivered.push(bundle);
            }
        }
        for bundle in delivered {
            bundle.fwdlog_add(
                LOCAL_DELIVERY_LINK,
                ForwardingAction::ForwardUnique,
                ForwardingState::Delivered,
                None,
            );
            if bundle.wants_report(BundleFlags::DELIVERY_RCPT) {
                self.send_status_report(
                    &bundle,
                    BundleStatusReason::NoAdditionalInformation,
                    StatusAssertion::DELIVERED,
                );
            }
            self.delete_bundle(&bundle, None);
        }
        Ok(())
    }

    async fn handle_registration_remove_request(&mut self, regid: u32) -> Result<(), DaemonError> {
        match self.registrations.remove(regid) {
            Some(registration) => {
                match self.store.del(Table::Registrations, &regid.to_string()) {
                    Ok(()) | Err(StoreError::NotFound) => {}
                    Err(e) => error!("cannot delete registration {regid}: {e}"),
                }
                registration.list().clear();
                self.post_event(BundleEvent::RegistrationRemoved { regid });
            }
            None => warn!("cannot remove unknown registration {regid}"),
        }
        Ok(())
    }

    // ----- router plumbing

    async fn invoke_router(&mut self, event: &BundleEvent) -> Result<(), DaemonError> {
        let actions = {
            let BundleDaemon {
                ref mut router,
                ref local_eid,
                ref contact_manager,
                ref pending_bundles,
                ..
            } = *self;
            let view = RouterView {
                local_eid,
                contacts: contact_manager.as_ref(),
                pending: pending_bundles,
            };
            router.handle_event(event, &view)
        };
        for action in actions {
            self.execute_action(action).await?;
        }
        Ok(())
    }

    async fn execute_action(&mut self, action: RouterAction) -> Result<(), DaemonError> {
        match action {
            RouterAction::Enqueue {
                bundle,
                link,
                action,
                custody_timer,
            } => {
                self.execute_enqueue(bundle, &link, action, custody_timer)
                    .await;
                Ok(())
            }
            RouterAction::Cancel { bundle, link } => {
                if !link.is_open() {
                    warn!("cancel on non-open link {}", link.name());
                    return Ok(());
                }
                if let (Some(contact), Some(cl)) =
                    (link.contact(), self.cl_registry.find(link.cl_name()))
                {
                    bundle.fwdlog_update(link.name(), ForwardingState::Cancelled);
                    cl.cancel_bundle(&contact, &bundle).await;
                }
                Ok(())
            }
            RouterAction::Delete { bundle, reason } => {
                self.delete_bundle(&bundle, Some(reason));
                Ok(())
            }
            RouterAction::StoreAdd { bundle } => {
                self.persist_bundle(&bundle, PutMode::Create)?;
                Ok(())
            }
            RouterAction::StoreUpdate { bundle } => {
                self.persist_update(&bundle);
                Ok(())
            }
            RouterAction::StoreDel { bundle } => {
                let key = bundle.bundleid().to_string();
                match self.store.del(Table::Bundles, &key) {
                    Ok(()) | Err(StoreError::NotFound) => {}
                    Err(e) => error!("cannot delete bundle {key}: {e}"),
                }
                Ok(())
            }
        }
    }

    /// Check the send preconditions and hand the bundle to the
    /// convergence layer. Precondition failures log and skip the send.
    async fn execute_enqueue(
        &mut self,
        bundle: BundleRef,
        link: &LinkRef,
        action: ForwardingAction,
        custody_timer: Option<CustodyTimerSpec>,
    ) {
        if link.state() != LinkState::Open {
            error!(
                "enqueue of {bundle:?} on link {} which is {:?}",
                link.name(),
                link.state()
            );
            return;
        }
        if bundle.fwdlog_latest(link.name()) == ForwardingState::InFlight {
            error!(
                "enqueue of {bundle:?} already in flight on link {}",
                link.name()
            );
            return;
        }
        if link.params().mtu > 0 {
            let length = match bundle.to_wire().map(|w| w.formatted_length()) {
                Ok(Ok(length)) => length,
                Ok(Err(e)) => {
                    error!("cannot size {bundle:?}: {e}");
                    return;
                }
                Err(e) => {
                    error!("cannot size {bundle:?}: {e}");
                    return;
                }
            };
            if length > link.params().mtu {
                error!(
                    "{bundle:?} is {length} bytes, exceeding the {} byte mtu of link {}",
                    link.params().mtu,
                    link.name()
                );
                return;
            }
        }
        let Some(contact) = link.contact() else {
            error!("open link {} has no contact", link.name());
            return;
        };
        let Some(cl) = self.cl_registry.find(link.cl_name()) else {
            error!("link {} has no convergence layer", link.name());
            return;
        };
        bundle.fwdlog_add(link.name(), action, ForwardingState::InFlight, custody_timer);
        link.queue().push_back(&bundle);
        link.stats.sent(bundle.payload().length());
        self.restart_idle_timer(link);
        cl.send_bundle(&contact, bundle).await;
    }

    // ----- timers

    fn start_expiration_timer(&mut self, bundle: &BundleRef) {
        if bundle.has_expiration_timer() {
            return;
        }
        match bundle.remaining_lifetime(Utc::now()) {
            Some(remaining) => {
                let handle = self.timers.schedule_in(
                    remaining,
                    BundleEvent::BundleExpired {
                        bundle: bundle.clone(),
                    },
                );
                bundle.set_expiration_timer(handle);
            }
            None => {
                info!("{bundle:?} was already expired on arrival");
                self.post_event(BundleEvent::BundleExpired {
                    bundle: bundle.clone(),
                });
            }
        }
    }

    fn restart_idle_timer(&mut self, link: &LinkRef) {
        if link.kind() != LinkKind::OnDemand || link.params().idle_close_secs == 0 {
            return;
        }
        if let Some(handle) = self.idle_timers.remove(link.name()) {
            handle.cancel();
        }
        let handle = self.timers.schedule_in(
            Duration::from_secs(u64::from(link.params().idle_close_secs)),
            BundleEvent::LinkCloseRequest {
                name: link.name().to_string(),
                reason: LinkStateReason::Idle,
            },
        );
        self.idle_timers.insert(link.name().to_string(), handle);
    }

    // ----- persistence helpers

    fn persist_bundle(&self, bundle: &BundleRef, mode: PutMode) -> Result<(), DaemonError> {
        let inline = self.payload_dir.is_none();
        if let Some(dir) = &self.payload_dir {
            if bundle.payload().location() == PayloadLocation::Memory {
                std::fs::create_dir_all(dir)?;
                std::fs::write(
                    crate::bundling::payload::BundlePayload::file_path(dir, bundle.bundleid()),
                    bundle.payload().read()?,
                )?;
            }
        }
        let record = bundle.to_record(inline)?;
        self.store.put(
            Table::Bundles,
            &bundle.bundleid().to_string(),
            &record.encode()?,
            mode,
        )?;
        Ok(())
    }

    /// Best-effort store update after a state change; failures are
    /// logged and retried on the next state change.
    fn persist_update(&self, bundle: &BundleRef) {
        match self.persist_bundle(bundle, PutMode::CreateOrReplace) {
            Ok(()) => {}
            Err(e) => error!("cannot update stored bundle {}: {e}", bundle.bundleid()),
        }
    }

    // ----- generated administrative traffic

    fn next_creation_timestamp(&mut self) -> CreationTimestamp {
        let timestamp = DtnTime::now();
        let sequence_number = if Some(timestamp) == self.last_created_dtn_time {
            self.last_sequence_number += 1;
            self.last_sequence_number
        } else {
            self.last_created_dtn_time = Some(timestamp);
            self.last_sequence_number = 0;
            0
        };
        CreationTimestamp {
            creation_time: timestamp,
            sequence_number,
        }
    }

    /// Build an admin bundle and feed it back through the arrival path
    /// as locally sourced traffic.
    fn dispatch_admin_record(&mut self, dest: &EndpointId, record: &AdministrativeRecord) {
        if dest.is_null_endpoint() {
            return;
        }
        let data: Vec<u8> = match record.try_into() {
            Ok(data) => data,
            Err(e) => {
                warn!("error serializing administrative record: {e:?}");
                return;
            }
        };
        let wire = WireBundle {
            primary_block: PrimaryBlock {
                version: BP_VERSION,
                bundle_processing_flags: BundleFlags::IS_ADMIN | BundleFlags::SINGLETON_DEST,
                priority: Priority::Normal,
                destination_endpoint: dest.clone(),
                source_node: self.local_eid.clone(),
                replyto: EndpointId::null_endpoint(),
                custodian: EndpointId::null_endpoint(),
                report_to: self.local_eid.clone(),
                creation_timestamp: self.next_creation_timestamp(),
                lifetime: ADMIN_BUNDLE_LIFETIME,
                fragment_offset: None,
                total_data_length: None,
            },
            blocks: vec![CanonicalBlock::payload(data)],
        };
        match Bundle::from_wire(&wire) {
            Ok(admin) => {
                debug!("dispatching administrative bundle to {dest}");
                self.post_event(BundleEvent::BundleReceived {
                    bundle: Arc::new(admin),
                    source: BundleSource::App,
                });
            }
            Err(e) => warn!("cannot build administrative bundle: {e}"),
        }
    }

    fn send_custody_signal(
        &mut self,
        bundle: &BundleRef,
        succeeded: bool,
        reason: CustodySignalReason,
    ) {
        let custodian = bundle.custodian();
        self.send_custody_signal_to(&custodian, bundle, succeeded, reason);
    }

    fn send_custody_signal_to(
        &mut self,
        custodian: &EndpointId,
        bundle: &BundleRef,
        succeeded: bool,
        reason: CustodySignalReason,
    ) {
        if custodian.is_null_endpoint() {
            return;
        }
        let mut signal = if succeeded {
            CustodySignal::accepted(DtnTime::now(), bundle.source.clone(), bundle.creation_ts)
        } else {
            CustodySignal::refused(
                DtnTime::now(),
                reason,
                bundle.source.clone(),
                bundle.creation_ts,
            )
        };
        signal.fragment_offset = bundle.frag_offset;
        signal.fragment_length = bundle.orig_length;
        let record = AdministrativeRecord::CustodySignal(signal);
        let custodian = custodian.clone();
        self.dispatch_admin_record(&custodian, &record);
    }

    fn send_status_report(
        &mut self,
        bundle: &BundleRef,
        reason: BundleStatusReason,
        assertion: StatusAssertion,
    ) {
        if bundle.is_admin() {
            // administrative traffic never generates reports
            return;
        }
        let report_to = bundle.report_to.clone();
        if report_to.is_null_endpoint() {
            return;
        }
        let now = DtnTime::now();
        let item = |asserted: bool| {
            if asserted {
                BundleStatusItem::asserted_at(now)
            } else {
                BundleStatusItem::not_asserted()
            }
        };
        let report = BundleStatusReport {
            status_information: BundleStatusInformation {
                received_bundle: item(assertion.contains(StatusAssertion::RECEIVED)),
                custody_accepted_bundle: item(assertion.contains(StatusAssertion::CUSTODY_ACCEPTED)),
                forwarded_bundle: item(assertion.contains(StatusAssertion::FORWARDED)),
                delivered_bundle: item(assertion.contains(StatusAssertion::DELIVERED)),
                deleted_bundle: item(assertion.contains(StatusAssertion::DELETED)),
            },
            reason,
            bundle_source: bundle.source.clone(),
            bundle_creation_timestamp: bundle.creation_ts,
            fragment_offset: bundle.frag_offset,
            fragment_length: bundle.orig_length,
        };
        let record = AdministrativeRecord::BundleStatusReport(report);
        self.dispatch_admin_record(&report_to, &record);
    }
}

bitflags::bitflags! {
    /// Which of the five status flags a generated report asserts.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct StatusAssertion: u8 {
        const RECEIVED = 0x01;
        const CUSTODY_ACCEPTED = 0x02;
        const FORWARDED = 0x04;
        const DELIVERED = 0x08;
        const DELETED = 0x10;
    }
}
