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

use std::{sync::Arc, time::Duration};

use bp6::{bundleflags::BundleFlags, cos::Priority, endpoint::EndpointId};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::sleep,
};

use dtnd::{
    bundling::{fwdlog::ForwardingState, BundleIdentity, BundleRef},
    cla::{loopback::LoopbackCl, ClRegistry},
    common::{settings::Settings, shutdown::Shutdown},
    contacts::{LinkKind, LinkParams, LinkState, LinkStateReason},
    daemon::{
        events::{BundleEvent, EventSender, InjectSpec},
        BundleDaemon, DaemonError, DaemonHandle,
    },
    registration::FailureAction,
    storage::{memory::MemoryStore, DataStore, StoreError, Table},
};

const WAIT_LIMIT: Duration = Duration::from_secs(15);

struct TestNode {
    handle: DaemonHandle,
    event_tx: EventSender,
    loopback: Arc<LoopbackCl>,
    store: Arc<dyn DataStore>,
    daemon_task: JoinHandle<Result<(), DaemonError>>,
    notify_shutdown: broadcast::Sender<()>,
}

impl TestNode {
    async fn start(node_id: &str, store: Arc<dyn DataStore>, loopback_rate: u64) -> TestNode {
        let settings = Settings {
            my_node_id: node_id.to_string(),
            ..Settings::default()
        };
        let (event_tx, event_rx) = mpsc::channel(256);
        let mut cl_registry = ClRegistry::new();
        let loopback = LoopbackCl::new(event_tx.clone(), loopback_rate);
        cl_registry.add(loopback.clone());

        let (mut daemon, handle) = BundleDaemon::new(
            &settings,
            store.clone(),
            cl_registry,
            event_tx.clone(),
            event_rx,
        )
        .unwrap();
        daemon.recover().await.unwrap();

        let (notify_shutdown, _) = broadcast::channel::<()>(1);
        let (done_tx, _done_rx) = mpsc::channel::<()>(1);

        let timers = handle.timers.clone();
        let timer_events = event_tx.clone();
        tokio::spawn(timers.run(timer_events, Shutdown::new(notify_shutdown.subscribe())));

        let daemon_task = tokio::spawn(daemon.run(notify_shutdown.subscribe(), done_tx));

        TestNode {
            handle,
            event_tx,
            loopback,
            store,
            daemon_task,
            notify_shutdown,
        }
    }

    /// Kill the daemon without any cleanup, like a crash.
    fn kill(&self) {
        self.daemon_task.abort();
    }

    async fn post(&self, event: BundleEvent) {
        self.event_tx.send(event).await.unwrap();
    }

    async fn create_loopback_link(&self, name: &str) {
        self.post(BundleEvent::LinkCreateRequest {
            name: name.to_string(),
            kind: LinkKind::AlwaysOn,
            cl_name: "loopback".to_string(),
            nexthop: format!("loopback://{name}"),
            params: LinkParams::default(),
        })
        .await;
        let cm = self.handle.contact_manager.clone();
        let name = name.to_string();
        wait_for("link open", move || {
            cm.find_link(&name)
                .is_some_and(|l| l.state() == LinkState::Open)
        })
        .await;
    }

    async fn add_route(&self, pattern: &str, link: &str) {
        self.post(BundleEvent::RouteAddRequest {
            pattern: EndpointId::new(pattern).unwrap(),
            link: link.to_string(),
        })
        .await;
    }

    async fn inject(&self, dest: &str, lifetime: u64, payload: &[u8]) {
        self.post(BundleEvent::BundleInject(InjectSpec {
            source: None,
            dest: EndpointId::new(dest).unwrap(),
            replyto: None,
            lifetime,
            priority: Priority::Normal,
            flags: BundleFlags::empty(),
            payload: payload.to_vec(),
        }))
        .await;
    }

    async fn pending_bundle(&self) -> BundleRef {
        let pending = self.handle.pending_bundles.clone();
        wait_for("a pending bundle", move || !pending.is_empty()).await;
        self.handle.pending_bundles.snapshot().remove(0)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        let _ = self.notify_shutdown.send(());
        self.daemon_task.abort();
    }
}

async fn wait_for<F>(what: &str, cond: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timeout waiting for {what}"
        );
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn single_link_send_success() {
    let node = TestNode::start("dtn://a", Arc::new(MemoryStore::new()), 0).await;
    node.create_loopback_link("l1").await;

    // inject before the route exists so the bundle can be observed in
    // the pending set
    node.inject("dtn://b/app", 60, b"12345678").await;
    let bundle = node.pending_bundle().await;
    assert_eq!(bundle.payload().length(), 8);

    node.add_route("dtn://b/*", "l1").await;
    {
        let bundle = bundle.clone();
        wait_for("transmission", move || {
            bundle.fwdlog_latest("l1") == ForwardingState::Transmitted
        })
        .await;
    }

    let link = node.handle.contact_manager.find_link("l1").unwrap();
    assert_eq!(
        link.stats
            .bundles_transmitted
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
    assert_eq!(
        link.stats
            .bytes_transmitted
            .load(std::sync::atomic::Ordering::Relaxed),
        8
    );
    // the forwarded bundle left the pending set
    let pending = node.handle.pending_bundles.clone();
    wait_for("pending drained", move || pending.is_empty()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn link_close_mid_transmission() {
    // 1 kB/s over a 10 kB payload keeps the transfer in flight for
    // seconds, far longer than this test runs
    let node = TestNode::start("dtn://a", Arc::new(MemoryStore::new()), 1024).await;
    node.create_loopback_link("l1").await;
    node.add_route("dtn://b/*", "l1").await;
    node.inject("dtn://b/app", 600, &[0x5A; 10 * 1024]).await;

    let bundle = node.pending_bundle().await;
    {
        let bundle = bundle.clone();
        wait_for("send to start", move || {
            bundle.fwdlog_latest("l1") == ForwardingState::InFlight
        })
        .await;
    }

    node.post(BundleEvent::LinkCloseRequest {
        name: "l1".to_string(),
        reason: LinkStateReason::User,
    })
    .await;

    {
        let bundle = bundle.clone();
        wait_for("cancellation", move || {
            bundle.fwdlog_latest("l1") == ForwardingState::Cancelled
        })
        .await;
    }
    // the bundle survives for the next contact
    assert!(node.handle.pending_bundles.contains(&bundle));

    let link = node.handle.contact_manager.find_link("l1").unwrap();
    assert_eq!(
        link.stats
            .bundles_cancelled
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
    assert_eq!(
        link.stats
            .bundles_transmitted
            .load(std::sync::atomic::Ordering::Relaxed),
        0
    );
    // after the contact went down the link waits for the next opening
    {
        let link = link.clone();
        wait_for("link available again", move || {
            link.state() == LinkState::Available
        })
        .await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn expiration_removes_the_bundle() {
    let node = TestNode::start("dtn://a", Arc::new(MemoryStore::new()), 0).await;
    // no link, no route: the bundle can only wait and expire
    node.inject("dtn://nowhere/app", 1, b"doomed").await;

    let bundle = node.pending_bundle().await;
    let bundleid = bundle.bundleid();
    assert!(matches!(
        node.store.get(Table::Bundles, &bundleid.to_string()),
        Ok(_)
    ));

    {
        let pending = node.handle.pending_bundles.clone();
        wait_for("expiration", move || pending.is_empty()).await;
    }
    {
        let bundle = bundle.clone();
        wait_for("mappings released", move || bundle.num_mappings() == 0).await;
    }
    assert!(matches!(
        node.store.get(Table::Bundles, &bundleid.to_string()),
        Err(StoreError::NotFound)
    ));
    // only the test still holds the bundle (a BundleFree event may
    // transiently hold another reference)
    {
        let bundle_ref = bundle.clone();
        wait_for("references released", move || {
            Arc::strong_count(&bundle_ref) <= 3
        })
        .await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_recovery_restores_pending_bundles() {
    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
    let node = TestNode::start("dtn://a", store.clone(), 0).await;
    for i in 0..3u8 {
        node.inject("dtn://remote/app", 3600, &[i; 16]).await;
    }
    {
        let pending = node.handle.pending_bundles.clone();
        wait_for("three pending bundles", move || pending.size() == 3).await;
    }
    let mut identities: Vec<BundleIdentity> = node
        .handle
        .pending_bundles
        .snapshot()
        .iter()
        .map(|b| b.identity())
        .collect();
    identities.sort_by_key(|i| (i.creation_ts.creation_time, i.creation_ts.sequence_number));

    node.kill();

    let revived = TestNode::start("dtn://a", store, 0).await;
    {
        let pending = revived.handle.pending_bundles.clone();
        wait_for("recovered bundles", move || pending.size() == 3).await;
    }
    let recovered = revived.handle.pending_bundles.snapshot();
    let mut recovered_identities: Vec<BundleIdentity> =
        recovered.iter().map(|b| b.identity()).collect();
    recovered_identities
        .sort_by_key(|i| (i.creation_ts.creation_time, i.creation_ts.sequence_number));
    assert_eq!(identities, recovered_identities);
    for bundle in &recovered {
        assert!(bundle.has_expiration_timer());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_link_names_leave_the_original_alone() {
    let node = TestNode::start("dtn://a", Arc::new(MemoryStore::new()), 0).await;
    node.create_loopback_link("l1").await;

    node.post(BundleEvent::LinkCreateRequest {
        name: "l1".to_string(),
        kind: LinkKind::OnDemand,
        cl_name: "loopback".to_string(),
        nexthop: "loopback://elsewhere".to_string(),
        params: LinkParams::default(),
    })
    .await;
    // give the daemon a chance to process the rejected request
    sleep(Duration::from_millis(50)).await;

    let link = node.handle.contact_manager.find_link("l1").unwrap();
    assert_eq!(link.kind(), LinkKind::AlwaysOn);
    assert_eq!(link.nexthop(), "loopback://l1");
    assert_eq!(link.state(), LinkState::Open);
}

#[tokio::test(flavor = "multi_thread")]
async fn local_delivery_through_a_registration() {
    let node = TestNode::start("dtn://a", Arc::new(MemoryStore::new()), 0).await;
    node.post(BundleEvent::RegistrationAddRequest {
        endpoint: EndpointId::new("dtn://a/inbox").unwrap(),
        failure_action: FailureAction::Defer,
        script: None,
        expiration: 0,
    })
    .await;
    {
        let regs = node.handle.registrations.clone();
        wait_for("registration", move || !regs.is_empty()).await;
    }

    node.inject("dtn://a/inbox", 60, b"local data").await;

    let registration = node.handle.registrations.all().remove(0);
    let delivered = registration
        .list()
        .pop_blocking(Duration::from_secs(10))
        .await
        .expect("bundle should be delivered");
    assert_eq!(delivered.payload().read().unwrap(), b"local data");
    assert_eq!(
        delivered.fwdlog_latest("local"),
        ForwardingState::Delivered
    );

    // delivery completes the bundle's time in the pending set
    let pending = node.handle.pending_bundles.clone();
    wait_for("pending drained", move || pending.is_empty()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn two_nodes_end_to_end_payload_identity() {
    let node_a = TestNode::start("dtn://a", Arc::new(MemoryStore::new()), 0).await;
    let node_b = TestNode::start("dtn://b", Arc::new(MemoryStore::new()), 0).await;

    // wire a's loopback transmissions into b's event queue
    node_a
        .loopback
        .set_deliver_to(Some(node_b.event_tx.clone()));

    node_b
        .post(BundleEvent::RegistrationAddRequest {
            endpoint: EndpointId::new("dtn://b/inbox").unwrap(),
            failure_action: FailureAction::Defer,
            script: None,
            expiration: 0,
        })
        .await;
    {
        let regs = node_b.handle.registrations.clone();
        wait_for("registration on b", move || !regs.is_empty()).await;
    }

    node_a.create_loopback_link("to-b").await;
    node_a.add_route("dtn://b/*", "to-b").await;

    let payload: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
    node_a.inject("dtn://b/inbox", 60, &payload).await;

    let registration = node_b.handle.registrations.all().remove(0);
    let delivered = registration
        .list()
        .pop_blocking(Duration::from_secs(10))
        .await
        .expect("bundle should arrive at b");
    assert_eq!(delivered.payload().read().unwrap(), payload);
    assert_eq!(
        delivered.source,
        EndpointId::new("dtn://a").unwrap()
    );
}
