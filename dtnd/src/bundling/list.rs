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
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::bundle::{BundleIdentity, BundleRef};

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    FragmentOffset,
    Priority,
}

/// An ordered container of bundle references.
///
/// Every insert records a back-pointer (mapping) on the bundle and the
/// list keeps the strong reference; every removal drops both. The
/// `pop_*` methods transfer the strong reference to the caller instead
/// of dropping it, so a bundle can move between lists without its
/// reference count touching zero mid-flight.
///
/// Lists carry a process-unique id. Operations over two lists take the
/// locks in id order, which makes the lock order total.
pub struct BundleList {
    id: u64,
    name: String,
    entries: Mutex<VecDeque<BundleRef>>,
    notify: Notify,
}

impl std::fmt::Debug for BundleList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleList")
            .field("name", &self.name)
            .field("size", &self.size())
            .finish()
    }
}

impl BundleList {
    pub fn new(name: &str) -> Arc<BundleList> {
        Arc::new(BundleList {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn push_back(self: &Arc<Self>, bundle: &BundleRef) {
        let mut entries = self.entries.lock();
        entries.push_back(bundle.clone());
        bundle.add_mapping(self);
        self.notify.notify_one();
    }

    pub fn push_front(self: &Arc<Self>, bundle: &BundleRef) {
        let mut entries = self.entries.lock();
        entries.push_front(bundle.clone());
        bundle.add_mapping(self);
        self.notify.notify_one();
    }

    /// Insert keeping the list sorted by `order`. Ties keep insertion
    /// order, the new bundle goes after existing equals.
    pub fn insert_sorted(self: &Arc<Self>, bundle: &BundleRef, order: SortOrder) {
        let mut entries = self.entries.lock();
        let pos = match order {
            SortOrder::FragmentOffset => {
                let offset = bundle.frag_offset.unwrap_or(0);
                entries
                    .iter()
                    .position(|other| other.frag_offset.unwrap_or(0) > offset)
            }
            SortOrder::Priority => {
                let priority = bundle.priority;
                entries.iter().position(|other| other.priority < priority)
            }
        };
        match pos {
            Some(pos) => entries.insert(pos, bundle.clone()),
            None => entries.push_back(bundle.clone()),
        }
        bundle.add_mapping(self);
        self.notify.notify_one();
    }

    /// Remove and return the head. The list's strong reference is
    /// transferred to the caller, only the mapping is removed.
    pub fn pop_front(&self) -> Option<BundleRef> {
        let mut entries = self.entries.lock();
        let bundle = entries.pop_front()?;
        bundle.del_mapping(self.id);
        Some(bundle)
    }

    pub fn pop_back(&self) -> Option<BundleRef> {
        let mut entries = self.entries.lock();
        let bundle = entries.pop_back()?;
        bundle.del_mapping(self.id);
        Some(bundle)
    }

    /// Like `pop_front` but waits up to `timeout` for a bundle to show
    /// up. A zero timeout returns immediately.
    pub async fn pop_blocking(&self, timeout: Duration) -> Option<BundleRef> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(bundle) = self.pop_front() {
                return Some(bundle);
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop_front();
            }
        }
    }

    /// Remove the bundle, dropping the list's reference.
    pub fn erase(&self, bundle: &BundleRef) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|other| Arc::ptr_eq(other, bundle)) {
            Some(pos) => {
                let removed = entries.remove(pos).expect("position is valid");
                removed.del_mapping(self.id);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, bundleid: u32) -> Option<BundleRef> {
        self.entries
            .lock()
            .iter()
            .find(|b| b.bundleid() == bundleid)
            .cloned()
    }

    pub fn find_by_identity(&self, identity: &BundleIdentity) -> Option<BundleRef> {
        self.entries
            .lock()
            .iter()
            .find(|b| &b.identity() == identity)
            .cloned()
    }

    pub fn contains(&self, bundle: &BundleRef) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|other| Arc::ptr_eq(other, bundle))
    }

    /// Clone of the current contents, in order.
    pub fn snapshot(&self) -> Vec<BundleRef> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Move every bundle to `other`, preserving order.
    pub fn move_contents(self: &Arc<Self>, other: &Arc<BundleList>) {
        assert!(self.id != other.id, "cannot move a list onto itself");
        // lock order follows list identity
        let (mut src, mut dst) = if self.id < other.id {
            let src = self.entries.lock();
            let dst = other.entries.lock();
            (src, dst)
        } else {
            let dst = other.entries.lock();
            let src = self.entries.lock();
            (src, dst)
        };
        while let Some(bundle) = src.pop_front() {
            bundle.del_mapping(self.id);
            bundle.add_mapping(other);
            dst.push_back(bundle);
        }
        drop(src);
        drop(dst);
        other.notify.notify_one();
    }

    /// Drop every bundle from the list.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        while let Some(bundle) = entries.pop_front() {
            bundle.del_mapping(self.id);
        }
    }
}

impl Drop for BundleList {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use bp6::cos::Priority;

    use super::{BundleList, SortOrder};
    use crate::bundling::testutil::{test_bundle, test_bundle_with, TestBundleOpts};

    #[test]
    fn push_pop_identity() {
        let list = BundleList::new("test");
        let bundles: Vec<_> = (0..10)
            .map(|i| test_bundle(i, "dtn://a/app", "dtn://b/app"))
            .collect();
        for bundle in &bundles {
            list.push_back(bundle);
        }
        assert_eq!(list.size(), 10);
        for (i, expected) in bundles.iter().enumerate() {
            let popped = list.pop_front().unwrap();
            assert!(Arc::ptr_eq(&popped, expected), "ordering broken at {i}");
        }
        assert!(list.is_empty());
        for bundle in &bundles {
            assert_eq!(bundle.num_mappings(), 0);
            assert_eq!(Arc::strong_count(bundle), 1);
        }
    }

    #[test]
    fn multi_list_membership() {
        let l1 = BundleList::new("l1");
        let l2 = BundleList::new("l2");
        let l3 = BundleList::new("l3");
        let bundles: Vec<_> = (0..10)
            .map(|i| test_bundle(i, "dtn://a/app", "dtn://b/app"))
            .collect();
        for (i, bundle) in bundles.iter().enumerate() {
            l1.push_back(bundle);
            if i % 2 == 0 {
                l2.push_back(bundle);
            } else {
                l2.push_front(bundle);
            }
            if i % 3 == 0 {
                l3.push_back(bundle);
            }
        }
        let b0 = &bundles[0];
        assert_eq!(b0.num_mappings(), 3);
        assert_eq!(Arc::strong_count(b0), 4);

        for list in b0.mappings() {
            assert!(list.erase(b0));
        }
        assert_eq!(b0.num_mappings(), 0);
        assert_eq!(Arc::strong_count(b0), 1);

        assert_eq!(l1.size(), 9);
        assert!(!l1.contains(b0));
    }

    #[test]
    fn pop_transfers_the_reference() {
        let l1 = BundleList::new("l1");
        let l2 = BundleList::new("l2");
        let bundle = test_bundle(0, "dtn://a/app", "dtn://b/app");
        l1.push_back(&bundle);
        assert_eq!(Arc::strong_count(&bundle), 2);

        let popped = l1.pop_front().unwrap();
        // the reference moved to `popped`, never through zero
        assert_eq!(Arc::strong_count(&bundle), 2);
        l2.push_back(&popped);
        drop(popped);
        assert_eq!(Arc::strong_count(&bundle), 2);
        assert_eq!(bundle.num_mappings(), 1);
        assert!(l2.contains(&bundle));
    }

    #[test]
    fn insert_sorted_by_fragment_offset() {
        let list = BundleList::new("fragments");
        for (id, offset) in [(0, 500u64), (1, 0), (2, 1000), (3, 500), (4, 250)] {
            let bundle = test_bundle_with(TestBundleOpts {
                bundleid: id,
                frag_offset: Some(offset),
                ..TestBundleOpts::default()
            });
            list.insert_sorted(&bundle, SortOrder::FragmentOffset);
        }
        let offsets: Vec<u64> = list
            .snapshot()
            .iter()
            .map(|b| b.frag_offset.unwrap())
            .collect();
        assert_eq!(offsets, vec![0, 250, 500, 500, 1000]);
        // ties keep insertion order
        let ids: Vec<u32> = list.snapshot().iter().map(|b| b.bundleid()).collect();
        assert_eq!(ids, vec![1, 4, 0, 3, 2]);
    }

    #[test]
    fn insert_sorted_by_priority() {
        let list = BundleList::new("priorities");
        for (id, priority) in [
            (0, Priority::Normal),
            (1, Priority::Bulk),
            (2, Priority::Expedited),
            (3, Priority::Normal),
        ] {
            let bundle = test_bundle_with(TestBundleOpts {
                bundleid: id,
                priority,
                ..TestBundleOpts::default()
            });
            list.insert_sorted(&bundle, SortOrder::Priority);
        }
        let ids: Vec<u32> = list.snapshot().iter().map(|b| b.bundleid()).collect();
        assert_eq!(ids, vec![2, 0, 3, 1]);
    }

    #[test]
    fn move_contents_rewrites_mappings() {
        let src = BundleList::new("src");
        let dst = BundleList::new("dst");
        let bundles: Vec<_> = (0..5)
            .map(|i| test_bundle(i, "dtn://a/app", "dtn://b/app"))
            .collect();
        for bundle in &bundles {
            src.push_back(bundle);
        }
        src.move_contents(&dst);
        assert!(src.is_empty());
        assert_eq!(dst.size(), 5);
        for bundle in &bundles {
            assert_eq!(bundle.num_mappings(), 1);
            assert!(bundle.is_queued_on(&dst));
            assert_eq!(Arc::strong_count(bundle), 2);
        }
        let ids: Vec<u32> = dst.snapshot().iter().map(|b| b.bundleid()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn pop_blocking_zero_timeout_returns_immediately() {
        let list = BundleList::new("empty");
        assert!(list.pop_blocking(Duration::ZERO).await.is_none());
    }

    #[tokio::test]
    async fn pop_blocking_wakes_on_push() {
        let list = BundleList::new("wake");
        let waiter = {
            let list = list.clone();
            tokio::spawn(async move { list.pop_blocking(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        let bundle = test_bundle(0, "dtn://a/app", "dtn://b/app");
        list.push_back(&bundle);
        let popped = waiter.await.unwrap();
        assert!(popped.is_some());
        assert_eq!(bundle.num_mappings(), 0);
    }

    #[test]
    fn find_by_id_and_identity() {
        let list = BundleList::new("find");
        let bundle = test_bundle(42, "dtn://a/app", "dtn://b/app");
        list.push_back(&bundle);
        assert!(list.find(42).is_some());
        assert!(list.find(43).is_none());
        assert!(list.find_by_identity(&bundle.identity()).is_some());
    }
}
