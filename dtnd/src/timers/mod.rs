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
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
    time::Duration,
};

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::{
    sync::Notify,
    time::Instant,
};

use crate::{
    common::shutdown::Shutdown,
    daemon::events::{BundleEvent, EventSender},
};

const LATE_FIRE_SLACK: Duration = Duration::from_millis(500);

/// Cancels its timer. Cancellation is lazy: the entry stays in the
/// heap and is discarded when it surfaces. Cancelling twice is fine.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Acquire)
    }
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    event: BundleEvent,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // inverted so the max-heap surfaces the earliest deadline,
        // ties in schedule order
        other
            .deadline
            .cmp(&self.deadline)
            .then(other.seq.cmp(&self.seq))
    }
}

struct TimerInner {
    heap: Mutex<BinaryHeap<TimerEntry>>,
    notify: Notify,
    next_seq: AtomicU64,
}

/// Deadline-ordered timers whose expiry posts an event to the daemon
/// queue. One driver task sleeps until the earliest deadline or until
/// a producer schedules something earlier.
///
/// Timers never mutate state themselves; all effects happen when the
/// daemon processes the posted event.
#[derive(Clone)]
pub struct TimerService {
    inner: Arc<TimerInner>,
}

impl Default for TimerService {
    fn default() -> Self {
        TimerService::new()
    }
}

impl TimerService {
    pub fn new() -> Self {
        TimerService {
            inner: Arc::new(TimerInner {
                heap: Mutex::new(BinaryHeap::new()),
                notify: Notify::new(),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn schedule_at(&self, deadline: Instant, event: BundleEvent) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = TimerEntry {
            deadline,
            seq: self.inner.next_seq.fetch_add(1, AtomicOrdering::Relaxed),
            cancelled: cancelled.clone(),
            event,
        };
        self.inner.heap.lock().push(entry);
        self.inner.notify.notify_one();
        TimerHandle { cancelled }
    }

    pub fn schedule_in(&self, delay: Duration, event: BundleEvent) -> TimerHandle {
        self.schedule_at(Instant::now() + delay, event)
    }

    pub fn schedule_immediate(&self, event: BundleEvent) -> TimerHandle {
        self.schedule_at(Instant::now(), event)
    }

    /// Entries still in the heap, cancelled ones included.
    pub fn pending(&self) -> usize {
        self.inner.heap.lock().len()
    }

    /// The driver task. Exits on shutdown or when the daemon queue is
    /// gone.
    pub async fn run(self, event_tx: EventSender, mut shutdown: Shutdown) {
        info!("timer driver starting");
        loop {
            let next_deadline = self.inner.heap.lock().peek().map(|e| e.deadline);
            tokio::select! {
                () = shutdown.recv() => {
                    info!("timer driver received shutdown");
                    break;
                }
                () = self.inner.notify.notified() => {}
                () = async {
                    match next_deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    if !self.fire_due(&event_tx).await {
                        info!("timer driver can no longer post events, exiting");
                        return;
                    }
                }
            }
        }
    }

    /// Fire every due entry in deadline order. Returns false when the
    /// event queue is closed.
    async fn fire_due(&self, event_tx: &EventSender) -> bool {
        loop {
            let entry = {
                let mut heap = self.inner.heap.lock();
                match heap.peek() {
                    Some(e) if e.deadline <= Instant::now() => heap.pop(),
                    _ => None,
                }
            };
            let Some(entry) = entry else {
                return true;
            };
            if entry.cancelled.load(AtomicOrdering::Acquire) {
                debug!("discarding cancelled timer for {}", entry.event.kind());
                continue;
            }
            let overdue = Instant::now().saturating_duration_since(entry.deadline);
            if overdue > LATE_FIRE_SLACK {
                warn!(
                    "timer for {} fired {}ms late",
                    entry.event.kind(),
                    overdue.as_millis()
                );
            }
            if event_tx.send(entry.event).await.is_err() {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::TimerService;
    use crate::{
        common::shutdown::Shutdown,
        daemon::events::BundleEvent,
    };

    fn marker(name: &str) -> BundleEvent {
        BundleEvent::LinkDeleted {
            name: name.to_string(),
        }
    }

    fn marker_name(event: &BundleEvent) -> String {
        match event {
            BundleEvent::LinkDeleted { name } => name.clone(),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_in_deadline_order() {
        let timers = TimerService::new();
        let (tx, mut rx) = mpsc::channel(16);
        let (notify, _) = tokio::sync::broadcast::channel::<()>(1);
        tokio::spawn(timers.clone().run(tx, Shutdown::new(notify.subscribe())));

        timers.schedule_in(Duration::from_secs(3), marker("third"));
        timers.schedule_in(Duration::from_secs(1), marker("first"));
        timers.schedule_in(Duration::from_secs(2), marker("second"));

        for expected in ["first", "second", "third"] {
            let event = rx.recv().await.unwrap();
            assert_eq!(marker_name(&event), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_never_fire() {
        let timers = TimerService::new();
        let (tx, mut rx) = mpsc::channel(16);
        let (notify, _) = tokio::sync::broadcast::channel::<()>(1);
        tokio::spawn(timers.clone().run(tx, Shutdown::new(notify.subscribe())));

        let doomed = timers.schedule_in(Duration::from_secs(1), marker("doomed"));
        timers.schedule_in(Duration::from_secs(2), marker("kept"));
        doomed.cancel();
        doomed.cancel(); // idempotent

        let event = rx.recv().await.unwrap();
        assert_eq!(marker_name(&event), "kept");
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_timers_fire_promptly() {
        let timers = TimerService::new();
        let (tx, mut rx) = mpsc::channel(16);
        let (notify, _) = tokio::sync::broadcast::channel::<()>(1);
        tokio::spawn(timers.clone().run(tx, Shutdown::new(notify.subscribe())));

        timers.schedule_immediate(marker("now"));
        let event = rx.recv().await.unwrap();
        assert_eq!(marker_name(&event), "now");
    }

    #[tokio::test(start_paused = true)]
    async fn ties_fire_in_schedule_order() {
        let timers = TimerService::new();
        let (tx, mut rx) = mpsc::channel(16);
        let (notify, _) = tokio::sync::broadcast::channel::<()>(1);
        tokio::spawn(timers.clone().run(tx, Shutdown::new(notify.subscribe())));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        timers.schedule_at(deadline, marker("a"));
        timers.schedule_at(deadline, marker("b"));

        assert_eq!(marker_name(&rx.recv().await.unwrap()), "a");
        assert_eq!(marker_name(&rx.recv().await.unwrap()), "b");
    }
}
