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
    path::Path,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Weak,
    },
};

use bp6::{
    block::CanonicalBlock,
    bundle::Bundle as WireBundle,
    bundleflags::BundleFlags,
    cos::Priority,
    endpoint::EndpointId,
    primaryblock::{PrimaryBlock, BP_VERSION},
    time::{CreationTimestamp, DtnTime},
    SerializationError,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::{
    storage::{BundleRecord, StoreError},
    timers::TimerHandle,
};

use super::{
    fwdlog::{CustodyTimerSpec, ForwardingAction, ForwardingInfo, ForwardingLog, ForwardingState},
    list::BundleList,
    payload::BundlePayload,
};

/// Value of the bundleid before the daemon assigned one.
pub const BUNDLEID_UNASSIGNED: u32 = 0xFFFF_FFFF;

pub type BundleRef = Arc<Bundle>;

/// The tuple that identifies a bundle for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleIdentity {
    pub source: EndpointId,
    pub creation_ts: CreationTimestamp,
    pub is_fragment: bool,
    pub frag_offset: Option<u64>,
    pub orig_length: Option<u64>,
}

struct Mapping {
    list_id: u64,
    list: Weak<BundleList>,
}

/// Mutable bundle state, guarded by the bundle's own lock. The lock is
/// always taken after any list lock, never before.
struct BundleState {
    custodian: EndpointId,
    local_custody: bool,
    mappings: Vec<Mapping>,
    fwdlog: ForwardingLog,
    expiration_timer: Option<TimerHandle>,
}

/// The daemon-side bundle. Reference counting is the `Arc` strong
/// count: every list holds one strong reference, `mappings` only holds
/// weak back-pointers, so `strong_count == lists + transient holders`.
pub struct Bundle {
    bundleid: AtomicU32,
    pub source: EndpointId,
    pub dest: EndpointId,
    pub replyto: EndpointId,
    pub report_to: EndpointId,
    pub priority: Priority,
    pub flags: BundleFlags,
    pub creation_ts: CreationTimestamp,
    /// Seconds after the creation timestamp at which the bundle expires.
    pub expiration: u64,
    pub frag_offset: Option<u64>,
    pub orig_length: Option<u64>,
    payload: BundlePayload,
    state: Mutex<BundleState>,
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "bundle id {} {} -> {} ({} bytes payload)",
            self.bundleid.load(Ordering::Relaxed),
            self.source,
            self.dest,
            self.payload.length()
        ))
    }
}

impl Bundle {
    fn from_parts(primary: &PrimaryBlock, payload: BundlePayload) -> Bundle {
        Bundle {
            bundleid: AtomicU32::new(BUNDLEID_UNASSIGNED),
            source: primary.source_node.clone(),
            dest: primary.destination_endpoint.clone(),
            replyto: primary.replyto.clone(),
            report_to: primary.report_to.clone(),
            priority: primary.priority,
            flags: primary.bundle_processing_flags,
            creation_ts: primary.creation_timestamp,
            expiration: primary.lifetime,
            frag_offset: primary.fragment_offset,
            orig_length: primary.total_data_length,
            payload,
            state: Mutex::new(BundleState {
                custodian: primary.custodian.clone(),
                local_custody: false,
                mappings: Vec::new(),
                fwdlog: ForwardingLog::default(),
                expiration_timer: None,
            }),
        }
    }

    /// Build a daemon bundle from its wire form. The payload is kept in
    /// memory; the bundleid stays unassigned until the daemon takes the
    /// bundle over.
    pub fn from_wire(wire: &WireBundle) -> Result<Bundle, SerializationError> {
        let payload = wire
            .payload()
            .ok_or(SerializationError::ConversionError)?
            .to_vec();
        Ok(Bundle::from_parts(
            &wire.primary_block,
            BundlePayload::in_memory(payload),
        ))
    }

    /// Re-materialise a bundle from its durable record.
    pub fn from_record(
        record: &BundleRecord,
        payload_dir: Option<&Path>,
    ) -> Result<Bundle, StoreError> {
        let parse = |s: &str| {
            EndpointId::new(s).ok_or_else(|| StoreError::Corrupt(format!("bad endpoint: {s}")))
        };
        let payload = match (&record.payload, payload_dir) {
            (Some(data), _) => BundlePayload::in_memory(data.clone()),
            (None, Some(dir)) => BundlePayload::from_existing_file(dir, record.bundleid)?,
            (None, None) => {
                return Err(StoreError::Corrupt(format!(
                    "bundle {} has no inline payload and no payload directory is configured",
                    record.bundleid
                )))
            }
        };
        let bundle = Bundle {
            bundleid: AtomicU32::new(record.bundleid),
            source: parse(&record.source)?,
            dest: parse(&record.dest)?,
            replyto: parse(&record.replyto)?,
            report_to: parse(&record.report_to)?,
            priority: Priority::try_from(record.priority)
                .map_err(|_| StoreError::Corrupt(format!("bad priority {}", record.priority)))?,
            flags: BundleFlags::from_bits_truncate(record.flags),
            creation_ts: CreationTimestamp {
                creation_time: DtnTime {
                    timestamp: record.creation_secs,
                },
                sequence_number: record.creation_seqno,
            },
            expiration: record.expiration,
            frag_offset: record.frag_offset,
            orig_length: record.orig_length,
            payload,
            state: Mutex::new(BundleState {
                custodian: parse(&record.custodian)?,
                local_custody: record.local_custody,
                mappings: Vec::new(),
                fwdlog: ForwardingLog::default(),
                expiration_timer: None,
            }),
        };
        Ok(bundle)
    }

    pub fn to_record(&self, inline_payload: bool) -> Result<BundleRecord, std::io::Error> {
        let state = self.state.lock();
        Ok(BundleRecord {
            bundleid: self.bundleid(),
            source: self.source.to_string(),
            dest: self.dest.to_string(),
            replyto: self.replyto.to_string(),
            custodian: state.custodian.to_string(),
            report_to: self.report_to.to_string(),
            priority: self.priority.into(),
            flags: self.flags.bits(),
            creation_secs: self.creation_ts.creation_time.timestamp,
            creation_seqno: self.creation_ts.sequence_number,
            expiration: self.expiration,
            frag_offset: self.frag_offset,
            orig_length: self.orig_length,
            local_custody: state.local_custody,
            payload_length: self.payload.length(),
            payload: if inline_payload {
                Some(self.payload.read()?)
            } else {
                None
            },
        })
    }

    /// Rebuild the wire form, reflecting the current custodian.
    pub fn to_wire(&self) -> Result<WireBundle, std::io::Error> {
        let payload = self.payload.read()?;
        Ok(WireBundle {
            primary_block: PrimaryBlock {
                version: BP_VERSION,
                bundle_processing_flags: self.flags,
                priority: self.priority,
                destination_endpoint: self.dest.clone(),
                source_node: self.source.clone(),
                replyto: self.replyto.clone(),
                custodian: self.custodian(),
                report_to: self.report_to.clone(),
                creation_timestamp: self.creation_ts,
                lifetime: self.expiration,
                fragment_offset: self.frag_offset,
                total_data_length: self.orig_length,
            },
            blocks: vec![CanonicalBlock::payload(payload)],
        })
    }

    pub fn bundleid(&self) -> u32 {
        self.bundleid.load(Ordering::Relaxed)
    }

    pub fn has_bundleid(&self) -> bool {
        self.bundleid() != BUNDLEID_UNASSIGNED
    }

    pub fn assign_bundleid(&self, id: u32) {
        let prev = self.bundleid.swap(id, Ordering::Relaxed);
        assert!(
            prev == BUNDLEID_UNASSIGNED,
            "bundle id {prev} reassigned to {id}"
        );
    }

    pub fn identity(&self) -> BundleIdentity {
        BundleIdentity {
            source: self.source.clone(),
            creation_ts: self.creation_ts,
            is_fragment: self.is_fragment(),
            frag_offset: self.frag_offset,
            orig_length: self.orig_length,
        }
    }

    pub fn payload(&self) -> &BundlePayload {
        &self.payload
    }

    pub fn is_fragment(&self) -> bool {
        self.flags.contains(BundleFlags::IS_FRAGMENT)
    }

    pub fn is_admin(&self) -> bool {
        self.flags.contains(BundleFlags::IS_ADMIN)
    }

    pub fn do_not_fragment(&self) -> bool {
        self.flags.contains(BundleFlags::DO_NOT_FRAGMENT)
    }

    pub fn custody_requested(&self) -> bool {
        self.flags.contains(BundleFlags::CUSTODY_REQUESTED)
    }

    pub fn wants_report(&self, bit: BundleFlags) -> bool {
        self.flags.contains(bit)
    }

    pub fn custodian(&self) -> EndpointId {
        self.state.lock().custodian.clone()
    }

    pub fn set_custodian(&self, custodian: EndpointId) {
        self.state.lock().custodian = custodian;
    }

    pub fn local_custody(&self) -> bool {
        self.state.lock().local_custody
    }

    pub fn set_local_custody(&self, held: bool) {
        self.state.lock().local_custody = held;
    }

    pub fn creation_datetime(&self) -> DateTime<Utc> {
        self.creation_ts.creation_time.into()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.creation_datetime() + Duration::seconds(self.expiration as i64)
    }

    /// Time left until expiration, or `None` when the lifetime already
    /// elapsed.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        (self.expires_at() - now).to_std().ok()
    }

    // -- mappings, maintained by BundleList under this bundle's lock

    pub(crate) fn add_mapping(&self, list: &Arc<BundleList>) {
        let mut state = self.state.lock();
        debug_assert!(
            !state.mappings.iter().any(|m| m.list_id == list.id()),
            "bundle already mapped to list {}",
            list.name()
        );
        state.mappings.push(Mapping {
            list_id: list.id(),
            list: Arc::downgrade(list),
        });
    }

    pub(crate) fn del_mapping(&self, list_id: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.mappings.len();
        state.mappings.retain(|m| m.list_id != list_id);
        state.mappings.len() != before
    }

    pub fn num_mappings(&self) -> usize {
        self.state.lock().mappings.len()
    }

    /// The lists this bundle currently sits on.
    pub fn mappings(&self) -> Vec<Arc<BundleList>> {
        self.state
            .lock()
            .mappings
            .iter()
            .filter_map(|m| m.list.upgrade())
            .collect()
    }

    pub fn is_queued_on(&self, list: &Arc<BundleList>) -> bool {
        self.state.lock().mappings.iter().any(|m| m.list_id == list.id())
    }

    // -- forwarding log

    pub fn fwdlog_add(
        &self,
        link: &str,
        action: ForwardingAction,
        state: ForwardingState,
        custody_spec: Option<CustodyTimerSpec>,
    ) {
        self.state
            .lock()
            .fwdlog
            .add_entry(link, action, state, custody_spec);
    }

    pub fn fwdlog_update(&self, link: &str, state: ForwardingState) -> bool {
        self.state.lock().fwdlog.update(link, state)
    }

    pub fn fwdlog_latest(&self, link: &str) -> ForwardingState {
        self.state.lock().fwdlog.latest_state(link)
    }

    pub fn fwdlog_entry(&self, link: &str) -> Option<ForwardingInfo> {
        self.state.lock().fwdlog.get_latest_entry(link)
    }

    // -- expiration timer

    pub fn has_expiration_timer(&self) -> bool {
        self.state.lock().expiration_timer.is_some()
    }

    pub fn set_expiration_timer(&self, handle: TimerHandle) {
        let mut state = self.state.lock();
        debug_assert!(state.expiration_timer.is_none());
        state.expiration_timer = Some(handle);
    }

    pub fn take_expiration_timer(&self) -> Option<TimerHandle> {
        self.state.lock().expiration_timer.take()
    }
}

#[cfg(test)]
mod tests {
    use bp6::bundleflags::BundleFlags;

    use crate::bundling::testutil::test_bundle;

    #[test]
    fn identity_tuple_distinguishes_bundles() {
        let a = test_bundle(1, "dtn://a/app", "dtn://b/app");
        let b = test_bundle(1, "dtn://a/app", "dtn://b/app");
        assert_eq!(a.identity(), b.identity());

        // a different sequence number or source breaks the identity
        let c = test_bundle(2, "dtn://a/app", "dtn://b/app");
        assert_ne!(a.identity(), c.identity());
        let d = test_bundle(1, "dtn://other/app", "dtn://b/app");
        assert_ne!(a.identity(), d.identity());
    }

    #[test]
    fn record_roundtrip_preserves_fields() {
        let a = test_bundle(9, "dtn://a/app", "dtn://b/app");
        a.set_local_custody(true);
        let record = a.to_record(true).unwrap();
        let back = super::Bundle::from_record(&record, None).unwrap();
        assert_eq!(back.bundleid(), 9);
        assert_eq!(back.identity(), a.identity());
        assert_eq!(back.expiration, a.expiration);
        assert!(back.local_custody());
        assert_eq!(
            back.payload().read().unwrap(),
            a.payload().read().unwrap()
        );
    }

    #[test]
    fn wire_roundtrip_preserves_payload() {
        let a = test_bundle(4, "dtn://a/app", "dtn://b/app");
        let wire = a.to_wire().unwrap();
        let back = super::Bundle::from_wire(&wire).unwrap();
        assert!(!back.has_bundleid());
        assert_eq!(back.identity(), a.identity());
        assert_eq!(back.payload().read().unwrap(), a.payload().read().unwrap());
    }

    #[test]
    fn flag_accessors() {
        let a = test_bundle(5, "dtn://a/app", "dtn://b/app");
        assert!(!a.is_admin());
        assert!(!a.custody_requested());
        assert!(!a.wants_report(BundleFlags::DELIVERY_RCPT));
    }
}
