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
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bp6::endpoint::EndpointId;
use log::debug;
use parking_lot::Mutex;

use crate::{
    bundling::{BundleList, BundleRef},
    storage::{RegistrationRecord, StoreError},
};

/// Regids below this value are never allocated dynamically.
pub const MAX_RESERVED_REGID: u32 = 16;

/// The reserved registration backing the node's own administrative
/// endpoint.
pub const ADMIN_REGID: u32 = 0;

/// What to do with a matching bundle while no application is draining
/// the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Keep the bundle queued until the application shows up.
    Defer = 0,
    /// Throw the bundle away.
    Drop = 1,
    /// Spawn the registration's handler program, then defer.
    Exec = 2,
}

impl FailureAction {
    pub fn from_u32(value: u32) -> Option<FailureAction> {
        match value {
            0 => Some(FailureAction::Defer),
            1 => Some(FailureAction::Drop),
            2 => Some(FailureAction::Exec),
            _ => None,
        }
    }
}

pub type RegistrationRef = Arc<Registration>;

/// A local delivery endpoint: bundles matching the pattern are pushed
/// onto the delivery list, which the application drains.
pub struct Registration {
    regid: u32,
    endpoint: EndpointId,
    failure_action: FailureAction,
    script: Option<String>,
    expiration: u64,
    /// True while an application is actively draining the list. The
    /// failure action only applies while this is false.
    active: AtomicBool,
    list: Arc<BundleList>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "registration {} for {} ({:?})",
            self.regid, self.endpoint, self.failure_action
        ))
    }
}

impl Registration {
    pub fn new(
        regid: u32,
        endpoint: EndpointId,
        failure_action: FailureAction,
        script: Option<String>,
        expiration: u64,
    ) -> RegistrationRef {
        Arc::new(Registration {
            regid,
            endpoint,
            failure_action,
            script,
            expiration,
            active: AtomicBool::new(false),
            list: BundleList::new(&format!("registration:{regid}")),
        })
    }

    pub fn from_record(record: &RegistrationRecord) -> Result<RegistrationRef, StoreError> {
        Ok(Registration::new(
            record.regid,
            EndpointId::new(&record.endpoint)
                .ok_or_else(|| StoreError::Corrupt(format!("bad endpoint: {}", record.endpoint)))?,
            FailureAction::from_u32(record.failure_action).ok_or_else(|| {
                StoreError::Corrupt(format!("bad failure action: {}", record.failure_action))
            })?,
            record.script.clone(),
            record.expiration,
        ))
    }

    pub fn to_record(&self) -> RegistrationRecord {
        RegistrationRecord {
            regid: self.regid,
            endpoint: self.endpoint.to_string(),
            failure_action: self.failure_action as u32,
            script: self.script.clone(),
            expiration: self.expiration,
        }
    }

    pub fn regid(&self) -> u32 {
        self.regid
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn failure_action(&self) -> FailureAction {
        self.failure_action
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// The delivery list the application drains.
    pub fn list(&self) -> &Arc<BundleList> {
        &self.list
    }

    pub fn matches(&self, dest: &EndpointId) -> bool {
        self.endpoint == *dest || self.endpoint.matches(dest)
    }

    pub fn deliver(&self, bundle: &BundleRef) {
        debug!("delivering {bundle:?} to registration {}", self.regid);
        self.list.push_back(bundle);
    }
}

/// All current registrations, keyed by regid. Shared between the
/// daemon (which mutates it) and application-facing code (which reads
/// and drains delivery lists).
#[derive(Default)]
pub struct RegistrationTable {
    regs: Mutex<BTreeMap<u32, RegistrationRef>>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        RegistrationTable::default()
    }

    pub fn add(&self, registration: RegistrationRef) -> bool {
        self.regs
            .lock()
            .insert(registration.regid(), registration)
            .is_none()
    }

    pub fn remove(&self, regid: u32) -> Option<RegistrationRef> {
        self.regs.lock().remove(&regid)
    }

    pub fn get(&self, regid: u32) -> Option<RegistrationRef> {
        self.regs.lock().get(&regid).cloned()
    }

    pub fn len(&self) -> usize {
        self.regs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.lock().is_empty()
    }

    /// Registrations whose pattern covers `dest`, in regid order.
    pub fn matching(&self, dest: &EndpointId) -> Vec<RegistrationRef> {
        self.regs
            .lock()
            .values()
            .filter(|r| r.matches(dest))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<RegistrationRef> {
        self.regs.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use bp6::endpoint::EndpointId;

    use super::{FailureAction, Registration, RegistrationTable};

    #[test]
    fn pattern_matching_delivery_targets() {
        let table = RegistrationTable::new();
        table.add(Registration::new(
            16,
            EndpointId::new("dtn://node/app").unwrap(),
            FailureAction::Defer,
            None,
            0,
        ));
        table.add(Registration::new(
            17,
            EndpointId::new("dtn://node/*").unwrap(),
            FailureAction::Drop,
            None,
            0,
        ));

        let dest = EndpointId::new("dtn://node/app").unwrap();
        let matching = table.matching(&dest);
        assert_eq!(matching.len(), 2);
        assert_eq!(matching[0].regid(), 16);
        assert_eq!(matching[1].regid(), 17);

        let other = EndpointId::new("dtn://node/other").unwrap();
        assert_eq!(table.matching(&other).len(), 1);

        let elsewhere = EndpointId::new("dtn://elsewhere/app").unwrap();
        assert!(table.matching(&elsewhere).is_empty());
    }

    #[test]
    fn record_roundtrip() {
        let reg = Registration::new(
            42,
            EndpointId::new("dtn://node/inbox").unwrap(),
            FailureAction::Exec,
            Some("/usr/local/bin/handler".to_string()),
            86400,
        );
        let record = reg.to_record();
        let back = Registration::from_record(&record).unwrap();
        assert_eq!(back.regid(), 42);
        assert_eq!(back.endpoint(), reg.endpoint());
        assert_eq!(back.failure_action(), FailureAction::Exec);
        assert_eq!(back.script(), Some("/usr/local/bin/handler"));
        assert_eq!(back.expiration(), 86400);
    }
}
