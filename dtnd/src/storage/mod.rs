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

use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod rocks;

pub const GLOBALS_KEY: &str = "globals";
pub const CURRENT_VERSION: u32 = 1;

/// The durable tables the daemon relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Bundles,
    Registrations,
    Globals,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Bundles => "bundles",
            Table::Registrations => "registrations",
            Table::Globals => "globals",
        }
    }

    pub const ALL: [Table; 3] = [Table::Bundles, Table::Registrations, Table::Globals];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with `AlreadyExists` if the key is present.
    Create,
    CreateOrReplace,
}

#[derive(Debug)]
pub enum StoreError {
    NotFound,
    AlreadyExists,
    Corrupt(String),
    Backend(String),
    Io(std::io::Error),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_cbor::Error> for StoreError {
    fn from(e: serde_cbor::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => f.write_str("not found"),
            StoreError::AlreadyExists => f.write_str("already exists"),
            StoreError::Corrupt(e) => f.write_fmt(format_args!("corrupt record: {e}")),
            StoreError::Backend(e) => f.write_fmt(format_args!("backend error: {e}")),
            StoreError::Io(e) => f.write_fmt(format_args!("io error: {e}")),
        }
    }
}

impl std::error::Error for StoreError {}

/// Contract for the durable key to record tables.
///
/// A `put` must be durable by the time it returns. Iteration reflects a
/// consistent snapshot or serialises with writes. No transactions
/// across tables are assumed by callers.
pub trait DataStore: Send + Sync {
    fn get(&self, table: Table, key: &str) -> Result<Vec<u8>, StoreError>;
    fn put(&self, table: Table, key: &str, value: &[u8], mode: PutMode) -> Result<(), StoreError>;
    fn del(&self, table: Table, key: &str) -> Result<(), StoreError>;
    fn iterate(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
    fn truncate(&self, table: Table) -> Result<(), StoreError>;
}

/// The durable form of a bundle, keyed by bundleid in `Table::Bundles`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleRecord {
    pub bundleid: u32,
    pub source: String,
    pub dest: String,
    pub replyto: String,
    pub custodian: String,
    pub report_to: String,
    pub priority: u64,
    pub flags: u64,
    pub creation_secs: u64,
    pub creation_seqno: u64,
    pub expiration: u64,
    pub frag_offset: Option<u64>,
    pub orig_length: Option<u64>,
    pub local_custody: bool,
    pub payload_length: u64,
    /// Inline payload bytes, or `None` when the payload lives in a file
    /// named after the bundleid under the payload directory.
    pub payload: Option<Vec<u8>>,
}

impl BundleRecord {
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_cbor::from_slice(data)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub regid: u32,
    pub endpoint: String,
    pub failure_action: u32,
    pub script: Option<String>,
    pub expiration: u64,
}

impl RegistrationRecord {
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_cbor::from_slice(data)?)
    }
}

/// The singleton record in `Table::Globals`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalsRecord {
    pub version: u32,
    pub next_bundleid: u32,
    pub next_regid: u32,
    pub next_linkid: u32,
}

impl Default for GlobalsRecord {
    fn default() -> Self {
        GlobalsRecord {
            version: CURRENT_VERSION,
            next_bundleid: 0,
            next_regid: crate::registration::MAX_RESERVED_REGID,
            next_linkid: 0,
        }
    }
}

/// Write-through allocator over the globals record. Every allocation is
/// persisted before the new id is handed out, so ids are never reused
/// across restarts.
pub struct Globals {
    store: Arc<dyn DataStore>,
    record: Mutex<GlobalsRecord>,
}

impl Globals {
    pub fn load_or_init(store: Arc<dyn DataStore>) -> Result<Self, StoreError> {
        let record = match store.get(Table::Globals, GLOBALS_KEY) {
            Ok(data) => {
                let record: GlobalsRecord = serde_cbor::from_slice(&data)?;
                if record.version != CURRENT_VERSION {
                    return Err(StoreError::Corrupt(format!(
                        "globals version {} does not match expected {}",
                        record.version, CURRENT_VERSION
                    )));
                }
                debug!("Loaded globals: {record:?}");
                record
            }
            Err(StoreError::NotFound) => {
                let record = GlobalsRecord::default();
                info!("Priming fresh globals record");
                store.put(
                    Table::Globals,
                    GLOBALS_KEY,
                    &serde_cbor::to_vec(&record)?,
                    PutMode::Create,
                )?;
                record
            }
            Err(e) => return Err(e),
        };
        Ok(Globals {
            store,
            record: Mutex::new(record),
        })
    }

    fn persist(&self, record: &GlobalsRecord) -> Result<(), StoreError> {
        self.store.put(
            Table::Globals,
            GLOBALS_KEY,
            &serde_cbor::to_vec(record)?,
            PutMode::CreateOrReplace,
        )
    }

    pub fn next_bundleid(&self) -> Result<u32, StoreError> {
        let mut record = self.record.lock();
        let id = record.next_bundleid;
        record.next_bundleid += 1;
        self.persist(&record)?;
        Ok(id)
    }

    pub fn next_regid(&self) -> Result<u32, StoreError> {
        let mut record = self.record.lock();
        let id = record.next_regid;
        record.next_regid += 1;
        self.persist(&record)?;
        Ok(id)
    }

    pub fn next_linkid(&self) -> Result<u32, StoreError> {
        let mut record = self.record.lock();
        let id = record.next_linkid;
        record.next_linkid += 1;
        self.persist(&record)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{memory::MemoryStore, DataStore, Globals, PutMode, StoreError, Table};

    #[test]
    fn globals_allocations_are_write_through() {
        let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
        let globals = Globals::load_or_init(store.clone()).unwrap();
        assert_eq!(globals.next_bundleid().unwrap(), 0);
        assert_eq!(globals.next_bundleid().unwrap(), 1);
        assert_eq!(globals.next_linkid().unwrap(), 0);

        // a second instance over the same store continues where the
        // first one stopped
        let globals2 = Globals::load_or_init(store).unwrap();
        assert_eq!(globals2.next_bundleid().unwrap(), 2);
        assert_eq!(globals2.next_linkid().unwrap(), 1);
    }

    #[test]
    fn put_create_rejects_existing() {
        let store = MemoryStore::new();
        store
            .put(Table::Bundles, "1", b"abc", PutMode::Create)
            .unwrap();
        match store.put(Table::Bundles, "1", b"def", PutMode::Create) {
            Err(StoreError::AlreadyExists) => {}
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        store
            .put(Table::Bundles, "1", b"def", PutMode::CreateOrReplace)
            .unwrap();
        assert_eq!(store.get(Table::Bundles, "1").unwrap(), b"def");
    }

    #[test]
    fn iterate_is_per_table() {
        let store = MemoryStore::new();
        store
            .put(Table::Bundles, "1", b"a", PutMode::Create)
            .unwrap();
        store
            .put(Table::Registrations, "1", b"b", PutMode::Create)
            .unwrap();
        let bundles = store.iterate(Table::Bundles).unwrap();
        assert_eq!(bundles, vec![("1".to_string(), b"a".to_vec())]);
        store.truncate(Table::Bundles).unwrap();
        assert!(store.iterate(Table::Bundles).unwrap().is_empty());
        assert_eq!(store.iterate(Table::Registrations).unwrap().len(), 1);
    }
}
