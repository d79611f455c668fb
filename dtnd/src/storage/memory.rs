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

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use super::{DataStore, PutMode, StoreError, Table};

/// A store with `DataStore` semantics but no durability. Used by tests
/// and usable as a scratch configuration.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<&'static str, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl DataStore for MemoryStore {
    fn get(&self, table: Table, key: &str) -> Result<Vec<u8>, StoreError> {
        self.tables
            .lock()
            .get(table.as_str())
            .and_then(|t| t.get(key))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn put(&self, table: Table, key: &str, value: &[u8], mode: PutMode) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let table = tables.entry(table.as_str()).or_default();
        if mode == PutMode::Create && table.contains_key(key) {
            return Err(StoreError::AlreadyExists);
        }
        table.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn del(&self, table: Table, key: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        match tables.get_mut(table.as_str()).and_then(|t| t.remove(key)) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    fn iterate(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .tables
            .lock()
            .get(table.as_str())
            .map(|t| {
                t.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default())
    }

    fn truncate(&self, table: Table) -> Result<(), StoreError> {
        self.tables.lock().remove(table.as_str());
        Ok(())
    }
}
