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

use std::path::Path;

use log::info;
use rocksdb::{Options, TransactionDB, TransactionDBOptions};

use super::{DataStore, PutMode, StoreError, Table};

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Durable store over a single RocksDB database. Each table lives under
/// its own key prefix so prefix-range iteration yields exactly one
/// table.
pub struct RocksStore {
    db: TransactionDB,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore").finish()
    }
}

impl RocksStore {
    pub fn open(path: &Path, tidy: bool) -> Result<Self, StoreError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = TransactionDB::open(&options, &TransactionDBOptions::default(), path)?;
        let store = RocksStore { db };
        if tidy {
            info!("Tidying all tables in {}", path.display());
            for table in Table::ALL {
                store.truncate(table)?;
            }
        }
        Ok(store)
    }

    fn get_path(table: Table, key: &str) -> String {
        format!("\0table\0{}\0{}", table.as_str(), key)
    }

    fn prefix(table: Table) -> String {
        format!("\0table\0{}\0", table.as_str())
    }

    fn iter_range(&self, key: &[u8]) -> rocksdb::DBIteratorWithThreadMode<'_, TransactionDB> {
        let mut options = rocksdb::ReadOptions::default();
        options.set_iterate_range(rocksdb::PrefixRange(key));
        self.db.iterator_opt(
            rocksdb::IteratorMode::From(key, rocksdb::Direction::Forward),
            options,
        )
    }
}

impl DataStore for RocksStore {
    fn get(&self, table: Table, key: &str) -> Result<Vec<u8>, StoreError> {
        self.db
            .get(Self::get_path(table, key))?
            .ok_or(StoreError::NotFound)
    }

    fn put(&self, table: Table, key: &str, value: &[u8], mode: PutMode) -> Result<(), StoreError> {
        let path = Self::get_path(table, key);
        match mode {
            PutMode::Create => {
                let txn = self.db.transaction();
                if txn.get_for_update(&path, true)?.is_some() {
                    return Err(StoreError::AlreadyExists);
                }
                txn.put(&path, value)?;
                txn.commit()?;
                Ok(())
            }
            PutMode::CreateOrReplace => Ok(self.db.put(&path, value)?),
        }
    }

    fn del(&self, table: Table, key: &str) -> Result<(), StoreError> {
        let path = Self::get_path(table, key);
        if self.db.get(&path)?.is_none() {
            return Err(StoreError::NotFound);
        }
        Ok(self.db.delete(&path)?)
    }

    fn iterate(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let prefix = Self::prefix(table);
        let prefix_bytes = prefix.as_bytes();
        self.iter_range(prefix_bytes)
            .try_fold(Vec::new(), |mut out, e| {
                let (key, value) = e?;
                let keystring = String::from_utf8(key.iter().copied().skip(prefix_bytes.len()).collect())
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                out.push((keystring, value.to_vec()));
                Ok(out)
            })
    }

    fn truncate(&self, table: Table) -> Result<(), StoreError> {
        let prefix = Self::prefix(table);
        let txn = self.db.transaction();
        for found in self.iter_range(prefix.as_bytes()) {
            txn.delete(found?.0)?;
        }
        txn.commit()?;
        Ok(())
    }
}
