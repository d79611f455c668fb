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
    fs,
    path::{Path, PathBuf},
};

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLocation {
    Memory,
    File,
}

/// Handle to a bundle's payload: its length plus where the bytes live.
#[derive(Debug, Clone)]
pub struct BundlePayload {
    length: u64,
    data: PayloadData,
}

#[derive(Debug, Clone)]
enum PayloadData {
    Memory(Bytes),
    File(PathBuf),
}

impl BundlePayload {
    pub fn in_memory(data: Vec<u8>) -> Self {
        BundlePayload {
            length: data.len() as u64,
            data: PayloadData::Memory(Bytes::from(data)),
        }
    }

    /// Write the payload to its own file under `dir`, named after the
    /// bundleid.
    pub fn in_file(dir: &Path, bundleid: u32, data: &[u8]) -> Result<Self, std::io::Error> {
        fs::create_dir_all(dir)?;
        let path = Self::file_path(dir, bundleid);
        fs::write(&path, data)?;
        Ok(BundlePayload {
            length: data.len() as u64,
            data: PayloadData::File(path),
        })
    }

    pub fn from_existing_file(dir: &Path, bundleid: u32) -> Result<Self, std::io::Error> {
        let path = Self::file_path(dir, bundleid);
        let length = fs::metadata(&path)?.len();
        Ok(BundlePayload {
            length,
            data: PayloadData::File(path),
        })
    }

    pub fn file_path(dir: &Path, bundleid: u32) -> PathBuf {
        dir.join(format!("{bundleid}.payload"))
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn location(&self) -> PayloadLocation {
        match self.data {
            PayloadData::Memory(_) => PayloadLocation::Memory,
            PayloadData::File(_) => PayloadLocation::File,
        }
    }

    pub fn read(&self) -> Result<Vec<u8>, std::io::Error> {
        match &self.data {
            PayloadData::Memory(bytes) => Ok(bytes.to_vec()),
            PayloadData::File(path) => fs::read(path),
        }
    }

    /// Remove the backing file, if any. Memory payloads are freed by
    /// dropping.
    pub fn discard(&self) -> Result<(), std::io::Error> {
        match &self.data {
            PayloadData::Memory(_) => Ok(()),
            PayloadData::File(path) => fs::remove_file(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BundlePayload, PayloadLocation};

    #[test]
    fn memory_payload_roundtrip() {
        let payload = BundlePayload::in_memory(b"some bytes".to_vec());
        assert_eq!(payload.length(), 10);
        assert_eq!(payload.location(), PayloadLocation::Memory);
        assert_eq!(payload.read().unwrap(), b"some bytes");
    }

    #[test]
    fn file_payload_roundtrip() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("dtnd-payload-test-{}", std::process::id()));
        let payload = BundlePayload::in_file(&dir, 17, b"on disk").unwrap();
        assert_eq!(payload.length(), 7);
        assert_eq!(payload.location(), PayloadLocation::File);
        assert_eq!(payload.read().unwrap(), b"on disk");

        let reloaded = BundlePayload::from_existing_file(&dir, 17).unwrap();
        assert_eq!(reloaded.read().unwrap(), b"on disk");

        payload.discard().unwrap();
        assert!(BundlePayload::from_existing_file(&dir, 17).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
