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

pub mod administrative_record;
pub mod block;
pub mod blockflags;
pub mod bundle;
pub mod bundleflags;
pub mod cos;
pub mod endpoint;
pub mod primaryblock;
pub mod time;

pub trait Validate {
    fn validate(&self) -> bool;
}

#[derive(Debug)]
pub enum SerializationError {
    SerializationError(serde_cbor::Error),
    ConversionError,
}

impl From<serde_cbor::Error> for SerializationError {
    fn from(error: serde_cbor::Error) -> Self {
        SerializationError::SerializationError(error)
    }
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializationError::SerializationError(e) => {
                f.write_fmt(format_args!("cbor error: {e}"))
            }
            SerializationError::ConversionError => f.write_str("conversion error"),
        }
    }
}

impl std::error::Error for SerializationError {}
