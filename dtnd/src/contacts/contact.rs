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
    any::Any,
    sync::{Arc, Weak},
};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use super::link::{Link, LinkRef};

pub type ContactRef = Arc<Contact>;

/// Observed characteristics of a contact, filled in by the convergence
/// layer as it learns them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContactTelemetry {
    pub duration_ms: u32,
    pub bps: u32,
    pub latency_ms: u32,
}

/// One opportunity to transmit over a link. Its lifetime is strictly
/// nested inside the link's open state; the link holds the owning
/// reference, the contact only points back weakly.
pub struct Contact {
    id: Uuid,
    link: Weak<Link>,
    link_name: String,
    start_time: DateTime<Utc>,
    telemetry: Mutex<ContactTelemetry>,
    cl_info: Mutex<Option<Box<dyn Any + Send>>>,
}

impl std::fmt::Debug for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "contact {} on link {} since {}",
            self.id, self.link_name, self.start_time
        ))
    }
}

impl Contact {
    pub fn new(link: &LinkRef) -> ContactRef {
        Arc::new(Contact {
            id: Uuid::new_v4(),
            link: Arc::downgrade(link),
            link_name: link.name().to_string(),
            start_time: Utc::now(),
            telemetry: Mutex::new(ContactTelemetry::default()),
            cl_info: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The owning link, `None` once the link is gone.
    pub fn link(&self) -> Option<LinkRef> {
        self.link.upgrade()
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn telemetry(&self) -> ContactTelemetry {
        *self.telemetry.lock()
    }

    pub fn update_telemetry(&self, telemetry: ContactTelemetry) {
        *self.telemetry.lock() = telemetry;
    }

    /// Slot for convergence-layer private state. The core never looks
    /// inside.
    pub fn cl_info(&self) -> MutexGuard<'_, Option<Box<dyn Any + Send>>> {
        self.cl_info.lock()
    }
}
