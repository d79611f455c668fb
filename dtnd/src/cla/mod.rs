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

use std::{any::Any, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use url::Url;

use crate::{
    bundling::BundleRef,
    contacts::{ContactRef, LinkRef, LinkStateReason},
};

pub mod loopback;

#[derive(Debug)]
pub enum ClError {
    UnknownScheme(String),
    BadAddress(String),
    InterfaceFailed(String),
    LinkFailed(String),
    ContactFailed(String),
}

impl std::fmt::Display for ClError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClError::UnknownScheme(s) => f.write_fmt(format_args!("unknown scheme: {s}")),
            ClError::BadAddress(s) => f.write_fmt(format_args!("bad address: {s}")),
            ClError::InterfaceFailed(s) => f.write_fmt(format_args!("interface failed: {s}")),
            ClError::LinkFailed(s) => f.write_fmt(format_args!("link failed: {s}")),
            ClError::ContactFailed(s) => f.write_fmt(format_args!("contact failed: {s}")),
        }
    }
}

impl std::error::Error for ClError {}

pub type InterfaceRef = Arc<Interface>;

/// A server-side listening endpoint of one convergence layer.
pub struct Interface {
    name: String,
    cl_name: String,
    addr: String,
    cl_info: Mutex<Option<Box<dyn Any + Send>>>,
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "interface {} [{} at {}]",
            self.name, self.cl_name, self.addr
        ))
    }
}

impl Interface {
    pub fn new(name: &str, cl_name: &str, addr: &str) -> InterfaceRef {
        Arc::new(Interface {
            name: name.to_string(),
            cl_name: cl_name.to_string(),
            addr: addr.to_string(),
            cl_info: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cl_name(&self) -> &str {
        &self.cl_name
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn cl_info(&self) -> MutexGuard<'_, Option<Box<dyn Any + Send>>> {
        self.cl_info.lock()
    }
}

/// Uniform interface over concrete transports.
///
/// Implementations run their own tasks and report back exclusively by
/// posting events to the daemon queue: `send_bundle` MUST eventually be
/// answered by exactly one of `BundleTransmitted` or
/// `BundleTransmitFailed` for the (bundle, contact) pair, and a
/// `close_contact` drains every in-flight transfer into a failure
/// before the daemon announces the contact as down.
#[async_trait]
pub trait ConvergenceLayer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn init_interface(&self, iface: &InterfaceRef) -> Result<(), ClError>;

    async fn destroy_interface(&self, iface: &InterfaceRef);

    /// One-time per-link setup.
    async fn init_link(&self, link: &LinkRef) -> Result<(), ClError>;

    async fn delete_link(&self, link: &LinkRef);

    /// Begin the work of reaching the peer. Completion is signalled
    /// asynchronously through `ContactUp` or a closed `LinkStateChange`.
    async fn open_contact(&self, contact: &ContactRef) -> Result<(), ClError>;

    async fn close_contact(&self, contact: &ContactRef, reason: LinkStateReason);

    /// Start transmitting. Always asynchronous.
    async fn send_bundle(&self, contact: &ContactRef, bundle: BundleRef);

    /// Best effort. True when the transfer was still cancellable; the
    /// failure outcome event follows.
    async fn cancel_bundle(&self, contact: &ContactRef, bundle: &BundleRef) -> bool;

    /// Advisory only.
    fn is_queued(&self, link: &LinkRef, bundle: &BundleRef) -> bool;
}

/// The convergence layers available in this process, keyed by scheme.
#[derive(Default)]
pub struct ClRegistry {
    cls: HashMap<&'static str, Arc<dyn ConvergenceLayer>>,
}

impl ClRegistry {
    pub fn new() -> Self {
        ClRegistry::default()
    }

    pub fn add(&mut self, cl: Arc<dyn ConvergenceLayer>) {
        self.cls.insert(cl.name(), cl);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn ConvergenceLayer>> {
        self.cls.get(name).cloned()
    }

    /// Resolve the convergence layer responsible for an address like
    /// `loopback://peer` by its URL scheme.
    pub fn find_for_addr(&self, addr: &str) -> Result<Arc<dyn ConvergenceLayer>, ClError> {
        let url = Url::parse(addr).map_err(|e| ClError::BadAddress(format!("{addr}: {e}")))?;
        self.find(url.scheme())
            .ok_or_else(|| ClError::UnknownScheme(url.scheme().to_string()))
    }
}
