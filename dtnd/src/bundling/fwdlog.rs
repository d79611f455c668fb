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

use chrono::{DateTime, Utc};

/// What the router asked to happen on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingAction {
    /// Forward the bundle to exactly one next hop.
    ForwardUnique,
    /// Forward a copy, the bundle may also go elsewhere.
    ForwardCopy,
    /// Forward to the first of a set of links.
    ForwardFirst,
    /// Reassemble fragments before forwarding.
    ForwardReassemble,
}

/// Where a (bundle, link) pair currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingState {
    None,
    InFlight,
    Transmitting,
    Transmitted,
    Cancelled,
    CustodyTimeout,
    Delivered,
}

/// Parameters for the retransmission timer armed when a bundle with
/// custody is sent. The effective timeout scales with the bundle
/// lifetime but is bounded by `limit_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustodyTimerSpec {
    pub base_secs: u32,
    pub lifetime_pct: u32,
    pub limit_secs: u32,
}

impl Default for CustodyTimerSpec {
    fn default() -> Self {
        CustodyTimerSpec {
            base_secs: 30,
            lifetime_pct: 25,
            limit_secs: 3600,
        }
    }
}

impl CustodyTimerSpec {
    pub fn timeout_secs(&self, lifetime_secs: u64) -> u64 {
        let scaled = u64::from(self.base_secs) + lifetime_secs * u64::from(self.lifetime_pct) / 100;
        scaled.min(u64::from(self.limit_secs))
    }
}

/// One forwarding attempt of a bundle on a link.
#[derive(Debug, Clone)]
pub struct ForwardingInfo {
    pub link: String,
    pub action: ForwardingAction,
    pub state: ForwardingState,
    pub timestamp: DateTime<Utc>,
    pub custody_spec: Option<CustodyTimerSpec>,
}

/// Append-only audit trail of forwarding attempts, consulted before a
/// send to keep a bundle from going out twice on the same link.
#[derive(Debug, Default)]
pub struct ForwardingLog {
    entries: Vec<ForwardingInfo>,
}

impl ForwardingLog {
    pub fn add_entry(
        &mut self,
        link: &str,
        action: ForwardingAction,
        state: ForwardingState,
        custody_spec: Option<CustodyTimerSpec>,
    ) {
        self.entries.push(ForwardingInfo {
            link: link.to_string(),
            action,
            state,
            timestamp: Utc::now(),
            custody_spec,
        });
    }

    /// Rewrite the state of the most recent entry for `link`. Returns
    /// false when the link never had an entry.
    pub fn update(&mut self, link: &str, state: ForwardingState) -> bool {
        for entry in self.entries.iter_mut().rev() {
            if entry.link == link {
                entry.state = state;
                entry.timestamp = Utc::now();
                return true;
            }
        }
        false
    }

    pub fn get_latest_entry(&self, link: &str) -> Option<ForwardingInfo> {
        self.entries.iter().rev().find(|e| e.link == link).cloned()
    }

    pub fn latest_state(&self, link: &str) -> ForwardingState {
        self.get_latest_entry(link)
            .map_or(ForwardingState::None, |e| e.state)
    }

    pub fn entries(&self) -> &[ForwardingInfo] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::{CustodyTimerSpec, ForwardingAction, ForwardingLog, ForwardingState};

    #[test]
    fn update_rewrites_latest_entry_only() {
        let mut log = ForwardingLog::default();
        log.add_entry(
            "l1",
            ForwardingAction::ForwardUnique,
            ForwardingState::InFlight,
            None,
        );
        log.add_entry(
            "l2",
            ForwardingAction::ForwardCopy,
            ForwardingState::InFlight,
            None,
        );
        log.add_entry(
            "l1",
            ForwardingAction::ForwardUnique,
            ForwardingState::InFlight,
            None,
        );

        assert!(log.update("l1", ForwardingState::Transmitted));
        assert_eq!(log.latest_state("l1"), ForwardingState::Transmitted);
        // the earlier l1 entry is untouched
        assert_eq!(log.entries()[0].state, ForwardingState::InFlight);
        assert_eq!(log.latest_state("l2"), ForwardingState::InFlight);
        assert!(!log.update("l3", ForwardingState::Cancelled));
        assert_eq!(log.latest_state("l3"), ForwardingState::None);
    }

    #[test]
    fn custody_timeout_scales_with_lifetime() {
        let spec = CustodyTimerSpec::default();
        assert_eq!(spec.timeout_secs(0), 30);
        assert_eq!(spec.timeout_secs(120), 60);
        // bounded by the limit
        assert_eq!(spec.timeout_secs(1_000_000), 3600);
    }
}
