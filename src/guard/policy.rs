// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CIDR allow/deny policy.
//!
//! The policy store holds two disjoint lists of network prefixes and
//! classifies a single address against them. A match in either list is
//! *authoritative*: it fully determines the outcome and rate limiting is
//! skipped.
//!
//! # Rules
//!
//! - The allow list is checked first, then the deny list.
//! - A canonical prefix is never present in both lists. Adding a prefix to
//!   one list removes it from the other under the same write lock.
//! - Removing a prefix that is not present is a no-op.
//!
//! # Example
//!
//! ```
//! use bouncer::guard::{PolicyStore, PolicyVerdict};
//!
//! let policy = PolicyStore::new();
//! policy.add_deny("10.0.0.0/24").unwrap();
//!
//! let ip: std::net::IpAddr = "10.0.0.5".parse().unwrap();
//! assert_eq!(policy.classify(&ip).unwrap(), PolicyVerdict::Deny);
//!
//! policy.add_allow("10.0.0.0/24").unwrap();
//! assert_eq!(policy.classify(&ip).unwrap(), PolicyVerdict::Allow);
//! assert_eq!(policy.deny_count().unwrap(), 0);
//! ```

use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::GuardError;

/// Result of classifying an address against the policy lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// The address matched the allow list.
    Allow,
    /// The address matched the deny list.
    Deny,
    /// Neither list matched; rate limiting decides.
    Undecided,
}

impl PolicyVerdict {
    /// Whether the lists alone determine the outcome.
    pub fn is_authoritative(&self) -> bool {
        !matches!(self, PolicyVerdict::Undecided)
    }

    /// Whether the address is admitted. Meaningless for [`PolicyVerdict::Undecided`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyVerdict::Allow)
    }
}

/// Which of the two lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyList {
    Allow,
    Deny,
}

impl PolicyList {
    fn opposite(self) -> Self {
        match self {
            PolicyList::Allow => PolicyList::Deny,
            PolicyList::Deny => PolicyList::Allow,
        }
    }

    fn name(self) -> &'static str {
        match self {
            PolicyList::Allow => "allow",
            PolicyList::Deny => "deny",
        }
    }
}

#[derive(Debug, Default)]
struct PolicyLists {
    allow: Vec<IpNetwork>,
    deny: Vec<IpNetwork>,
}

impl PolicyLists {
    fn list_mut(&mut self, which: PolicyList) -> &mut Vec<IpNetwork> {
        match which {
            PolicyList::Allow => &mut self.allow,
            PolicyList::Deny => &mut self.deny,
        }
    }
}

/// Parse CIDR text into its canonical network form.
///
/// Host bits are cleared (`10.0.0.5/24` becomes `10.0.0.0/24`) and a bare
/// address is taken as a host prefix (`/32` or `/128`).
pub fn parse_prefix(text: &str) -> Result<IpNetwork, GuardError> {
    let trimmed = text.trim();
    let parsed: IpNetwork = trimmed
        .parse()
        .map_err(|e| GuardError::invalid_prefix(trimmed, e))?;
    IpNetwork::new(parsed.network(), parsed.prefix())
        .map_err(|e| GuardError::invalid_prefix(trimmed, e))
}

/// Thread-safe allow/deny prefix store.
///
/// Readers never observe a prefix in both lists: moves between lists happen
/// under a single write lock.
#[derive(Debug, Default)]
pub struct PolicyStore {
    lists: RwLock<PolicyLists>,
}

impl PolicyStore {
    /// Create an empty policy store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy store seeded with initial allow and deny prefixes.
    ///
    /// Prefixes are applied allow list first, through the regular add
    /// operations, so a prefix listed in both ends up in the deny list only.
    pub fn from_lists(allow: &[String], deny: &[String]) -> Result<Self, GuardError> {
        let store = Self::new();
        for prefix in allow {
            store.add_allow(prefix)?;
        }
        for prefix in deny {
            store.add_deny(prefix)?;
        }

        let (allow_count, deny_count) = {
            let lists = store.read()?;
            (lists.allow.len(), lists.deny.len())
        };
        tracing::info!(allow_count, deny_count, "Policy store configured");

        Ok(store)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, PolicyLists>, GuardError> {
        self.lists
            .read()
            .map_err(|_| GuardError::StatePoisoned("policy"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, PolicyLists>, GuardError> {
        self.lists
            .write()
            .map_err(|_| GuardError::StatePoisoned("policy"))
    }

    /// Classify an address against the allow and deny lists.
    ///
    /// IPv4-mapped IPv6 addresses are matched as their IPv4 form.
    pub fn classify(&self, ip: &IpAddr) -> Result<PolicyVerdict, GuardError> {
        let ip = &ip.to_canonical();
        let lists = self.read()?;

        if let Some(network) = lists.allow.iter().find(|n| n.contains(*ip)) {
            tracing::trace!(ip = %ip, network = %network, "Address matched allow list");
            return Ok(PolicyVerdict::Allow);
        }

        if let Some(network) = lists.deny.iter().find(|n| n.contains(*ip)) {
            tracing::debug!(ip = %ip, network = %network, "Address matched deny list");
            return Ok(PolicyVerdict::Deny);
        }

        Ok(PolicyVerdict::Undecided)
    }

    /// Add a prefix to the allow list, removing it from the deny list.
    pub fn add_allow(&self, prefix: &str) -> Result<IpNetwork, GuardError> {
        self.insert(PolicyList::Allow, prefix)
    }

    /// Add a prefix to the deny list, removing it from the allow list.
    pub fn add_deny(&self, prefix: &str) -> Result<IpNetwork, GuardError> {
        self.insert(PolicyList::Deny, prefix)
    }

    /// Remove a prefix from the allow list.
    ///
    /// Returns whether a matching entry was present.
    pub fn remove_allow(&self, prefix: &str) -> Result<bool, GuardError> {
        self.remove(PolicyList::Allow, prefix)
    }

    /// Remove a prefix from the deny list.
    ///
    /// Returns whether a matching entry was present.
    pub fn remove_deny(&self, prefix: &str) -> Result<bool, GuardError> {
        self.remove(PolicyList::Deny, prefix)
    }

    fn insert(&self, which: PolicyList, prefix: &str) -> Result<IpNetwork, GuardError> {
        let network = parse_prefix(prefix)?;

        let mut lists = self.write()?;
        let opposite = lists.list_mut(which.opposite());
        let before = opposite.len();
        opposite.retain(|n| *n != network);
        if opposite.len() < before {
            tracing::info!(
                network = %network,
                from = which.opposite().name(),
                "Removed from opposite list"
            );
        }

        let target = lists.list_mut(which);
        if !target.contains(&network) {
            target.push(network);
            tracing::info!(network = %network, list = which.name(), "Added to policy list");
        }

        Ok(network)
    }

    fn remove(&self, which: PolicyList, prefix: &str) -> Result<bool, GuardError> {
        let network = parse_prefix(prefix)?;

        let mut lists = self.write()?;
        let target = lists.list_mut(which);
        let before = target.len();
        target.retain(|n| *n != network);
        let removed = target.len() < before;
        if removed {
            tracing::info!(network = %network, list = which.name(), "Removed from policy list");
        }

        Ok(removed)
    }

    /// Number of allow-list prefixes.
    pub fn allow_count(&self) -> Result<usize, GuardError> {
        Ok(self.read()?.allow.len())
    }

    /// Number of deny-list prefixes.
    pub fn deny_count(&self) -> Result<usize, GuardError> {
        Ok(self.read()?.deny.len())
    }

    /// Snapshot of the allow list.
    pub fn allowed_networks(&self) -> Result<Vec<IpNetwork>, GuardError> {
        Ok(self.read()?.allow.clone())
    }

    /// Snapshot of the deny list.
    pub fn denied_networks(&self) -> Result<Vec<IpNetwork>, GuardError> {
        Ok(self.read()?.deny.clone())
    }

    /// Consistent snapshot of both lists, taken under one read lock.
    pub fn snapshot(&self) -> Result<(Vec<IpNetwork>, Vec<IpNetwork>), GuardError> {
        let lists = self.read()?;
        Ok((lists.allow.clone(), lists.deny.clone()))
    }
}
