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

//! Admission decisions.
//!
//! [`AdmissionEngine`] composes the [`PolicyStore`] and the [`BucketStore`]
//! into the single authorization decision used by the transport layer, plus
//! the administrative operations.

use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::Instant;

use super::bucket::{BucketConfig, BucketStore};
use super::category::Category;
use super::error::GuardError;
use super::policy::{PolicyStore, PolicyVerdict};

/// Decides whether an authentication attempt may proceed.
#[derive(Debug)]
pub struct AdmissionEngine {
    policy: PolicyStore,
    buckets: Arc<BucketStore>,
}

impl AdmissionEngine {
    /// Create an engine from its two stores.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::ZeroWindow`] if the bucket store has a zero
    /// window, and [`GuardError::UnknownCategory`] if any category consulted
    /// by [`authorize`](Self::authorize) has no configured capacity.
    pub fn new(policy: PolicyStore, buckets: Arc<BucketStore>) -> Result<Self, GuardError> {
        if buckets.window().is_zero() {
            return Err(GuardError::ZeroWindow);
        }
        for category in Category::ALL {
            buckets.capacity(category)?;
        }

        Ok(Self { policy, buckets })
    }

    /// Create an engine from bucket settings and initial policy lists.
    pub fn with_config(
        bucket_config: BucketConfig,
        allow: &[String],
        deny: &[String],
    ) -> Result<Self, GuardError> {
        let policy = PolicyStore::from_lists(allow, deny)?;
        Self::new(policy, Arc::new(BucketStore::new(bucket_config)))
    }

    /// The policy store.
    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    /// The bucket store, shared with the sweeper.
    pub fn buckets(&self) -> &Arc<BucketStore> {
        &self.buckets
    }

    /// Decide whether an authentication attempt is admitted.
    ///
    /// A policy-list match decides on its own and touches no bucket.
    /// Otherwise the login, password and source-address buckets are all
    /// charged, and the attempt is admitted only if every one admits it.
    pub fn authorize(&self, login: &str, password: &str, source: &str) -> bool {
        let (address, source_key) = source_key(source);

        if let Some(ip) = address {
            match self.policy.classify(&ip) {
                Ok(verdict @ (PolicyVerdict::Allow | PolicyVerdict::Deny)) => {
                    tracing::debug!(
                        source = %ip,
                        allowed = verdict.is_allowed(),
                        "Authorization decided by policy list"
                    );
                    return verdict.is_allowed();
                }
                Ok(PolicyVerdict::Undecided) => {}
                Err(e) => {
                    tracing::error!(error = %e, source = %ip, "Policy check failed, rejecting");
                    return false;
                }
            }
        }

        let now = Instant::now();
        // Every bucket records the attempt, whatever the others decide.
        let login_ok = self.charge(Category::Login, login, now);
        let password_ok = self.charge(Category::Password, password, now);
        let source_ok = self.charge(Category::SourceAddress, &source_key, now);

        let admitted = login_ok && password_ok && source_ok;
        if admitted {
            tracing::trace!(login = %login, source = %source_key, "Attempt admitted");
        } else {
            tracing::info!(
                login = %login,
                source = %source_key,
                login_ok,
                password_ok,
                source_ok,
                "Attempt rejected by rate limit"
            );
        }

        admitted
    }

    fn charge(&self, category: Category, identifier: &str, now: Instant) -> bool {
        match self.buckets.attempt_at(category, identifier, now) {
            Ok(admitted) => admitted,
            Err(e) => {
                tracing::error!(error = %e, category = %category, "Rate limit check failed, rejecting");
                false
            }
        }
    }

    /// Clear the login and source-address buckets of an identity.
    ///
    /// The password bucket is left alone. Missing buckets are not an error.
    pub fn drop_identity(&self, login: &str, source: &str) -> Result<(), GuardError> {
        let (_, source_key) = source_key(source);

        let source_dropped = self
            .buckets
            .drop_bucket(Category::SourceAddress, &source_key)?;
        let login_dropped = self.buckets.drop_bucket(Category::Login, login)?;

        tracing::info!(
            login = %login,
            source = %source_key,
            login_dropped,
            source_dropped,
            "Dropped identity buckets"
        );

        Ok(())
    }

    /// Add a prefix to the allow list.
    pub fn add_allow_policy(&self, subnet: &str) -> Result<IpNetwork, GuardError> {
        self.policy.add_allow(subnet)
    }

    /// Remove a prefix from the allow list.
    pub fn remove_allow_policy(&self, subnet: &str) -> Result<bool, GuardError> {
        self.policy.remove_allow(subnet)
    }

    /// Add a prefix to the deny list.
    pub fn add_deny_policy(&self, subnet: &str) -> Result<IpNetwork, GuardError> {
        self.policy.add_deny(subnet)
    }

    /// Remove a prefix from the deny list.
    pub fn remove_deny_policy(&self, subnet: &str) -> Result<bool, GuardError> {
        self.policy.remove_deny(subnet)
    }
}

/// Parse the source address and derive its bucket key.
///
/// Addresses that parse are keyed by their canonical text, with IPv4-mapped
/// IPv6 addresses folded to IPv4; anything else is keyed verbatim and can
/// never match a policy list.
fn source_key(source: &str) -> (Option<IpAddr>, String) {
    match source.trim().parse::<IpAddr>() {
        Ok(ip) => {
            let ip = ip.to_canonical();
            (Some(ip), ip.to_string())
        }
        Err(_) => {
            tracing::debug!(source = %source, "Source address is not an IP address");
            (None, source.to_string())
        }
    }
}
