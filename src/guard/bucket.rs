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

//! Sliding-window attempt buckets.
//!
//! Every `(category, identifier)` pair owns a bucket holding the timestamps
//! of its most recent attempts. An attempt is admitted when, after dropping
//! timestamps older than the window, fewer than `capacity` remain. Rejected
//! attempts are recorded as well, so hammering a full bucket keeps it full.
//!
//! Only the newest `capacity` timestamps are kept. Because stale entries always
//! form a prefix of the queue, the newest `capacity` entries are enough to tell
//! whether more than `capacity` attempts happened inside the window.
//!
//! Buckets are removed explicitly with [`BucketStore::drop_bucket`] or by
//! [`BucketStore::sweep_expired`] once they have seen no attempt for a whole
//! window.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::category::Category;
use super::error::GuardError;

/// Default observation window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15);

/// Default number of attempts admitted per window.
pub const DEFAULT_CAPACITY: usize = 5;

/// Capacities and window for a [`BucketStore`].
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Observation window shared by all categories.
    pub window: Duration,
    /// Maximum admitted attempts per window, per category.
    pub capacities: HashMap<Category, usize>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self::uniform(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

impl BucketConfig {
    /// Create a configuration with no categories.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            capacities: HashMap::new(),
        }
    }

    /// Create a configuration giving every category the same capacity.
    pub fn uniform(capacity: usize, window: Duration) -> Self {
        Category::ALL
            .into_iter()
            .fold(Self::new(window), |config, category| {
                config.with_capacity(category, capacity)
            })
    }

    /// Set the capacity of one category.
    pub fn with_capacity(mut self, category: Category, capacity: usize) -> Self {
        self.capacities.insert(category, capacity);
        self
    }
}

#[derive(Debug)]
struct Bucket {
    /// Attempt timestamps, oldest first.
    entries: VecDeque<Instant>,
    /// Most recent attempt, used for sweeping.
    last_seen: Instant,
}

impl Bucket {
    fn new(now: Instant, capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            last_seen: now,
        }
    }

    fn record(&mut self, now: Instant, capacity: usize, window: Duration) -> bool {
        // Callers read the clock before taking the lock; keep entries ordered.
        let now = now.max(self.last_seen);
        self.last_seen = now;

        while let Some(&oldest) = self.entries.front() {
            if now.duration_since(oldest) < window {
                break;
            }
            self.entries.pop_front();
        }

        if capacity == 0 {
            return false;
        }

        if self.entries.len() < capacity {
            self.entries.push_back(now);
            true
        } else {
            self.entries.pop_front();
            self.entries.push_back(now);
            false
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) >= window
    }
}

/// Concurrent store of attempt buckets keyed by category and identifier.
///
/// A single mutex guards the whole map. The critical section of an attempt
/// is a trim and an append on one bucket; parsing and clock reads happen
/// before the lock is taken.
#[derive(Debug)]
pub struct BucketStore {
    buckets: Mutex<HashMap<Category, HashMap<String, Bucket>>>,
    capacities: HashMap<Category, usize>,
    window: Duration,
}

impl Default for BucketStore {
    fn default() -> Self {
        Self::new(BucketConfig::default())
    }
}

impl BucketStore {
    /// Create an empty store.
    pub fn new(config: BucketConfig) -> Self {
        let buckets = config
            .capacities
            .keys()
            .map(|category| (*category, HashMap::new()))
            .collect();

        Self {
            buckets: Mutex::new(buckets),
            capacities: config.capacities,
            window: config.window,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Category, HashMap<String, Bucket>>>, GuardError> {
        self.buckets
            .lock()
            .map_err(|_| GuardError::StatePoisoned("bucket"))
    }

    /// The observation window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Capacity configured for a category.
    pub fn capacity(&self, category: Category) -> Result<usize, GuardError> {
        self.capacities
            .get(&category)
            .copied()
            .ok_or(GuardError::UnknownCategory(category))
    }

    /// Record an attempt at the current time.
    ///
    /// Returns `Ok(true)` if the attempt is admitted.
    pub fn attempt(&self, category: Category, identifier: &str) -> Result<bool, GuardError> {
        self.attempt_at(category, identifier, Instant::now())
    }

    /// Record an attempt at `now`.
    ///
    /// The attempt is recorded whether or not it is admitted.
    pub fn attempt_at(
        &self,
        category: Category,
        identifier: &str,
        now: Instant,
    ) -> Result<bool, GuardError> {
        if self.window.is_zero() {
            return Err(GuardError::ZeroWindow);
        }
        let capacity = self.capacity(category)?;

        let mut buckets = self.lock()?;
        let by_id = buckets.entry(category).or_default();
        let admitted = match by_id.get_mut(identifier) {
            Some(bucket) => bucket.record(now, capacity, self.window),
            None => {
                let mut bucket = Bucket::new(now, capacity);
                let admitted = bucket.record(now, capacity, self.window);
                by_id.insert(identifier.to_owned(), bucket);
                admitted
            }
        };
        drop(buckets);

        if !admitted {
            tracing::debug!(category = %category, capacity, "Attempt rejected by rate limit");
        }

        Ok(admitted)
    }

    /// Remove a bucket. Returns whether one was present.
    pub fn drop_bucket(&self, category: Category, identifier: &str) -> Result<bool, GuardError> {
        let mut buckets = self.lock()?;
        let removed = buckets
            .get_mut(&category)
            .and_then(|by_id| by_id.remove(identifier))
            .is_some();
        Ok(removed)
    }

    /// Remove every bucket that has seen no attempt during the window ending at `now`.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep_expired(&self, now: Instant) -> Result<usize, GuardError> {
        let window = self.window;
        let mut buckets = self.lock()?;

        let mut removed = 0;
        for by_id in buckets.values_mut() {
            let before = by_id.len();
            by_id.retain(|_, bucket| !bucket.is_expired(now, window));
            removed += before - by_id.len();
        }
        let remaining: usize = buckets.values().map(HashMap::len).sum();
        drop(buckets);

        if removed > 0 {
            tracing::debug!(removed, remaining, "Swept expired buckets");
        }

        Ok(removed)
    }

    /// Total number of live buckets.
    pub fn bucket_count(&self) -> Result<usize, GuardError> {
        Ok(self.lock()?.values().map(HashMap::len).sum())
    }

    /// Whether a bucket exists for the key.
    pub fn contains(&self, category: Category, identifier: &str) -> Result<bool, GuardError> {
        Ok(self.entry_count(category, identifier)?.is_some())
    }

    /// Number of timestamps held for the key, if a bucket exists.
    ///
    /// Stale entries are only trimmed by the next attempt, so this may include them.
    pub fn entry_count(
        &self,
        category: Category,
        identifier: &str,
    ) -> Result<Option<usize>, GuardError> {
        let buckets = self.lock()?;
        Ok(buckets
            .get(&category)
            .and_then(|by_id| by_id.get(identifier))
            .map(|bucket| bucket.entries.len()))
    }
}
