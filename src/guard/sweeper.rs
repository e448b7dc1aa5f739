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

//! Periodic eviction of idle buckets.
//!
//! The sweeper is a background task that calls
//! [`BucketStore::sweep_expired`] once per tick. It is stopped through a
//! [`CancellationToken`]; dropping the [`Sweeper`] handle cancels it too, so
//! the timer never outlives its owner.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::bucket::{BucketStore, DEFAULT_WINDOW};

/// Handle to the running sweeper task.
#[derive(Debug)]
pub struct Sweeper {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Sweeper {
    /// Spawn a sweeper ticking every `interval`.
    ///
    /// A zero interval falls back to the store's window, or to
    /// [`DEFAULT_WINDOW`] when that is zero as well.
    pub fn spawn(store: Arc<BucketStore>, interval: Duration) -> Self {
        Self::spawn_with_token(store, interval, CancellationToken::new())
    }

    /// Spawn a sweeper that also stops when `cancel` is cancelled.
    pub fn spawn_with_token(
        store: Arc<BucketStore>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let interval = if !interval.is_zero() {
            interval
        } else if !store.window().is_zero() {
            store.window()
        } else {
            tracing::warn!(
                fallback_secs = DEFAULT_WINDOW.as_secs(),
                "Sweeper interval and window are both zero, using default interval"
            );
            DEFAULT_WINDOW
        };

        tracing::info!(
            interval_secs = interval.as_secs_f64(),
            window_secs = store.window().as_secs_f64(),
            "Starting bucket sweeper"
        );

        let handle = tokio::spawn(Self::run(store, interval, cancel.clone()));

        Self {
            cancel,
            handle: Some(handle),
            interval,
        }
    }

    async fn run(store: Arc<BucketStore>, interval: Duration, cancel: CancellationToken) {
        // First sweep one interval after start, not immediately.
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = store.sweep_expired(Instant::now()) {
                        tracing::error!(error = %e, "Bucket sweep failed");
                    }
                }
            }
        }

        tracing::debug!("Bucket sweeper stopped");
    }

    /// The tick interval in use.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Token that stops the sweeper when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the sweeper and wait for the task to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweeper task panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| anyhow::anyhow!("Sweeper task panicked: {}", e))?;
        }

        Ok(())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
