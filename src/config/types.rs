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

//! Configuration types for bouncer-server.
//!
//! This module defines the YAML configuration schema. Every field has a
//! default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::guard::{BucketConfig, Category, DEFAULT_CAPACITY, DEFAULT_WINDOW};

/// Root configuration loaded from YAML files.
///
/// # Example YAML
///
/// ```yaml
/// server:
///   bind_address: "127.0.0.1"
///   port: 50051
///
/// limits:
///   window: 15
///   capacity:
///     login: 5
///     password: 5
///     source_address: 5
///
/// policy:
///   allow:
///     - 10.0.0.0/8
///   deny:
///     - 203.0.113.0/24
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardFileConfig {
    /// Listener settings.
    pub server: ServerSettings,

    /// Rate-limit window and per-category capacities.
    pub limits: LimitsConfig,

    /// Initial allow and deny lists.
    pub policy: PolicyConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    ///
    /// Default: "127.0.0.1"
    pub bind_address: String,

    /// Port to listen on.
    ///
    /// Default: 50051
    pub port: u16,

    /// Maximum length of a single request line in bytes.
    ///
    /// Default: 4096
    pub max_request_bytes: usize,

    /// Maximum number of concurrently served connections.
    ///
    /// Default: 256
    pub max_connections: usize,
}

impl ServerSettings {
    /// The `host:port` socket address to bind.
    pub fn listen_address(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.port)
        } else {
            format!("{}:{}", self.bind_address, self.port)
        }
    }
}

/// Rate-limit settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Observation window in seconds, shared by all categories.
    ///
    /// Default: 15
    pub window: u64,

    /// Sweeper tick interval in seconds. 0 means the same as `window`.
    ///
    /// Default: 0
    pub sweep_interval: u64,

    /// Maximum attempts per window for each category.
    ///
    /// Default: 5 for login, password and source_address
    pub capacity: BTreeMap<Category, usize>,
}

impl LimitsConfig {
    /// The observation window.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window)
    }

    /// The sweeper tick interval.
    pub fn sweep_interval(&self) -> Duration {
        if self.sweep_interval == 0 {
            self.window()
        } else {
            Duration::from_secs(self.sweep_interval)
        }
    }

    /// Bucket store settings derived from these limits.
    pub fn bucket_config(&self) -> BucketConfig {
        self.capacity
            .iter()
            .fold(BucketConfig::new(self.window()), |config, (category, capacity)| {
                config.with_capacity(*category, *capacity)
            })
    }
}

/// Initial policy lists in CIDR notation.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Prefixes always admitted, bypassing rate limits.
    pub allow: Vec<String>,

    /// Prefixes always rejected.
    pub deny: Vec<String>,
}

fn default_capacities() -> BTreeMap<Category, usize> {
    Category::ALL
        .into_iter()
        .map(|category| (category, DEFAULT_CAPACITY))
        .collect()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 50051,
            max_request_bytes: 4096,
            max_connections: 256,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW.as_secs(),
            sweep_interval: 0,
            capacity: default_capacities(),
        }
    }
}
