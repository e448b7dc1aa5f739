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

//! Brute-force protection for authentication endpoints.
//!
//! This module provides the admission-control core:
//!
//! - [`PolicyStore`]: CIDR allow/deny lists with mutually exclusive entries
//! - [`BucketStore`]: per-category, per-identifier sliding-window rate limiting
//! - [`Sweeper`]: background task reclaiming buckets idle for a full window
//! - [`AdmissionEngine`]: the authorization decision and administrative operations
//!
//! # Example
//!
//! ```
//! use bouncer::guard::{AdmissionEngine, BucketConfig};
//! use std::time::Duration;
//!
//! let engine = AdmissionEngine::with_config(
//!     BucketConfig::uniform(2, Duration::from_secs(15)),
//!     &[],
//!     &["203.0.113.0/24".to_string()],
//! )
//! .unwrap();
//!
//! // Denied by policy, no rate limiting involved
//! assert!(!engine.authorize("alice", "secret", "203.0.113.7"));
//!
//! // Rate limited by login
//! assert!(engine.authorize("alice", "pw1", "192.0.2.1"));
//! assert!(engine.authorize("alice", "pw2", "192.0.2.2"));
//! assert!(!engine.authorize("alice", "pw3", "192.0.2.3"));
//!
//! // An administrator clears the identity
//! engine.drop_identity("alice", "192.0.2.3").unwrap();
//! assert!(engine.authorize("alice", "pw4", "192.0.2.3"));
//! ```

mod bucket;
mod category;
mod engine;
mod error;
mod policy;
mod sweeper;

pub use bucket::{BucketConfig, BucketStore, DEFAULT_CAPACITY, DEFAULT_WINDOW};
pub use category::Category;
pub use engine::AdmissionEngine;
pub use error::GuardError;
pub use policy::{parse_prefix, PolicyList, PolicyStore, PolicyVerdict};
pub use sweeper::Sweeper;
