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

//! Brute-force protection guard for authentication endpoints.
//!
//! An authentication front end asks the guard whether an attempt
//! (login, password, source address) may proceed. The guard answers from
//! static CIDR allow/deny lists when they match, and otherwise from
//! per-login, per-password and per-address sliding-window rate limits.
//!
//! - [`guard`]: the admission-control core
//! - [`config`]: YAML configuration with environment overrides
//! - [`server`]: newline-delimited JSON over TCP
//! - [`utils`]: logging setup

pub mod config;
pub mod guard;
pub mod server;
pub mod utils;

pub use guard::{AdmissionEngine, GuardError};
pub use server::BouncerServer;
