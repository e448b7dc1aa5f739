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

//! Error types for the admission guard.

use thiserror::Error;

use super::category::Category;

/// Errors produced by the policy store, the bucket store and the admission engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// Malformed CIDR text supplied to an allow/deny mutation.
    #[error("invalid network prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    /// A category was used that has no configured capacity.
    #[error("no capacity configured for category '{0}'")]
    UnknownCategory(Category),

    /// The observation window is zero, which would admit every attempt.
    #[error("observation window must be greater than zero")]
    ZeroWindow,

    /// A lock guarding shared state was poisoned by a panicking holder.
    #[error("{0} state lock poisoned")]
    StatePoisoned(&'static str),
}

impl GuardError {
    pub(crate) fn invalid_prefix(prefix: &str, reason: impl ToString) -> Self {
        Self::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the error was caused by caller input rather than
    /// by the guard's own state.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidPrefix { .. })
    }
}
