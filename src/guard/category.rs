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

//! Rate-limit categories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An independent rate-limiting dimension evaluated for every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// The login (user name) presented with the attempt.
    Login,
    /// The password value presented with the attempt.
    Password,
    /// The source IP address of the attempt.
    #[serde(alias = "ip")]
    SourceAddress,
}

impl Category {
    /// Every category consulted by an authorization decision.
    pub const ALL: [Category; 3] = [Category::Login, Category::Password, Category::SourceAddress];

    /// Name used in configuration files and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Login => "login",
            Category::Password => "password",
            Category::SourceAddress => "source_address",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
