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

//! Wire protocol for the guard service.
//!
//! Each request and each response is one JSON object on its own line.
//!
//! ```text
//! -> {"op":"authorize","login":"alice","password":"secret","ip":"192.0.2.1"}
//! <- {"status":"verdict","ok":true}
//! -> {"op":"add_deny","subnet":"203.0.113.0/24"}
//! <- {"status":"ack"}
//! -> {"op":"add_allow","subnet":"bogus"}
//! <- {"status":"error","code":"invalid_prefix","message":"invalid network prefix 'bogus': ..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::guard::{AdmissionEngine, GuardError};

/// A request sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Decide whether an authentication attempt may proceed.
    Authorize {
        login: String,
        password: String,
        ip: String,
    },
    /// Reset the login and source-address buckets of an identity.
    DropIdentity { login: String, ip: String },
    /// Add a prefix to the allow list.
    AddAllow { subnet: String },
    /// Remove a prefix from the allow list.
    RemoveAllow { subnet: String },
    /// Add a prefix to the deny list.
    AddDeny { subnet: String },
    /// Remove a prefix from the deny list.
    RemoveDeny { subnet: String },
}

/// Error classes reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed CIDR text.
    InvalidPrefix,
    /// The request line could not be decoded.
    BadRequest,
    /// The guard failed internally.
    Internal,
}

/// A response returned for each request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Outcome of an `authorize` request.
    Verdict { ok: bool },
    /// An administrative request succeeded.
    Ack,
    /// The request failed.
    Error { code: ErrorCode, message: String },
}

impl Response {
    /// Build an error response.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }
}

impl From<GuardError> for Response {
    fn from(err: GuardError) -> Self {
        let code = if err.is_caller_error() {
            ErrorCode::InvalidPrefix
        } else {
            ErrorCode::Internal
        };
        Response::error(code, err.to_string())
    }
}

fn ack<T>(result: Result<T, GuardError>) -> Response {
    match result {
        Ok(_) => Response::Ack,
        Err(e) => e.into(),
    }
}

impl Request {
    /// Short operation name for logging.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Authorize { .. } => "authorize",
            Request::DropIdentity { .. } => "drop_identity",
            Request::AddAllow { .. } => "add_allow",
            Request::RemoveAllow { .. } => "remove_allow",
            Request::AddDeny { .. } => "add_deny",
            Request::RemoveDeny { .. } => "remove_deny",
        }
    }

    /// Execute the request against the engine.
    pub fn execute(&self, engine: &AdmissionEngine) -> Response {
        match self {
            Request::Authorize {
                login,
                password,
                ip,
            } => Response::Verdict {
                ok: engine.authorize(login, password, ip),
            },
            Request::DropIdentity { login, ip } => ack(engine.drop_identity(login, ip)),
            Request::AddAllow { subnet } => ack(engine.add_allow_policy(subnet)),
            Request::RemoveAllow { subnet } => ack(engine.remove_allow_policy(subnet)),
            Request::AddDeny { subnet } => ack(engine.add_deny_policy(subnet)),
            Request::RemoveDeny { subnet } => ack(engine.remove_deny_policy(subnet)),
        }
    }
}

/// Decode one request line and execute it.
pub fn handle_line(engine: &AdmissionEngine, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            tracing::trace!(op = request.op(), "Handling request");
            request.execute(engine)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Malformed request");
            Response::error(ErrorCode::BadRequest, format!("malformed request: {e}"))
        }
    }
}
