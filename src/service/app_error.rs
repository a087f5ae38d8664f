// Copyright 2025 jonefeewang@gmail.com
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

pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced to callers of the registration, polling and bootstrap APIs.
///
/// Per-connection read outcomes (would-block, peer close, socket failure) are
/// not represented here; they are turned into staged data by the connection
/// table and never leave a poll cycle as errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// connection table errors
    #[error("out of connection tokens (capacity {capacity})")]
    OutOfTokens { capacity: u32 },

    #[error("connection registration aborted: {0}")]
    RegistrationAborted(String),

    #[error("poll failure: {0}")]
    PollFailure(String),

    #[error("accept error: {0}")]
    Accept(String),
}
