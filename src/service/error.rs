// Copyright 2025 wirelink contributors
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

use std::time::Duration;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// exchange errors, delivered through the error callback
    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("send failed: {0}")]
    SendFailure(String),

    #[error("receive timed out after {0:?}")]
    ReceiveTimeout(Duration),

    #[error("receive failed: {0}")]
    ReceiveFailure(String),

    #[error("message size {size} exceeds limit of {limit} bytes")]
    MessageSizeTooLarge { size: usize, limit: usize },

    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("accept error: {0}")]
    Accept(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl TransportError {
    /// True when the error means a deadline expired rather than the socket
    /// failing outright.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransportError::SendTimeout(_) | TransportError::ReceiveTimeout(_)
        )
    }
}
