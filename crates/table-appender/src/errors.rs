// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure reported by a table store or one of its connections.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("table store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to serialize entity: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("table store unavailable: {0}")]
    Unavailable(String),
}

impl TableError {
    /// Client errors other than timeouts and throttling will not go away on retry.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            TableError::Status { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            TableError::Serialize(_) => true,
            TableError::Transport(_) | TableError::Unavailable(_) => false,
        }
    }
}

/// One failed flush attempt.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("failed to open table connection: {0}")]
    Connect(#[source] TableError),
    #[error("failed to stage record: {0}")]
    Stage(#[source] TableError),
    #[error("failed to commit staged records: {0}")]
    Commit(#[source] TableError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingVariable(&'static str),
    #[error("{name} has an invalid value: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
    #[error("could not parse log filter: {0}")]
    Filter(String),
}
