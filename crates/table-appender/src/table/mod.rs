// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The remote table the flusher writes into.
//!
//! A [`TableStore`] knows where the table lives and which credentials to
//! use. Each flush works against a [`TableConnection`] opened from it: rows
//! are staged locally one by one and then committed in a single remote
//! operation. Connections apply their own bounded retry policy; the flusher
//! adds one more layer on top by throwing a failed connection away and
//! opening a fresh one.
//!
//! - [`http`]: HTTP table endpoint (reqwest)
//! - [`memory`]: in-process table for tests and dry runs

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::errors::TableError;
use crate::record::LogRecord;

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Creates the target table if it is missing.
    async fn ensure_table_exists(&self) -> Result<(), TableError>;

    /// Opens a fresh connection. Implementations ensure the table exists first.
    async fn open_connection(&self) -> Result<Box<dyn TableConnection>, TableError>;
}

#[async_trait]
pub trait TableConnection: Send {
    /// Buffers one row on the connection. No remote I/O.
    fn stage_row(&mut self, record: &LogRecord) -> Result<(), TableError>;

    /// Writes every staged row in one operation and returns how many were written.
    async fn commit_staged(&mut self) -> Result<usize, TableError>;
}
