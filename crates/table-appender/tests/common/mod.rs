// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use table_appender::retry::RetryStrategy;
use table_appender::table::memory::MemoryTableStore;
use table_appender::{Config, TableAppender};

/// Appender backed by an in-memory table, plus a handle on that table.
pub fn memory_appender(config: Config) -> (Arc<TableAppender>, MemoryTableStore) {
    let store = MemoryTableStore::new();
    let appender = Arc::new(TableAppender::new(config, Arc::new(store.clone())));
    (appender, store)
}

/// Config pointing at a mock server, retrying immediately so tests stay fast.
pub fn http_config(url: String) -> Config {
    Config {
        storage_url: url,
        storage_key: Some("mock-table-key".to_string()),
        request_timeout_secs: 5,
        retry_strategy: RetryStrategy::Immediate(3),
        ..Default::default()
    }
}
