// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::TableError;
use crate::record::LogRecord;
use crate::table::{TableConnection, TableStore};

/// Where an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Open,
    Stage,
    Commit,
}

#[derive(Debug, Default)]
struct MemoryState {
    table_created: bool,
    rows: Vec<LogRecord>,
    ensure_calls: usize,
    open_calls: usize,
    stage_calls: usize,
    commit_calls: usize,
    failures: VecDeque<FailurePoint>,
    commit_delay: Option<Duration>,
}

/// In-process table. Cloning shares the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps inside every commit, to hold a flush open in tests.
    #[must_use]
    pub fn with_commit_delay(self, delay: Duration) -> Self {
        self.lock().commit_delay = Some(delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next operation of the given kind fail once. Calls stack.
    pub fn fail_next(&self, point: FailurePoint) {
        self.lock().failures.push_back(point);
    }

    fn take_failure(&self, point: FailurePoint) -> Result<(), TableError> {
        let mut state = self.lock();
        match state.failures.iter().position(|p| *p == point) {
            Some(index) => {
                state.failures.remove(index);
                Err(TableError::Unavailable(format!("injected {point:?} failure")))
            }
            None => Ok(()),
        }
    }

    /// Every committed row, in commit order.
    #[must_use]
    pub fn rows(&self) -> Vec<LogRecord> {
        self.lock().rows.clone()
    }

    #[must_use]
    pub fn table_created(&self) -> bool {
        self.lock().table_created
    }

    #[must_use]
    pub fn ensure_calls(&self) -> usize {
        self.lock().ensure_calls
    }

    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.lock().open_calls
    }

    #[must_use]
    pub fn stage_calls(&self) -> usize {
        self.lock().stage_calls
    }

    #[must_use]
    pub fn commit_calls(&self) -> usize {
        self.lock().commit_calls
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn ensure_table_exists(&self) -> Result<(), TableError> {
        let mut state = self.lock();
        state.ensure_calls += 1;
        state.table_created = true;
        Ok(())
    }

    async fn open_connection(&self) -> Result<Box<dyn TableConnection>, TableError> {
        self.lock().open_calls += 1;
        self.take_failure(FailurePoint::Open)?;
        self.ensure_table_exists().await?;
        Ok(Box::new(MemoryTableConnection {
            store: self.clone(),
            staged: Vec::new(),
        }))
    }
}

#[derive(Debug)]
struct MemoryTableConnection {
    store: MemoryTableStore,
    staged: Vec<LogRecord>,
}

#[async_trait]
impl TableConnection for MemoryTableConnection {
    fn stage_row(&mut self, record: &LogRecord) -> Result<(), TableError> {
        self.store.lock().stage_calls += 1;
        self.store.take_failure(FailurePoint::Stage)?;
        self.staged.push(record.clone());
        Ok(())
    }

    async fn commit_staged(&mut self) -> Result<usize, TableError> {
        let delay = {
            let mut state = self.store.lock();
            state.commit_calls += 1;
            state.commit_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.store.take_failure(FailurePoint::Commit)?;

        let count = self.staged.len();
        self.store.lock().rows.append(&mut self.staged);
        Ok(count)
    }
}
