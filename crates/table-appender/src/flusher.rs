// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Drains the record queue into the remote table.
//!
//! # Flow
//!
//! ```text
//!   try_lock(flush guard) ──busy──> Skipped
//!          │
//!          v
//!   liveness marker due? ──yes──> enqueue marker
//!          │
//!          v
//!   connection missing / refresh requested? ──yes──> open_connection
//!          │
//!          v
//!   drain_one + stage_row   (until the queue is empty)
//!          │
//!          v
//!   commit_staged           (one remote operation)
//! ```
//!
//! Any failure drops the connection and puts the drained records back at the
//! head of the queue. [`Flusher::flush_with_retry`] runs the whole sequence a
//! second time on a fresh connection before giving up until the next tick.
//!
//! A commit that succeeded remotely but was reported as failed will be sent
//! again: delivery is at-least-once and the table does not deduplicate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::Config;
use crate::errors::FlushError;
use crate::queue::RecordQueue;
use crate::record::{LogEvent, LogLevel, LogRecord};
use crate::table::{TableConnection, TableStore};

/// Attempts made by [`Flusher::flush_with_retry`], each on a fresh connection
/// after a failure.
pub const FLUSH_ATTEMPTS: usize = 2;

pub const LIVENESS_MARKER_MESSAGE: &str = "table appender liveness marker";

/// Result of a single [`Flusher::flush`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Number of records committed.
    Flushed(usize),
    /// Another flush held the guard.
    Skipped,
}

/// Result of [`Flusher::flush_with_retry`]. Never an error for the caller.
#[derive(Debug)]
pub enum FlushReport {
    Flushed(usize),
    Skipped,
    /// Both attempts failed; the records are still queued.
    Failed(Vec<FlushError>),
}

impl FlushReport {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, FlushReport::Failed(_))
    }
}

struct FlushState {
    connection: Option<Box<dyn TableConnection>>,
    next_marker: Instant,
}

pub struct Flusher {
    config: Arc<Config>,
    queue: Arc<RecordQueue>,
    store: Arc<dyn TableStore>,
    marker_interval: Duration,
    refresh: AtomicBool,
    // The mutex is the flush guard: whoever holds it owns the connection.
    state: Mutex<FlushState>,
}

impl Flusher {
    pub fn new(
        config: Arc<Config>,
        queue: Arc<RecordQueue>,
        store: Arc<dyn TableStore>,
        marker_interval: Duration,
    ) -> Self {
        Flusher {
            config,
            queue,
            store,
            marker_interval,
            refresh: AtomicBool::new(false),
            state: Mutex::new(FlushState {
                connection: None,
                next_marker: Instant::now() + marker_interval,
            }),
        }
    }

    /// Forces the next flush to open a new connection.
    pub fn request_refresh(&self) {
        self.refresh.store(true, Ordering::Release);
    }

    /// Drains the queue into the table once.
    ///
    /// Returns [`FlushOutcome::Skipped`] without waiting if another flush is
    /// running. On error the connection is dropped and nothing drained in this
    /// call is lost from the queue.
    pub async fn flush(&self) -> Result<FlushOutcome, FlushError> {
        let Ok(mut state) = self.state.try_lock() else {
            debug!("TABLE | Flush already in progress, skipping");
            return Ok(FlushOutcome::Skipped);
        };

        if Instant::now() >= state.next_marker {
            self.enqueue_marker();
            state.next_marker = Instant::now() + self.marker_interval;
        }

        let result = self.flush_locked(&mut state).await;
        if result.is_err() {
            state.connection = None;
        }
        result
    }

    async fn flush_locked(&self, state: &mut FlushState) -> Result<FlushOutcome, FlushError> {
        let refresh = self.refresh.swap(false, Ordering::AcqRel);
        let connection = match state.connection.take() {
            Some(connection) if !refresh => connection,
            _ => {
                debug!("TABLE | Opening table connection");
                self.store
                    .open_connection()
                    .await
                    .map_err(FlushError::Connect)?
            }
        };
        let connection = state.connection.insert(connection);

        let mut drained: Vec<LogRecord> = Vec::new();
        while let Some(record) = self.queue.drain_one() {
            let staged = connection.stage_row(&record);
            drained.push(record);
            if let Err(e) = staged {
                self.queue.requeue_front(drained);
                return Err(FlushError::Stage(e));
            }
        }

        if drained.is_empty() {
            debug!("TABLE | Nothing to flush");
            return Ok(FlushOutcome::Flushed(0));
        }

        debug!("TABLE | Committing {} records", drained.len());
        match connection.commit_staged().await {
            Ok(_) => {
                debug!(
                    "TABLE | Flushed {} records, {} pending",
                    drained.len(),
                    self.queue.len()
                );
                Ok(FlushOutcome::Flushed(drained.len()))
            }
            Err(e) => {
                self.queue.requeue_front(drained);
                Err(FlushError::Commit(e))
            }
        }
    }

    /// [`Flusher::flush`] with one retry on a rebuilt connection.
    ///
    /// Failures are logged and reported, never raised.
    pub async fn flush_with_retry(&self) -> FlushReport {
        let mut errors = Vec::with_capacity(FLUSH_ATTEMPTS);
        for attempt in 1..=FLUSH_ATTEMPTS {
            match self.flush().await {
                Ok(FlushOutcome::Flushed(count)) => return FlushReport::Flushed(count),
                Ok(FlushOutcome::Skipped) => return FlushReport::Skipped,
                Err(e) if attempt < FLUSH_ATTEMPTS => {
                    error!("TABLE | Flush attempt {attempt}/{FLUSH_ATTEMPTS} failed: {e}");
                    errors.push(e);
                }
                Err(e) => {
                    error!(
                        "TABLE | Flush attempt {attempt}/{FLUSH_ATTEMPTS} failed, {} records kept for the next flush: {e}",
                        self.queue.len()
                    );
                    errors.push(e);
                }
            }
        }
        FlushReport::Failed(errors)
    }

    fn enqueue_marker(&self) {
        debug!("TABLE | Emitting liveness marker");
        let event = LogEvent::new(
            LogLevel::Information,
            format!(
                "{LIVENESS_MARKER_MESSAGE} (table {}, {} records pending)",
                self.config.table_name,
                self.queue.len()
            ),
        );
        self.queue.enqueue(event, &self.config.environment);
    }
}
