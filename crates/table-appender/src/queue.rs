// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pending records between `append` and the next flush.
//!
//! Producers append from any thread; the flusher is the only reader. The
//! queue and the timestamp sequencer share one mutex so two producers can
//! never read the same "last assigned" timestamp.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::record::{from_ticks, to_ticks, EnvironmentContext, LogEvent, LogRecord};

/// Hands out strictly increasing timestamps at tick resolution.
#[derive(Debug, Default)]
pub struct TimestampSequencer {
    last_ticks: Option<i64>,
}

impl TimestampSequencer {
    /// Returns `max(candidate, last + 1 tick)` and remembers it.
    pub fn assign(&mut self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let ticks = to_ticks(&candidate);
        let assigned = match self.last_ticks {
            Some(last) if ticks <= last => last + 1,
            _ => ticks,
        };
        self.last_ticks = Some(assigned);
        from_ticks(assigned)
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.last_ticks.map(from_ticks)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    records: VecDeque<LogRecord>,
    sequencer: TimestampSequencer,
}

/// Unbounded FIFO of records awaiting a flush.
#[derive(Debug, Default)]
pub struct RecordQueue {
    state: Mutex<QueueState>,
}

impl RecordQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Producers must never panic, so a poisoned lock is simply reclaimed.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sequences the event's timestamp, builds the record and appends it.
    pub fn enqueue(&self, event: LogEvent, environment: &EnvironmentContext) -> LogRecord {
        let mut state = self.lock();
        let timestamp = state.sequencer.assign(event.timestamp);
        let record = LogRecord::new(event, timestamp, environment);
        state.records.push_back(record.clone());
        record
    }

    /// Removes and returns the oldest record.
    pub fn drain_one(&self) -> Option<LogRecord> {
        self.lock().records.pop_front()
    }

    /// The most recently appended record still waiting in the queue.
    pub fn peek_last(&self) -> Option<LogRecord> {
        self.lock().records.back().cloned()
    }

    /// Puts records from a failed flush back at the head, in their original order.
    pub fn requeue_front(&self, records: Vec<LogRecord>) {
        if records.is_empty() {
            return;
        }
        let mut state = self.lock();
        for record in records.into_iter().rev() {
            state.records.push_front(record);
        }
    }

    /// Last timestamp handed out, even if that record was already flushed.
    pub fn last_assigned(&self) -> Option<DateTime<Utc>> {
        self.lock().sequencer.last()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}
