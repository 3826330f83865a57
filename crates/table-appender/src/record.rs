// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log records and the table addressing derived from them.
//!
//! A [`LogEvent`] is what a producer hands over: a raw timestamp, a severity
//! and a formatted message. Once the queue has assigned a sequenced timestamp
//! the event becomes a [`LogRecord`], which is immutable and carries the
//! partition and row keys used to address it in the remote table.
//!
//! # Addressing
//!
//! ```text
//! PartitionKey = "0" + ticks truncated to the second (19 digits)
//! RowKey       = sub-second ticks (7 digits) + "_" + random hex
//! ```
//!
//! Ticks are 100ns units since 0001-01-01T00:00:00Z, the clock used by WAD
//! tables, so external readers can sort on `EventTickCount` directly.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Ticks per second (one tick is 100ns).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const NANOS_PER_TICK: i64 = 100;

/// Severity as stored in the `Level` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LogLevel {
    Critical = 1,
    Error = 2,
    Warning = 3,
    Information = 4,
    Verbose = 5,
}

impl LogLevel {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Returns true if a record at `self` passes a `minimum` threshold.
    #[must_use]
    pub fn passes(self, minimum: LogLevel) -> bool {
        self.as_i32() <= minimum.as_i32()
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Information,
            _ => LogLevel::Verbose,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Critical => "CRITICAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Information => "INFO",
            LogLevel::Verbose => "VERBOSE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError(String);

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level '{}'", self.0)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "fatal" => Ok(LogLevel::Critical),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "info" | "information" => Ok(LogLevel::Information),
            "debug" | "trace" | "verbose" => Ok(LogLevel::Verbose),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Description of the host environment stamped onto every record.
///
/// All fields are empty when no environment context is available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentContext {
    pub deployment_id: String,
    pub role: String,
    pub role_instance: String,
}

/// A log line as handed over by a producer, before sequencing.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Error or exception detail, appended to the message after a newline.
    pub error: Option<String>,
    pub pid: u32,
    pub tid: u64,
}

impl LogEvent {
    /// Creates an event stamped with the current time, process and thread.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            error: None,
            pid: std::process::id(),
            tid: current_thread_id(),
        }
    }

    #[must_use]
    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// One persisted log line. Immutable once built by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    tick_count: i64,
    deployment_id: String,
    role: String,
    role_instance: String,
    level: i32,
    event_id: i32,
    pid: u32,
    tid: u64,
    message: String,
    partition_key: String,
    row_key: String,
}

impl LogRecord {
    /// Builds a record from an event. `timestamp` must already be sequenced.
    pub(crate) fn new(
        event: LogEvent,
        timestamp: DateTime<Utc>,
        environment: &EnvironmentContext,
    ) -> Self {
        let tick_count = to_ticks(&timestamp);
        let mut message = event.message.trim_end().to_string();
        if let Some(detail) = event.error {
            message.push('\n');
            message.push_str(detail.trim_end());
        }

        LogRecord {
            timestamp,
            tick_count,
            deployment_id: environment.deployment_id.clone(),
            role: environment.role.clone(),
            role_instance: environment.role_instance.clone(),
            level: event.level.as_i32(),
            event_id: 0,
            pid: event.pid,
            tid: event.tid,
            message,
            partition_key: partition_key(tick_count),
            row_key: row_key(tick_count, &Uuid::new_v4()),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn tick_count(&self) -> i64 {
        self.tick_count
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn role_instance(&self) -> &str {
        &self.role_instance
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn event_id(&self) -> i32 {
        self.event_id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn tid(&self) -> u64 {
        self.tid
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    /// The entity written to the table for this record.
    #[must_use]
    pub fn to_entity(&self) -> TableEntity<'_> {
        TableEntity {
            partition_key: &self.partition_key,
            row_key: &self.row_key,
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            event_tick_count: self.tick_count,
            deployment_id: &self.deployment_id,
            role: &self.role,
            role_instance: &self.role_instance,
            level: self.level,
            event_id: self.event_id,
            pid: self.pid,
            tid: self.tid,
            message: &self.message,
        }
    }
}

/// Wire layout of a persisted row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableEntity<'a> {
    pub partition_key: &'a str,
    pub row_key: &'a str,
    pub timestamp: String,
    pub event_tick_count: i64,
    pub deployment_id: &'a str,
    pub role: &'a str,
    pub role_instance: &'a str,
    pub level: i32,
    pub event_id: i32,
    pub pid: u32,
    pub tid: u64,
    pub message: &'a str,
}

/// Converts an instant to ticks, dropping anything finer than 100ns.
#[must_use]
pub fn to_ticks(timestamp: &DateTime<Utc>) -> i64 {
    let sub_second = i64::from(timestamp.timestamp_subsec_nanos()) / NANOS_PER_TICK;
    UNIX_EPOCH_TICKS
        .saturating_add(timestamp.timestamp().saturating_mul(TICKS_PER_SECOND))
        .saturating_add(sub_second)
}

#[must_use]
pub fn from_ticks(ticks: i64) -> DateTime<Utc> {
    let unix_ticks = ticks - UNIX_EPOCH_TICKS;
    let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
    // always < 1e9, fits in u32
    let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Partition key: one partition per calendar second.
#[must_use]
pub fn partition_key(ticks: i64) -> String {
    format!("0{:019}", ticks - ticks.rem_euclid(TICKS_PER_SECOND))
}

/// Row key: sortable sub-second ticks plus a random disambiguator.
#[must_use]
pub fn row_key(ticks: i64, disambiguator: &Uuid) -> String {
    format!(
        "{:07}_{}",
        ticks.rem_euclid(TICKS_PER_SECOND),
        disambiguator.simple()
    )
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Small, stable numeric id for the calling thread.
#[must_use]
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
