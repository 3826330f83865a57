// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Table Appender
//!
//! A log sink that buffers records in memory and writes them to a remote
//! append-only table on a fixed schedule. Producers never wait on the network
//! and never see an error.
//!
//! ## Architecture
//!
//! - [`record`]: log records, severities and table addressing
//! - [`queue`]: the in-memory FIFO and its timestamp sequencer
//! - [`table`]: the remote store capability, over HTTP or in memory
//! - [`flusher`]: drains the queue into the table, retrying once on failure
//! - [`scheduler`]: runs the flusher on a fixed period
//! - [`appender`]: lifecycle entry point tying the pieces together
//! - [`layer`] and [`subscriber`]: `tracing` integration
//! - [`dispatch`]: fan-out over several sinks

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod appender;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod flusher;
pub mod layer;
pub mod layout;
pub mod queue;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod subscriber;
pub mod table;

pub use appender::TableAppender;
pub use config::Config;
pub use flusher::FlushReport;
pub use record::{LogEvent, LogLevel};
pub use scheduler::Activation;
