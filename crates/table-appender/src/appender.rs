// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{Config, Intervals};
use crate::dispatch::LogSink;
use crate::flusher::{FlushReport, Flusher};
use crate::layout::Layout;
use crate::queue::RecordQueue;
use crate::record::LogEvent;
use crate::scheduler::{Activation, Scheduler};
use crate::table::http::HttpTableStore;
use crate::table::TableStore;

/// Entry point for hosts: owns the queue, the flusher and the scheduler.
pub struct TableAppender {
    config: Arc<Config>,
    layout: Layout,
    queue: Arc<RecordQueue>,
    flusher: Arc<Flusher>,
    scheduler: Scheduler,
}

impl TableAppender {
    /// Builds an appender writing through `store`. Intervals below one minute
    /// are clamped here and reported by [`TableAppender::activate`].
    pub fn new(config: Config, store: Arc<dyn TableStore>) -> Self {
        let intervals = Intervals::validate(&config);
        let config = Arc::new(config);
        let queue = Arc::new(RecordQueue::new());
        let flusher = Arc::new(Flusher::new(
            Arc::clone(&config),
            Arc::clone(&queue),
            store,
            intervals.marker,
        ));
        let scheduler = Scheduler::new(Arc::clone(&flusher), intervals.flush);

        TableAppender {
            layout: Layout::parse(&config.layout),
            config,
            queue,
            flusher,
            scheduler,
        }
    }

    /// Builds an appender writing to the HTTP table endpoint in `config`.
    pub fn with_http_store(config: Config) -> Self {
        let store = Arc::new(HttpTableStore::new(&config));
        Self::new(config, store)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Producer entry point. Never blocks on I/O and never fails.
    pub fn append(&self, event: LogEvent) {
        if !event.level.passes(self.config.min_level) {
            return;
        }
        self.queue.enqueue(event, &self.config.environment);
    }

    /// Starts the background flush loop and reports intervals clamped at
    /// construction. Must be called inside a tokio runtime.
    pub fn activate(&self) -> Activation {
        let activation = self.scheduler.start();
        if activation == Activation::Started {
            Intervals::warn_clamped(&self.config);
        }
        activation
    }

    /// Manual flush, safe to call from a shutdown path.
    pub async fn flush(&self) -> FlushReport {
        self.flusher.flush_with_retry().await
    }

    /// Stops the scheduler, then flushes whatever is left.
    pub async fn shutdown(&self) -> FlushReport {
        self.scheduler.shutdown().await;
        let report = self.flush().await;
        debug!("TABLE | Appender shut down, {} records left", self.pending());
        report
    }

    /// Forces the next flush to rebuild its connection.
    pub fn request_refresh(&self) {
        self.flusher.request_refresh();
    }

    /// Records waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn flush_interval(&self) -> Duration {
        self.scheduler.period()
    }

    pub fn is_active(&self) -> bool {
        self.scheduler.is_running()
    }
}

#[async_trait]
impl LogSink for TableAppender {
    fn accept(&self, event: LogEvent) {
        self.append(event);
    }

    async fn flush(&self) -> FlushReport {
        TableAppender::flush(self).await
    }
}
