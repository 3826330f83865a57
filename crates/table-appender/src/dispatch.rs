// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;

use crate::flusher::FlushReport;
use crate::record::LogEvent;

/// Destination for formatted log events.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Takes ownership of one event. Must return quickly and never fail.
    fn accept(&self, event: LogEvent);

    async fn flush(&self) -> FlushReport;
}

/// Fans every event out to a fixed set of sinks.
#[derive(Clone, Default)]
pub struct Dispatcher {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn dispatch(&self, event: LogEvent) {
        let Some((last, rest)) = self.sinks.split_last() else {
            return;
        };
        for sink in rest {
            sink.accept(event.clone());
        }
        last.accept(event);
    }

    /// Flushes every sink in registration order.
    pub async fn flush_all(&self) -> Vec<FlushReport> {
        let mut reports = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            reports.push(sink.flush().await);
        }
        reports
    }
}
