// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `tracing` integration: turns events into [`LogEvent`]s for an appender.

use std::error::Error;
use std::fmt::{self, Write};
use std::sync::Arc;

use tracing_core::field::{Field, Visit};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::appender::TableAppender;
use crate::layout::LayoutContext;
use crate::record::{current_thread_id, LogEvent, LogLevel};

/// Targets never forwarded to the table, so that the appender's own
/// diagnostics and the HTTP stack under it cannot feed back into the queue.
const INTERNAL_TARGETS: &[&str] = &["table_appender", "hyper", "h2", "reqwest", "rustls", "tokio"];

const ERROR_FIELDS: &[&str] = &["error", "exception"];

fn is_internal(target: &str) -> bool {
    INTERNAL_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: String,
    error: Option<String>,
    field_names: Vec<&'static str>,
    unformattable: bool,
}

impl EventVisitor {
    fn push_error(&mut self, detail: &str) {
        match &mut self.error {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(detail);
            }
            None => self.error = Some(detail.to_string()),
        }
    }

    /// Message followed by the remaining fields as ` key=value` pairs.
    fn into_parts(self) -> (String, Option<String>) {
        let message = if self.unformattable {
            format!("unformattable event, fields: {}", self.field_names.join(", "))
        } else {
            let mut message = self.message;
            message.push_str(&self.fields);
            message.trim_start().to_string()
        };
        (message, self.error)
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.field_names.push(field.name());
        match field.name() {
            "message" => self.message.push_str(value),
            name if ERROR_FIELDS.contains(&name) => self.push_error(value),
            name => {
                let _ = write!(self.fields, " {name}={value}");
            }
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.field_names.push(field.name());
        let mut detail = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            let _ = write!(detail, "\ncaused by: {cause}");
            source = cause.source();
        }
        self.push_error(&detail);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.field_names.push(field.name());
        let result = match field.name() {
            "message" => write!(self.message, "{value:?}"),
            name if ERROR_FIELDS.contains(&name) => {
                let mut detail = String::new();
                let result = write!(detail, "{value:?}");
                self.push_error(&detail);
                result
            }
            name => write!(self.fields, " {name}={value:?}"),
        };
        if result.is_err() {
            self.unformattable = true;
        }
    }
}

/// Forwards `tracing` events at or above the appender's threshold.
#[derive(Clone)]
pub struct TableLayer {
    appender: Arc<TableAppender>,
}

impl TableLayer {
    pub fn new(appender: Arc<TableAppender>) -> Self {
        TableLayer { appender }
    }

    pub fn appender(&self) -> &Arc<TableAppender> {
        &self.appender
    }
}

impl<S> Layer<S> for TableLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal(metadata.target()) {
            return;
        }
        let level = LogLevel::from(metadata.level());
        if !level.passes(self.appender.config().min_level) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        let (message, error) = visitor.into_parts();

        let context = LayoutContext {
            message: &message,
            level,
            target: metadata.target(),
            thread: current_thread_id(),
        };
        let rendered = self
            .appender
            .layout()
            .render(&context)
            .unwrap_or_else(|_| message.clone());

        let mut log_event = LogEvent::new(level, rendered);
        if let Some(detail) = error {
            log_event = log_event.with_error(detail);
        }
        self.appender.append(log_event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::flusher::FlushReport;
    use crate::table::memory::MemoryTableStore;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct ResetError;

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct QueryError(#[source] ResetError);

    struct Unprintable;

    impl fmt::Debug for Unprintable {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    fn create_layer(config: Config) -> (TableLayer, MemoryTableStore) {
        let store = MemoryTableStore::new();
        let appender = Arc::new(TableAppender::new(config, Arc::new(store.clone())));
        (TableLayer::new(appender), store)
    }

    fn capture(layer: &TableLayer, emit: impl FnOnce()) {
        let subscriber = Registry::default().with(layer.clone());
        tracing::subscriber::with_default(subscriber, emit);
    }

    #[test]
    fn test_internal_targets() {
        assert!(is_internal("table_appender"));
        assert!(is_internal("table_appender::flusher"));
        assert!(is_internal("hyper::client"));
        assert!(!is_internal("table_appender_host"));
        assert!(!is_internal("hyperion"));
        assert!(!is_internal("app"));
    }

    #[tokio::test]
    async fn test_info_event_round_trips_with_level_four() {
        let (layer, store) = create_layer(Config::default());

        capture(&layer, || tracing::info!(target: "app", "hello"));
        assert!(matches!(
            layer.appender().flush().await,
            FlushReport::Flushed(1)
        ));

        let rows = store.rows();
        assert_eq!(rows[0].message(), "hello");
        assert_eq!(rows[0].level(), 4);
    }

    #[test]
    fn test_threshold_and_internal_targets_are_skipped() {
        let (layer, _store) = create_layer(Config::default());

        capture(&layer, || {
            tracing::debug!(target: "app", "too chatty");
            tracing::error!(target: "table_appender::flusher", "own diagnostics");
            tracing::warn!(target: "app", "kept");
        });

        assert_eq!(layer.appender().pending(), 1);
    }

    #[tokio::test]
    async fn test_fields_and_error_chain() {
        let (layer, store) = create_layer(Config::default());

        capture(&layer, || {
            let query = QueryError(ResetError);
            let err: &(dyn Error + 'static) = &query;
            tracing::error!(
                target: "app",
                user = "alice",
                attempts = 3,
                error = err,
                "lookup failed"
            );
        });
        layer.appender().flush().await;

        let rows = store.rows();
        assert_eq!(
            rows[0].message(),
            "lookup failed user=alice attempts=3\nquery failed\ncaused by: connection reset"
        );
        assert_eq!(rows[0].level(), 2);
    }

    #[tokio::test]
    async fn test_layout_is_applied() {
        let (layer, store) = create_layer(Config {
            layout: "{level} [{target}] {message}".to_string(),
            ..Default::default()
        });

        capture(&layer, || tracing::warn!(target: "app::db", "disk full"));
        layer.appender().flush().await;

        assert_eq!(store.rows()[0].message(), "WARN [app::db] disk full");
    }

    #[tokio::test]
    async fn test_unformattable_field_falls_back() {
        let (layer, store) = create_layer(Config::default());

        capture(&layer, || {
            tracing::info!(target: "app", payload = ?Unprintable, "ignored");
        });
        layer.appender().flush().await;

        let rows = store.rows();
        let message = rows[0].message();
        assert!(message.starts_with("unformattable event, fields: "));
        assert!(message.contains("payload"));
        assert!(message.contains("message"));
    }
}
