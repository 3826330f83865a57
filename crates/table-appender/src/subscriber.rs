// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::{debug, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::appender::TableAppender;
use crate::errors::InitError;
use crate::layer::TableLayer;

/// Filter for the console layer. `console_level` is any `EnvFilter` directive.
pub fn console_filter(console_level: &str) -> Result<EnvFilter, InitError> {
    let directives = format!(
        "h2=off,hyper=off,rustls=off,reqwest=off,{}",
        console_level.to_lowercase()
    );
    EnvFilter::try_new(directives).map_err(|e| InitError::Filter(e.to_string()))
}

fn console_layer<S>(console_level: &str) -> Result<impl Layer<S>, InitError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    Ok(tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_filter(console_filter(console_level)?))
}

/// Console-only subscriber for use with [`tracing::subscriber::with_default`]
/// while the configuration is read, before an appender exists.
pub fn console_only(console_level: &str) -> Result<impl Subscriber + Send + Sync, InitError> {
    Ok(Registry::default().with(console_layer::<Registry>(console_level)?))
}

/// Installs the process-wide subscriber: a console fmt layer filtered by
/// `console_level`, plus a [`TableLayer`] feeding `appender`.
///
/// Fails with [`InitError::AlreadyInstalled`] if a global subscriber exists.
pub fn try_init(appender: Arc<TableAppender>, console_level: &str) -> Result<(), InitError> {
    let subscriber = Registry::default()
        .with(console_layer::<Registry>(console_level)?)
        .with(TableLayer::new(appender));

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| InitError::AlreadyInstalled)?;

    debug!("TABLE | Logging subsystem enabled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_filter_accepts_levels() {
        assert!(console_filter("info").is_ok());
        assert!(console_filter("DEBUG").is_ok());
        assert!(console_filter("my_app=trace,warn").is_ok());
    }

    #[test]
    fn test_console_only_subscriber_scopes_config_warnings() {
        let console = console_only("warn").unwrap();
        let config = tracing::subscriber::with_default(console, crate::config::Config::default);
        assert_eq!(config.table_name, "WADLogsTable");
        assert!(matches!(console_only("app=notalevel"), Err(InitError::Filter(_))));
    }

    #[test]
    fn test_console_filter_rejects_garbage() {
        let err = console_filter("app=notalevel").unwrap_err();
        assert!(matches!(err, InitError::Filter(_)));
    }
}
