// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, error, info};

use table_appender::{subscriber, Activation, Config, FlushReport, TableAppender};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("TABLE_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let console = match subscriber::console_only(&log_level) {
        Ok(console) => console,
        Err(e) => {
            eprintln!("table-appender-host: {e}");
            return ExitCode::FAILURE;
        }
    };
    // config warnings go to the console, the table appender does not exist yet
    let config = match tracing::subscriber::with_default(console, Config::from_env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("table-appender-host: {e}");
            return ExitCode::FAILURE;
        }
    };

    let appender = Arc::new(TableAppender::with_http_store(config));
    if let Err(e) = subscriber::try_init(Arc::clone(&appender), &log_level) {
        eprintln!("table-appender-host: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    if appender.activate() != Activation::Started {
        error!("Table appender could not be activated, shutting down");
        return ExitCode::FAILURE;
    }
    info!(
        table = %appender.config().table_name,
        "Table appender host started, flushing every {}s",
        appender.flush_interval().as_secs()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
    }

    info!("Shutting down, flushing {} pending records", appender.pending());
    match appender.shutdown().await {
        FlushReport::Failed(errors) => {
            error!("Final flush failed after {} attempts", errors.len());
            ExitCode::FAILURE
        }
        _ => ExitCode::SUCCESS,
    }
}
