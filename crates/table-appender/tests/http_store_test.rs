// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use mockito::{Matcher, Server};
use table_appender::errors::{FlushError, TableError};
use table_appender::table::http::HttpTableStore;
use table_appender::table::TableStore;
use table_appender::{FlushReport, LogEvent, LogLevel, TableAppender};
use tracing_test::traced_test;

use common::http_config;

#[tokio::test]
async fn creates_table_once_and_accepts_conflict() {
    let mut server = Server::new_async().await;
    let created = server
        .mock("POST", "/Tables")
        .match_header("x-table-key", "mock-table-key")
        .match_body(Matcher::Json(serde_json::json!({ "TableName": "WADLogsTable" })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let store = HttpTableStore::new(&http_config(server.url()));
    store.ensure_table_exists().await.expect("table created");
    created.assert_async().await;

    let exists = server
        .mock("POST", "/Tables")
        .with_status(409)
        .with_body("table already exists")
        .expect(1)
        .create_async()
        .await;
    created.remove_async().await;

    store.ensure_table_exists().await.expect("conflict is success");
    exists.assert_async().await;
}

#[tokio::test]
async fn flush_posts_entities_as_one_batch() {
    let mut server = Server::new_async().await;
    let _table = server
        .mock("POST", "/Tables")
        .with_status(201)
        .create_async()
        .await;
    let batch = server
        .mock("POST", "/WADLogsTable")
        .match_header("x-table-key", "mock-table-key")
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""Message":"hello""#.to_string()),
            Matcher::Regex(r#""Message":"world""#.to_string()),
            Matcher::Regex(r#""Level":4"#.to_string()),
            Matcher::Regex(r#""EventId":0"#.to_string()),
            Matcher::Regex(r#""PartitionKey":"0\d{19}""#.to_string()),
            Matcher::Regex(r#""RowKey":"\d{7}_[0-9a-f]{32}""#.to_string()),
        ]))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let appender = TableAppender::with_http_store(http_config(server.url()));
    appender.append(LogEvent::new(LogLevel::Information, "hello"));
    appender.append(LogEvent::new(LogLevel::Warning, "world"));

    let report = appender.flush().await;

    assert!(matches!(report, FlushReport::Flushed(2)), "{report:?}");
    assert_eq!(appender.pending(), 0);
    batch.assert_async().await;
}

#[tokio::test]
#[traced_test]
async fn transient_failures_are_retried_then_reported() {
    let mut server = Server::new_async().await;
    let table = server
        .mock("POST", "/Tables")
        .with_status(201)
        .expect(2)
        .create_async()
        .await;
    // two flush attempts, each retried three times by the store
    let batch = server
        .mock("POST", "/WADLogsTable")
        .with_status(500)
        .with_body("busy")
        .expect(6)
        .create_async()
        .await;

    let appender = TableAppender::with_http_store(http_config(server.url()));
    appender.append(LogEvent::new(LogLevel::Error, "keep me"));

    let report = appender.flush().await;

    let FlushReport::Failed(errors) = report else {
        panic!("expected failure, got {report:?}");
    };
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| matches!(
        e,
        FlushError::Commit(TableError::Status { status: 500, .. })
    )));
    assert_eq!(appender.pending(), 1);
    table.assert_async().await;
    batch.assert_async().await;
    // one report per flush attempt, store-level retries stay below error
    logs_assert(|lines: &[&str]| {
        match lines.iter().filter(|line| line.contains(" ERROR ")).count() {
            2 => Ok(()),
            n => Err(format!("expected 2 error lines, got {n}")),
        }
    });
}

#[tokio::test]
async fn permanent_failures_are_not_retried_by_the_store() {
    let mut server = Server::new_async().await;
    let _table = server
        .mock("POST", "/Tables")
        .with_status(201)
        .create_async()
        .await;
    let batch = server
        .mock("POST", "/WADLogsTable")
        .with_status(403)
        .expect(2)
        .create_async()
        .await;

    let appender = TableAppender::with_http_store(http_config(server.url()));
    appender.append(LogEvent::new(LogLevel::Information, "forbidden"));

    let report = appender.flush().await;

    assert!(report.is_failed());
    assert_eq!(appender.pending(), 1);
    batch.assert_async().await;
}

#[tokio::test]
async fn records_survive_an_outage() {
    let mut server = Server::new_async().await;
    let _table = server
        .mock("POST", "/Tables")
        .with_status(201)
        .create_async()
        .await;
    let outage = server
        .mock("POST", "/WADLogsTable")
        .with_status(503)
        .create_async()
        .await;

    let appender = TableAppender::with_http_store(http_config(server.url()));
    appender.append(LogEvent::new(LogLevel::Information, "first"));
    assert!(appender.flush().await.is_failed());

    outage.remove_async().await;
    let recovered = server
        .mock("POST", "/WADLogsTable")
        .match_body(Matcher::Regex(r#""Message":"first""#.to_string()))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    assert!(matches!(appender.flush().await, FlushReport::Flushed(1)));
    recovered.assert_async().await;
}
