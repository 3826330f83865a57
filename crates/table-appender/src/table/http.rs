// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Response;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::TableError;
use crate::record::LogRecord;
use crate::retry::RetryStrategy;
use crate::table::{TableConnection, TableStore};

const KEY_HEADER: &str = "x-table-key";

/// Table reachable over HTTP.
///
/// `POST {url}/Tables` creates the table, `POST {url}/{table}` appends a
/// JSON array of entities.
#[derive(Debug, Clone)]
pub struct HttpTableStore {
    base_url: String,
    table_name: String,
    storage_key: Option<String>,
    proxy_url: Option<String>,
    timeout: Duration,
    retry_strategy: RetryStrategy,
}

impl HttpTableStore {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        HttpTableStore {
            base_url: config.storage_url.trim_end_matches('/').to_string(),
            table_name: config.table_name.clone(),
            storage_key: config.storage_key.clone(),
            proxy_url: config.proxy_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            retry_strategy: config.retry_strategy.clone(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, TableError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.storage_key {
            let value = HeaderValue::from_str(key).map_err(|e| {
                TableError::Unavailable(format!("storage key is not a valid header: {e}"))
            })?;
            headers.insert(KEY_HEADER, value);
        }
        Ok(headers)
    }

    // Every connection gets its own client so a wedged pool is dropped with it.
    fn client(&self) -> Result<HttpTableClient, TableError> {
        Ok(HttpTableClient {
            client: build_client(self.proxy_url.as_deref(), self.timeout)?,
            headers: self.headers()?,
            retry_strategy: self.retry_strategy.clone(),
        })
    }

    async fn create_table(&self, client: &HttpTableClient) -> Result<(), TableError> {
        let url = format!("{}/Tables", self.base_url);
        let body = json!({ "TableName": self.table_name });
        match client.post_with_retry(&url, &body).await {
            Ok(_) => {
                debug!("TABLE | Created table {}", self.table_name);
                Ok(())
            }
            Err(TableError::Status { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TableStore for HttpTableStore {
    async fn ensure_table_exists(&self) -> Result<(), TableError> {
        let client = self.client()?;
        self.create_table(&client).await
    }

    async fn open_connection(&self) -> Result<Box<dyn TableConnection>, TableError> {
        let client = self.client()?;
        self.create_table(&client).await?;
        Ok(Box::new(HttpTableConnection {
            client,
            url: format!("{}/{}", self.base_url, self.table_name),
            staged: Vec::new(),
        }))
    }
}

#[derive(Debug)]
struct HttpTableClient {
    client: reqwest::Client,
    headers: HeaderMap,
    retry_strategy: RetryStrategy,
}

impl HttpTableClient {
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<Response, TableError> {
        let attempts = self.retry_strategy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let time = Instant::now();
            let result = self
                .client
                .post(url)
                .headers(self.headers.clone())
                .json(body)
                .send()
                .await;
            let elapsed = time.elapsed();

            let error = match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    TableError::Status {
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(e) => TableError::Transport(e),
            };

            if error.is_permanent() || attempt >= attempts {
                // 409 on table creation means the table already exists
                if !matches!(error, TableError::Status { status: 409, .. }) {
                    warn!(
                        "TABLE | Request to {url} failed after {} ms and {attempt} attempts: {error}",
                        elapsed.as_millis()
                    );
                }
                return Err(error);
            }

            warn!("TABLE | Request to {url} failed (attempt {attempt}/{attempts}): {error}");
            if let Some(delay) = self.retry_strategy.delay() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// One flush worth of staged entities.
#[derive(Debug)]
struct HttpTableConnection {
    client: HttpTableClient,
    url: String,
    staged: Vec<Value>,
}

#[async_trait]
impl TableConnection for HttpTableConnection {
    fn stage_row(&mut self, record: &LogRecord) -> Result<(), TableError> {
        self.staged.push(serde_json::to_value(record.to_entity())?);
        Ok(())
    }

    async fn commit_staged(&mut self) -> Result<usize, TableError> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        let batch = Value::Array(std::mem::take(&mut self.staged));
        let count = batch.as_array().map_or(0, Vec::len);

        match self.client.post_with_retry(&self.url, &batch).await {
            Ok(_) => {
                debug!("TABLE | Committed {count} rows to {}", self.url);
                Ok(count)
            }
            Err(e) => {
                // keep the rows staged so the connection state reflects what was not written
                if let Value::Array(rows) = batch {
                    self.staged = rows;
                }
                Err(e)
            }
        }
    }
}

pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, TableError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(url: &str) -> Config {
        Config {
            storage_url: format!("{url}/"),
            storage_key: Some("secret".to_string()),
            table_name: "Logs".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_store_trims_trailing_slash() {
        let store = HttpTableStore::new(&test_config("https://tables.example.com"));
        assert_eq!(store.base_url, "https://tables.example.com");
        assert_eq!(store.table_name, "Logs");
    }

    #[test]
    fn test_headers_carry_key() {
        let store = HttpTableStore::new(&test_config("https://tables.example.com"));
        let headers = store.headers().unwrap();
        assert_eq!(headers.get(KEY_HEADER).unwrap(), "secret");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_headers_reject_invalid_key() {
        let mut config = test_config("https://tables.example.com");
        config.storage_key = Some("bad\nkey".to_string());
        let store = HttpTableStore::new(&config);
        assert!(matches!(store.headers(), Err(TableError::Unavailable(_))));
    }

    #[test]
    fn test_build_client_with_and_without_proxy() {
        assert!(build_client(None, Duration::from_secs(1)).is_ok());
        assert!(build_client(Some("http://proxy.internal:3128"), Duration::from_secs(1)).is_ok());
    }
}
