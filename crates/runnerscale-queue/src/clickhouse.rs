//! HTTP client for the ClickHouse job analytics store.
//!
//! Queries go out as `GET` with the SQL in the `query` parameter and come
//! back as `JSONEachRow`: one JSON object per line.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use runnerscale_core::config::QueueConfig;
use runnerscale_core::QueueRecord;

use crate::backoff::RetryPolicy;
use crate::credentials::{CredentialSource, QueueCredentials};
use crate::error::{QueueError, QueueResult};
use crate::query::build_queue_query;
use crate::source::{BoxFuture, QueueSource};

/// Queue snapshot source backed by ClickHouse's HTTP interface.
pub struct ClickHouseSource {
    client: reqwest::Client,
    credential_source: Arc<dyn CredentialSource>,
    /// Swapped by `refresh_credentials`; read once per attempt.
    credentials: RwLock<QueueCredentials>,
    database: String,
    query: String,
    retry: RetryPolicy,
}

impl ClickHouseSource {
    /// Create a source running `query` against `database`.
    ///
    /// Credentials are loaded once here; a missing endpoint fails fast.
    pub fn new(
        credential_source: Arc<dyn CredentialSource>,
        database: impl Into<String>,
        query: impl Into<String>,
        timeout: Duration,
    ) -> QueueResult<Self> {
        let credentials = credential_source.load()?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("runnerscale/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            credential_source,
            credentials: RwLock::new(credentials),
            database: database.into(),
            query: query.into(),
            retry: RetryPolicy::default(),
        })
    }

    /// Build the source for the configured known pools.
    pub fn from_config(
        config: &QueueConfig,
        known_pools: &[String],
        credential_source: Arc<dyn CredentialSource>,
    ) -> QueueResult<Self> {
        let query = build_queue_query(
            &config.database,
            &config.table,
            known_pools,
            config.lookback_days,
        );
        Ok(Self::new(
            credential_source,
            config.database.clone(),
            query,
            config.request_timeout(),
        )?
        .with_retry(RetryPolicy::from_config(config)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The SQL this source sends.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Run the query, retrying with backoff, and decode the rows.
    pub async fn select_json_each_row(&self) -> QueueResult<Vec<QueueRecord>> {
        let mut backoff = self.retry.backoff();
        let mut attempt = 1;
        loop {
            match self.fetch_once().await {
                Ok(text) => return parse_json_each_row(&text),
                Err(e) if attempt >= self.retry.max_attempts => {
                    warn!(attempt, error = %e, "cannot fetch queue snapshot, giving up");
                    return Err(QueueError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "cannot fetch queue snapshot"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_once(&self) -> QueueResult<String> {
        let creds = self.credentials.read().await.clone();

        let mut request = self.client.get(&creds.url).query(&[
            ("database", self.database.as_str()),
            ("query", self.query.as_str()),
            ("default_format", "JSONEachRow"),
        ]);
        if let Some(user) = &creds.user {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &creds.password {
            request = request.header("X-ClickHouse-Key", password);
        }

        debug!(url = %creds.url, "querying job analytics store");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.text().await?)
    }
}

impl QueueSource for ClickHouseSource {
    fn fetch_snapshot(&self) -> BoxFuture<'_, QueueResult<Vec<QueueRecord>>> {
        Box::pin(self.select_json_each_row())
    }

    fn refresh_credentials(&self) -> BoxFuture<'_, QueueResult<()>> {
        Box::pin(async move {
            let fresh = self.credential_source.load()?;
            info!(url = %fresh.url, "query credentials refreshed");
            *self.credentials.write().await = fresh;
            Ok(())
        })
    }
}

/// Decode a `JSONEachRow` body, skipping blank lines.
pub fn parse_json_each_row(text: &str) -> QueueResult<Vec<QueueRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| QueueError::Decode {
                line: i + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{EnvCredentials, StaticCredentials};
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROWS: &str = concat!(
        r#"{"status":"in_progress","length":3,"labels":["self-hosted","builder"]}"#,
        "\n",
        r#"{"status":"queued","length":12,"labels":["self-hosted","builder"]}"#,
        "\n\n",
    );

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn source_for(url: String, max_attempts: u32) -> ClickHouseSource {
        let creds = StaticCredentials(QueueCredentials {
            url,
            user: Some("play".to_string()),
            password: None,
        });
        ClickHouseSource::new(Arc::new(creds), "default", "SELECT 1", Duration::from_secs(5))
            .unwrap()
            .with_retry(fast_retry(max_attempts))
    }

    #[test]
    fn parses_rows_and_skips_blank_lines() {
        let rows = parse_json_each_row(ROWS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].status, "queued");
        assert_eq!(rows[1].length, 12);
    }

    #[test]
    fn decode_error_reports_line() {
        let text = "{\"status\":\"queued\",\"length\":1,\"labels\":[]}\nnot json";
        let err = parse_json_each_row(text).unwrap_err();
        assert!(matches!(err, QueueError::Decode { line: 2, .. }));
    }

    #[tokio::test]
    async fn sends_query_parameters_and_user_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("database", "default"))
            .and(query_param("query", "SELECT 1"))
            .and(query_param("default_format", "JSONEachRow"))
            .and(header("X-ClickHouse-User", "play"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROWS))
            .expect(1)
            .mount(&server)
            .await;

        let source = source_for(server.uri(), 1);
        let rows = source.fetch_snapshot().await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROWS))
            .mount(&server)
            .await;

        let source = source_for(server.uri(), 3);
        let rows = source.fetch_snapshot().await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let source = source_for(server.uri(), 3);
        let err = source.fetch_snapshot().await.unwrap_err();
        match err {
            QueueError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, QueueError::Status { status: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn refresh_picks_up_new_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROWS))
            .mount(&server)
            .await;

        // First load points at a closed port, the refresh at the mock server.
        let loads = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&loads);
        let good = server.uri();
        let creds = EnvCredentials::from_config(&QueueConfig::default()).with_lookup(move |_| {
            if counter.fetch_add(1, Ordering::Relaxed) == 0 {
                Some("http://127.0.0.1:1".to_string())
            } else {
                Some(good.clone())
            }
        });
        let source = ClickHouseSource::new(
            Arc::new(creds),
            "default",
            "SELECT 1",
            Duration::from_secs(5),
        )
        .unwrap()
        .with_retry(fast_retry(1));

        assert!(source.fetch_snapshot().await.is_err());
        source.refresh_credentials().await.unwrap();
        assert_eq!(source.fetch_snapshot().await.unwrap().len(), 2);
        assert_eq!(loads.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn from_config_renders_query() {
        let mut config = QueueConfig::default();
        config.url = Some("http://localhost:8123".to_string());
        let creds = EnvCredentials::from_config(&config).with_lookup(|_| None);
        let source =
            ClickHouseSource::from_config(&config, &["builder".to_string()], Arc::new(creds))
                .unwrap();
        assert!(source.query().contains("hasAny(['builder'], labels)"));
        assert_eq!(source.retry.max_attempts, 5);
    }
}
