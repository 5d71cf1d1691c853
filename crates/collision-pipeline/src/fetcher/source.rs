//! Record sources the fetcher pulls windows from.
//!
//! The [`RecordSource`] trait is the seam between the fetcher and the
//! network. [`HttpRecordSource`] talks to a Socrata (SODA) resource; tests
//! and offline runs can provide their own implementation.

use super::window::BatchWindow;
use crate::error::Result;
use std::io::Read;

/// A paginated source of collision records.
pub trait RecordSource: Send + Sync {
    /// URL recorded in the manifest.
    fn source_url(&self) -> &str;

    /// Total number of records available.
    ///
    /// Fails with [`PipelineError::Discovery`](crate::error::PipelineError::Discovery)
    /// when the count cannot be obtained.
    fn count_records(&self) -> Result<u64>;

    /// Open a byte stream with the payload for one window.
    ///
    /// The stream is consumed incrementally by the fetcher, so
    /// implementations should not buffer the whole body.
    fn open_window(&self, window: &BatchWindow) -> Result<Box<dyn Read + Send>>;
}

/// Parse the body of a `$select=count(*)` query.
///
/// Socrata answers with `[{"count": "123"}]`; the count may also arrive as a
/// JSON number.
pub fn parse_count_body(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let count = value.as_array()?.first()?.get("count")?;
    match count {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(feature = "http")]
pub use http::HttpRecordSource;

#[cfg(feature = "http")]
mod http {
    use super::{BatchWindow, RecordSource, parse_count_body};
    use crate::config::PipelineConfig;
    use crate::error::{PipelineError, Result};
    use reqwest::blocking::Client;
    use std::io::Read;
    use std::time::Duration;
    use tracing::debug;

    /// Socrata resource accessed over HTTP.
    ///
    /// The count query always goes to the JSON endpoint; windows are
    /// requested from the endpoint of the configured format.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use collision_pipeline::fetcher::HttpRecordSource;
    ///
    /// let source = HttpRecordSource::new(&PipelineConfig::default())?;
    /// let total = source.count_records()?;
    /// ```
    pub struct HttpRecordSource {
        client: Client,
        count_url: String,
        data_url: String,
        app_token: Option<String>,
    }

    impl HttpRecordSource {
        /// Build a source from the pipeline configuration.
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be created.
        pub fn new(config: &PipelineConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()?;

            Ok(Self {
                client,
                count_url: config.endpoints.json.clone(),
                data_url: config.data_url().to_string(),
                app_token: config.app_token.clone(),
            })
        }

        fn get(&self, url: &str, query: &[(&str, String)]) -> reqwest::blocking::RequestBuilder {
            let request = self.client.get(url).query(query);
            match &self.app_token {
                Some(token) => request.header("X-App-Token", token),
                None => request,
            }
        }
    }

    impl RecordSource for HttpRecordSource {
        fn source_url(&self) -> &str {
            &self.data_url
        }

        fn count_records(&self) -> Result<u64> {
            debug!("Querying record count from {}", self.count_url);

            let response = self
                .get(&self.count_url, &[("$select", "count(*)".to_string())])
                .send()
                .map_err(|e| PipelineError::Discovery(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::Discovery(format!(
                    "count query returned {status}"
                )));
            }

            let body = response
                .text()
                .map_err(|e| PipelineError::Discovery(e.to_string()))?;

            parse_count_body(&body).ok_or_else(|| {
                PipelineError::Discovery(format!("unparsable count response: {body}"))
            })
        }

        fn open_window(&self, window: &BatchWindow) -> Result<Box<dyn Read + Send>> {
            let response = self
                .get(
                    &self.data_url,
                    &[
                        ("$limit", window.size.to_string()),
                        ("$offset", window.offset.to_string()),
                    ],
                )
                .send()?;

            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::WindowFetch {
                    index: window.index,
                    offset: window.offset,
                    reason: format!("HTTP {status}"),
                });
            }

            Ok(Box::new(response))
        }
    }

    static_assertions::assert_impl_all!(HttpRecordSource: Send, Sync);
}
