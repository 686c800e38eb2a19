//! Kaspersky OpenTIP adapter.
//!
//! URL lookups are a single GET; file scans submit the bytes, take the
//! content hash from the submission response, then poll the result endpoint
//! until a terminal status or the poll budget runs out. Every failure mode
//! normalizes to an unknown verdict.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::config::ScannerConfig;
use crate::scanner::{PollPolicy, ScanResult, Scanner};

pub struct OpenTipScanner {
    api_url: String,
    api_key: Option<secrecy::SecretString>,
    poll: PollPolicy,
    client: reqwest::Client,
}

impl OpenTipScanner {
    pub fn new(config: ScannerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        Self {
            api_url: config.api_url,
            api_key: config.api_key,
            poll: PollPolicy {
                max_attempts: config.poll_attempts,
                delay: config.poll_interval,
            },
            client,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_url.trim_end_matches('/'))
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }

    /// Pull the `Zone` field out of a vendor response and normalize it.
    fn normalize(data: &serde_json::Value) -> ScanResult {
        let zone = data.get("Zone").and_then(|z| z.as_str()).unwrap_or("Grey");
        ScanResult::from_zone(zone)
    }

    /// Poll the file-result endpoint until a terminal `Status` appears.
    /// Returns `None` when the budget is exhausted or the endpoint fails.
    async fn poll_file_result(&self, key: &str, file_hash: &str) -> Option<serde_json::Value> {
        let endpoint = self.endpoint("getresult/file");

        for attempt in 0..self.poll.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.poll.delay).await;
            }

            let resp = match self
                .client
                .post(&endpoint)
                .query(&[("request", file_hash)])
                .header("x-api-key", key)
                .header("Accept", "application/json")
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "OpenTIP file result request failed");
                    return None;
                }
            };

            if !resp.status().is_success() {
                warn!(status = %resp.status(), "OpenTIP file result non-success");
                return None;
            }

            let data: serde_json::Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "OpenTIP file result unparsable");
                    return None;
                }
            };

            let status = data
                .get("Status")
                .and_then(|s| s.as_str())
                .unwrap_or_default();

            if PollPolicy::is_terminal(status) {
                debug!(status, attempt, "OpenTIP file scan reached terminal status");
                return Some(data);
            }
        }

        None
    }
}

#[async_trait]
impl Scanner for OpenTipScanner {
    async fn check_link(&self, url: &str) -> ScanResult {
        let Some(key) = self.api_key() else {
            warn!("OPENTIP_API_KEY is not set; returning unknown verdict");
            return ScanResult::unknown();
        };

        let resp = match self
            .client
            .get(self.endpoint("search/url"))
            .query(&[("request", url)])
            .header("x-api-key", key)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "OpenTIP url lookup failed");
                return ScanResult::unknown();
            }
        };

        if !resp.status().is_success() {
            warn!(url, status = %resp.status(), "OpenTIP url lookup non-success");
            return ScanResult::unknown();
        }

        match resp.json::<serde_json::Value>().await {
            Ok(data) => Self::normalize(&data),
            Err(e) => {
                warn!(url, error = %e, "OpenTIP url lookup unparsable");
                ScanResult::unknown()
            }
        }
    }

    async fn check_file(&self, bytes: &[u8], filename: &str) -> ScanResult {
        let Some(key) = self.api_key() else {
            warn!("OPENTIP_API_KEY is not set; returning unknown verdict");
            return ScanResult::unknown();
        };
        let key = key.to_string();

        let resp = match self
            .client
            .post(self.endpoint("scan/file"))
            .query(&[("filename", filename)])
            .header("x-api-key", &key)
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(filename, error = %e, "OpenTIP file submission failed");
                return ScanResult::unknown();
            }
        };

        if !resp.status().is_success() {
            warn!(filename, status = %resp.status(), "OpenTIP file submission non-success");
            return ScanResult::unknown();
        }

        let scan_data: serde_json::Value = match resp.json().await {
            Ok(d) => d,
            Err(e) => {
                warn!(filename, error = %e, "OpenTIP file submission unparsable");
                return ScanResult::unknown();
            }
        };

        let file_hash = ["Sha256", "Sha1", "Md5"]
            .iter()
            .find_map(|f| scan_data.get(*f).and_then(|v| v.as_str()));

        let Some(file_hash) = file_hash else {
            warn!(filename, "OpenTIP submission response carries no content hash");
            return Self::normalize(&scan_data);
        };

        // Budget exhausted or poll failure: fall back to whatever the
        // submission response said.
        match self.poll_file_result(&key, file_hash).await {
            Some(result) => Self::normalize(&result),
            None => Self::normalize(&scan_data),
        }
    }
}
