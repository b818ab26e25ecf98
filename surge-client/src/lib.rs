use std::collections::BTreeMap;
use std::time::Duration;
use surge_common::{HttpMethod, RequestSpec, ResponseView, Result, SurgeError, DEFAULT_BASE_URL};
use uuid::Uuid;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Surge HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme, host and port of the system under test, e.g. `http://localhost:8080`.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string(), timeout: DEFAULT_TIMEOUT }
    }
}

/// Surge HTTP client
pub struct Client {
    pub config: ClientConfig,
    http_client: reqwest::Client,
}

impl Client {
    /// Create a new client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
            return Err(SurgeError::config(format!(
                "base URL must start with http:// or https://, got {:?}",
                config.base_url
            )));
        }
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SurgeError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { config, http_client })
    }

    /// Resolve a request target against the base URL. Absolute URLs pass through unchanged.
    pub fn build_url(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            return target.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        if target.is_empty() {
            base.to_string()
        } else if target.starts_with('/') {
            format!("{base}{target}")
        } else {
            format!("{base}/{target}")
        }
    }

    /// Send `spec` and read the full response body.
    ///
    /// Any HTTP status is a successful exchange; only failures that prevent a response
    /// (refused connection, DNS, timeout, truncated body) are errors.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<ResponseView> {
        let url = self.build_url(&spec.target);

        let mut request = match spec.method {
            HttpMethod::Get => self.http_client.get(&url),
            HttpMethod::Post => self.http_client.post(&url),
            HttpMethod::Put => self.http_client.put(&url),
            HttpMethod::Patch => self.http_client.patch(&url),
            HttpMethod::Delete => self.http_client.delete(&url),
        };
        request = request.header("X-Request-Id", Uuid::new_v4().to_string());
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &spec.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| SurgeError::NetworkError(format!("cannot encode body: {e}")))?;
            request = request.body(bytes);
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;

        Ok(ResponseView { status, headers, body: bytes.to_vec(), duration: Duration::ZERO })
    }

    fn map_error(&self, err: reqwest::Error) -> SurgeError {
        if err.is_timeout() {
            SurgeError::Timeout(self.config.timeout.as_millis() as u64)
        } else {
            tracing::debug!(error = %err, "transport failure");
            SurgeError::NetworkError(err.to_string())
        }
    }
}
