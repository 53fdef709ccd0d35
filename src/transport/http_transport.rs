use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::GatewayError;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
    use_env_proxy: bool,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, GatewayError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout);

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| GatewayError::Transport(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| GatewayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP transport for calls to the completion provider.
///
/// One pooled client is built on first use. Requests are sent exactly once;
/// nothing here retries.
pub struct HttpTransport {
    client: OnceLock<Arc<reqwest::Client>>,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
    use_env_proxy: bool,
    proxy_url: Option<String>,
}

impl HttpTransport {
    /// Create a transport with pooling and timeouts from the server config,
    /// routed through `proxy_url` when set.
    #[must_use]
    pub fn new(config: &ServerConfig, proxy_url: Option<&str>) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        Self {
            client: OnceLock::new(),
            pool_max_idle_per_host: config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            timeout: Duration::from_secs(config.timeout),
            use_env_proxy: config.http_use_env_proxy,
            proxy_url: proxy_url.map(str::to_string),
        }
    }

    fn build_client(&self) -> Arc<reqwest::Client> {
        match build_reqwest_client(
            self.pool_max_idle_per_host,
            self.pool_idle_timeout,
            self.timeout,
            self.use_env_proxy,
            self.proxy_url.as_deref(),
        ) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                Arc::new(reqwest::Client::new())
            }
        }
    }

    fn reqwest_client(&self) -> Arc<reqwest::Client> {
        if let Some(existing) = self.client.get() {
            return existing.clone();
        }

        let built = self.build_client();
        let _ = self.client.set(built.clone());
        self.client.get().cloned().unwrap_or(built)
    }

    /// POST `body` to `url` and return the response once its headers arrive.
    ///
    /// The status is not inspected; callers decide how a non-2xx answer is
    /// surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the request cannot be sent or
    /// no response headers arrive within the timeout.
    pub async fn post(
        &self,
        url: &url::Url,
        headers: &http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, GatewayError> {
        let client = self.reqwest_client();
        let mut request = reqwest::Request::new(http::Method::POST, url.clone());
        *request.headers_mut() = headers.clone();
        *request.body_mut() = Some(reqwest::Body::from(body));

        client.execute(request).await.map_err(|err| {
            let message = if err.is_timeout() {
                "upstream request timed out".to_string()
            } else if err.is_connect() {
                format!("failed to connect to upstream: {err}")
            } else {
                err.to_string()
            };
            GatewayError::Transport(message)
        })
    }
}
