use crate::config::UpstreamConfig;
use crate::error::GatewayError;

/// Completion endpoint and request headers, computed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    chat_url: String,
    chat_url_parsed: url::Url,
    headers: Option<CallHeaders>,
    proxy: Option<String>,
}

#[derive(Debug, Clone)]
struct CallHeaders {
    json: http::HeaderMap,
    event_stream: http::HeaderMap,
}

impl PreparedUpstream {
    /// Build the prepared upstream from configuration.
    ///
    /// A missing credential is not an error here; it surfaces per request
    /// through [`PreparedUpstream::headers`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when the endpoint URL does not parse
    /// or the credential cannot be carried in a header.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, GatewayError> {
        let base = upstream.base_url.trim_end_matches('/');
        let chat_url = format!("{base}/chat/completions");
        let chat_url_parsed = url::Url::parse(&chat_url).map_err(|err| {
            GatewayError::Config(format!("invalid upstream endpoint '{chat_url}': {err}"))
        })?;
        let headers = upstream
            .api_key
            .as_deref()
            .map(build_call_headers)
            .transpose()?;

        Ok(Self {
            chat_url,
            chat_url_parsed,
            headers,
            proxy: normalize_proxy(upstream.proxy.as_deref()),
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    #[must_use]
    pub fn chat_url_parsed(&self) -> &url::Url {
        &self.chat_url_parsed
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.headers.is_some()
    }

    /// Request headers including the bearer credential. Streaming calls
    /// accept `text/event-stream`, others `application/json`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when no credential is configured.
    pub fn headers(&self, stream: bool) -> Result<&http::HeaderMap, GatewayError> {
        let headers = self.headers.as_ref().ok_or_else(|| {
            GatewayError::Config(
                "upstream API key is not configured; set the DEEPSEEK_API_KEY environment variable"
                    .to_string(),
            )
        })?;
        Ok(if stream {
            &headers.event_stream
        } else {
            &headers.json
        })
    }
}

fn build_call_headers(key: &str) -> Result<CallHeaders, GatewayError> {
    let mut json = http::HeaderMap::new();
    json.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    let mut bearer = http::HeaderValue::from_str(&format!("Bearer {}", key.trim()))
        .map_err(|_| GatewayError::Config("upstream API key contains invalid characters".into()))?;
    bearer.set_sensitive(true);
    json.insert(http::header::AUTHORIZATION, bearer);

    let mut event_stream = json.clone();
    event_stream.insert(
        http::header::ACCEPT,
        http::HeaderValue::from_static("text/event-stream"),
    );
    json.insert(
        http::header::ACCEPT,
        http::HeaderValue::from_static("application/json"),
    );
    Ok(CallHeaders { json, event_stream })
}

fn normalize_proxy(proxy: Option<&str>) -> Option<String> {
    proxy.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(base_url: &str, api_key: Option<&str>) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn test_chat_url_strips_trailing_slash() {
        let prepared = PreparedUpstream::new(&upstream("https://api.deepseek.com/v1/", None)).unwrap();
        assert_eq!(prepared.chat_url(), "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(prepared.chat_url_parsed().path(), "/v1/chat/completions");
    }

    #[test]
    fn test_headers_carry_bearer_credential() {
        let prepared = PreparedUpstream::new(&upstream("http://127.0.0.1:9", Some("sk-test"))).unwrap();
        let headers = prepared.headers(false).unwrap();
        assert_eq!(headers[http::header::AUTHORIZATION], "Bearer sk-test");
        assert_eq!(headers[http::header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[http::header::ACCEPT], "application/json");
        assert!(headers[http::header::AUTHORIZATION].is_sensitive());

        let streaming = prepared.headers(true).unwrap();
        assert_eq!(streaming[http::header::ACCEPT], "text/event-stream");
        assert_eq!(streaming[http::header::AUTHORIZATION], "Bearer sk-test");
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        let prepared = PreparedUpstream::new(&upstream("http://127.0.0.1:9", None)).unwrap();
        assert!(!prepared.has_credential());
        assert!(matches!(prepared.headers(true), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_invalid_credential_characters_are_rejected() {
        let result = PreparedUpstream::new(&upstream("http://127.0.0.1:9", Some("sk\nbad")));
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_blank_proxy_is_ignored() {
        let mut config = upstream("http://127.0.0.1:9", None);
        config.proxy = Some("  ".to_string());
        assert!(PreparedUpstream::new(&config).unwrap().proxy().is_none());
    }
}
