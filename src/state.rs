mod request_id;

use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::transport::{HttpTransport, PreparedUpstream};

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
///
/// Nothing here is mutated per request; each request owns its own filter
/// and buffers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub upstream: PreparedUpstream,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport, upstream: PreparedUpstream) -> Self {
        Self {
            config,
            transport,
            upstream,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build the transport and prepared upstream from a loaded config.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when the upstream endpoint is unusable.
    pub fn from_config(config: AppConfig) -> Result<Self, GatewayError> {
        let upstream = PreparedUpstream::new(&config.upstream)?;
        let transport = HttpTransport::new(&config.server, upstream.proxy());
        Ok(Self::new(config, transport, upstream))
    }

    /// Allocate the id used to correlate log records of one request.
    #[must_use]
    pub fn next_request_id(&self) -> String {
        self.request_ids.next_id().to_string()
    }

    /// Request ids issued since startup.
    #[must_use]
    pub fn requests_seen(&self) -> u64 {
        self.request_ids.issued()
    }
}
