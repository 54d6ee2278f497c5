mod request_id;

use std::sync::Arc;

use bytes::Bytes;

use crate::api::models::build_models_response_body;
use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::protocol::upstream::UpstreamOptions;
use crate::resolver::{ModelResolver, ResolutionMemo};
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub resolver: ModelResolver,
    pub upstream_options: UpstreamOptions,
    models_body: Bytes,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport, memo: Arc<ResolutionMemo>) -> Self {
        let resolver = ModelResolver::new(&config.models, memo);
        let upstream_options = UpstreamOptions::from_config(&config);
        let models_body = build_models_response_body(&config);
        Self {
            config,
            transport,
            resolver,
            upstream_options,
            models_body,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build state with a fresh resolution memo and a transport derived from
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when the HTTP transport cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, ProxyError> {
        let transport = HttpTransport::new(&config.server, &config.upstream)?;
        let memo = Arc::new(ResolutionMemo::with_capacity(config.models.memo_capacity));
        Ok(Self::new(config, transport, memo))
    }

    pub fn next_request_seq(&self) -> u64 {
        self.request_ids.next_seq()
    }

    #[must_use]
    pub fn request_uuid(&self, request_seq: u64) -> uuid::Uuid {
        self.request_ids.request_uuid(request_seq)
    }

    #[must_use]
    pub fn models_body(&self) -> Bytes {
        self.models_body.clone()
    }
}
