mod request_id;

use std::sync::Arc;

use bytes::Bytes;

use crate::api::models::build_models_response_body;
use crate::config::AppConfig;
use crate::error::CanonicalError;
use crate::session::WebSession;
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub session: WebSession,
    models_response_body: Bytes,
    request_ids: RequestIdGenerator,
}

impl AppState {
    /// # Errors
    ///
    /// Returns [`CanonicalError::Config`] when the web session cannot be
    /// built from the upstream settings.
    pub fn new(config: AppConfig, transport: &HttpTransport) -> Result<Self, CanonicalError> {
        let session = WebSession::new(transport.client().clone(), config.upstream.clone())?;
        let models_response_body = build_models_response_body(&config.upstream);
        Ok(Self {
            config,
            session,
            models_response_body,
            request_ids: RequestIdGenerator::new(),
        })
    }

    /// Build state from config alone, creating the transport on the way.
    ///
    /// # Errors
    ///
    /// Propagates transport and session construction failures.
    pub fn from_config(config: AppConfig) -> Result<Arc<Self>, CanonicalError> {
        let transport = HttpTransport::new(&config.server, config.upstream.proxy.as_deref())?;
        Ok(Arc::new(Self::new(config, &transport)?))
    }

    #[must_use]
    pub fn next_completion_id(&self) -> String {
        self.request_ids.next_completion_id()
    }

    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }
}
