use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::CanonicalError;

fn build_reqwest_client(
    config: &ServerConfig,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, CanonicalError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout));

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| CanonicalError::Transport(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| CanonicalError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client shared by every upstream call.
///
/// `reqwest::Client` is internally reference counted, so cloning the
/// transport shares one connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport from server settings and an optional proxy.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::Transport`] when the proxy URL is rejected
    /// or the TLS backend fails to initialize.
    pub fn new(config: &ServerConfig, proxy_url: Option<&str>) -> Result<Self, CanonicalError> {
        Ok(Self {
            client: build_reqwest_client(config, proxy_url)?,
        })
    }

    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}
