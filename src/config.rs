use std::time::Duration;

use crate::transport::DEFAULT_TIMEOUT;

/// Default remote service API base.
pub const DEFAULT_API_BASE: &str = "https://api.coze.cn/v1";

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Gateway configuration, resolved once at startup.
///
/// Use [`GatewayConfig::from_env`] to read it from the environment, or
/// [`GatewayConfig::default`] plus the `with_*` setters in tests and
/// embedded setups.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bearer token for the remote workflow service. Operations that need
    /// it fail with `Unconfigured` when absent.
    pub access_token: Option<String>,
    /// Remote service API base URL.
    pub api_base: String,
    /// Request timeout for remote calls.
    pub timeout: Duration,
    /// Emit verbose request/response diagnostics.
    pub debug: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            debug: false,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from environment variables: `COZE_ACCESS_TOKEN`,
    /// `COZE_API_BASE` (optional override), and `GATEWAY_DEBUG`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.access_token = std::env::var("COZE_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        if let Ok(base) = std::env::var("COZE_API_BASE") {
            if !base.is_empty() {
                config.api_base = normalize(base);
            }
        }
        config.debug = std::env::var("GATEWAY_DEBUG")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);
        config
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = normalize(base.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Token to send, if one is configured.
    pub(crate) fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}
