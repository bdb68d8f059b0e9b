//! Outbound HTTP transport assembly.
//!
//! Composes proxy resolution and the tunnel agent into ready-to-use client
//! options. Transport construction never fails: any problem building the
//! tunnel agent degrades to forwarding the proxy URL through the
//! environment, and any problem building the client degrades to a plain
//! client.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::agent::{adapt, TunnelAgent};
use crate::proxy::{self, EnvContext, ProxyConfig};

/// Default request timeout for gateway traffic.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(45_000);

/// Shorter timeout profile used by OAuth provider calls.
pub const OAUTH_PROVIDER_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Inputs for building client options.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Explicit proxy configuration. When absent, one is resolved from the
    /// environment context.
    pub proxy: Option<ProxyConfig>,
    /// Request timeout; `None` means [`DEFAULT_TIMEOUT`].
    pub timeout: Option<Duration>,
    /// Emit verbose transport diagnostics.
    pub debug: bool,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// A fully assembled transport: timeout, optional proxy, optional adapted
/// tunnel agent. Handed to HTTP clients and to collaborators (the OAuth
/// provider layer) that manage their own connections.
#[derive(Debug)]
pub struct HttpClientOptions {
    pub timeout: Duration,
    pub proxy: Option<ProxyConfig>,
    pub agent: Option<TunnelAgent>,
}

impl HttpClientOptions {
    /// Build a `reqwest` client from these options.
    ///
    /// A proxy that `reqwest` refuses, or a client that fails to build,
    /// downgrades with a warning instead of failing; the caller always
    /// gets a usable client.
    pub fn client(&self) -> Client {
        let mut builder = Client::builder().timeout(self.timeout);

        if let Some(config) = &self.proxy {
            match reqwest::Proxy::all(&config.url) {
                Ok(mut proxy) => {
                    if let Some(auth) = &config.auth {
                        proxy = proxy.basic_auth(&auth.username, &auth.password);
                    }
                    builder = builder.proxy(proxy);
                }
                Err(e) => {
                    warn!(url = %config.url, error = %e, "proxy rejected by HTTP client, continuing without it");
                }
            }
        }

        builder.build().unwrap_or_else(|e| {
            warn!(error = %e, "client build failed, falling back to default client");
            Client::new()
        })
    }
}

/// Build client options from the process environment.
pub fn build(options: TransportOptions) -> HttpClientOptions {
    build_with_context(options, &EnvContext::from_env())
}

/// Build client options against an explicit environment context.
///
/// When a proxy is supplied or resolvable, it is propagated process-wide
/// (non-production only) and a tunnel agent is constructed for it, wrapped
/// through the capability adapter. Agent construction failures are
/// absorbed: the proxy URL still rides along for ambient handling.
pub fn build_with_context(options: TransportOptions, ctx: &EnvContext) -> HttpClientOptions {
    let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
    let proxy = options.proxy.or_else(|| proxy::resolve(ctx));

    let agent = proxy.as_ref().and_then(|config| {
        proxy::apply_global_proxy(config, ctx);

        match TunnelAgent::for_proxy(config) {
            Ok(raw) => {
                let agent = adapt(raw);
                if options.debug {
                    agent.validate();
                    debug!(
                        proxy = %config.url,
                        agent = agent.name(),
                        "tunnel agent ready"
                    );
                }
                Some(agent)
            }
            Err(e) => {
                // Degraded transport: proxy still reaches downstream
                // libraries through the environment.
                warn!(error = %e, "tunnel agent unavailable, forwarding proxy via environment only");
                None
            }
        }
    });

    HttpClientOptions {
        timeout,
        proxy,
        agent,
    }
}
