//! Keep-alive tunnel agent with capability patching.
//!
//! Low-level tunneling clients do not always expose the full connection-pool
//! interface an HTTP stack expects (naming, connection creation, keep-alive,
//! teardown, socket reuse). [`adapt`] decorates an agent with a conforming
//! default for every capability it is missing, without touching the ones it
//! already has, so upstream clients never hit an absent method.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use base64::Engine;
use futures::future::BoxFuture;
use futures::FutureExt;
use socket2::{SockRef, TcpKeepalive};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::proxy::{ProxyAuth, ProxyConfig, ProxyProtocol, DEFAULT_PROXY_PORT};

/// Name reported by agents that did not bring their own.
pub const DEFAULT_AGENT_NAME: &str = "tunnel-agent";

/// Idle-socket cap installed when the agent does not define one.
pub const DEFAULT_MAX_FREE_SOCKETS: usize = 256;

const KEEP_ALIVE_PROBE: Duration = Duration::from_secs(1);

/// Errors constructing a tunnel agent. Callers absorb these and fall back
/// to environment-only proxy forwarding.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("invalid proxy URL for tunnel agent: {0}")]
    InvalidProxy(String),

    #[error("tunneling is not supported for {0} proxies")]
    Unsupported(&'static str),
}

/// Where a connection should be opened.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    /// Open a TLS connection instead of plain TCP.
    pub secure: bool,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
        }
    }

    /// Pool bucket key for this destination.
    pub fn bucket(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A pooled connection: plain TCP, or TLS for secure endpoints.
pub enum TunnelSocket {
    Plain(TcpStream),
    Tls(tokio_native_tls::TlsStream<TcpStream>),
}

impl TunnelSocket {
    fn tcp(&self) -> &TcpStream {
        match self {
            TunnelSocket::Plain(s) => s,
            TunnelSocket::Tls(s) => s.get_ref().get_ref().get_ref(),
        }
    }

    /// Enable TCP keep-alive with the given idle probe and clear any read
    /// timeout on the underlying socket.
    pub fn set_keep_alive(&self, idle: Duration) -> io::Result<()> {
        let sock = SockRef::from(self.tcp());
        sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
        sock.set_read_timeout(None)?;
        Ok(())
    }

    /// Best-effort close. Shutdown failures are logged, never raised.
    pub fn close(self) {
        if let Err(e) = SockRef::from(self.tcp()).shutdown(std::net::Shutdown::Both) {
            debug!(error = %e, "socket shutdown failed during close");
        }
    }
}

impl std::fmt::Debug for TunnelSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TunnelSocket::Plain(_) => f.write_str("TunnelSocket::Plain"),
            TunnelSocket::Tls(_) => f.write_str("TunnelSocket::Tls"),
        }
    }
}

/// Connection-pool bookkeeping shared across concurrent requests.
///
/// Open sockets are tracked by count (their handles live with the caller);
/// idle sockets are owned by the pool until reused or destroyed.
#[derive(Debug, Default)]
pub struct PoolBuckets {
    /// Open-socket counts per destination bucket.
    pub sockets: HashMap<String, usize>,
    /// Idle sockets available for reuse, per destination bucket.
    pub free_sockets: HashMap<String, Vec<TunnelSocket>>,
    /// Pending request counts per destination bucket.
    pub requests: HashMap<String, usize>,
}

/// The tunnel hop a proxy-scoped agent dials through.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
}

type ConnectFn =
    dyn Fn(ConnectOptions) -> BoxFuture<'static, io::Result<TunnelSocket>> + Send + Sync;
type KeepAliveFn = dyn Fn(&TunnelSocket) -> bool + Send + Sync;
type DestroyFn = dyn Fn(&mut PoolBuckets) + Send + Sync;
type FreeFn = dyn Fn(&mut PoolBuckets, TunnelSocket, &str, usize) -> bool + Send + Sync;

/// Which capabilities and state properties an agent currently carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityReport {
    pub name: bool,
    pub create_connection: bool,
    pub keep_alive: bool,
    pub destroy: bool,
    pub free_socket: bool,
    pub sockets: bool,
    pub free_sockets: bool,
    pub requests: bool,
    pub max_sockets: bool,
    pub max_free_sockets: bool,
}

impl CapabilityReport {
    /// True when every capability and state property is present.
    pub fn complete(&self) -> bool {
        self.name
            && self.create_connection
            && self.keep_alive
            && self.destroy
            && self.free_socket
            && self.sockets
            && self.free_sockets
            && self.requests
            && self.max_sockets
            && self.max_free_sockets
    }
}

/// HTTP keep-alive connection pool, possibly scoped to a proxy hop.
///
/// Freshly constructed agents may be missing capabilities; run them through
/// [`adapt`] before handing them to an HTTP client.
pub struct TunnelAgent {
    secure_endpoint: bool,
    target: Option<ProxyTarget>,
    name: Option<String>,
    connect: Option<Arc<ConnectFn>>,
    keep_alive: Option<Arc<KeepAliveFn>>,
    destroy: Option<Arc<DestroyFn>>,
    free: Option<Arc<FreeFn>>,
    pool: Option<Arc<Mutex<PoolBuckets>>>,
    max_sockets: Option<usize>,
    max_free_sockets: Option<usize>,
}

impl std::fmt::Debug for TunnelAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelAgent")
            .field("name", &self.name)
            .field("secure_endpoint", &self.secure_endpoint)
            .field("target", &self.target)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl TunnelAgent {
    /// Create a bare agent with no capabilities installed.
    pub fn new(secure_endpoint: bool) -> Self {
        Self {
            secure_endpoint,
            target: None,
            name: None,
            connect: None,
            keep_alive: None,
            destroy: None,
            free: None,
            pool: None,
            max_sockets: None,
            max_free_sockets: None,
        }
    }

    /// Create an agent scoped to a proxy hop. The agent dials the proxy
    /// host/port and carries its credentials; `https` proxies get a TLS hop.
    ///
    /// socks5 proxies are not tunneled here; the caller falls back to
    /// ambient proxy handling for those.
    pub fn for_proxy(config: &ProxyConfig) -> Result<Self, AgentError> {
        if config.protocol == ProxyProtocol::Socks5 {
            return Err(AgentError::Unsupported("socks5"));
        }

        let parsed = url::Url::parse(&config.url)
            .map_err(|e| AgentError::InvalidProxy(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AgentError::InvalidProxy("proxy URL has no host".into()))?
            .to_string();
        let port = parsed.port().unwrap_or(DEFAULT_PROXY_PORT);

        let mut agent = Self::new(config.protocol == ProxyProtocol::Https);
        agent.target = Some(ProxyTarget {
            host,
            port,
            auth: config.auth.clone(),
        });
        Ok(agent)
    }

    // ── Raw-agent construction (capabilities supplied by the wrapped client) ──

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_connector<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectOptions) -> BoxFuture<'static, io::Result<TunnelSocket>>
            + Send
            + Sync
            + 'static,
    {
        self.connect = Some(Arc::new(f));
        self
    }

    pub fn with_keep_alive<F>(mut self, f: F) -> Self
    where
        F: Fn(&TunnelSocket) -> bool + Send + Sync + 'static,
    {
        self.keep_alive = Some(Arc::new(f));
        self
    }

    pub fn with_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut PoolBuckets) + Send + Sync + 'static,
    {
        self.destroy = Some(Arc::new(f));
        self
    }

    pub fn with_free<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut PoolBuckets, TunnelSocket, &str, usize) -> bool + Send + Sync + 'static,
    {
        self.free = Some(Arc::new(f));
        self
    }

    pub fn with_pool(mut self) -> Self {
        self.pool = Some(Arc::new(Mutex::new(PoolBuckets::default())));
        self
    }

    pub fn with_max_sockets(mut self, max: usize) -> Self {
        self.max_sockets = Some(max);
        self
    }

    pub fn with_max_free_sockets(mut self, max: usize) -> Self {
        self.max_free_sockets = Some(max);
        self
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_AGENT_NAME)
    }

    pub fn is_secure(&self) -> bool {
        self.secure_endpoint
    }

    pub fn target(&self) -> Option<&ProxyTarget> {
        self.target.as_ref()
    }

    pub fn max_sockets(&self) -> Option<usize> {
        self.max_sockets
    }

    pub fn max_free_sockets(&self) -> Option<usize> {
        self.max_free_sockets
    }

    /// `Proxy-Authorization` header value for the tunnel hop, when the
    /// proxy carries credentials.
    pub fn proxy_authorization(&self) -> Option<String> {
        let auth = self.target.as_ref()?.auth.as_ref()?;
        let raw = format!("{}:{}", auth.username, auth.password);
        Some(format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        ))
    }

    /// Idle sockets currently pooled for a destination.
    pub fn free_count(&self, bucket: &str) -> usize {
        self.pool
            .as_ref()
            .map(|pool| {
                lock(pool)
                    .free_sockets
                    .get(bucket)
                    .map(Vec::len)
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Open sockets currently tracked for a destination.
    pub fn open_count(&self, bucket: &str) -> usize {
        self.pool
            .as_ref()
            .map(|pool| lock(pool).sockets.get(bucket).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Which capabilities and state properties are present.
    pub fn capabilities(&self) -> CapabilityReport {
        let pooled = self.pool.is_some();
        CapabilityReport {
            name: self.name.is_some(),
            create_connection: self.connect.is_some(),
            keep_alive: self.keep_alive.is_some(),
            destroy: self.destroy.is_some(),
            free_socket: self.free.is_some(),
            sockets: pooled,
            free_sockets: pooled,
            requests: pooled,
            max_sockets: self.max_sockets.is_some(),
            max_free_sockets: self.max_free_sockets.is_some(),
        }
    }

    /// Diagnostic completeness check: logs every missing capability and
    /// state property. Never blocks operation.
    pub fn validate(&self) -> bool {
        let report = self.capabilities();
        let checks = [
            ("name", report.name),
            ("create_connection", report.create_connection),
            ("keep_alive", report.keep_alive),
            ("destroy", report.destroy),
            ("free_socket", report.free_socket),
            ("sockets", report.sockets),
            ("free_sockets", report.free_sockets),
            ("requests", report.requests),
            ("max_sockets", report.max_sockets),
            ("max_free_sockets", report.max_free_sockets),
        ];
        for (capability, present) in checks {
            if !present {
                warn!(capability, "tunnel agent is missing a capability");
            }
        }
        report.complete()
    }

    // ── Pool operations ────────────────────────────────────────────

    /// Open (or reuse) a connection to the destination. Secure endpoints
    /// get a TLS connection with verification relaxed for the tunnel hop.
    pub async fn create_connection(&self, opts: &ConnectOptions) -> io::Result<TunnelSocket> {
        let mut opts = opts.clone();
        opts.secure = opts.secure || self.secure_endpoint;
        let bucket = opts.bucket();

        if let Some(pool) = &self.pool {
            let mut pool = lock(pool);
            if let Some(sock) = pool.free_sockets.get_mut(&bucket).and_then(Vec::pop) {
                *pool.sockets.entry(bucket).or_insert(0) += 1;
                return Ok(sock);
            }
        }

        let sock = match &self.connect {
            Some(dial) => dial.as_ref()(opts).await?,
            None => default_connect(opts).await?,
        };

        if let Some(pool) = &self.pool {
            let mut pool = lock(pool);
            *pool.sockets.entry(bucket.clone()).or_insert(0) += 1;
            pool.free_sockets.entry(bucket).or_default();
        }

        Ok(sock)
    }

    /// Enable keep-alive on a pooled socket. Returns `false` (and logs)
    /// when the socket rejects the option; never raises.
    pub fn keep_alive(&self, sock: &TunnelSocket) -> bool {
        match &self.keep_alive {
            Some(f) => f.as_ref()(sock),
            None => default_keep_alive(sock),
        }
    }

    /// Best-effort teardown of every tracked socket in every bucket.
    pub fn destroy(&self) {
        let Some(pool) = &self.pool else { return };
        let mut pool = lock(pool);
        match &self.destroy {
            Some(f) => f.as_ref()(&mut pool),
            None => default_destroy(&mut pool),
        }
    }

    /// Return a socket to its destination bucket, or destroy it when the
    /// bucket does not exist. Returns whether the socket was pooled.
    pub fn free_socket(&self, sock: TunnelSocket, opts: &ConnectOptions) -> bool {
        let Some(pool) = &self.pool else {
            sock.close();
            return false;
        };
        let bucket = opts.bucket();
        let max_free = self.max_free_sockets.unwrap_or(DEFAULT_MAX_FREE_SOCKETS);
        let mut pool = lock(pool);
        match &self.free {
            Some(f) => f.as_ref()(&mut pool, sock, &bucket, max_free),
            None => default_free(&mut pool, sock, &bucket, max_free),
        }
    }
}

/// Fill every absent capability with its conforming default.
///
/// Capabilities the agent already carries are never replaced, so a second
/// application is a no-op.
pub fn adapt(mut agent: TunnelAgent) -> TunnelAgent {
    if agent.name.is_none() {
        agent.name = Some(DEFAULT_AGENT_NAME.to_string());
    }
    if agent.connect.is_none() {
        debug!("installing default create_connection");
        agent.connect = Some(Arc::new(|opts| default_connect(opts).boxed()));
    }
    if agent.keep_alive.is_none() {
        agent.keep_alive = Some(Arc::new(default_keep_alive));
    }
    if agent.destroy.is_none() {
        agent.destroy = Some(Arc::new(default_destroy));
    }
    if agent.free.is_none() {
        agent.free = Some(Arc::new(default_free));
    }
    if agent.pool.is_none() {
        agent.pool = Some(Arc::new(Mutex::new(PoolBuckets::default())));
    }
    if agent.max_sockets.is_none() {
        agent.max_sockets = Some(usize::MAX);
    }
    if agent.max_free_sockets.is_none() {
        agent.max_free_sockets = Some(DEFAULT_MAX_FREE_SOCKETS);
    }
    agent
}

// ── Capability defaults ─────────────────────────────────────────────

async fn default_connect(opts: ConnectOptions) -> io::Result<TunnelSocket> {
    let stream = TcpStream::connect((opts.host.as_str(), opts.port)).await?;

    if !opts.secure {
        return Ok(TunnelSocket::Plain(stream));
    }

    // Verification is relaxed for the tunnel hop only.
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(io::Error::other)?;
    let connector = tokio_native_tls::TlsConnector::from(connector);
    let tls = connector
        .connect(&opts.host, stream)
        .await
        .map_err(io::Error::other)?;
    Ok(TunnelSocket::Tls(tls))
}

fn default_keep_alive(sock: &TunnelSocket) -> bool {
    match sock.set_keep_alive(KEEP_ALIVE_PROBE) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "socket rejected keep-alive");
            false
        }
    }
}

fn default_destroy(pool: &mut PoolBuckets) {
    for (bucket, sockets) in pool.free_sockets.drain() {
        debug!(bucket = %bucket, count = sockets.len(), "closing pooled sockets");
        for sock in sockets {
            // One stubborn socket must not stop the rest.
            sock.close();
        }
    }
    pool.sockets.clear();
    pool.requests.clear();
}

fn default_free(pool: &mut PoolBuckets, sock: TunnelSocket, bucket: &str, max_free: usize) -> bool {
    if let Some(open) = pool.sockets.get_mut(bucket) {
        *open = open.saturating_sub(1);
    }
    match pool.free_sockets.get_mut(bucket) {
        Some(free) if free.len() < max_free => {
            free.push(sock);
            true
        }
        _ => {
            sock.close();
            false
        }
    }
}

fn lock(pool: &Mutex<PoolBuckets>) -> MutexGuard<'_, PoolBuckets> {
    // Pool bookkeeping stays usable after a poisoned lock.
    pool.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::PROXY_TIMEOUT;
    use tokio::net::TcpListener;

    fn proxy_config(url: &str, protocol: ProxyProtocol) -> ProxyConfig {
        ProxyConfig {
            url: url.to_string(),
            protocol,
            auth: None,
            timeout: PROXY_TIMEOUT,
        }
    }

    async fn local_listener() -> (TcpListener, ConnectOptions) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, ConnectOptions::new("127.0.0.1", addr.port()))
    }

    #[test]
    fn adapt_installs_every_missing_capability() {
        let agent = TunnelAgent::new(false);
        assert!(!agent.capabilities().complete());

        let agent = adapt(agent);
        assert!(agent.capabilities().complete());
        assert_eq!(agent.name(), DEFAULT_AGENT_NAME);
        assert_eq!(agent.max_sockets(), Some(usize::MAX));
        assert_eq!(agent.max_free_sockets(), Some(DEFAULT_MAX_FREE_SOCKETS));
    }

    #[test]
    fn adapt_is_idempotent() {
        let agent = adapt(TunnelAgent::new(false));
        let before = agent.capabilities();
        let agent = adapt(agent);
        assert_eq!(agent.capabilities(), before);
    }

    #[test]
    fn adapt_keeps_present_capabilities() {
        let agent = TunnelAgent::new(false)
            .with_name("custom-agent")
            .with_keep_alive(|_| false)
            .with_max_free_sockets(4);
        let agent = adapt(adapt(agent));

        assert_eq!(agent.name(), "custom-agent");
        assert_eq!(agent.max_free_sockets(), Some(4));
        // The custom keep-alive (always-false) survived both adaptations.
        let report = agent.capabilities();
        assert!(report.complete());
    }

    #[test]
    fn validate_reports_missing_and_complete() {
        assert!(!TunnelAgent::new(false).validate());
        assert!(adapt(TunnelAgent::new(false)).validate());
    }

    #[test]
    fn for_proxy_extracts_target() {
        let agent =
            TunnelAgent::for_proxy(&proxy_config("http://proxy.internal:3128", ProxyProtocol::Http))
                .unwrap();
        let target = agent.target().unwrap();
        assert_eq!(target.host, "proxy.internal");
        assert_eq!(target.port, 3128);
        assert!(!agent.is_secure());
    }

    #[test]
    fn for_proxy_defaults_port_and_secure_flag() {
        let agent =
            TunnelAgent::for_proxy(&proxy_config("https://proxy.internal", ProxyProtocol::Https))
                .unwrap();
        assert_eq!(agent.target().unwrap().port, DEFAULT_PROXY_PORT);
        assert!(agent.is_secure());
    }

    #[test]
    fn for_proxy_rejects_socks5() {
        let result =
            TunnelAgent::for_proxy(&proxy_config("socks5://127.0.0.1:1080", ProxyProtocol::Socks5));
        assert!(matches!(result, Err(AgentError::Unsupported(_))));
    }

    #[test]
    fn proxy_authorization_encodes_credentials() {
        let mut config = proxy_config("http://proxy.internal:3128", ProxyProtocol::Http);
        config.auth = Some(ProxyAuth {
            username: "user".into(),
            password: "pass".into(),
        });
        let agent = TunnelAgent::for_proxy(&config).unwrap();
        assert_eq!(
            agent.proxy_authorization().unwrap(),
            // "user:pass"
            "Basic dXNlcjpwYXNz"
        );

        let plain = TunnelAgent::new(false);
        assert!(plain.proxy_authorization().is_none());
    }

    #[tokio::test]
    async fn create_connection_dials_plain_tcp() {
        let (listener, opts) = local_listener().await;
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let agent = adapt(TunnelAgent::new(false));
        let sock = agent.create_connection(&opts).await.unwrap();
        assert_eq!(agent.open_count(&opts.bucket()), 1);
        assert!(agent.keep_alive(&sock));
        sock.close();
    }

    #[tokio::test]
    async fn create_connection_fails_cleanly_when_unreachable() {
        // Bind a listener, grab its port, then drop it so nothing answers.
        let (listener, opts) = local_listener().await;
        drop(listener);

        let agent = adapt(TunnelAgent::new(false));
        assert!(agent.create_connection(&opts).await.is_err());
        assert_eq!(agent.open_count(&opts.bucket()), 0);
    }

    #[tokio::test]
    async fn free_socket_returns_to_known_bucket_and_reuses() {
        let (listener, opts) = local_listener().await;
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let agent = adapt(TunnelAgent::new(false));
        let sock = agent.create_connection(&opts).await.unwrap();

        assert!(agent.free_socket(sock, &opts));
        assert_eq!(agent.free_count(&opts.bucket()), 1);
        assert_eq!(agent.open_count(&opts.bucket()), 0);

        // Second connection must come from the pool, not a fresh dial.
        let reused = agent.create_connection(&opts).await.unwrap();
        assert_eq!(agent.free_count(&opts.bucket()), 0);
        assert_eq!(agent.open_count(&opts.bucket()), 1);
        reused.close();
    }

    #[tokio::test]
    async fn free_socket_destroys_when_bucket_is_unknown() {
        let (listener, opts) = local_listener().await;
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        // Raw socket, never tracked by this agent's pool.
        let stream = TcpStream::connect(("127.0.0.1", opts.port)).await.unwrap();
        let agent = adapt(TunnelAgent::new(false));
        let elsewhere = ConnectOptions::new("10.0.0.1", 443);
        assert!(!agent.free_socket(TunnelSocket::Plain(stream), &elsewhere));
        assert_eq!(agent.free_count(&elsewhere.bucket()), 0);
    }

    #[tokio::test]
    async fn destroy_clears_every_bucket() {
        let (listener, opts) = local_listener().await;
        tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let _sock = sock;
                    tokio::time::sleep(Duration::from_secs(5)).await;
                });
            }
        });

        let agent = adapt(TunnelAgent::new(false));
        let a = agent.create_connection(&opts).await.unwrap();
        let b = agent.create_connection(&opts).await.unwrap();
        agent.free_socket(a, &opts);
        agent.free_socket(b, &opts);
        assert_eq!(agent.free_count(&opts.bucket()), 2);

        agent.destroy();
        assert_eq!(agent.free_count(&opts.bucket()), 0);
        assert_eq!(agent.open_count(&opts.bucket()), 0);
    }

    #[tokio::test]
    async fn custom_connector_is_used() {
        let (listener, opts) = local_listener().await;
        let port = opts.port;
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let agent = adapt(TunnelAgent::new(false).with_connector(move |_opts| {
            async move {
                let stream = TcpStream::connect(("127.0.0.1", port)).await?;
                Ok(TunnelSocket::Plain(stream))
            }
            .boxed()
        }));

        // Destination is bogus; the custom connector ignores it.
        let sock = agent
            .create_connection(&ConnectOptions::new("203.0.113.1", 1))
            .await
            .unwrap();
        sock.close();
    }
}
