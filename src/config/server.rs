use std::{net::IpAddr, time::Duration};

use serde::{Deserialize, Serialize};

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hard ceiling on request bodies, enforced before any handler runs.
    /// Kept above the ingest ceiling so oversize webhooks get the ingress
    /// error rather than a bare transport error.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Outbound HTTP client used for resource fetches and task invocation.
    #[serde(default)]
    pub http_client: HttpClientConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            http_client: HttpClientConfig::default(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024 // 10 MB
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpClientConfig {
    /// Total time allowed for a request, including reading the body.
    #[serde(default = "default_http_client_timeout")]
    pub timeout_secs: u64,

    /// Time allowed to establish a connection.
    #[serde(default = "default_http_client_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle connections kept per host.
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Idle connection timeout in seconds.
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,

    /// TCP keepalive interval in seconds. 0 disables keepalive.
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_client_timeout(),
            connect_timeout_secs: default_http_client_connect_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            tcp_keepalive_secs: default_tcp_keepalive(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpClientConfig {
    /// Build a reqwest Client from this configuration.
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(self.pool_idle_timeout_secs))
            .user_agent(&self.user_agent);

        if self.tcp_keepalive_secs > 0 {
            builder = builder.tcp_keepalive(Duration::from_secs(self.tcp_keepalive_secs));
        }

        builder.build()
    }
}

// Resource fetches are bounded by size, so a minute is plenty
fn default_http_client_timeout() -> u64 {
    60
}

fn default_http_client_connect_timeout() -> u64 {
    10
}

fn default_pool_max_idle_per_host() -> usize {
    16
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_tcp_keepalive() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("hookvault/{}", env!("CARGO_PKG_VERSION"))
}
