use std::time::Duration;

use anyhow::Context;
use unidl_core::models::settings::{AppSettings, ProxySettings};

const USER_AGENT: &str = concat!("unidl/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn proxy_url(proxy: &ProxySettings) -> Option<String> {
    if !proxy.enabled || proxy.host.is_empty() {
        return None;
    }
    let scheme = match proxy.proxy_type.as_str() {
        "socks5" => "socks5",
        "https" => "https",
        _ => "http",
    };
    if !proxy.username.is_empty() {
        Some(format!(
            "{}://{}:{}@{}:{}",
            scheme,
            urlencoding::encode(&proxy.username),
            urlencoding::encode(&proxy.password),
            proxy.host,
            proxy.port
        ))
    } else {
        Some(format!("{}://{}:{}", scheme, proxy.host, proxy.port))
    }
}

pub fn apply_proxy(
    builder: reqwest::ClientBuilder,
    proxy: &ProxySettings,
) -> reqwest::ClientBuilder {
    let Some(url) = proxy_url(proxy) else {
        return builder;
    };
    match reqwest::Proxy::all(&url) {
        Ok(p) => builder.proxy(p),
        Err(e) => {
            tracing::warn!("Invalid proxy URL: {}", e);
            builder
        }
    }
}

/// Shared client for every backend call. No total timeout: artifact
/// downloads may legitimately run for a long time.
pub fn build_client(settings: &AppSettings) -> anyhow::Result<reqwest::Client> {
    let builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT);
    apply_proxy(builder, &settings.proxy)
        .build()
        .context("failed to build HTTP client")
}
