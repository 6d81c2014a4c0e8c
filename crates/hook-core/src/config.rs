use std::time::Duration;

use url::Url;

use crate::error::NotifyError;

/// Configuration for a [`Notifier`](crate::Notifier).
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Incoming-webhook URL. The access token normally lives in its path.
    pub endpoint: String,
    /// Upper bound for a whole request, body and response included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// When false, `post_message` logs and drops every message.
    pub enabled: bool,
    pub user_agent: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            enabled: true,
            user_agent: default_user_agent(),
        }
    }
}

pub fn default_user_agent() -> String {
    format!("hook-notify/{}", env!("CARGO_PKG_VERSION"))
}

impl NotifierConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, ms: u64) -> Self {
        self.request_timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Parse and validate the endpoint as an absolute http(s) URL.
    pub fn endpoint_url(&self) -> Result<Url, NotifyError> {
        parse_http_url("webhook URL", &self.endpoint)
    }
}

/// Parse a proxy address. Empty means a direct connection.
///
/// A bare `host:port` is accepted and treated as an `http://` proxy.
pub fn parse_proxy(address: &str) -> Result<Option<Url>, NotifyError> {
    let address = address.trim();
    if address.is_empty() {
        return Ok(None);
    }
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    parse_http_url("proxy address", &candidate).map(Some)
}

fn parse_http_url(field: &'static str, value: &str) -> Result<Url, NotifyError> {
    let url = Url::parse(value).map_err(|e| NotifyError::config(field, value, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(NotifyError::config(field, value, "scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(NotifyError::config(field, value, "missing host"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = NotifierConfig::new("https://hooks.example.com/services/T/B/x");
        assert_eq!(c.request_timeout, Duration::from_secs(10));
        assert_eq!(c.connect_timeout, Duration::from_secs(5));
        assert!(c.enabled);
        assert!(c.user_agent.starts_with("hook-notify/"));
        assert_eq!(c.endpoint_url().unwrap().path(), "/services/T/B/x");
    }

    #[test]
    fn builders_override() {
        let c = NotifierConfig::new("http://localhost:9000/hook")
            .with_request_timeout(250)
            .with_connect_timeout(100)
            .with_enabled(false)
            .with_user_agent("ci-bot");
        assert_eq!(c.request_timeout, Duration::from_millis(250));
        assert_eq!(c.connect_timeout, Duration::from_millis(100));
        assert!(!c.enabled);
        assert_eq!(c.user_agent, "ci-bot");
    }

    #[test]
    fn endpoint_must_be_http() {
        for bad in ["", "not a url", "ftp://example.com/hook", "/relative/path"] {
            let err = NotifierConfig::new(bad).endpoint_url().unwrap_err();
            assert!(
                matches!(err, NotifyError::Config { field: "webhook URL", .. }),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn empty_proxy_means_direct() {
        assert_eq!(parse_proxy("").unwrap(), None);
        assert_eq!(parse_proxy("   ").unwrap(), None);
    }

    #[test]
    fn bare_proxy_gets_http_scheme() {
        let url = parse_proxy("proxy.internal:3128").unwrap().unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("proxy.internal"));
        assert_eq!(url.port(), Some(3128));
    }

    #[test]
    fn malformed_proxy_is_config_error() {
        let err = parse_proxy("http://").unwrap_err();
        assert!(matches!(err, NotifyError::Config { field: "proxy address", .. }), "{err}");
        assert!(parse_proxy("socks9://proxy:1").is_err());
    }
}
