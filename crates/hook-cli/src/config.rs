//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [webhook]
//! url = "https://hooks.example.com/services/T000/B000/XXXX"
//! proxy = "http://proxy.internal:3128"
//! timeout_ms = 10000
//! connect_timeout_ms = 5000
//! enabled = true
//!
//! [log]
//! format = "json"
//! ```

use std::path::Path;

use serde::Deserialize;

use hook_core::{parse_proxy, NotifierConfig};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub webhook: WebhookSection,

    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSection {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            url: None,
            proxy: None,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            enabled: default_enabled(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

impl WebhookSection {
    /// Build the notifier config, letting a command-line URL win over the file.
    pub fn to_notifier_config(&self, url_override: Option<&str>) -> Result<NotifierConfig, String> {
        let url = url_override
            .map(str::to_string)
            .or_else(|| self.url.clone())
            .ok_or_else(|| "No webhook URL: pass --url or set [webhook].url".to_string())?;

        let config = NotifierConfig::new(url)
            .with_request_timeout(self.timeout_ms)
            .with_connect_timeout(self.connect_timeout_ms)
            .with_enabled(self.enabled);
        config.endpoint_url().map_err(|e| e.to_string())?;
        Ok(config)
    }

    pub fn proxy_address(&self) -> &str {
        self.proxy.as_deref().unwrap_or("")
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(ref url) = self.webhook.url {
            NotifierConfig::new(url.as_str())
                .endpoint_url()
                .map_err(|e| format!("Invalid [webhook].url: {}", e))?;
        }

        if let Some(ref proxy) = self.webhook.proxy {
            parse_proxy(proxy).map_err(|e| format!("Invalid [webhook].proxy: {}", e))?;
        }

        if self.webhook.timeout_ms == 0 {
            return Err("[webhook].timeout_ms must be greater than zero".into());
        }

        match self.log.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}
