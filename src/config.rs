use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::session::StoreSettings;

/// Prefix for environment overrides, e.g. `PHOTOBOOTH_SESSIONS__TTL_SECS`.
const ENV_PREFIX: &str = "PHOTOBOOTH";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long, env = "BIND_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Public base URL used to build download links
    #[arg(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Directory holding the kiosk UI
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<String>,

    /// Session lifetime in seconds
    #[arg(long, env = "SESSION_TTL_SECS")]
    pub ttl_secs: Option<u64>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sessions: SessionConfig,
    pub resilience: ResilienceConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Empty means `http://localhost:<port>/`.
    pub public_base_url: String,
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub max_images: usize,
    pub max_image_bytes: usize,
    /// 0 disables the cap.
    pub max_live_sessions: usize,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
    pub requests_per_second: f32,
    pub burst_size: f32,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub json: bool,
    pub filter: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 5001)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.public_base_url", "")?
            .set_default("server.static_dir", "public")?
            .set_default("sessions.ttl_secs", 30 * 60)?
            .set_default("sessions.max_images", 3)?
            .set_default("sessions.max_image_bytes", 10 * 1024 * 1024)?
            .set_default("sessions.max_live_sessions", 500)?
            .set_default("sessions.sweep_interval_secs", 60)?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 20.0)?
            .set_default("resilience.body_limit_bytes", 48 * 1024 * 1024)?
            .set_default("telemetry.json", false)?
            .set_default("telemetry.filter", "info,photobooth_share=debug")?;

        // 2. Config file: explicit path is required, ./config.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. PHOTOBOOTH_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (clap also folds in their plain env vars)
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(url) = cli.public_base_url {
            builder = builder.set_override("server.public_base_url", url)?;
        }
        if let Some(dir) = cli.static_dir {
            builder = builder.set_override("server.static_dir", dir)?;
        }
        if let Some(ttl) = cli.ttl_secs {
            builder = builder.set_override("sessions.ttl_secs", ttl)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("telemetry.json", json)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.sessions.ttl_secs == 0 {
            return Err(config::ConfigError::Message(
                "sessions.ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.sessions.max_images == 0 {
            return Err(config::ConfigError::Message(
                "sessions.max_images must be greater than zero".to_string(),
            ));
        }
        if self.sessions.max_image_bytes == 0 {
            return Err(config::ConfigError::Message(
                "sessions.max_image_bytes must be greater than zero".to_string(),
            ));
        }
        if self.sessions.sweep_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "sessions.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        self.server.public_base_url()?;
        Ok(())
    }

    /// Store limits derived from this configuration.
    pub fn store_settings(&self) -> Result<StoreSettings, config::ConfigError> {
        Ok(StoreSettings {
            ttl: Duration::from_secs(self.sessions.ttl_secs),
            max_images: self.sessions.max_images,
            max_image_bytes: self.sessions.max_image_bytes,
            max_live_sessions: (self.sessions.max_live_sessions > 0)
                .then_some(self.sessions.max_live_sessions),
            public_base_url: self.server.public_base_url()?,
        })
    }
}

impl ServerConfig {
    /// Parsed public base URL, always ending in `/` so relative joins
    /// append rather than replace the last path segment.
    pub fn public_base_url(&self) -> Result<Url, config::ConfigError> {
        let raw = self.public_base_url.trim();
        let raw = if raw.is_empty() {
            format!("http://localhost:{}/", self.port)
        } else if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };

        let url = Url::parse(&raw).map_err(|e| {
            config::ConfigError::Message(format!("invalid server.public_base_url {raw:?}: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(config::ConfigError::Message(format!(
                "server.public_base_url must be an http(s) URL, got {raw:?}"
            )));
        }
        Ok(url)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
