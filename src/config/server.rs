use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ratelimit::RateLimitRule;

const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Lifetime of a login session.
    pub session_ttl_secs: i64,
    pub rate_limits: RateLimits,
}

/// Per-endpoint failure thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub login: RateLimitRule,
    pub signup: RateLimitRule,
    /// Every other mutating endpoint.
    pub mutation: RateLimitRule,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            login: RateLimitRule::LOGIN,
            signup: RateLimitRule::SIGNUP,
            mutation: RateLimitRule::MUTATION,
        }
    }
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ServerConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.session_ttl_secs <= 0 {
            return Err(Error::Config(
                "session_ttl_secs must be positive".to_string(),
            ));
        }
        for (name, rule) in [
            ("login", self.rate_limits.login),
            ("signup", self.rate_limits.signup),
            ("mutation", self.rate_limits.mutation),
        ] {
            if rule.window_secs <= 0 {
                return Err(Error::Config(format!(
                    "rate_limits.{name}.window_secs must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("notebase.db")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            rate_limits: RateLimits::default(),
        }
    }
}
