//! Configuration for the workspace service
//!
//! Configuration is loaded entirely from environment variables, in line with
//! the twelve-factor posture of a multi-tenant backend (no config file, no
//! `$EDITOR` round trip — this isn't a tool a human tunes interactively).

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub bind_addr: SocketAddr,

    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Secret used to sign and verify bearer tokens
    pub jwt_secret: String,

    /// Root directory under which all workspace trees live
    pub storage_path: PathBuf,

    /// CORS origin allowed to call this service (None = same-origin only)
    pub cors_origin: Option<String>,

    /// Provider API credentials, looked up by provider name
    pub providers: ProviderCredentials,

    /// Process supervisor tuning
    pub process: ProcessConfig,

    /// Optional directory containing a prebuilt frontend bundle to serve as a fallback
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub google: Option<String>,
}

impl ProviderCredentials {
    pub fn for_provider(&self, provider: &str) -> Option<&str> {
        match provider {
            "openai" => self.openai.as_deref(),
            "anthropic" => self.anthropic.as_deref(),
            "google" => self.google.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// First port handed out to a dev server
    pub base_port: u16,
    /// Size of the port pool
    pub max_ports: u16,
    /// Timeout for the dependency-install step
    pub install_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL on stop()
    pub stop_grace_period: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            base_port: 4100,
            max_ports: 100,
            install_timeout: Duration::from_secs(120),
            stop_grace_period: Duration::from_secs(5),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the environment, falling back to documented defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env_u16("PORT", 8080);
        let bind_addr = format!("0.0.0.0:{port}").parse()?;

        let process = ProcessConfig {
            base_port: env_u16("PROCESS_BASE_PORT", port + 1),
            max_ports: env_u16("PROCESS_MAX_PORTS", 100),
            install_timeout: Duration::from_secs(env_u64("INSTALL_TIMEOUT_SECS", 120)),
            stop_grace_period: Duration::from_secs(5),
        };

        Ok(Self {
            bind_addr,
            database_path: PathBuf::from(env_string("DATABASE_URL", "./data/forge.sqlite3")),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "dev-only-insecure-secret".to_string()),
            storage_path: PathBuf::from(env_string("STORAGE_PATH", "./data/apps")),
            cors_origin: env::var("CORS_ORIGIN").ok(),
            providers: ProviderCredentials {
                openai: env::var("OPENAI_API_KEY").ok(),
                anthropic: env::var("ANTHROPIC_API_KEY").ok(),
                google: env::var("GOOGLE_API_KEY").ok(),
            },
            process,
            static_dir: env::var("STATIC_DIR").ok().map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_config_default_matches_documented_values() {
        let process = ProcessConfig::default();
        assert_eq!(process.install_timeout, Duration::from_secs(120));
        assert_eq!(process.stop_grace_period, Duration::from_secs(5));
    }

    #[test]
    fn provider_credentials_lookup_by_name() {
        let creds = ProviderCredentials {
            anthropic: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert_eq!(creds.for_provider("anthropic"), Some("sk-test"));
        assert_eq!(creds.for_provider("openai"), None);
        assert_eq!(creds.for_provider("unknown"), None);
    }
}
