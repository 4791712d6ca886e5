use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::keys::parse_seed_hex;

// Admin plane configuration sourced from environment variables, optionally
// overridden by the YAML file named in WARDEN_CONFIG.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub token: TokenConfig,
    /// `None` disables the background poller; reloads are then manual only.
    pub policy_reload_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "pg" => Ok(StorageBackend::Postgres),
            other => bail!("unknown storage backend {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    pub leeway_secs: u64,
    /// Ed25519 seed; a random key is generated at boot when absent.
    pub seed: Option<[u8; 32]>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .field("leeway_secs", &self.leeway_secs)
            .field("seed", &self.seed.map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct AdminConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<String>,
    postgres: Option<PostgresOverride>,
    token: Option<TokenOverride>,
    policy_reload_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PostgresOverride {
    url: Option<String>,
    max_connections: Option<u32>,
    connect_timeout_ms: Option<u64>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenOverride {
    issuer: Option<String>,
    audience: Option<String>,
    ttl_secs: Option<u64>,
    leeway_secs: Option<u64>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow::anyhow!("parse {key}: {err}")),
        Err(_) => Ok(default),
    }
}

fn reload_interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl AdminConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("WARDEN_BIND", "0.0.0.0:48080")
            .parse()
            .with_context(|| "parse WARDEN_BIND")?;
        let metrics_bind = env_or("WARDEN_METRICS_BIND", "0.0.0.0:9090")
            .parse()
            .with_context(|| "parse WARDEN_METRICS_BIND")?;
        let storage: StorageBackend = env_or("WARDEN_STORAGE", "memory")
            .parse()
            .with_context(|| "parse WARDEN_STORAGE")?;
        let postgres = match std::env::var("WARDEN_PG_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_parse("WARDEN_PG_MAX_CONNECTIONS", 10)?,
                connect_timeout_ms: env_parse("WARDEN_PG_CONNECT_TIMEOUT_MS", 5_000)?,
                acquire_timeout_ms: env_parse("WARDEN_PG_ACQUIRE_TIMEOUT_MS", 5_000)?,
            }),
            Err(_) => None,
        };
        let seed = match std::env::var("WARDEN_TOKEN_SEED") {
            Ok(raw) => Some(parse_seed_hex(&raw).with_context(|| "parse WARDEN_TOKEN_SEED")?),
            Err(_) => None,
        };
        let token = TokenConfig {
            issuer: env_or("WARDEN_TOKEN_ISSUER", "warden"),
            audience: env_or("WARDEN_TOKEN_AUDIENCE", "warden-admin"),
            ttl: Duration::from_secs(env_parse("WARDEN_TOKEN_TTL_SECS", 1800)?),
            leeway_secs: env_parse("WARDEN_TOKEN_LEEWAY_SECS", 5)?,
            seed,
        };
        let policy_reload_interval =
            reload_interval(env_parse("WARDEN_POLICY_RELOAD_INTERVAL_SECS", 0)?);
        let config = Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            token,
            policy_reload_interval,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("WARDEN_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read WARDEN_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: AdminConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse admin plane config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value.parse().with_context(|| "parse storage")?;
        }
        if let Some(pg) = override_cfg.postgres {
            let base = self.postgres.take();
            let url = pg
                .url
                .or_else(|| base.as_ref().map(|cfg| cfg.url.clone()))
                .context("postgres.url is required")?;
            self.postgres = Some(PostgresConfig {
                url,
                max_connections: pg
                    .max_connections
                    .or(base.as_ref().map(|cfg| cfg.max_connections))
                    .unwrap_or(10),
                connect_timeout_ms: pg
                    .connect_timeout_ms
                    .or(base.as_ref().map(|cfg| cfg.connect_timeout_ms))
                    .unwrap_or(5_000),
                acquire_timeout_ms: pg
                    .acquire_timeout_ms
                    .or(base.as_ref().map(|cfg| cfg.acquire_timeout_ms))
                    .unwrap_or(5_000),
            });
        }
        if let Some(token) = override_cfg.token {
            if let Some(value) = token.issuer {
                self.token.issuer = value;
            }
            if let Some(value) = token.audience {
                self.token.audience = value;
            }
            if let Some(value) = token.ttl_secs {
                self.token.ttl = Duration::from_secs(value);
            }
            if let Some(value) = token.leeway_secs {
                self.token.leeway_secs = value;
            }
        }
        if let Some(secs) = override_cfg.policy_reload_interval_secs {
            self.policy_reload_interval = reload_interval(secs);
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("WARDEN_STORAGE=postgres requires WARDEN_PG_URL");
        }
        if self.token.ttl.is_zero() {
            bail!("token ttl must be positive");
        }
        Ok(())
    }
}
