//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::events::{DEFAULT_DEDUP_WINDOW, DedupPolicy};

mod cli;

pub use cli::{
    AllArgs, CliArgs, Command, NotifyArgs, NotifyOverrides, ServeArgs, ServeOverrides,
    SharedOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "picshare";
const ENV_PREFIX: &str = "PICSHARE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_NOTIFIER_PORT: u16 = 8081;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_POST_TTL_SECS: u64 = 5 * 60 * 60;
const DEFAULT_MOST_LIKED_TTL_SECS: u64 = 30 * 60;
const DEFAULT_MOST_LIKED_LIMIT: u32 = 3;
const DEFAULT_INVALIDATION_ATTEMPTS: u32 = 3;
const DEFAULT_INVALIDATION_BACKOFF_MS: u64 = 50;
const DEFAULT_INVALIDATION_TIMEOUT_MS: u64 = 500;
const DEFAULT_CACHE_MEMORY_CAPACITY: usize = 10_000;
const DEFAULT_TOPIC: &str = "like_exchange:new_like";
const DEFAULT_CONSUMER_GROUP: &str = "notifications";
const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_BLOCK_MS: u64 = 5_000;
const DEFAULT_BATCH_SIZE: usize = 16;
const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 1_000;
const DEFAULT_BLOB_BASE_URL: &str = "http://127.0.0.1:9000/images";
const DEFAULT_BLOB_URL_TTL_SECS: u64 = 60 * 60;
const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 10;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 3;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 3;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub broker: BrokerSettings,
    pub blobs: BlobSettings,
    pub requests: RequestSettings,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub api_addr: SocketAddr,
    pub notifier_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    notifications_url: Option<String>,
    pub max_connections: NonZeroU32,
}

impl DatabaseSettings {
    /// The notification store may live in its own database; it defaults to the
    /// posts database.
    pub fn notifications_url(&self) -> Option<&str> {
        self.notifications_url.as_deref().or(self.url.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Redis,
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Backend::Redis),
            "memory" => Ok(Backend::Memory),
            other => Err(format!("unknown backend `{other}` (expected redis|memory)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: Backend,
    pub redis_url: String,
    pub post_ttl: Duration,
    pub most_liked_ttl: Duration,
    pub most_liked_limit: NonZeroU32,
    pub invalidation_attempts: NonZeroU32,
    pub invalidation_backoff: Duration,
    pub invalidation_timeout: Duration,
    pub memory_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub backend: Backend,
    pub redis_url: String,
    pub topic: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub publish_timeout: Duration,
    pub block: Duration,
    pub batch_size: NonZeroUsize,
    pub reconnect_backoff: Duration,
    pub dedup: DedupPolicy,
    pub dedup_window: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct BlobSettings {
    pub base_url: String,
    pub signing_secret: Option<String>,
    pub url_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub deadline: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Notify(args)) => raw.apply_notify_overrides(&args.overrides),
        Some(Command::All(args)) => {
            raw.apply_serve_overrides(&args.overrides);
            if let Some(port) = args.notifier_port {
                raw.server.notifier_port = Some(port);
            }
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    broker: RawBrokerSettings,
    blobs: RawBlobSettings,
    requests: RawRequestSettings,
    rate_limit: RawRateLimitSettings,
}

impl RawSettings {
    fn apply_shared_overrides(&mut self, overrides: &SharedOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(backend) = overrides.broker_backend.as_ref() {
            self.broker.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.broker_redis_url.as_ref() {
            self.broker.redis_url = Some(url.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_shared_overrides(&overrides.shared);

        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(ttl) = overrides.cache_post_ttl_seconds {
            self.cache.post_ttl_seconds = Some(ttl);
        }
        if let Some(ttl) = overrides.cache_most_liked_ttl_seconds {
            self.cache.most_liked_ttl_seconds = Some(ttl);
        }
        if let Some(deadline) = overrides.request_deadline_seconds {
            self.requests.deadline_seconds = Some(deadline);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = Some(max);
        }
        if let Some(url) = overrides.blobs_base_url.as_ref() {
            self.blobs.base_url = Some(url.clone());
        }
    }

    fn apply_notify_overrides(&mut self, overrides: &NotifyOverrides) {
        self.apply_shared_overrides(&overrides.shared);

        if let Some(port) = overrides.notifier_port {
            self.server.notifier_port = Some(port);
        }
        if let Some(url) = overrides.notifications_url.as_ref() {
            self.database.notifications_url = Some(url.clone());
        }
        if let Some(name) = overrides.consumer_name.as_ref() {
            self.broker.consumer_name = Some(name.clone());
        }
        if let Some(policy) = overrides.dedup.as_ref() {
            self.broker.dedup = Some(policy.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            broker,
            blobs,
            requests,
            rate_limit,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            broker: build_broker_settings(broker)?,
            blobs: build_blob_settings(blobs)?,
            requests: build_request_settings(requests)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = non_zero_port(server.port.unwrap_or(DEFAULT_PORT), "server.port")?;
    let notifier_port = non_zero_port(
        server.notifier_port.unwrap_or(DEFAULT_NOTIFIER_PORT),
        "server.notifier_port",
    )?;
    if port == notifier_port {
        return Err(LoadError::invalid(
            "server.notifier_port",
            "must differ from server.port",
        ));
    }

    let api_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.api_addr", reason))?;
    let notifier_addr = parse_socket_addr(&host, notifier_port)
        .map_err(|reason| LoadError::invalid("server.notifier_addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        api_addr,
        notifier_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        notifications_url: non_blank(database.notifications_url),
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = parse_backend(cache.backend, "cache.backend")?;
    let redis_url = non_blank(cache.redis_url).unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());

    Ok(CacheSettings {
        backend,
        redis_url,
        post_ttl: positive_secs(
            cache.post_ttl_seconds.unwrap_or(DEFAULT_POST_TTL_SECS),
            "cache.post_ttl_seconds",
        )?,
        most_liked_ttl: positive_secs(
            cache
                .most_liked_ttl_seconds
                .unwrap_or(DEFAULT_MOST_LIKED_TTL_SECS),
            "cache.most_liked_ttl_seconds",
        )?,
        most_liked_limit: non_zero_u32(
            cache
                .most_liked_limit
                .unwrap_or(DEFAULT_MOST_LIKED_LIMIT)
                .into(),
            "cache.most_liked_limit",
        )?,
        invalidation_attempts: non_zero_u32(
            cache
                .invalidation_attempts
                .unwrap_or(DEFAULT_INVALIDATION_ATTEMPTS)
                .into(),
            "cache.invalidation_attempts",
        )?,
        invalidation_backoff: Duration::from_millis(
            cache
                .invalidation_backoff_ms
                .unwrap_or(DEFAULT_INVALIDATION_BACKOFF_MS),
        ),
        invalidation_timeout: positive_millis(
            cache
                .invalidation_timeout_ms
                .unwrap_or(DEFAULT_INVALIDATION_TIMEOUT_MS),
            "cache.invalidation_timeout_ms",
        )?,
        memory_capacity: non_zero_usize(
            cache
                .memory_capacity
                .unwrap_or(DEFAULT_CACHE_MEMORY_CAPACITY),
            "cache.memory_capacity",
        )?,
    })
}

fn build_broker_settings(broker: RawBrokerSettings) -> Result<BrokerSettings, LoadError> {
    let backend = parse_backend(broker.backend, "broker.backend")?;
    let redis_url = non_blank(broker.redis_url).unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
    let topic = non_blank(broker.topic).unwrap_or_else(|| DEFAULT_TOPIC.to_string());
    let consumer_group =
        non_blank(broker.consumer_group).unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string());
    let consumer_name = non_blank(broker.consumer_name)
        .unwrap_or_else(|| format!("notifier-{}", std::process::id()));

    let dedup = match broker.dedup {
        Some(raw) => raw
            .parse::<DedupPolicy>()
            .map_err(|reason| LoadError::invalid("broker.dedup", reason))?,
        None => DedupPolicy::default(),
    };

    Ok(BrokerSettings {
        backend,
        redis_url,
        topic,
        consumer_group,
        consumer_name,
        publish_timeout: positive_millis(
            broker
                .publish_timeout_ms
                .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_MS),
            "broker.publish_timeout_ms",
        )?,
        block: positive_millis(
            broker.block_ms.unwrap_or(DEFAULT_BLOCK_MS),
            "broker.block_ms",
        )?,
        batch_size: non_zero_usize(
            broker.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            "broker.batch_size",
        )?,
        reconnect_backoff: positive_millis(
            broker
                .reconnect_backoff_ms
                .unwrap_or(DEFAULT_RECONNECT_BACKOFF_MS),
            "broker.reconnect_backoff_ms",
        )?,
        dedup,
        dedup_window: non_zero_usize(
            broker.dedup_window.unwrap_or(DEFAULT_DEDUP_WINDOW),
            "broker.dedup_window",
        )?,
    })
}

fn build_blob_settings(blobs: RawBlobSettings) -> Result<BlobSettings, LoadError> {
    let base_url = non_blank(blobs.base_url).unwrap_or_else(|| DEFAULT_BLOB_BASE_URL.to_string());
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(LoadError::invalid(
            "blobs.base_url",
            "must start with http:// or https://",
        ));
    }

    Ok(BlobSettings {
        base_url: base_url.trim_end_matches('/').to_string(),
        signing_secret: non_blank(blobs.signing_secret),
        url_ttl: positive_secs(
            blobs.url_ttl_seconds.unwrap_or(DEFAULT_BLOB_URL_TTL_SECS),
            "blobs.url_ttl_seconds",
        )?,
    })
}

fn build_request_settings(requests: RawRequestSettings) -> Result<RequestSettings, LoadError> {
    Ok(RequestSettings {
        deadline: positive_secs(
            requests
                .deadline_seconds
                .unwrap_or(DEFAULT_REQUEST_DEADLINE_SECS),
            "requests.deadline_seconds",
        )?,
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_seconds = non_zero_u32(
        rate_limit
            .window_seconds
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        "rate_limit.window_seconds",
    )?;
    let max_requests = non_zero_u32(
        rate_limit
            .max_requests
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
        "rate_limit.max_requests",
    )?;

    Ok(RateLimitSettings {
        window_seconds,
        max_requests,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    notifier_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    notifications_url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    redis_url: Option<String>,
    post_ttl_seconds: Option<u64>,
    most_liked_ttl_seconds: Option<u64>,
    most_liked_limit: Option<u32>,
    invalidation_attempts: Option<u32>,
    invalidation_backoff_ms: Option<u64>,
    invalidation_timeout_ms: Option<u64>,
    memory_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrokerSettings {
    backend: Option<String>,
    redis_url: Option<String>,
    topic: Option<String>,
    consumer_group: Option<String>,
    consumer_name: Option<String>,
    publish_timeout_ms: Option<u64>,
    block_ms: Option<u64>,
    batch_size: Option<usize>,
    reconnect_backoff_ms: Option<u64>,
    dedup: Option<String>,
    dedup_window: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBlobSettings {
    base_url: Option<String>,
    signing_secret: Option<String>,
    url_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRequestSettings {
    deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_backend(value: Option<String>, key: &'static str) -> Result<Backend, LoadError> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|reason: String| LoadError::invalid(key, reason)),
        None => Ok(Backend::Redis),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_port(port: u16, key: &'static str) -> Result<u16, LoadError> {
    if port == 0 {
        return Err(LoadError::invalid(key, "port must be greater than zero"));
    }
    Ok(port)
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
