use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the picshare binary.
#[derive(Debug, Parser)]
#[command(
    name = "picshare",
    version,
    about = "Picshare post service and like notifier"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PICSHARE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the posts HTTP service.
    Serve(Box<ServeArgs>),
    /// Run the like-notification consumer and its query endpoint.
    Notify(Box<NotifyArgs>),
    /// Run both services in one process, sharing one broker.
    All(Box<AllArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct NotifyArgs {
    #[command(flatten)]
    pub overrides: NotifyOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct AllArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,

    /// Override the notifier listener port.
    #[arg(long = "server-notifier-port", value_name = "PORT")]
    pub notifier_port: Option<u16>,
}

/// Overrides accepted by every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct SharedOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the broker backend (redis|memory).
    #[arg(long = "broker-backend", value_name = "BACKEND")]
    pub broker_backend: Option<String>,

    /// Override the broker Redis URL.
    #[arg(long = "broker-redis-url", value_name = "URL")]
    pub broker_redis_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub shared: SharedOverrides,

    /// Override the posts listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the cache backend (redis|memory).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the cache Redis URL.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Override the lifetime of cached post views.
    #[arg(long = "cache-post-ttl-seconds", value_name = "SECONDS")]
    pub cache_post_ttl_seconds: Option<u64>,

    /// Override the lifetime of the cached most-liked ranking.
    #[arg(long = "cache-most-liked-ttl-seconds", value_name = "SECONDS")]
    pub cache_most_liked_ttl_seconds: Option<u64>,

    /// Override the per-request deadline.
    #[arg(long = "request-deadline-seconds", value_name = "SECONDS")]
    pub request_deadline_seconds: Option<u64>,

    /// Override the rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the rate limit request ceiling.
    #[arg(long = "rate-limit-max-requests", value_name = "COUNT")]
    pub rate_limit_max_requests: Option<u64>,

    /// Override the base URL signed image links point at.
    #[arg(long = "blobs-base-url", value_name = "URL")]
    pub blobs_base_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct NotifyOverrides {
    #[command(flatten)]
    pub shared: SharedOverrides,

    /// Override the notifier listener port.
    #[arg(long = "server-notifier-port", value_name = "PORT")]
    pub notifier_port: Option<u16>,

    /// Override the notifications database URL.
    #[arg(long = "database-notifications-url", value_name = "URL")]
    pub notifications_url: Option<String>,

    /// Override this consumer's name within the group.
    #[arg(long = "broker-consumer-name", value_name = "NAME")]
    pub consumer_name: Option<String>,

    /// Override the duplicate-suppression policy (none|delivery|post_and_liker).
    #[arg(long = "broker-dedup", value_name = "POLICY")]
    pub dedup: Option<String>,
}
