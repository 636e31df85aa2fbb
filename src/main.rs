use std::{net::SocketAddr, process, sync::Arc, time::Duration};

use picshare::{
    application::{
        error::AppError,
        notifications::NotificationService,
        posts::{PostService, PostServiceDeps},
    },
    cache::{Cache, CacheConfig, MemoryCache, PostCache, RedisCache},
    config::{self, Backend},
    events::{
        Broker, ConsumerConfig, LikePublisher, MemoryBroker, NotificationConsumer,
        RedisStreamBroker, StreamConsumerConfig, WindowedDeduplicator,
    },
    infra::{
        blobs::SignedUrlLinker,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, NotifierState, PostsState},
        telemetry,
    },
};
use tokio::try_join;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    match command {
        config::Command::Serve(_) => run_serve(settings, shutdown).await,
        config::Command::Notify(_) => run_notify(settings, shutdown).await,
        config::Command::All(_) => run_all(settings, shutdown).await,
    }
}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                shutdown.cancel();
            }
            Err(err) => error!(error = %err, "failed to listen for ctrl-c"),
        }
    });
}

async fn run_serve(settings: config::Settings, shutdown: CancellationToken) -> Result<(), AppError> {
    if settings.broker.backend == Backend::Memory {
        warn!("memory broker selected for `serve`; like events will not leave this process");
    }
    let broker = connect_broker(&settings.broker).await?;
    serve_posts(&settings, broker, shutdown).await
}

async fn run_notify(settings: config::Settings, shutdown: CancellationToken) -> Result<(), AppError> {
    let broker = connect_broker(&settings.broker).await?;
    serve_notifications(&settings, broker, shutdown).await
}

async fn run_all(settings: config::Settings, shutdown: CancellationToken) -> Result<(), AppError> {
    let broker = connect_broker(&settings.broker).await?;
    try_join!(
        serve_posts(&settings, broker.clone(), shutdown.clone()),
        serve_notifications(&settings, broker, shutdown),
    )?;
    Ok(())
}

async fn connect_broker(settings: &config::BrokerSettings) -> Result<Arc<dyn Broker>, AppError> {
    match settings.backend {
        Backend::Memory => Ok(Arc::new(MemoryBroker::new())),
        Backend::Redis => {
            let consumer = StreamConsumerConfig {
                group: settings.consumer_group.clone(),
                consumer: settings.consumer_name.clone(),
                block: settings.block,
                batch_size: settings.batch_size.get(),
            };
            let broker = RedisStreamBroker::connect(&settings.redis_url, consumer)
                .await
                .map_err(InfraError::from)?;
            info!(topic = %settings.topic, "connected to redis streams broker");
            Ok(Arc::new(broker))
        }
    }
}

async fn connect_cache(settings: &config::CacheSettings) -> Result<Arc<dyn Cache>, AppError> {
    match settings.backend {
        Backend::Memory => Ok(Arc::new(MemoryCache::new(settings.memory_capacity.get()))),
        Backend::Redis => {
            let cache = RedisCache::connect(&settings.redis_url)
                .await
                .map_err(InfraError::from)?;
            cache.ping().await.map_err(InfraError::from)?;
            info!("connected to redis cache");
            Ok(Arc::new(cache))
        }
    }
}

async fn connect_posts_store(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database("posts", err))?;
    PostgresRepositories::run_app_migrations(&pool)
        .await
        .map_err(|err| InfraError::database("posts", err))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn connect_notifications_store(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let url = settings
        .database
        .notifications_url()
        .ok_or_else(|| InfraError::configuration("notifications database url is not configured"))?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database("notifications", err))?;
    PostgresRepositories::run_notification_migrations(&pool)
        .await
        .map_err(|err| InfraError::database("notifications", err))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn serve_posts(
    settings: &config::Settings,
    broker: Arc<dyn Broker>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let secret = settings
        .blobs
        .signing_secret
        .clone()
        .ok_or_else(|| InfraError::configuration("blobs.signing_secret is not configured"))?;

    let repositories = connect_posts_store(settings).await?;
    let backend = connect_cache(&settings.cache).await?;
    let cache_config = CacheConfig::from(&settings.cache);

    let service = PostService::new(PostServiceDeps {
        reader: repositories.clone(),
        writer: repositories.clone(),
        blobs: Arc::new(SignedUrlLinker::new(
            settings.blobs.base_url.clone(),
            secret,
            settings.blobs.url_ttl,
        )),
        cache: PostCache::new(backend, cache_config),
        publisher: LikePublisher::new(
            broker,
            settings.broker.topic.clone(),
            settings.broker.publish_timeout,
        ),
        deadline: settings.requests.deadline,
    });

    let router = http::build_posts_router(PostsState {
        posts: Arc::new(service),
        health: repositories,
        rate_limiter: ApiRateLimiter::new(
            Duration::from_secs(u64::from(settings.rate_limit.window_seconds.get())),
            settings.rate_limit.max_requests.get(),
        ),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.api_addr)
        .await
        .map_err(InfraError::from)?;
    info!(addr = %settings.server.api_addr, "posts service listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
    .map_err(|err| AppError::unexpected(format!("posts server error: {err}")))
}

async fn serve_notifications(
    settings: &config::Settings,
    broker: Arc<dyn Broker>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let repositories = connect_notifications_store(settings).await?;
    let service = NotificationService::new(repositories.clone());

    let consumer = NotificationConsumer::new(
        broker,
        service.clone(),
        Arc::new(WindowedDeduplicator::new(
            settings.broker.dedup,
            settings.broker.dedup_window.get(),
        )),
        ConsumerConfig {
            topic: settings.broker.topic.clone(),
            reconnect_backoff: settings.broker.reconnect_backoff,
            retry_backoff: settings.broker.reconnect_backoff,
        },
    );
    let consumer_task = tokio::spawn(consumer.run(shutdown.clone()));

    let router = http::build_notifier_router(NotifierState {
        notifications: Arc::new(service),
        health: repositories,
    });

    let served = async {
        let listener = tokio::net::TcpListener::bind(settings.server.notifier_addr)
            .await
            .map_err(InfraError::from)?;
        info!(addr = %settings.server.notifier_addr, "notifier listening");
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await
            .map_err(|err| AppError::unexpected(format!("notifier server error: {err}")))
    }
    .await;

    // The consumer stops only on shutdown; make sure it gets the signal when
    // the listener failed instead.
    shutdown.cancel();
    match tokio::time::timeout(settings.server.graceful_shutdown, consumer_task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "notification consumer task failed"),
        Err(_) => warn!("notification consumer did not stop within the shutdown grace period"),
    }

    served
}
