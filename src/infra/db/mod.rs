//! Postgres-backed repository implementations.

mod notifications;
mod posts;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    Postgres, Transaction,
    migrate::MigrateError,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::RepoError;
use crate::infra::http::HealthCheck;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Both migration sets may target one database, so each ignores the
    /// other's applied versions.
    pub async fn run_app_migrations(pool: &PgPool) -> Result<(), MigrateError> {
        let mut migrator = sqlx::migrate!("./migrations/app");
        migrator.set_ignore_missing(true);
        migrator.run(pool).await
    }

    pub async fn run_notification_migrations(pool: &PgPool) -> Result<(), MigrateError> {
        let mut migrator = sqlx::migrate!("./migrations/notifications");
        migrator.set_ignore_missing(true);
        migrator.run(pool).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

#[async_trait]
impl HealthCheck for PostgresRepositories {
    async fn check(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}
