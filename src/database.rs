use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::migrate::Migrator;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::broadcast::EventBroadcaster;
use crate::env;
use crate::error::{ServiceError, ServiceResult};

mod activity_logs;
mod departments;
mod dining_sessions;
mod extra_charges;
mod menu;
mod migration;
mod orders;
mod packages;
mod promotions;
mod tables;
mod templates;
mod users;
mod work_orders;

#[cfg(all(test, feature = "postgres-tests"))]
mod tests;

pub use work_orders::WorkOrderFilter;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub events: EventBroadcaster,
}

impl AppState {
    pub async fn connect(url: &str) -> ServiceResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: Pool<Postgres>) -> ServiceResult<Self> {
        let migrator = Migrator::new(migration::postgresql_migrations())
            .await
            .map_err(|e| ServiceError::InternalServerError(format!("load migrations: {e}")))?;
        migrator
            .run(&pool)
            .await
            .map_err(|e| ServiceError::InternalServerError(format!("run migrations: {e}")))?;

        Ok(Self {
            pool,
            events: EventBroadcaster::new(*env::EVENT_CHANNEL_CAPACITY),
        })
    }

    pub async fn connection(&self) -> ServiceResult<DatabaseConnection> {
        let connection = self.pool.acquire().await?;
        Ok(DatabaseConnection { connection })
    }
}

pub struct DatabaseConnection {
    pub connection: PoolConnection<Postgres>,
}

pub fn generate_random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Postgres has no unsigned integers, ids are stored as `BIGINT`.
fn to_id(value: i64) -> u64 {
    value as u64
}

fn to_db_id(value: u64) -> i64 {
    value as i64
}
