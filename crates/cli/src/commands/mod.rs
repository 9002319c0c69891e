//! CLI subcommands.

pub mod cart;
pub mod migrate;
pub mod user;

use sqlx::PgPool;
use thiserror::Error;

use mercato_storefront::config::{ConfigError, database_url_from_env};
use mercato_storefront::db::create_pool;

/// Errors shared by commands that talk to the database.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Connect to the storefront database named by the environment.
pub async fn connect() -> Result<PgPool, ConnectError> {
    dotenvy::dotenv().ok();

    let database_url = database_url_from_env()?;
    tracing::info!("Connecting to storefront database...");
    Ok(create_pool(&database_url).await?)
}
