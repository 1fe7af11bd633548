//! Database connection handling
//!
//! This module provides the sqlx-backed [`DatabaseAdapter`] used against real targets.

use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow},
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
    Column, Executor, MySql, Pool, Postgres, Row,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::config::TargetConfig;
use crate::db::adapter::{CatalogRow, DatabaseAdapter};
use crate::dialect::DialectKind;
use crate::error::{Error, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Enumeration of supported database types
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
}

/// A DSN split into a URL sqlx understands and any credentials it carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsnParts {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Accept both URLs and PDO-style `mysql:host=...;dbname=...` DSNs
pub fn normalize_dsn(dsn: &str, kind: DialectKind) -> DsnParts {
    let scheme = match kind {
        DialectKind::MySql => "mysql",
        DialectKind::Postgres => "postgres",
    };

    if let Some((_, rest)) = dsn.split_once("://") {
        return DsnParts {
            url: format!("{}://{}", scheme, rest),
            user: None,
            password: None,
        };
    }

    let params = dsn.split_once(':').map_or(dsn, |(_, rest)| rest);
    let mut host = "localhost".to_string();
    let mut port = None;
    let mut database = String::new();
    let mut user = None;
    let mut password = None;

    for pair in params.split(';') {
        if let Some((key, value)) = pair.split_once('=') {
            let value = value.trim().to_string();
            match key.trim().to_lowercase().as_str() {
                "host" => host = value,
                "port" => port = Some(value),
                "dbname" => database = value,
                "user" => user = Some(value),
                "password" => password = Some(value),
                _ => {}
            }
        }
    }

    let mut url = format!("{}://{}", scheme, host);
    if let Some(port) = port {
        url.push(':');
        url.push_str(&port);
    }
    url.push('/');
    url.push_str(&database);

    DsnParts {
        url,
        user,
        password,
    }
}

impl DatabaseConnection {
    /// Open a single-connection pool for a target.
    ///
    /// One connection keeps session settings (such as `FOREIGN_KEY_CHECKS`) in force for
    /// every statement of the plan. Configured `user`/`pass` override the DSN.
    pub async fn connect(config: &TargetConfig, kind: DialectKind) -> Result<Self> {
        let timeout =
            Duration::from_secs(config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        let dsn = normalize_dsn(&config.dsn, kind);
        let user = config.user.as_ref().or(dsn.user.as_ref());
        let password = config.pass.as_ref().or(dsn.password.as_ref());

        match kind {
            DialectKind::Postgres => {
                let mut options = PgConnectOptions::from_str(&dsn.url)
                    .map_err(|e| Error::ConnectionError(e.to_string()))?;
                if let Some(user) = user {
                    options = options.username(user);
                }
                if let Some(password) = password {
                    options = options.password(password);
                }
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| Error::ConnectionError(e.to_string()))?;

                Ok(DatabaseConnection::Postgres(pool))
            }
            DialectKind::MySql => {
                let mut options = MySqlConnectOptions::from_str(&dsn.url)
                    .map_err(|e| Error::ConnectionError(e.to_string()))?;
                if let Some(user) = user {
                    options = options.username(user);
                }
                if let Some(password) = password {
                    options = options.password(password);
                }
                let pool = MySqlPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| Error::ConnectionError(e.to_string()))?;

                Ok(DatabaseConnection::MySql(pool))
            }
        }
    }
}

fn decode_pg_row(row: &PgRow) -> CatalogRow {
    row.columns()
        .iter()
        .map(|column| {
            let value = row
                .try_get::<Option<String>, _>(column.ordinal())
                .ok()
                .flatten();
            (column.name().to_string(), value)
        })
        .collect()
}

/// Some information_schema columns are binary strings on MySQL 8
fn decode_mysql_row(row: &MySqlRow) -> CatalogRow {
    row.columns()
        .iter()
        .map(|column| {
            let value = match row.try_get::<Option<String>, _>(column.ordinal()) {
                Ok(value) => value,
                Err(_) => row
                    .try_get::<Option<Vec<u8>>, _>(column.ordinal())
                    .ok()
                    .flatten()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            };
            (column.name().to_string(), value)
        })
        .collect()
}

#[async_trait]
impl DatabaseAdapter for DatabaseConnection {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>> {
        match self {
            DatabaseConnection::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = query.bind(*param);
                }
                let rows = query.fetch_all(pool).await?;
                Ok(rows.iter().map(decode_pg_row).collect())
            }
            DatabaseConnection::MySql(pool) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = query.bind(*param);
                }
                let rows = query.fetch_all(pool).await?;
                Ok(rows.iter().map(decode_mysql_row).collect())
            }
        }
    }

    /// Plain-text execution, so compound DDL that cannot be prepared is accepted
    async fn execute(&self, sql: &str) -> Result<()> {
        match self {
            DatabaseConnection::Postgres(pool) => {
                pool.execute(sql).await?;
            }
            DatabaseConnection::MySql(pool) => {
                pool.execute(sql).await?;
            }
        }
        Ok(())
    }

    async fn close(&self) {
        debug!("Closing database connection");
        match self {
            DatabaseConnection::Postgres(pool) => pool.close().await,
            DatabaseConnection::MySql(pool) => pool.close().await,
        }
    }
}
