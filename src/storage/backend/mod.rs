//! SeaORM storage backend
//!
//! Database access shared by every worker, supporting SQLite,
//! MySQL/MariaDB and PostgreSQL.

mod connection;
mod mutations;
mod query;
pub mod retry;

use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::{PromoGuardError, Result};

pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use query::PostThresholds;

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(PromoGuardError::database_config(format!(
            "Cannot infer database type from URL: {}. Supported: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// SeaORM-based storage backend
///
/// Cheap to clone; every worker gets its own handle instead of reaching for
/// a process-wide client.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    retry_config: retry::RetryConfig,
}

impl SeaOrmStorage {
    /// 连接数据库并运行迁移
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let database_url = config.database_url.as_str();
        if database_url.is_empty() {
            return Err(PromoGuardError::database_config("database_url is empty"));
        }

        let backend_name = infer_backend_from_url(database_url)?;
        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, &backend_name, config).await?
        };

        run_migrations(&db).await?;

        info!("{} storage initialized", backend_name.to_uppercase());
        Ok(Self {
            db,
            backend_name,
            retry_config: retry::RetryConfig::from(config),
        })
    }

    /// 包装一个已建立的连接（不运行迁移）
    pub fn from_connection(db: DatabaseConnection, retry_config: retry::RetryConfig) -> Self {
        let backend_name = match db.get_database_backend() {
            sea_orm::DatabaseBackend::MySql => "mysql",
            sea_orm::DatabaseBackend::Postgres => "postgres",
            _ => "sqlite",
        }
        .to_string();
        Self {
            db,
            backend_name,
            retry_config,
        }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn retry_config(&self) -> retry::RetryConfig {
        self.retry_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_backend_from_url() {
        assert_eq!(infer_backend_from_url("promoguard.db").unwrap(), "sqlite");
        assert_eq!(
            infer_backend_from_url("sqlite://data/pg.db?mode=rwc").unwrap(),
            "sqlite"
        );
        assert_eq!(infer_backend_from_url("sqlite::memory:").unwrap(), "sqlite");
        assert_eq!(
            infer_backend_from_url("mariadb://root@localhost/pg").unwrap(),
            "mysql"
        );
        assert_eq!(
            infer_backend_from_url("postgresql://localhost/pg").unwrap(),
            "postgres"
        );
        assert!(infer_backend_from_url("redis://localhost").is_err());
    }
}
