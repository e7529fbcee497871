pub mod gateway;
pub mod repository;

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn};

pub use gateway::{CourseQuery, Gateway, GatewayError, RegistrationQuery, Table};
pub use repository::SqliteGateway;

/// Tables that existed when the store was probed.
#[derive(Clone, Debug, Default)]
pub struct TableSet(Arc<HashSet<Table>>);

impl TableSet {
    pub fn new(tables: impl IntoIterator<Item = Table>) -> Self {
        Self(Arc::new(tables.into_iter().collect()))
    }

    pub fn all() -> Self {
        Self::new([Table::Courses, Table::RegisteredCourses])
    }

    pub fn contains(&self, table: Table) -> bool {
        self.0.contains(&table)
    }
}

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut pool = SqlitePoolOptions::new().max_connections(max_connections);
    if database_url.contains(":memory:") {
        // every connection would see its own empty database
        pool = pool
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>);
    }

    pool.connect_with(options).await
}

pub async fn migrate(db: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(db).await
}

pub async fn probe_tables(db: &SqlitePool) -> Result<TableSet, sqlx::Error> {
    let mut found = Vec::new();

    for table in [Table::Courses, Table::RegisteredCourses] {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table.name())
                .fetch_optional(db)
                .await?;

        if exists.is_some() {
            found.push(table);
        } else {
            warn!("table '{}' is missing; operations on it will fail", table);
        }
    }

    info!("available tables: {:?}", found);
    Ok(TableSet::new(found))
}
