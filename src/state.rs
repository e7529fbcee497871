use sqlx::SqlitePool;

use crate::db::{SqliteGateway, TableSet};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub tables: TableSet,
    pub sessions: SessionStore,
}

impl AppState {
    /// A gateway scoped to a single request.
    pub fn gateway(&self) -> SqliteGateway {
        SqliteGateway::new(self.db.clone(), self.tables.clone())
    }
}
