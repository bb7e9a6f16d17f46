//! The session store facade and its lifecycle.

use std::sync::Arc;

use tgstore_core::config::StoreConfig;
use tgstore_core::{Backend, Clock, StorePool, SystemClock};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::schema::{DEFAULT_DC_ID, DEFAULT_GROUP, SCHEMA_VERSION, SQLITE_DEFAULT_GROUP, Schema};

/// Which branch [`SessionStore::initialize`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Tables were missing and have been created with default rows.
    Created,
    /// Tables already existed; the upgrade hook ran instead.
    Existing,
}

/// Session and peer storage for one namespace.
///
/// All writes (table creation, session/version updates, peer upserts) are
/// serialized by one store-wide lock taken before a connection is acquired.
/// Reads and [`teardown`](Self::teardown) never take it.
pub struct SessionStore {
    pool: StorePool,
    schema: Schema,
    lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a store for `namespace` on a pool owned by the caller.
    ///
    /// `group` is the `PostgreSQL` schema (default `pyrogram`) or the `SQLite`
    /// database name (default `main`).
    pub fn new(namespace: &str, pool: StorePool, group: Option<&str>) -> Self {
        let backend = pool.backend();
        let group = group.unwrap_or(match backend {
            Backend::Postgres => DEFAULT_GROUP,
            Backend::Sqlite => SQLITE_DEFAULT_GROUP,
        });

        Self {
            schema: Schema::new(backend, group, namespace),
            pool,
            lock: Mutex::new(()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(config: &StoreConfig, pool: StorePool) -> Self {
        Self::new(&config.namespace, pool, config.group.as_deref())
    }

    /// Replace the clock used for `last_update_on` stamps and freshness checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &str {
        self.schema.namespace()
    }

    pub fn group(&self) -> &str {
        self.schema.group()
    }

    pub const fn pool(&self) -> &StorePool {
        &self.pool
    }

    pub(crate) const fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Create the namespace's tables, or run the upgrade hook if they exist.
    ///
    /// The store lock is held from the catalog probe through creation, so
    /// concurrent calls on one store create the tables exactly once.
    pub async fn initialize(&self) -> StoreResult<InitOutcome> {
        let _guard = self.lock().await;

        if self.table_exists().await? {
            self.update().await?;
            Ok(InitOutcome::Existing)
        } else {
            self.create().await?;
            Ok(InitOutcome::Created)
        }
    }

    async fn table_exists(&self) -> StoreResult<bool> {
        let sql = self.schema.table_exists();
        let table = self.schema.sessions_table_name();

        let found = match &self.pool {
            StorePool::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                sqlx::query(&sql)
                    .bind(self.schema.group())
                    .bind(table.as_str())
                    .fetch_optional(&mut *conn)
                    .await?
                    .is_some()
            }
            StorePool::Sqlite(pool) => {
                let mut conn = pool.acquire().await?;
                sqlx::query(&sql)
                    .bind(table.as_str())
                    .fetch_optional(&mut *conn)
                    .await?
                    .is_some()
            }
        };

        Ok(found)
    }

    /// Caller holds the store lock.
    async fn create(&self) -> StoreResult<()> {
        let statements = self.schema.create_statements();
        let insert_version = self.schema.insert_version();
        let insert_session = self.schema.insert_session();

        with_tx!(&self.pool, |tx| {
            for statement in &statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }

            sqlx::query(&insert_version)
                .bind(SCHEMA_VERSION)
                .execute(&mut *tx)
                .await?;

            sqlx::query(&insert_session)
                .bind(DEFAULT_DC_ID)
                .bind(0_i32)
                .execute(&mut *tx)
                .await?;
        });

        info!(
            namespace = %self.namespace(),
            group = %self.group(),
            version = SCHEMA_VERSION,
            "Session tables created"
        );
        Ok(())
    }

    /// Upgrade hook for namespaces created by an earlier schema revision.
    ///
    /// Only revision 1 exists, so there is nothing to migrate yet.
    #[allow(clippy::unused_async)]
    async fn update(&self) -> StoreResult<()> {
        debug!(namespace = %self.namespace(), "Session tables already exist");
        Ok(())
    }

    /// Drop the namespace's three tables.
    ///
    /// Fails with the engine's error if a table is missing. Takes no lock;
    /// callers must make sure nothing else is using the namespace.
    pub async fn teardown(&self) -> StoreResult<()> {
        let statements = self.schema.drop_statements();

        with_conn!(&self.pool, |conn| {
            for statement in &statements {
                sqlx::query(statement).execute(&mut *conn).await?;
            }
        });

        info!(namespace = %self.namespace(), group = %self.group(), "Session tables dropped");
        Ok(())
    }

    /// Release the store. The pool belongs to the caller and stays open.
    #[allow(clippy::unused_async)]
    pub async fn shutdown(&self) {
        debug!(namespace = %self.namespace(), "Session store closed");
    }
}
