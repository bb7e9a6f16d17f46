//! Session row accessors.
//!
//! Every accessor is a thin wrapper over [`SessionStore::read_column`] /
//! [`SessionStore::write_column`] naming its column explicitly.

use sqlx::{Decode, Encode, Postgres, Sqlite, Type};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::schema::SCHEMA_VERSION;
use crate::store::SessionStore;

/// A column of the single session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionColumn {
    DcId,
    ApiId,
    TestMode,
    AuthKey,
    Date,
    UserId,
    IsBot,
}

impl SessionColumn {
    pub const ALL: [Self; 7] = [
        Self::DcId,
        Self::ApiId,
        Self::TestMode,
        Self::AuthKey,
        Self::Date,
        Self::UserId,
        Self::IsBot,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DcId => "dc_id",
            Self::ApiId => "api_id",
            Self::TestMode => "test_mode",
            Self::AuthKey => "auth_key",
            Self::Date => "date",
            Self::UserId => "user_id",
            Self::IsBot => "is_bot",
        }
    }
}

/// A Rust type that can be stored in a session column on every backend.
pub trait ColumnValue:
    for<'q> Encode<'q, Postgres>
    + for<'r> Decode<'r, Postgres>
    + Type<Postgres>
    + for<'q> Encode<'q, Sqlite>
    + for<'r> Decode<'r, Sqlite>
    + Type<Sqlite>
    + Send
    + Sync
    + Unpin
    + 'static
{
}

impl ColumnValue for i32 {}
impl ColumnValue for i64 {}
impl ColumnValue for bool {}
impl ColumnValue for Vec<u8> {}

impl SessionStore {
    /// Read one column of the session row. `Ok(None)` means the column is
    /// NULL; a missing row is `NotFound`.
    pub async fn read_column<T: ColumnValue>(&self, column: SessionColumn) -> StoreResult<Option<T>> {
        let sql = self.schema().select_session_column(column);

        let value = with_conn!(self.pool(), |conn| {
            sqlx::query_scalar::<_, Option<T>>(&sql)
                .fetch_optional(&mut *conn)
                .await?
        });

        value.ok_or_else(|| self.missing_row("Session"))
    }

    /// Overwrite one column of the session row.
    pub async fn write_column<T: ColumnValue>(
        &self,
        column: SessionColumn,
        value: Option<T>,
    ) -> StoreResult<()> {
        let sql = self.schema().update_session_column(column);

        let _guard = self.lock().await;
        let affected = with_conn!(self.pool(), |conn| {
            sqlx::query(&sql)
                .bind(value)
                .execute(&mut *conn)
                .await?
                .rows_affected()
        });

        if affected == 0 {
            return Err(self.missing_row("Session"));
        }

        debug!(namespace = %self.namespace(), column = column.as_str(), "Session column written");
        Ok(())
    }

    pub async fn dc_id(&self) -> StoreResult<i32> {
        Ok(self.read_column(SessionColumn::DcId).await?.unwrap_or_default())
    }

    pub async fn set_dc_id(&self, dc_id: i32) -> StoreResult<()> {
        self.write_column(SessionColumn::DcId, Some(dc_id)).await
    }

    pub async fn api_id(&self) -> StoreResult<Option<i32>> {
        self.read_column(SessionColumn::ApiId).await
    }

    pub async fn set_api_id(&self, api_id: impl Into<Option<i32>>) -> StoreResult<()> {
        self.write_column(SessionColumn::ApiId, api_id.into()).await
    }

    pub async fn test_mode(&self) -> StoreResult<Option<bool>> {
        self.read_column(SessionColumn::TestMode).await
    }

    pub async fn set_test_mode(&self, test_mode: impl Into<Option<bool>>) -> StoreResult<()> {
        self.write_column(SessionColumn::TestMode, test_mode.into()).await
    }

    /// The session's authorization key (256 bytes once logged in).
    pub async fn auth_key(&self) -> StoreResult<Option<Vec<u8>>> {
        self.read_column(SessionColumn::AuthKey).await
    }

    pub async fn set_auth_key(&self, auth_key: impl Into<Option<Vec<u8>>>) -> StoreResult<()> {
        self.write_column(SessionColumn::AuthKey, auth_key.into()).await
    }

    /// Last-saved timestamp (Unix seconds), 0 until first saved.
    pub async fn date(&self) -> StoreResult<i32> {
        Ok(self.read_column(SessionColumn::Date).await?.unwrap_or_default())
    }

    pub async fn set_date(&self, date: i32) -> StoreResult<()> {
        self.write_column(SessionColumn::Date, Some(date)).await
    }

    pub async fn user_id(&self) -> StoreResult<Option<i64>> {
        self.read_column(SessionColumn::UserId).await
    }

    pub async fn set_user_id(&self, user_id: impl Into<Option<i64>>) -> StoreResult<()> {
        self.write_column(SessionColumn::UserId, user_id.into()).await
    }

    pub async fn is_bot(&self) -> StoreResult<Option<bool>> {
        self.read_column(SessionColumn::IsBot).await
    }

    pub async fn set_is_bot(&self, is_bot: impl Into<Option<bool>>) -> StoreResult<()> {
        self.write_column(SessionColumn::IsBot, is_bot.into()).await
    }

    /// Stamp the session row with the current time.
    pub async fn persist_now(&self) -> StoreResult<()> {
        // INTEGER column; saturates in 2038.
        let now = i32::try_from(self.now()).unwrap_or(i32::MAX);
        self.set_date(now).await
    }

    /// Schema version recorded for this namespace.
    pub async fn version(&self) -> StoreResult<i32> {
        let sql = self.schema().select_version();

        let version = with_conn!(self.pool(), |conn| {
            sqlx::query_scalar::<_, i32>(&sql)
                .fetch_optional(&mut *conn)
                .await?
        });

        version.ok_or_else(|| self.missing_row("Version"))
    }

    /// Overwrite the recorded schema version. No history is kept.
    pub async fn set_version(&self, version: i32) -> StoreResult<()> {
        let sql = self.schema().update_version();

        let _guard = self.lock().await;
        let affected = with_conn!(self.pool(), |conn| {
            sqlx::query(&sql)
                .bind(version)
                .execute(&mut *conn)
                .await?
                .rows_affected()
        });

        if affected == 0 {
            return Err(self.missing_row("Version"));
        }

        debug!(
            namespace = %self.namespace(),
            version,
            compiled = SCHEMA_VERSION,
            "Schema version written"
        );
        Ok(())
    }

    fn missing_row(&self, table: &str) -> StoreError {
        StoreError::NotFound(format!("{table} row for {}", self.namespace()))
    }
}
