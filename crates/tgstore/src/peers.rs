//! Peer directory: bulk upsert and lookups.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tgstore_core::StorePool;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::input_peer::{InputPeer, input_peer};
use crate::schema::{PeerColumn, USERNAME_TTL};
use crate::store::SessionStore;

/// One peer as reported by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: i64,
    pub access_hash: Option<i64>,
    /// `user`, `bot`, `group`, `channel` or `supergroup`.
    pub peer_type: String,
    pub username: Option<String>,
    pub phone_number: Option<String>,
}

/// Key passed to [`SessionStore::get_peer_by_id`].
///
/// Only `Id` is a valid id; `Text` is rejected without touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerKey {
    Id(i64),
    Text(String),
}

impl From<i64> for PeerKey {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<i32> for PeerKey {
    fn from(id: i32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl From<&str> for PeerKey {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for PeerKey {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PeerRow {
    id: i64,
    access_hash: Option<i64>,
    #[sqlx(rename = "type")]
    peer_type: String,
    last_update_on: i64,
}

#[derive(Debug, Clone, Copy)]
enum Lookup<'a> {
    Id(i64),
    Text(PeerColumn, &'a str),
}

impl Lookup<'_> {
    const fn column(self) -> PeerColumn {
        match self {
            Self::Id(_) => PeerColumn::Id,
            Self::Text(column, _) => column,
        }
    }
}

impl SessionStore {
    /// Insert or update a batch of peers atomically.
    ///
    /// Existing rows get every field overwritten and `last_update_on`
    /// refreshed. If any row fails, none of the batch is applied. When an id
    /// repeats within the batch, its last occurrence wins. `PostgreSQL` takes
    /// the whole batch in one statement; `SQLite` runs one statement per peer
    /// inside a transaction.
    pub async fn update_peers(&self, peers: &[PeerRecord]) -> StoreResult<()> {
        if peers.is_empty() {
            return Ok(());
        }

        let now = self.now();

        let _guard = self.lock().await;
        match self.pool() {
            StorePool::Postgres(pool) => {
                let batch = last_occurrences(peers);
                let sql = self.schema().upsert_peers_unnest();

                let mut conn = pool.acquire().await?;
                sqlx::query(&sql)
                    .bind(batch.iter().map(|p| p.id).collect::<Vec<_>>())
                    .bind(batch.iter().map(|p| p.access_hash).collect::<Vec<_>>())
                    .bind(batch.iter().map(|p| p.peer_type.as_str()).collect::<Vec<_>>())
                    .bind(batch.iter().map(|p| p.username.as_deref()).collect::<Vec<_>>())
                    .bind(batch.iter().map(|p| p.phone_number.as_deref()).collect::<Vec<_>>())
                    .bind(now)
                    .execute(&mut *conn)
                    .await?;
            }
            StorePool::Sqlite(pool) => {
                let sql = self.schema().upsert_peer();

                let mut tx = pool.begin().await?;
                for peer in peers {
                    sqlx::query(&sql)
                        .bind(peer.id)
                        .bind(peer.access_hash)
                        .bind(peer.peer_type.as_str())
                        .bind(peer.username.as_deref())
                        .bind(peer.phone_number.as_deref())
                        .bind(now)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
            }
        }

        debug!(namespace = %self.namespace(), count = peers.len(), "Peers updated");
        Ok(())
    }

    pub async fn get_peer_by_id(&self, key: impl Into<PeerKey>) -> StoreResult<InputPeer> {
        let id = match key.into() {
            PeerKey::Id(id) => id,
            PeerKey::Text(text) => {
                return Err(StoreError::InvalidKey(format!("ID not int: {text}")));
            }
        };

        let row = self
            .fetch_peer(Lookup::Id(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("ID {id}")))?;

        input_peer(row.id, row.access_hash, &row.peer_type)
    }

    /// Resolve a username, failing with `Expired` when the entry is older
    /// than [`USERNAME_TTL`]. Stale rows are left in place.
    pub async fn get_peer_by_username(&self, username: &str) -> StoreResult<InputPeer> {
        let row = self
            .fetch_peer(Lookup::Text(PeerColumn::Username, username))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Username {username}")))?;

        if self.now().abs_diff(row.last_update_on) > USERNAME_TTL.unsigned_abs() {
            return Err(StoreError::Expired(format!("Username {username}")));
        }

        input_peer(row.id, row.access_hash, &row.peer_type)
    }

    pub async fn get_peer_by_phone_number(&self, phone_number: &str) -> StoreResult<InputPeer> {
        let row = self
            .fetch_peer(Lookup::Text(PeerColumn::PhoneNumber, phone_number))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Phone number {phone_number}")))?;

        input_peer(row.id, row.access_hash, &row.peer_type)
    }

    async fn fetch_peer(&self, lookup: Lookup<'_>) -> StoreResult<Option<PeerRow>> {
        let sql = self.schema().select_peer(lookup.column());

        let row = with_conn!(self.pool(), |conn| {
            let query = sqlx::query_as::<_, PeerRow>(&sql);
            let query = match lookup {
                Lookup::Id(id) => query.bind(id),
                Lookup::Text(_, text) => query.bind(text),
            };
            query.fetch_optional(&mut *conn).await?
        });

        Ok(row)
    }
}

/// Drop all but the last record of every repeated id, keeping batch order.
fn last_occurrences(peers: &[PeerRecord]) -> Vec<&PeerRecord> {
    let mut seen = HashSet::with_capacity(peers.len());
    let mut batch: Vec<&PeerRecord> = peers.iter().rev().filter(|p| seen.insert(p.id)).collect();
    batch.reverse();
    batch
}
