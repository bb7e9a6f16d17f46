//! `tgstore` - relational session storage for Telegram MTProto clients.
//!
//! Persists the session credentials (data center, auth key, owner) and the
//! resolved peer directory of one client session in `PostgreSQL` (or
//! `SQLite`), in three tables named after the session:
//!
//! - `<group>."<namespace>:sessions"` - the single session row
//! - `<group>."<namespace>:peers"` - peers keyed by id
//! - `<group>."<namespace>:version"` - schema version stamp
//!
//! The connection pool is supplied by the caller and never closed here.

/// Run `$body` with `$conn` bound to a pooled connection of whichever
/// backend `$pool` wraps. The connection returns to the pool on every exit
/// path.
macro_rules! with_conn {
    ($pool:expr, |$conn:ident| $body:expr) => {
        match $pool {
            ::tgstore_core::StorePool::Postgres(pool) => {
                let mut $conn = pool.acquire().await?;
                $body
            }
            ::tgstore_core::StorePool::Sqlite(pool) => {
                let mut $conn = pool.acquire().await?;
                $body
            }
        }
    };
}

/// Like `with_conn!`, but inside a transaction that commits when `$body`
/// completes. An early return (`?`) drops the transaction, rolling it back.
macro_rules! with_tx {
    ($pool:expr, |$tx:ident| $body:expr) => {
        match $pool {
            ::tgstore_core::StorePool::Postgres(pool) => {
                let mut $tx = pool.begin().await?;
                let out = $body;
                $tx.commit().await?;
                out
            }
            ::tgstore_core::StorePool::Sqlite(pool) => {
                let mut $tx = pool.begin().await?;
                let out = $body;
                $tx.commit().await?;
                out
            }
        }
    };
}

mod error;
pub mod input_peer;
mod peers;
pub mod schema;
mod session;
mod store;

#[cfg(test)]
mod tests;

pub use error::{StoreError, StoreResult};
pub use input_peer::{InputPeer, input_peer};
pub use peers::{PeerKey, PeerRecord};
pub use schema::{SCHEMA_VERSION, USERNAME_TTL};
pub use session::{ColumnValue, SessionColumn};
pub use store::{InitOutcome, SessionStore};
pub use tgstore_core::{Clock, StorePool, SystemClock};
