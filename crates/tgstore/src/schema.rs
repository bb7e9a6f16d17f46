//! Table layout and SQL rendering.
//!
//! Namespace and group are caller-supplied strings, so they only ever enter
//! SQL text through [`quote_ident`]. Values are always bound as `$N`
//! parameters, which both `PostgreSQL` and `SQLite` accept.

use tgstore_core::Backend;

use crate::session::SessionColumn;

/// Schema revision written to the version table on creation.
pub const SCHEMA_VERSION: i32 = 1;

/// How long (seconds) a username stays resolvable after its last upsert.
pub const USERNAME_TTL: i64 = 8 * 60 * 60;

/// Default `PostgreSQL` schema holding the session tables.
pub const DEFAULT_GROUP: &str = "pyrogram";

/// `SQLite` has no schemas; tables go to the primary database.
pub const SQLITE_DEFAULT_GROUP: &str = "main";

/// Data center stored in a freshly created session row.
pub const DEFAULT_DC_ID: i32 = 2;

/// Quote an identifier, doubling any embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Column used by a peer lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PeerColumn {
    Id,
    Username,
    PhoneNumber,
}

impl PeerColumn {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Username => "username",
            Self::PhoneNumber => "phone_number",
        }
    }
}

/// Pre-rendered identifiers and statements for one namespace.
#[derive(Debug, Clone)]
pub(crate) struct Schema {
    backend: Backend,
    group: String,
    namespace: String,
    sessions: String,
    peers: String,
    version: String,
}

impl Schema {
    pub(crate) fn new(backend: Backend, group: &str, namespace: &str) -> Self {
        let table = |suffix: &str| {
            format!(
                "{}.{}",
                quote_ident(group),
                quote_ident(&format!("{namespace}:{suffix}"))
            )
        };

        Self {
            backend,
            group: group.to_string(),
            namespace: namespace.to_string(),
            sessions: table("sessions"),
            peers: table("peers"),
            version: table("version"),
        }
    }

    pub(crate) fn group(&self) -> &str {
        &self.group
    }

    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Unquoted name of the sessions table, as the catalog stores it.
    pub(crate) fn sessions_table_name(&self) -> String {
        format!("{}:sessions", self.namespace)
    }

    /// Catalog probe for the sessions table.
    ///
    /// `PostgreSQL` binds `$1` = group, `$2` = table name; `SQLite` binds
    /// `$1` = table name.
    pub(crate) fn table_exists(&self) -> String {
        match self.backend {
            Backend::Postgres => "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2"
                .to_string(),
            Backend::Sqlite => format!(
                "SELECT 1 FROM {}.sqlite_master WHERE type = 'table' AND name = $1",
                quote_ident(&self.group)
            ),
        }
    }

    /// DDL for a fresh namespace, in execution order.
    pub(crate) fn create_statements(&self) -> Vec<String> {
        let (bytes, now) = match self.backend {
            Backend::Postgres => ("BYTEA", "EXTRACT(EPOCH FROM NOW())::BIGINT"),
            Backend::Sqlite => ("BLOB", "(CAST(strftime('%s', 'now') AS INTEGER))"),
        };

        let mut statements = Vec::with_capacity(7);

        if self.backend == Backend::Postgres {
            statements.push(format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_ident(&self.group)
            ));
        }

        statements.push(format!(
            r"CREATE TABLE {} (
    dc_id     INTEGER PRIMARY KEY,
    api_id    INTEGER,
    test_mode BOOLEAN,
    auth_key  {bytes},
    date      INTEGER NOT NULL,
    user_id   BIGINT,
    is_bot    BOOLEAN
)",
            self.sessions
        ));

        statements.push(format!(
            r"CREATE TABLE {} (
    id             BIGINT PRIMARY KEY,
    access_hash    BIGINT,
    type           TEXT NOT NULL,
    username       TEXT,
    phone_number   TEXT,
    last_update_on BIGINT NOT NULL DEFAULT {now}
)",
            self.peers
        ));

        statements.push(format!(
            "CREATE TABLE {} (number INTEGER PRIMARY KEY)",
            self.version
        ));

        for column in [PeerColumn::Id, PeerColumn::Username, PeerColumn::PhoneNumber] {
            statements.push(self.create_peer_index(column));
        }

        statements
    }

    fn create_peer_index(&self, column: PeerColumn) -> String {
        let index = quote_ident(&format!("idx_{}:peers_{}", self.namespace, column.as_str()));
        match self.backend {
            // Postgres places the index in the table's schema.
            Backend::Postgres => format!(
                "CREATE INDEX {index} ON {} ({})",
                self.peers,
                column.as_str()
            ),
            // SQLite qualifies the index name, never the table.
            Backend::Sqlite => format!(
                "CREATE INDEX {}.{index} ON {} ({})",
                quote_ident(&self.group),
                quote_ident(&format!("{}:peers", self.namespace)),
                column.as_str()
            ),
        }
    }

    pub(crate) fn drop_statements(&self) -> [String; 3] {
        [
            format!("DROP TABLE {}", self.sessions),
            format!("DROP TABLE {}", self.peers),
            format!("DROP TABLE {}", self.version),
        ]
    }

    /// Default session row: `$1` = `dc_id`, `$2` = date. Other columns NULL.
    pub(crate) fn insert_session(&self) -> String {
        format!("INSERT INTO {} (dc_id, date) VALUES ($1, $2)", self.sessions)
    }

    pub(crate) fn insert_version(&self) -> String {
        format!("INSERT INTO {} (number) VALUES ($1)", self.version)
    }

    pub(crate) fn select_session_column(&self, column: SessionColumn) -> String {
        format!("SELECT {} FROM {}", column.as_str(), self.sessions)
    }

    pub(crate) fn update_session_column(&self, column: SessionColumn) -> String {
        format!("UPDATE {} SET {} = $1", self.sessions, column.as_str())
    }

    pub(crate) fn select_version(&self) -> String {
        format!("SELECT number FROM {}", self.version)
    }

    pub(crate) fn update_version(&self) -> String {
        format!("UPDATE {} SET number = $1", self.version)
    }

    /// Insert-or-update of one peer. Binds `$1..$5` = id, `access_hash`, type,
    /// username, `phone_number` and `$6` = now. The stored `last_update_on`
    /// never moves backwards.
    pub(crate) fn upsert_peer(&self) -> String {
        format!(
            r"INSERT INTO {} AS p (id, access_hash, type, username, phone_number, last_update_on)
VALUES ($1, $2, $3, $4, $5, $6)
{}",
            self.peers,
            self.on_peer_conflict()
        )
    }

    /// `PostgreSQL` batch upsert in one statement. Binds `$1..$5` as arrays
    /// of equal length (id, `access_hash`, type, username, `phone_number`)
    /// and `$6` = now. Ids must be unique within the batch.
    pub(crate) fn upsert_peers_unnest(&self) -> String {
        format!(
            r"INSERT INTO {} AS p (id, access_hash, type, username, phone_number, last_update_on)
SELECT u.id, u.access_hash, u.type, u.username, u.phone_number, $6::BIGINT
FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::TEXT[], $4::TEXT[], $5::TEXT[])
    AS u(id, access_hash, type, username, phone_number)
{}",
            self.peers,
            self.on_peer_conflict()
        )
    }

    fn on_peer_conflict(&self) -> String {
        let greatest = match self.backend {
            Backend::Postgres => "GREATEST",
            Backend::Sqlite => "MAX",
        };

        format!(
            r"ON CONFLICT (id) DO UPDATE SET
    access_hash = EXCLUDED.access_hash,
    type = EXCLUDED.type,
    username = EXCLUDED.username,
    phone_number = EXCLUDED.phone_number,
    last_update_on = {greatest}(p.last_update_on, EXCLUDED.last_update_on)"
        )
    }

    /// Peer lookup by one indexed column, `$1` = key. When several rows
    /// match, the most recently updated wins.
    pub(crate) fn select_peer(&self, column: PeerColumn) -> String {
        format!(
            "SELECT id, access_hash, type, last_update_on FROM {} \
             WHERE {} = $1 ORDER BY last_update_on DESC LIMIT 1",
            self.peers,
            column.as_str()
        )
    }
}
