//! SQLite-backed remote store for projects on disk
//!
//! Things are stored as JSON bodies keyed by id and iteration scope; every
//! commit bumps the head revision kept in `meta` and appends to the
//! `changes` log. Connection work runs on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::identity::IdentityKey;
use crate::core::operation::{OperationKind, OperationSet};
use crate::core::remote::{
    plan_commit, CommitReceipt, Remote, RemoteChange, RemoteError, Snapshot,
};
use crate::core::thing::Thing;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

const THINGS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS things (
        id TEXT NOT NULL,
        scope TEXT NOT NULL DEFAULT '',
        class_kind TEXT NOT NULL,
        revision INTEGER NOT NULL,
        body TEXT NOT NULL,
        PRIMARY KEY (id, scope)
    );

    CREATE INDEX IF NOT EXISTS idx_things_kind ON things(class_kind);
"#;

/// `scope` column value for a key; unscoped things use the empty string
fn scope_column(key: &IdentityKey) -> String {
    key.container.map(|scope| scope.to_string()).unwrap_or_default()
}

/// Remote store in a SQLite database file
pub struct SqliteRemote {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRemote {
    /// Open (creating if needed) the store at `path`
    pub fn open(path: &Path) -> Result<Self, RemoteError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RemoteError::Transport(e.to_string()))?;
        }
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Store that lives only as long as this value
    pub fn open_in_memory() -> Result<Self, RemoteError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, RemoteError> {
        Self::init_schema(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &mut Connection) -> Result<(), RemoteError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS changes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                revision INTEGER NOT NULL,
                kind TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_changes_revision ON changes(revision);
            "#,
        )?;

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match version {
            None => {
                conn.execute_batch(THINGS_TABLE)?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
                conn.execute(
                    "INSERT OR IGNORE INTO meta (key, value) VALUES ('head', 0)",
                    [],
                )?;
            }
            Some(1) => Self::migrate_v1(conn)?,
            Some(version) if version > SCHEMA_VERSION => {
                return Err(RemoteError::Transport(format!(
                    "store schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Version 1 keyed things by id alone; rebuild the table with a scope
    /// column taken from each stored body
    fn migrate_v1(conn: &mut Connection) -> Result<(), RemoteError> {
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DROP INDEX IF EXISTS idx_things_kind;
             ALTER TABLE things RENAME TO things_v1;",
        )?;
        tx.execute_batch(THINGS_TABLE)?;

        let bodies = {
            let mut stmt = tx.prepare("SELECT body FROM things_v1")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        for body in &bodies {
            let thing: Thing = serde_json::from_str(body)?;
            Self::store_thing(&tx, &thing, thing.revision(), body)?;
        }

        tx.execute_batch("DROP TABLE things_v1;")?;
        tx.execute("UPDATE schema_version SET version = ?1", params![SCHEMA_VERSION])?;
        tx.commit()?;
        tracing::info!(things = bodies.len(), "migrated store to schema version 2");
        Ok(())
    }

    fn head(conn: &Connection) -> Result<u64, RemoteError> {
        let head: i64 = conn.query_row("SELECT value FROM meta WHERE key = 'head'", [], |row| {
            row.get(0)
        })?;
        Ok(head as u64)
    }

    fn load_thing(conn: &Connection, key: &IdentityKey) -> Result<Option<Thing>, RemoteError> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM things WHERE id = ?1 AND scope = ?2",
                params![key.id.to_string(), scope_column(key)],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|body| serde_json::from_str(&body).map_err(RemoteError::from))
            .transpose()
    }

    fn store_thing(
        conn: &Connection,
        thing: &Thing,
        revision: u64,
        body: &str,
    ) -> Result<(), RemoteError> {
        let key = thing.key();
        conn.execute(
            "INSERT OR REPLACE INTO things (id, scope, class_kind, revision, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.id.to_string(),
                scope_column(&key),
                thing.class_kind().as_str(),
                revision as i64,
                body
            ],
        )?;
        Ok(())
    }

    fn apply(conn: &mut Connection, set: &OperationSet) -> Result<CommitReceipt, RemoteError> {
        let tx = conn.transaction()?;

        let head = Self::head(&tx)?;
        let plan = plan_commit(head, set, |key| Self::load_thing(&tx, &key))?;

        for outcome in &plan.outcomes {
            let thing = &outcome.thing;
            let body = serde_json::to_string(thing)?;
            match outcome.kind {
                OperationKind::Delete => {
                    let key = thing.key();
                    tx.execute(
                        "DELETE FROM things WHERE id = ?1 AND scope = ?2",
                        params![key.id.to_string(), scope_column(&key)],
                    )?;
                }
                OperationKind::Create | OperationKind::Update => {
                    Self::store_thing(&tx, thing, plan.revision, &body)?;
                }
            }
            tx.execute(
                "INSERT INTO changes (revision, kind, body) VALUES (?1, ?2, ?3)",
                params![plan.revision as i64, outcome.kind.to_string(), body],
            )?;
        }
        tx.execute(
            "UPDATE meta SET value = ?1 WHERE key = 'head'",
            params![plan.revision as i64],
        )?;
        tx.commit()?;

        tracing::debug!(
            revision = plan.revision,
            operations = plan.outcomes.len(),
            "store commit applied"
        );
        Ok(CommitReceipt {
            revision: plan.revision,
            outcomes: plan.outcomes,
        })
    }

    fn load_all(conn: &mut Connection) -> Result<Snapshot, RemoteError> {
        let revision = Self::head(conn)?;
        let mut stmt = conn.prepare("SELECT body FROM things ORDER BY id, scope")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let things = bodies
            .iter()
            .map(|body| serde_json::from_str(body))
            .collect::<Result<Vec<Thing>, _>>()?;
        Ok(Snapshot { revision, things })
    }

    fn load_changes(conn: &mut Connection, revision: u64) -> Result<Vec<RemoteChange>, RemoteError> {
        let mut stmt = conn.prepare(
            "SELECT revision, kind, body FROM changes WHERE revision > ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![revision as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(revision, kind, body)| -> Result<RemoteChange, RemoteError> {
                Ok(RemoteChange {
                    revision: revision as u64,
                    kind: parse_kind(&kind)?,
                    thing: serde_json::from_str(&body)?,
                })
            })
            .collect()
    }

    /// Run `work` against the connection on the blocking pool
    async fn blocking<T, F>(&self, work: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RemoteError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            work(&mut *conn)
        })
            .await
            .map_err(|e| RemoteError::Transport(format!("store task failed: {}", e)))?
    }
}

fn parse_kind(kind: &str) -> Result<OperationKind, RemoteError> {
    match kind {
        "create" => Ok(OperationKind::Create),
        "update" => Ok(OperationKind::Update),
        "delete" => Ok(OperationKind::Delete),
        other => Err(RemoteError::Transport(format!(
            "unknown change kind '{}' in store",
            other
        ))),
    }
}

#[async_trait]
impl Remote for SqliteRemote {
    async fn fetch(&self) -> Result<Snapshot, RemoteError> {
        self.blocking(Self::load_all).await
    }

    async fn fetch_thing(&self, key: IdentityKey) -> Result<Option<Thing>, RemoteError> {
        self.blocking(move |conn| Self::load_thing(conn, &key)).await
    }

    async fn commit(&self, set: &OperationSet) -> Result<CommitReceipt, RemoteError> {
        let set = set.clone();
        self.blocking(move |conn| Self::apply(conn, &set)).await
    }

    async fn changes_since(&self, revision: u64) -> Result<Vec<RemoteChange>, RemoteError> {
        self.blocking(move |conn| Self::load_changes(conn, revision)).await
    }
}

impl std::fmt::Debug for SqliteRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRemote").finish_non_exhaustive()
    }
}
