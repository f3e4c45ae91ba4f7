//! SQLite backed entity store.
use crate::store::{EntityStore, EntityTransaction, StoreError};
use crate::types::Entity;
use parking_lot::Mutex;
use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, Transaction, TransactionBehavior, params,
    params_from_iter,
};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entity (
    external_id VARCHAR(68) NOT NULL PRIMARY KEY,
    osm_id BIGINT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entity_osm_id ON entity (osm_id);
";

// Keeps every statement well below SQLITE_MAX_VARIABLE_NUMBER.
const MAX_IDS_PER_QUERY: usize = 500;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and makes sure the schema exists.
    /// `:memory:` opens a private in-memory database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

impl EntityStore for SqliteStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn EntityTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        // IMMEDIATE takes the write lock up front, so concurrent writers are
        // serialized instead of failing on lock upgrade.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let mut handle = SqliteTransaction { tx };

        match f(&mut handle) {
            Ok(value) => {
                handle.tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = handle.tx.rollback() {
                    tracing::error!(error = %rollback_err, "failed to roll back transaction");
                }
                Err(err)
            }
        }
    }

    fn is_ready(&self) -> bool {
        // A held lock means a transaction is running, which is as good as a ping.
        match self.conn.try_lock() {
            Some(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            None => true,
        }
    }
}

struct SqliteTransaction<'conn> {
    tx: Transaction<'conn>,
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        external_id: row.get(0)?,
        osm_id: row.get(1)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn batch<T>(items: &[T], index: usize) -> &[T] {
    let start = (index * MAX_IDS_PER_QUERY).min(items.len());
    let end = (start + MAX_IDS_PER_QUERY).min(items.len());
    &items[start..end]
}

fn batch_count(len: usize) -> usize {
    len.div_ceil(MAX_IDS_PER_QUERY)
}

impl SqliteTransaction<'_> {
    fn select(&self, sql: &str, values: Vec<&dyn ToSql>) -> Result<Vec<Entity>, StoreError> {
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), row_to_entity)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl EntityTransaction for SqliteTransaction<'_> {
    fn find_one(&self, external_id: &str) -> Result<Option<Entity>, StoreError> {
        let entity = self
            .tx
            .query_row(
                "SELECT external_id, osm_id FROM entity WHERE external_id = ?1",
                params![external_id],
                row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    fn find_existing(
        &self,
        external_ids: &[&str],
        osm_ids: &[i64],
    ) -> Result<Vec<Entity>, StoreError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for index in 0..batch_count(external_ids.len().max(osm_ids.len())) {
            let ids = batch(external_ids, index);
            let osm = batch(osm_ids, index);

            let mut clauses = Vec::with_capacity(2);
            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(ids.len() + osm.len());
            if !ids.is_empty() {
                clauses.push(format!("external_id IN ({})", placeholders(ids.len())));
                values.extend(ids.iter().map(|id| id as &dyn ToSql));
            }
            if !osm.is_empty() {
                clauses.push(format!("osm_id IN ({})", placeholders(osm.len())));
                values.extend(osm.iter().map(|id| id as &dyn ToSql));
            }

            let sql = format!(
                "SELECT external_id, osm_id FROM entity WHERE {}",
                clauses.join(" OR ")
            );
            for entity in self.select(&sql, values)? {
                if seen.insert(entity.external_id.clone()) {
                    found.push(entity);
                }
            }
        }

        Ok(found)
    }

    fn find_by_ids(&self, external_ids: &[&str]) -> Result<Vec<Entity>, StoreError> {
        let mut found = Vec::with_capacity(external_ids.len());

        for index in 0..batch_count(external_ids.len()) {
            let ids = batch(external_ids, index);
            let sql = format!(
                "SELECT external_id, osm_id FROM entity WHERE external_id IN ({})",
                placeholders(ids.len())
            );
            let values = ids.iter().map(|id| id as &dyn ToSql).collect();
            found.extend(self.select(&sql, values)?);
        }

        Ok(found)
    }

    fn insert_many(&mut self, entities: &[Entity]) -> Result<(), StoreError> {
        let mut stmt = self
            .tx
            .prepare_cached("INSERT INTO entity (external_id, osm_id) VALUES (?1, ?2)")?;
        for entity in entities {
            stmt.execute(params![entity.external_id, entity.osm_id])?;
        }
        Ok(())
    }

    fn delete_many(&mut self, external_ids: &[&str]) -> Result<(), StoreError> {
        for index in 0..batch_count(external_ids.len()) {
            let ids = batch(external_ids, index);
            let sql = format!(
                "DELETE FROM entity WHERE external_id IN ({})",
                placeholders(ids.len())
            );
            self.tx.execute(&sql, params_from_iter(ids))?;
        }
        Ok(())
    }

    fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .tx
            .query_row("SELECT COUNT(*) FROM entity", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
