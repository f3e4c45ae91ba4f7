use crate::types::Entity;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Backend(String),
}

/// Operations available on an open transaction. Everything issued through one
/// handle commits or rolls back together.
pub trait EntityTransaction {
    fn find_one(&self, external_id: &str) -> Result<Option<Entity>, StoreError>;

    /// Returns stored rows whose external id is in `external_ids` or whose osm id
    /// is in `osm_ids`.
    fn find_existing(
        &self,
        external_ids: &[&str],
        osm_ids: &[i64],
    ) -> Result<Vec<Entity>, StoreError>;

    fn find_by_ids(&self, external_ids: &[&str]) -> Result<Vec<Entity>, StoreError>;

    fn insert_many(&mut self, entities: &[Entity]) -> Result<(), StoreError>;

    fn delete_many(&mut self, external_ids: &[&str]) -> Result<(), StoreError>;

    fn count(&self) -> Result<u64, StoreError>;
}

pub trait EntityStore: Send + Sync + 'static {
    /// Runs `f` inside a serializable read-write transaction. The transaction is
    /// committed when `f` returns `Ok` and rolled back otherwise.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn EntityTransaction) -> Result<T, E>,
        E: From<StoreError>;

    /// Must not block: called from the readiness probe on the async runtime.
    fn is_ready(&self) -> bool;
}
