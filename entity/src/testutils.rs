use crate::store::{EntityStore, EntityTransaction, StoreError};
use crate::types::Entity;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Store call that `MemoryStore` fails on when armed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    FindExisting,
    FindByIds,
    InsertMany,
    DeleteMany,
}

/// In-memory store for tests. Transactions work on a copy of the rows that is
/// swapped in on commit.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, i64>>,
    fail_on: Mutex<Option<FailPoint>>,
    transactions: AtomicUsize,
}

impl MemoryStore {
    pub fn with_entities(entities: &[Entity]) -> Self {
        let store = MemoryStore::default();
        {
            let mut rows = store.rows.lock();
            for entity in entities {
                rows.insert(entity.external_id.clone(), entity.osm_id);
            }
        }
        store
    }

    pub fn fail_on(&self, point: FailPoint) {
        *self.fail_on.lock() = Some(point);
    }

    /// Committed rows ordered by external id.
    pub fn entities(&self) -> Vec<Entity> {
        self.rows
            .lock()
            .iter()
            .map(|(id, osm_id)| Entity::new(id.clone(), *osm_id))
            .collect()
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.rows.lock().contains_key(external_id)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }
}

impl EntityStore for MemoryStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn EntityTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut rows = self.rows.lock();
        self.transactions.fetch_add(1, Ordering::SeqCst);

        let mut tx = MemoryTransaction {
            rows: rows.clone(),
            fail_on: *self.fail_on.lock(),
        };
        let value = f(&mut tx)?;
        *rows = tx.rows;
        Ok(value)
    }

    fn is_ready(&self) -> bool {
        true
    }
}

struct MemoryTransaction {
    rows: BTreeMap<String, i64>,
    fail_on: Option<FailPoint>,
}

impl MemoryTransaction {
    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        if self.fail_on == Some(point) {
            return Err(StoreError::Backend(format!("{point:?} failed")));
        }
        Ok(())
    }
}

impl EntityTransaction for MemoryTransaction {
    fn find_one(&self, external_id: &str) -> Result<Option<Entity>, StoreError> {
        Ok(self
            .rows
            .get(external_id)
            .map(|osm_id| Entity::new(external_id, *osm_id)))
    }

    fn find_existing(
        &self,
        external_ids: &[&str],
        osm_ids: &[i64],
    ) -> Result<Vec<Entity>, StoreError> {
        self.check(FailPoint::FindExisting)?;
        Ok(self
            .rows
            .iter()
            .filter(|(id, osm_id)| {
                external_ids.contains(&id.as_str()) || osm_ids.contains(*osm_id)
            })
            .map(|(id, osm_id)| Entity::new(id.clone(), *osm_id))
            .collect())
    }

    fn find_by_ids(&self, external_ids: &[&str]) -> Result<Vec<Entity>, StoreError> {
        self.check(FailPoint::FindByIds)?;
        Ok(self
            .rows
            .iter()
            .filter(|(id, _)| external_ids.contains(&id.as_str()))
            .map(|(id, osm_id)| Entity::new(id.clone(), *osm_id))
            .collect())
    }

    fn insert_many(&mut self, entities: &[Entity]) -> Result<(), StoreError> {
        self.check(FailPoint::InsertMany)?;
        for entity in entities {
            if self.rows.contains_key(&entity.external_id) {
                return Err(StoreError::Backend(
                    "UNIQUE constraint failed: entity.external_id".into(),
                ));
            }
            self.rows.insert(entity.external_id.clone(), entity.osm_id);
        }
        Ok(())
    }

    fn delete_many(&mut self, external_ids: &[&str]) -> Result<(), StoreError> {
        self.check(FailPoint::DeleteMany)?;
        for id in external_ids {
            self.rows.remove(*id);
        }
        Ok(())
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.rows.len() as u64)
    }
}
