use crate::errors::EntityError;
use crate::metrics_defs::{ENTITY_COUNT, ENTITY_CURRENT};
use crate::store::{EntityStore, EntityTransaction};
use crate::types::{BulkOperation, BulkRequest, Entity, ExternalId, MultiOperationBulk};
use crate::validation::validate_bulk_request;
use serde::Serialize;
use shared::{counter, gauge};
use std::sync::Arc;

/// Executes entity operations against a store. Every public operation runs in
/// its own transaction; the `*_in` variants join a transaction owned by the
/// caller.
pub struct EntityManager<S> {
    store: Arc<S>,
    allow_duplicate_osm_id: bool,
}

impl<S> Clone for EntityManager<S> {
    fn clone(&self) -> Self {
        EntityManager {
            store: self.store.clone(),
            allow_duplicate_osm_id: self.allow_duplicate_osm_id,
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

impl<S: EntityStore> EntityManager<S> {
    pub fn new(store: Arc<S>, allow_duplicate_osm_id: bool) -> Self {
        EntityManager {
            store,
            allow_duplicate_osm_id,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    /// Sets the stored entity gauge from the table size.
    pub fn sync_entity_gauge(&self) -> Result<u64, EntityError> {
        let count = self.store.transaction(|tx| tx.count())?;
        gauge!(ENTITY_CURRENT).set(count as f64);
        Ok(count)
    }

    pub fn get_entity(&self, external_id: &str) -> Result<Entity, EntityError> {
        tracing::info!(external_id, "getting entity");

        self.store
            .transaction(|tx| tx.find_one(external_id))?
            .ok_or_else(|| EntityError::EntityNotFound("Entity with given id was not found.".into()))
    }

    pub fn create_entity(&self, entity: Entity) -> Result<(), EntityError> {
        tracing::info!(
            external_id = %entity.external_id,
            osm_id = entity.osm_id,
            "creating new entity"
        );

        let result: Result<(), EntityError> = self.store.transaction(|tx| {
            let new = std::slice::from_ref(&entity);
            let existing = tx.find_existing(&[entity.external_id.as_str()], &self.osm_ids(new))?;

            // Prefer reporting the externalId collision when both columns collide.
            let conflict = existing
                .iter()
                .find(|e| e.external_id == entity.external_id)
                .or(existing.first());

            if let Some(conflict) = conflict {
                let message = if conflict.external_id == entity.external_id {
                    tracing::error!(
                        external_id = %entity.external_id,
                        "entity with the same externalId already exists"
                    );
                    format!("externalId={} already exists", entity.external_id)
                } else {
                    tracing::error!(
                        osm_id = entity.osm_id,
                        "entity with the same osmId already exists"
                    );
                    format!("osmId={} already exists", entity.osm_id)
                };
                return Err(EntityError::IdAlreadyExists(message));
            }

            tx.insert_many(new)?;
            Ok(())
        });

        self.record_outcome(result.is_ok(), 1, 0);
        result
    }

    pub fn create_entities(&self, entities: Vec<Entity>) -> Result<(), EntityError> {
        let result = self
            .store
            .transaction(|tx| self.create_entities_in(tx, &entities));

        self.record_outcome(result.is_ok(), entities.len(), 0);
        result
    }

    pub fn delete_entity(&self, external_id: &str) -> Result<(), EntityError> {
        tracing::info!(external_id, "deleting entity");

        let result: Result<(), EntityError> = self.store.transaction(|tx| {
            if tx.find_one(external_id)?.is_none() {
                tracing::error!(external_id, "could not find the entity for deletion");
                return Err(EntityError::EntityNotFound(
                    "couldn't find an entity with the given id to delete".into(),
                ));
            }
            tx.delete_many(&[external_id])?;
            Ok(())
        });

        self.record_outcome(result.is_ok(), 0, 1);
        result
    }

    pub fn delete_entities(&self, external_ids: Vec<ExternalId>) -> Result<(), EntityError> {
        let result = self
            .store
            .transaction(|tx| self.delete_entities_in(tx, &external_ids));

        self.record_outcome(result.is_ok(), 0, external_ids.len());
        result
    }

    /// Runs one create bulk and one delete bulk in a single transaction. The
    /// create bulk always runs first, whatever order the pair was given in.
    pub fn multi_operation_bulks(&self, ops: [BulkOperation; 2]) -> Result<(), EntityError> {
        let MultiOperationBulk { create, delete } = MultiOperationBulk::try_from(ops)?;
        tracing::info!(
            create_amount = create.len(),
            delete_amount = delete.len(),
            "executing multi operation bulks"
        );

        let result = self.store.transaction(|tx| {
            self.create_entities_in(tx, &create)?;
            self.delete_entities_in(tx, &delete)
        });

        self.record_outcome(result.is_ok(), create.len(), delete.len());
        result
    }

    /// Validates a bulk request and dispatches it. Nothing reaches the store
    /// when validation fails.
    pub fn execute_bulk(&self, request: BulkRequest) -> Result<(), EntityError> {
        validate_bulk_request(&request)?;

        match request {
            BulkRequest::Single(BulkOperation::Create(entities)) => self.create_entities(entities),
            BulkRequest::Single(BulkOperation::Delete(ids)) => self.delete_entities(ids),
            BulkRequest::Multi(ops) => self.multi_operation_bulks(ops),
        }
    }

    /// Inserts `entities` unless any of them collides with a stored row. The
    /// collision check runs before the insert, so a conflict inserts nothing.
    pub fn create_entities_in(
        &self,
        tx: &mut dyn EntityTransaction,
        entities: &[Entity],
    ) -> Result<(), EntityError> {
        if entities.is_empty() {
            return Ok(());
        }
        tracing::info!(amount = entities.len(), "creating bulk entities");

        let external_ids: Vec<&str> = entities.iter().map(|e| e.external_id.as_str()).collect();
        let existing = tx.find_existing(&external_ids, &self.osm_ids(entities))?;

        if let Some(conflict) = existing.first() {
            tracing::error!(
                external_id = %conflict.external_id,
                osm_id = conflict.osm_id,
                "could not create bulk, found an entity with already existing id"
            );
            return Err(EntityError::IdAlreadyExists(format!(
                "an entity with the following ids: {} already exists",
                to_json(conflict)
            )));
        }

        tx.insert_many(entities)?;
        Ok(())
    }

    /// Deletes `external_ids`, requiring every one of them to exist.
    pub fn delete_entities_in(
        &self,
        tx: &mut dyn EntityTransaction,
        external_ids: &[ExternalId],
    ) -> Result<(), EntityError> {
        if external_ids.is_empty() {
            return Ok(());
        }
        tracing::info!(amount = external_ids.len(), "deleting bulk entities");

        let ids: Vec<&str> = external_ids.iter().map(String::as_str).collect();
        let found = tx.find_by_ids(&ids)?;

        if found.len() != ids.len() {
            tracing::error!(
                expected = ids.len(),
                received = found.len(),
                "could not find {} of the specified ids",
                ids.len().saturating_sub(found.len())
            );
            return Err(EntityError::EntityNotFound(format!(
                "couldn't find one of the specified ids: {}",
                to_json(external_ids)
            )));
        }

        tx.delete_many(&ids)?;
        Ok(())
    }

    fn osm_ids(&self, entities: &[Entity]) -> Vec<i64> {
        if self.allow_duplicate_osm_id {
            return Vec::new();
        }
        entities.iter().map(|e| e.osm_id).collect()
    }

    // Only committed changes are counted as created/deleted.
    fn record_outcome(&self, committed: bool, created: usize, deleted: usize) {
        if !committed {
            counter!(ENTITY_COUNT, "status" => "failed").increment((created + deleted) as u64);
            return;
        }

        if created > 0 {
            counter!(ENTITY_COUNT, "status" => "created").increment(created as u64);
            gauge!(ENTITY_CURRENT).increment(created as f64);
        }
        if deleted > 0 {
            counter!(ENTITY_COUNT, "status" => "deleted").increment(deleted as u64);
            gauge!(ENTITY_CURRENT).decrement(deleted as f64);
        }
    }
}
