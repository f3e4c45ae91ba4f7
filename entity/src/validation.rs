//! Structural checks on request bodies, run before anything touches the store.
use crate::types::{BulkOperation, BulkRequest, Entity};
use std::collections::HashSet;

pub const MAX_EXTERNAL_ID_LENGTH: usize = 68;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must NOT have more than 68 characters")]
    ExternalIdTooLong { field: String },

    #[error("single operation request payload must NOT have fewer than 1 items")]
    EmptySinglePayload,

    #[error("multi operation request payload must be a tuple of create bulk and delete bulk")]
    ActionsNotPaired,

    #[error("multi operation request payloads must NOT have fewer than 1 items")]
    EmptyMultiPayload,

    #[error("duplicate externalId found in multi operation request payload")]
    DuplicateExternalId { external_id: String },
}

pub fn validate_external_id(field: &str, external_id: &str) -> Result<(), ValidationError> {
    if external_id.chars().count() > MAX_EXTERNAL_ID_LENGTH {
        return Err(ValidationError::ExternalIdTooLong {
            field: field.to_string(),
        });
    }
    Ok(())
}

pub fn validate_entity(field: &str, entity: &Entity) -> Result<(), ValidationError> {
    validate_external_id(&format!("{field}/externalId"), &entity.external_id)
}

/// Validates a bulk request body. Id lengths are checked first, then the
/// cardinality rules in order; the first violation is returned.
pub fn validate_bulk_request(request: &BulkRequest) -> Result<(), ValidationError> {
    match request {
        BulkRequest::Single(op) => {
            validate_id_lengths("body", op)?;
            validate_single(op)
        }
        BulkRequest::Multi(ops) => {
            for (i, op) in ops.iter().enumerate() {
                validate_id_lengths(&format!("body/{i}"), op)?;
            }
            validate_multi(ops)
        }
    }
}

fn validate_id_lengths(prefix: &str, op: &BulkOperation) -> Result<(), ValidationError> {
    match op {
        BulkOperation::Create(entities) => {
            for (i, entity) in entities.iter().enumerate() {
                validate_entity(&format!("{prefix}/payload/{i}"), entity)?;
            }
        }
        BulkOperation::Delete(ids) => {
            for (i, id) in ids.iter().enumerate() {
                validate_external_id(&format!("{prefix}/payload/{i}"), id)?;
            }
        }
    }
    Ok(())
}

fn validate_single(op: &BulkOperation) -> Result<(), ValidationError> {
    if op.is_empty() {
        return Err(ValidationError::EmptySinglePayload);
    }
    Ok(())
}

fn validate_multi(ops: &[BulkOperation; 2]) -> Result<(), ValidationError> {
    let [first, second] = ops;

    if first.action() == second.action() {
        return Err(ValidationError::ActionsNotPaired);
    }

    if first.is_empty() && second.is_empty() {
        return Err(ValidationError::EmptyMultiPayload);
    }

    let mut seen = HashSet::with_capacity(first.len() + second.len());
    for external_id in first.external_ids().chain(second.external_ids()) {
        if !seen.insert(external_id) {
            return Err(ValidationError::DuplicateExternalId {
                external_id: external_id.to_string(),
            });
        }
    }

    Ok(())
}
