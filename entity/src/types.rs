use crate::validation::ValidationError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

pub type ExternalId = String;

/// A stored mapping between a caller supplied id and an OSM element id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub external_id: ExternalId,
    pub osm_id: i64,
}

impl Entity {
    pub fn new<I>(external_id: I, osm_id: i64) -> Self
    where
        I: Into<ExternalId>,
    {
        Entity {
            external_id: external_id.into(),
            osm_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkAction {
    Create,
    Delete,
}

/// One bulk operation, tagged on the wire by its `action` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "lowercase")]
pub enum BulkOperation {
    Create(Vec<Entity>),
    Delete(Vec<ExternalId>),
}

impl BulkOperation {
    pub fn action(&self) -> BulkAction {
        match self {
            BulkOperation::Create(_) => BulkAction::Create,
            BulkOperation::Delete(_) => BulkAction::Delete,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BulkOperation::Create(entities) => entities.len(),
            BulkOperation::Delete(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn external_ids(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            BulkOperation::Create(entities) => {
                Box::new(entities.iter().map(|e| e.external_id.as_str()))
            }
            BulkOperation::Delete(ids) => Box::new(ids.iter().map(String::as_str)),
        }
    }
}

/// Body of `POST /entity/bulk`: either a single bulk operation or a pair of them.
#[derive(Clone, Debug, PartialEq)]
pub enum BulkRequest {
    Single(BulkOperation),
    Multi([BulkOperation; 2]),
}

impl<'de> Deserialize<'de> for BulkRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Dispatch on the JSON shape so that parse errors name the actual problem
        // instead of "did not match any variant".
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.is_array() {
            serde_json::from_value::<[BulkOperation; 2]>(value)
                .map(BulkRequest::Multi)
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value::<BulkOperation>(value)
                .map(BulkRequest::Single)
                .map_err(D::Error::custom)
        }
    }
}

/// A multi operation request normalized to execution order: create first, then delete.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiOperationBulk {
    pub create: Vec<Entity>,
    pub delete: Vec<ExternalId>,
}

impl TryFrom<[BulkOperation; 2]> for MultiOperationBulk {
    type Error = ValidationError;

    fn try_from(ops: [BulkOperation; 2]) -> Result<Self, Self::Error> {
        match ops {
            [BulkOperation::Create(create), BulkOperation::Delete(delete)]
            | [BulkOperation::Delete(delete), BulkOperation::Create(create)] => {
                Ok(MultiOperationBulk { create, delete })
            }
            _ => Err(ValidationError::ActionsNotPaired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_wire_format() {
        let entity: Entity =
            serde_json::from_value(json!({"externalId": "a", "osmId": 1})).unwrap();
        assert_eq!(entity, Entity::new("a", 1));
        assert_eq!(
            serde_json::to_string(&entity).unwrap(),
            r#"{"externalId":"a","osmId":1}"#
        );

        assert!(serde_json::from_value::<Entity>(json!({"externalId": "a"})).is_err());
        assert!(
            serde_json::from_value::<Entity>(json!({"externalId": "a", "osmId": "1"})).is_err()
        );
        assert!(serde_json::from_value::<Entity>(json!({"externalId": 1, "osmId": 1})).is_err());
    }

    #[test]
    fn test_parse_single_operations() {
        let create: BulkRequest = serde_json::from_value(json!({
            "action": "create",
            "payload": [{"externalId": "a", "osmId": 1}]
        }))
        .unwrap();
        assert_eq!(
            create,
            BulkRequest::Single(BulkOperation::Create(vec![Entity::new("a", 1)]))
        );

        let delete: BulkRequest = serde_json::from_value(json!({
            "action": "delete",
            "payload": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(
            delete,
            BulkRequest::Single(BulkOperation::Delete(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_parse_rejects_mismatched_payload() {
        // Delete action with entity payload
        assert!(
            serde_json::from_value::<BulkRequest>(json!({
                "action": "delete",
                "payload": [{"externalId": "a", "osmId": 1}]
            }))
            .is_err()
        );

        // Unknown action
        let err = serde_json::from_value::<BulkRequest>(json!({
            "action": "update",
            "payload": ["a"]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown variant `update`"));
    }

    #[test]
    fn test_parse_multi_operation() {
        let request: BulkRequest = serde_json::from_value(json!([
            {"action": "delete", "payload": ["b"]},
            {"action": "create", "payload": [{"externalId": "a", "osmId": 1}]}
        ]))
        .unwrap();

        assert_eq!(
            request,
            BulkRequest::Multi([
                BulkOperation::Delete(vec!["b".into()]),
                BulkOperation::Create(vec![Entity::new("a", 1)]),
            ])
        );
    }

    #[test]
    fn test_parse_multi_operation_wrong_length() {
        let err = serde_json::from_value::<BulkRequest>(json!([
            {"action": "delete", "payload": ["b"]}
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("expected an array of length 2"));

        assert!(
            serde_json::from_value::<BulkRequest>(json!([
                {"action": "delete", "payload": ["b"]},
                {"action": "delete", "payload": ["c"]},
                {"action": "create", "payload": [{"externalId": "a", "osmId": 1}]}
            ]))
            .is_err()
        );
    }

    #[test]
    fn test_multi_operation_is_reordered() {
        let create = BulkOperation::Create(vec![Entity::new("a", 1)]);
        let delete = BulkOperation::Delete(vec!["b".into()]);
        let expected = MultiOperationBulk {
            create: vec![Entity::new("a", 1)],
            delete: vec!["b".into()],
        };

        assert_eq!(
            MultiOperationBulk::try_from([create.clone(), delete.clone()]),
            Ok(expected.clone())
        );
        assert_eq!(
            MultiOperationBulk::try_from([delete.clone(), create.clone()]),
            Ok(expected)
        );
        assert_eq!(
            MultiOperationBulk::try_from([delete.clone(), delete]),
            Err(ValidationError::ActionsNotPaired)
        );
    }

    #[test]
    fn test_external_ids() {
        let create = BulkOperation::Create(vec![Entity::new("a", 1), Entity::new("b", 2)]);
        assert_eq!(create.external_ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(create.action(), BulkAction::Create);
        assert_eq!(create.len(), 2);

        let delete = BulkOperation::Delete(vec![]);
        assert!(delete.is_empty());
        assert_eq!(delete.action(), BulkAction::Delete);
    }
}
