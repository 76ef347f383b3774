//! Change notifications emitted by the domain layer.

use serde::{Deserialize, Serialize};

use crate::{IndexType, Uid};

/// What kind of index change a notification asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    /// Re-index the affected documents.
    Update,
    /// Remove the affected documents.
    Delete,
    /// Drop and fully re-populate the index.
    Rebuild,
}

/// How the affected documents of a notification are found.
///
/// `SingleUnit` names exactly one uid; every other variant is an entity kind
/// the domain builder knows how to expand (e.g. all products of a category).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectedEntityType {
    SingleUnit,
    Category,
    Store,
    Warehouse,
    Brand,
    Catalog,
    ProductType,
}

/// One detected change in the system of record.
///
/// With no `affected_entity_type` the affected set is whatever
/// `query_string` matches in the current index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexNotification {
    pub index_type: IndexType,
    pub update_type: UpdateType,
    pub affected_entity_type: Option<AffectedEntityType>,
    pub affected_uid: Option<Uid>,
    pub query_string: Option<String>,
}

impl IndexNotification {
    /// Notification about exactly one document.
    pub fn single_unit(index_type: IndexType, update_type: UpdateType, uid: Uid) -> Self {
        Self {
            index_type,
            update_type,
            affected_entity_type: Some(AffectedEntityType::SingleUnit),
            affected_uid: Some(uid),
            query_string: None,
        }
    }

    /// Notification about every document matching a raw engine query.
    pub fn by_query(index_type: IndexType, update_type: UpdateType, query: impl Into<String>) -> Self {
        Self {
            index_type,
            update_type,
            affected_entity_type: None,
            affected_uid: None,
            query_string: Some(query.into()),
        }
    }

    /// Notification about documents related to another entity, resolved by
    /// the domain builder.
    pub fn by_entity(
        index_type: IndexType,
        update_type: UpdateType,
        entity_type: AffectedEntityType,
        uid: Uid,
    ) -> Self {
        Self {
            index_type,
            update_type,
            affected_entity_type: Some(entity_type),
            affected_uid: Some(uid),
            query_string: None,
        }
    }

    /// Request a full rebuild of the index.
    pub fn rebuild(index_type: IndexType) -> Self {
        Self {
            index_type,
            update_type: UpdateType::Rebuild,
            affected_entity_type: None,
            affected_uid: None,
            query_string: None,
        }
    }
}

/// A notification as held by a notification store.
///
/// Ids are assigned by the store and strictly increase in enqueue order, so
/// "everything up to id N" is a stable removal bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: u64,
    pub notification: IndexNotification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let single = IndexNotification::single_unit(IndexType::Product, UpdateType::Update, 7);
        assert_eq!(single.affected_entity_type, Some(AffectedEntityType::SingleUnit));
        assert_eq!(single.affected_uid, Some(7));

        let query = IndexNotification::by_query(IndexType::Sku, UpdateType::Delete, "storecode:A");
        assert!(query.affected_entity_type.is_none());
        assert_eq!(query.query_string.as_deref(), Some("storecode:A"));

        let rebuild = IndexNotification::rebuild(IndexType::Category);
        assert_eq!(rebuild.update_type, UpdateType::Rebuild);
    }

    #[test]
    fn test_serde_shape() {
        let n = IndexNotification::by_entity(
            IndexType::Product,
            UpdateType::Update,
            AffectedEntityType::Category,
            3,
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["update_type"], "update");
        assert_eq!(json["affected_entity_type"], "category");

        let back: IndexNotification = serde_json::from_value(json).unwrap();
        assert_eq!(back, n);
    }
}
