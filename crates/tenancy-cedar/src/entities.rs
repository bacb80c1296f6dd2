//! Cedar entity builders
//!
//! One function per semantic entity type, so every call site agrees on what
//! the entities and their attributes look like.

use std::collections::{HashMap, HashSet};

use cedar_policy::{Entity, EntityId, EntityTypeName, EntityUid, RestrictedExpression};

use crate::engine::{Error, Result};

/// Cedar schema namespace
const NAMESPACE: &str = "Tenancy";

/// Build an entity UID for a given type and ID
pub fn build_entity_uid(type_name: &str, id: &str) -> Result<EntityUid> {
    let full_type_name = format!("{}::{}", NAMESPACE, type_name);
    let entity_type: EntityTypeName =
        full_type_name
            .parse()
            .map_err(|e: cedar_policy::ParseErrors| {
                Error::Internal(format!(
                    "Invalid Cedar entity type name '{}': {}",
                    full_type_name, e
                ))
            })?;
    Ok(EntityUid::from_type_name_and_id(
        entity_type,
        EntityId::new(id),
    ))
}

/// Build a user entity with group membership
///
/// Returns the user entity followed by one entity per group.
pub fn build_user_entity(username: &str, groups: &[String]) -> Result<Vec<Entity>> {
    let mut entities = Vec::with_capacity(groups.len() + 1);
    let mut group_uids = HashSet::new();

    for group in groups {
        let uid = build_entity_uid("Group", group)?;
        let entity = Entity::new(uid.clone(), HashMap::new(), HashSet::new())
            .map_err(|e| Error::Internal(format!("Failed to create group entity: {}", e)))?;
        entities.push(entity);
        group_uids.insert(uid);
    }

    let user_uid = build_entity_uid("User", username)?;
    let user_entity = Entity::new(user_uid, HashMap::new(), group_uids)
        .map_err(|e| Error::Internal(format!("Failed to create user entity: {}", e)))?;
    entities.push(user_entity);

    Ok(entities)
}

/// Build the workspace type resource and its logical cluster parent
///
/// UID: `Tenancy::WorkspaceType::"cluster/name"`. The cluster is part of the
/// identity since two logical clusters can define types with the same name.
///
/// Attributes:
/// - `cluster`: owning logical cluster
/// - `name`: type name
pub fn build_workspace_type_entities(
    cluster: &str,
    type_name: &str,
) -> Result<(EntityUid, Vec<Entity>)> {
    let cluster_uid = build_entity_uid("LogicalCluster", cluster)?;
    let cluster_entity = Entity::new(cluster_uid.clone(), HashMap::new(), HashSet::new())
        .map_err(|e| Error::Internal(format!("Failed to create logical cluster entity: {}", e)))?;

    let type_uid = build_entity_uid("WorkspaceType", &format!("{}/{}", cluster, type_name))?;
    let attrs = HashMap::from([
        (
            "cluster".to_string(),
            RestrictedExpression::new_string(cluster.to_string()),
        ),
        (
            "name".to_string(),
            RestrictedExpression::new_string(type_name.to_string()),
        ),
    ]);
    let type_entity = Entity::new(type_uid.clone(), attrs, HashSet::from([cluster_uid]))
        .map_err(|e| Error::Internal(format!("Failed to create workspace type entity: {}", e)))?;

    Ok((type_uid, vec![type_entity, cluster_entity]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_entity_uid() {
        for (type_name, id) in [
            ("User", "alice@example.com"),
            ("Group", "platform"),
            ("Action", "use"),
            ("LogicalCluster", "root:org"),
            ("WorkspaceType", "root:org/team"),
        ] {
            let uid = build_entity_uid(type_name, id).unwrap();
            assert!(uid.to_string().contains(type_name));
            assert!(uid.to_string().contains(id));
        }
    }

    #[test]
    fn test_build_user_entity_with_groups() {
        let groups = vec!["admins".to_string(), "developers".to_string()];
        let entities = build_user_entity("alice", &groups).unwrap();
        assert_eq!(entities.len(), 3);
    }

    #[test]
    fn test_build_user_entity_no_groups() {
        let entities = build_user_entity("alice", &[]).unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn test_workspace_type_uid_includes_cluster() {
        let (a, _) = build_workspace_type_entities("root:a", "team").unwrap();
        let (b, _) = build_workspace_type_entities("root:b", "team").unwrap();
        assert_ne!(a, b);
        assert!(a.to_string().contains("root:a/team"));
    }

    #[test]
    fn test_workspace_type_entities_include_parent() {
        let (_, entities) = build_workspace_type_entities("root", "team").unwrap();
        assert_eq!(entities.len(), 2);
    }
}
