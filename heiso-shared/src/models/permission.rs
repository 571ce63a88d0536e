/// Permissions: `(resource, action)` pairs that roles are granted
///
/// A built-in catalog covers every resource the API protects; tenants can add
/// their own rows, optionally attached to a dashboard menu. Listings merge
/// both, with database rows winning over catalog entries of the same key.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::ids::{generate_id, prefix};

/// Resources protected by the API
pub const RESOURCES: [&str; 10] = [
    "team",
    "role",
    "permission",
    "menu",
    "navigation",
    "post",
    "template",
    "file",
    "setting",
    "api_key",
];

pub const ACTIONS: [&str; 4] = ["read", "create", "update", "delete"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permission {
    pub id: String,
    pub menu_id: Option<String>,
    pub resource: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A permission as seen by callers: catalog entries have no id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub id: Option<String>,
    pub menu_id: Option<String>,
    pub resource: String,
    pub action: String,
}

impl PermissionEntry {
    pub fn key(&self) -> String {
        format!("{}.{}", self.resource, self.action)
    }
}

impl From<Permission> for PermissionEntry {
    fn from(p: Permission) -> Self {
        Self {
            id: Some(p.id),
            menu_id: p.menu_id,
            resource: p.resource,
            action: p.action,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionInput {
    pub menu_id: Option<String>,
    pub resource: String,
    pub action: String,
}

/// Every `(resource, action)` pair of the built-in catalog
pub fn builtin_permissions() -> Vec<PermissionEntry> {
    RESOURCES
        .iter()
        .flat_map(|resource| {
            ACTIONS.iter().map(move |action| PermissionEntry {
                id: None,
                menu_id: None,
                resource: resource.to_string(),
                action: action.to_string(),
            })
        })
        .collect()
}

/// Merges catalog and database permissions, deduplicated by `resource.action`.
///
/// Database entries replace catalog entries with the same key; order of first
/// appearance is kept.
pub fn merge(catalog: Vec<PermissionEntry>, stored: Vec<PermissionEntry>) -> Vec<PermissionEntry> {
    let stored_keys: HashSet<String> = stored.iter().map(PermissionEntry::key).collect();
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(catalog.len() + stored.len());

    for entry in catalog.into_iter().filter(|e| !stored_keys.contains(&e.key())) {
        if seen.insert(entry.key()) {
            merged.push(entry);
        }
    }
    for entry in stored {
        if seen.insert(entry.key()) {
            merged.push(entry);
        }
    }
    merged
}

/// Groups entries by `menu_id`; entries without a menu are keyed by `""`.
pub fn group_by_menu(entries: &[PermissionEntry]) -> BTreeMap<String, Vec<PermissionEntry>> {
    let mut groups: BTreeMap<String, Vec<PermissionEntry>> = BTreeMap::new();
    for entry in entries {
        groups
            .entry(entry.menu_id.clone().unwrap_or_default())
            .or_default()
            .push(entry.clone());
    }
    groups
}

const COLUMNS: &str = "id, menu_id, resource, action, created_at, updated_at";

impl Permission {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Permission>(&format!(
            "SELECT {COLUMNS} FROM permissions WHERE deleted_at IS NULL ORDER BY resource, action"
        ))
        .fetch_all(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Permission>(&format!(
            "SELECT {COLUMNS} FROM permissions WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_by_key(
        conn: &mut PgConnection,
        resource: &str,
        action: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Permission>(&format!(
            r#"
            SELECT {COLUMNS} FROM permissions
            WHERE resource = $1 AND action = $2 AND deleted_at IS NULL
            "#
        ))
        .bind(resource)
        .bind(action)
        .fetch_optional(conn)
        .await
    }

    pub async fn create(conn: &mut PgConnection, data: PermissionInput) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Permission>(&format!(
            r#"
            INSERT INTO permissions (id, menu_id, resource, action)
            VALUES ($1, $2, $3, $4)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(Some(prefix::PERMISSION)))
        .bind(data.menu_id)
        .bind(data.resource)
        .bind(data.action)
        .fetch_one(conn)
        .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: &str,
        data: PermissionInput,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Permission>(&format!(
            r#"
            UPDATE permissions
            SET menu_id = $2, resource = $3, action = $4, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.menu_id)
        .bind(data.resource)
        .bind(data.action)
        .fetch_optional(conn)
        .await
    }

    pub async fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE permissions SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Catalog plus stored permissions, merged
    pub async fn list_merged(conn: &mut PgConnection) -> Result<Vec<PermissionEntry>, sqlx::Error> {
        let stored = Self::list(conn).await?;
        Ok(merge(
            builtin_permissions(),
            stored.into_iter().map(PermissionEntry::from).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Option<&str>, menu: Option<&str>, resource: &str, action: &str) -> PermissionEntry {
        PermissionEntry {
            id: id.map(String::from),
            menu_id: menu.map(String::from),
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn test_builtin_catalog_is_complete() {
        let catalog = builtin_permissions();
        assert_eq!(catalog.len(), RESOURCES.len() * ACTIONS.len());
        assert!(catalog.iter().any(|p| p.key() == "post.create"));
        assert!(catalog.iter().all(|p| p.id.is_none()));
    }

    #[test]
    fn test_merge_prefers_stored() {
        let catalog = vec![entry(None, None, "post", "read"), entry(None, None, "post", "create")];
        let stored = vec![entry(Some("pe_1"), Some("m1"), "post", "read")];

        let merged = merge(catalog, stored);
        assert_eq!(merged.len(), 2);
        let read = merged.iter().find(|p| p.key() == "post.read").unwrap();
        assert_eq!(read.id.as_deref(), Some("pe_1"));
        assert_eq!(read.menu_id.as_deref(), Some("m1"));
    }

    #[test]
    fn test_merge_dedupes_stored_duplicates() {
        let stored = vec![
            entry(Some("pe_1"), None, "file", "delete"),
            entry(Some("pe_2"), None, "file", "delete"),
        ];
        let merged = merge(Vec::new(), stored);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id.as_deref(), Some("pe_1"));
    }

    #[test]
    fn test_group_by_menu() {
        let entries = vec![
            entry(Some("a"), Some("m1"), "post", "read"),
            entry(Some("b"), None, "team", "read"),
            entry(Some("c"), Some("m1"), "post", "update"),
        ];
        let groups = group_by_menu(&entries);
        assert_eq!(groups["m1"].len(), 2);
        assert_eq!(groups[""].len(), 1);
    }
}
