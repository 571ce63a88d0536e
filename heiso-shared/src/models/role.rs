/// Roles and their menu/permission assignments
///
/// A role either has `full_access` or a set of `(resource, action)` grants
/// stored as `role_permissions` rows. Menus visible to the role are stored in
/// `role_menus`. Both sets are replaced wholesale on assignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use super::permission::{Permission, PermissionInput};
use super::user::LoginMethod;
use crate::ids::{generate_id, prefix};

/// Name of the role new members and former owners receive
pub const DEFAULT_ROLE_NAME: &str = "Admin";

/// Roles created for every new tenant: `(name, description, full_access)`
pub const DEFAULT_ROLES: [(&str, &str, bool); 2] = [
    ("Admin", "Administrator with high privileges", true),
    ("Editor", "", true),
];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub full_access: bool,
    pub login_method: Option<LoginMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role with its assignments, as listed on the roles page
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub role: Role,

    pub menu_ids: Vec<String>,

    /// Granted permissions as `resource.action` keys
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleInput {
    pub name: String,
    pub description: Option<String>,
    pub full_access: bool,
    pub login_method: Option<LoginMethod>,
}

/// One `(resource, action)` grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub resource: String,
    pub action: String,
}

const COLUMNS: &str = "id, name, description, full_access, login_method, created_at, updated_at";

impl Role {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<RoleDetail>, sqlx::Error> {
        sqlx::query_as::<_, RoleDetail>(
            r#"
            SELECT r.id, r.name, r.description, r.full_access, r.login_method,
                   r.created_at, r.updated_at,
                   ARRAY(
                       SELECT rm.menu_id::TEXT FROM role_menus rm
                       JOIN menus m ON m.id = rm.menu_id AND m.deleted_at IS NULL
                       WHERE rm.role_id = r.id
                       ORDER BY rm.menu_id
                   ) AS menu_ids,
                   ARRAY(
                       SELECT (p.resource || '.' || p.action)::TEXT FROM role_permissions rp
                       JOIN permissions p ON p.id = rp.permission_id AND p.deleted_at IS NULL
                       WHERE rp.role_id = r.id
                       ORDER BY 1
                   ) AS permissions
            FROM roles r
            WHERE r.deleted_at IS NULL
            ORDER BY r.created_at ASC
            "#,
        )
        .fetch_all(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Role>(&format!(
            "SELECT {COLUMNS} FROM roles WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Role given to new members and former owners: the live `Admin` role,
    /// otherwise the oldest live role.
    pub async fn default_role(conn: &mut PgConnection) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Role>(&format!(
            r#"
            SELECT {COLUMNS} FROM roles
            WHERE deleted_at IS NULL
            ORDER BY (name = $1) DESC, created_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .bind(DEFAULT_ROLE_NAME)
        .fetch_optional(conn)
        .await
    }

    pub async fn count(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles WHERE deleted_at IS NULL")
            .fetch_one(conn)
            .await
    }

    pub async fn create(conn: &mut PgConnection, data: RoleInput) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Role>(&format!(
            r#"
            INSERT INTO roles (id, name, description, full_access, login_method)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(Some(prefix::ROLE)))
        .bind(data.name)
        .bind(data.description)
        .bind(data.full_access)
        .bind(data.login_method)
        .fetch_one(conn)
        .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: &str,
        data: RoleInput,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Role>(&format!(
            r#"
            UPDATE roles
            SET name = $2, description = $3, full_access = $4, login_method = $5,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.full_access)
        .bind(data.login_method)
        .fetch_optional(conn)
        .await
    }

    /// Soft delete. Members holding the role keep the dangling id and fall
    /// back to no grants.
    pub async fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE roles SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .execute(conn)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the role's menus. Call inside a transaction.
    pub async fn assign_menus(
        conn: &mut PgConnection,
        role_id: &str,
        menu_ids: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM role_menus WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *conn)
            .await?;

        if !menu_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO role_menus (role_id, menu_id)
                SELECT $1, m.id FROM menus m
                WHERE m.id = ANY($2) AND m.deleted_at IS NULL
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(menu_ids)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Replaces the role's grants, creating permission rows for catalog
    /// entries that were never stored. Call inside a transaction.
    pub async fn assign_permissions(
        conn: &mut PgConnection,
        role_id: &str,
        grants: &[Grant],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *conn)
            .await?;

        for grant in grants {
            let permission =
                match Permission::find_by_key(&mut *conn, &grant.resource, &grant.action).await? {
                    Some(p) => p,
                    None => {
                        Permission::create(
                            &mut *conn,
                            PermissionInput {
                                menu_id: None,
                                resource: grant.resource.clone(),
                                action: grant.action.clone(),
                            },
                        )
                        .await?
                    }
                };

            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(&permission.id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Grants held by the role
    pub async fn grants(conn: &mut PgConnection, role_id: &str) -> Result<Vec<Grant>, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT p.resource, p.action
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id AND p.deleted_at IS NULL
            WHERE rp.role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(resource, action)| Grant { resource, action })
            .collect())
    }
}

impl Grant {
    /// Parses `resource.action`
    pub fn parse(key: &str) -> Option<Self> {
        let (resource, action) = key.split_once('.')?;
        if resource.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self {
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }
}
