/// Dashboard menus
///
/// Menus form a tree through `parent_id` and may carry a `group` label used
/// when rendering the sidebar. Deleting a menu soft-deletes its whole subtree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use super::ReorderError;
use crate::ids::generate_id;
use crate::tree::{descendant_ids, validate_move, validate_reorder, ReorderItem, TreeNode};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Menu {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub group: Option<String>,
    pub parent_id: Option<String>,

    #[sqlx(rename = "order_number")]
    #[serde(rename = "order")]
    pub order: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TreeNode for Menu {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    fn order(&self) -> Option<i32> {
        self.order
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenuInput {
    pub title: String,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub group: Option<String>,
    pub parent_id: Option<String>,
    pub order: Option<i32>,
}

const COLUMNS: &str =
    r#"id, tenant_id, title, path, icon, "group", parent_id, order_number, created_at, updated_at"#;

impl Menu {
    /// All live menus, ordered for display
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Menu>(&format!(
            r#"
            SELECT {COLUMNS} FROM menus
            WHERE deleted_at IS NULL
            ORDER BY order_number ASC NULLS LAST, created_at ASC
            "#
        ))
        .fetch_all(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Menu>(&format!(
            "SELECT {COLUMNS} FROM menus WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Used by provisioning to keep seeding idempotent.
    pub async fn find_by_path_and_title(
        conn: &mut PgConnection,
        path: &str,
        title: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Menu>(&format!(
            "SELECT {COLUMNS} FROM menus WHERE path = $1 AND title = $2 AND deleted_at IS NULL"
        ))
        .bind(path)
        .bind(title)
        .fetch_optional(conn)
        .await
    }

    pub async fn create(conn: &mut PgConnection, data: MenuInput) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Menu>(&format!(
            r#"
            INSERT INTO menus (id, title, path, icon, "group", parent_id, order_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(data.title)
        .bind(data.path)
        .bind(data.icon)
        .bind(data.group)
        .bind(data.parent_id)
        .bind(data.order)
        .fetch_one(conn)
        .await
    }

    /// Overwrites every editable column. A new parent must exist and must
    /// not sit below the menu itself.
    pub async fn update(
        conn: &mut PgConnection,
        id: &str,
        data: MenuInput,
    ) -> Result<Option<Self>, ReorderError> {
        let menus = Self::list(&mut *conn).await?;
        if !menus.iter().any(|m| m.id == id) {
            return Ok(None);
        }
        validate_move(&menus, id, data.parent_id.as_deref())?;

        let menu = sqlx::query_as::<_, Menu>(&format!(
            r#"
            UPDATE menus
            SET title = $2, path = $3, icon = $4, "group" = $5, parent_id = $6,
                order_number = $7, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.title)
        .bind(data.path)
        .bind(data.icon)
        .bind(data.group)
        .bind(data.parent_id)
        .bind(data.order)
        .fetch_optional(conn)
        .await?;

        Ok(menu)
    }

    /// Soft-deletes `id` and every menu below it. Returns the number of rows removed.
    pub async fn delete_with_descendants(
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<u64, sqlx::Error> {
        let menus = Self::list(&mut *conn).await?;
        let mut ids = descendant_ids(&menus, id);
        ids.push(id.to_string());

        let result = sqlx::query(
            "UPDATE menus SET deleted_at = NOW() WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(&ids)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Applies a batch of parent/order changes after checking the result is
    /// still a tree. Call inside a transaction so the batch is atomic.
    pub async fn reorder(
        conn: &mut PgConnection,
        updates: &[ReorderItem],
    ) -> Result<(), ReorderError> {
        let menus = Self::list(&mut *conn).await?;
        validate_reorder(&menus, updates)?;

        for item in updates {
            sqlx::query(
                "UPDATE menus SET parent_id = $2, order_number = $3, updated_at = NOW() WHERE id = $1",
            )
            .bind(&item.id)
            .bind(&item.parent_id)
            .bind(item.order)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}
