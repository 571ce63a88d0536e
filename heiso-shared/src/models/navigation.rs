/// Site navigations and their menu items
///
/// A navigation (e.g. `main`, `footer`) owns a tree of navigation menus.
/// Items with `link_type = "page"` point at a post; their link is kept in the
/// form `{category_id}/{post_id}` and rewritten when the post's
/// categories change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use super::ReorderError;
use crate::ids::{generate_id, prefix};
use crate::slug::slugify;
use crate::tree::{descendant_ids, validate_move, validate_reorder, ReorderItem, TreeNode};

/// Link type of items that point at a post
pub const PAGE_LINK: &str = "page";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Navigation {
    pub id: String,
    pub user_id: String,
    pub slug: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub description: Option<String>,

    #[sqlx(rename = "order_number")]
    #[serde(rename = "order")]
    pub order: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TreeNode for Navigation {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn order(&self) -> Option<i32> {
        self.order
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationInput {
    pub name: String,
    pub slug: Option<String>,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NavigationMenu {
    pub id: String,
    pub navigation_id: String,
    pub slug: String,
    pub group: Option<String>,
    pub title: String,
    pub sub_title: Option<String>,
    pub icon: Option<String>,
    pub link_type: String,
    pub style: String,
    pub link: String,
    pub target_blank: bool,
    pub enabled: bool,
    pub parent_id: Option<String>,

    #[sqlx(rename = "order_number")]
    #[serde(rename = "order")]
    pub order: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TreeNode for NavigationMenu {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationMenuInput {
    pub title: String,
    pub slug: Option<String>,
    pub group: Option<String>,
    pub sub_title: Option<String>,
    pub icon: Option<String>,
    #[serde(default = "default_none")]
    pub link_type: String,
    #[serde(default = "default_none")]
    pub style: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub target_blank: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub parent_id: Option<String>,
    pub order: Option<i32>,
}

fn default_none() -> String {
    "none".to_string()
}

fn default_true() -> bool {
    true
}

/// Link stored on `page` items for a post: `{category_id}/{post_id}`
pub fn page_link(category_id: Option<&str>, post_id: &str) -> String {
    match category_id {
        Some(category) if !category.is_empty() => format!("{}/{}", category, post_id),
        _ => post_id.to_string(),
    }
}

const NAV_COLUMNS: &str =
    "id, user_id, slug, name, parent_id, description, order_number, created_at, updated_at";

const ITEM_COLUMNS: &str = r#"id, navigation_id, slug, "group", title, sub_title, icon, link_type,
    style, link, target_blank, enabled, parent_id, order_number, created_at, updated_at"#;

impl Navigation {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Navigation>(&format!(
            r#"
            SELECT {NAV_COLUMNS} FROM navigations
            WHERE deleted_at IS NULL
            ORDER BY order_number ASC NULLS LAST, created_at ASC
            "#
        ))
        .fetch_all(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Navigation>(&format!(
            "SELECT {NAV_COLUMNS} FROM navigations WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    pub async fn count(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM navigations WHERE deleted_at IS NULL")
            .fetch_one(conn)
            .await
    }

    /// Creates a navigation; the slug defaults to `slugify(name)`.
    pub async fn create(
        conn: &mut PgConnection,
        user_id: &str,
        data: NavigationInput,
    ) -> Result<Self, sqlx::Error> {
        let slug = data
            .slug
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| slugify(&data.name));

        sqlx::query_as::<_, Navigation>(&format!(
            r#"
            INSERT INTO navigations (id, user_id, slug, name, parent_id, description, order_number)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 0))
            RETURNING {NAV_COLUMNS}
            "#
        ))
        .bind(generate_id(Some(prefix::NAVIGATION)))
        .bind(user_id)
        .bind(slug)
        .bind(data.name)
        .bind(data.parent_id)
        .bind(data.description)
        .bind(data.order)
        .fetch_one(conn)
        .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: &str,
        data: NavigationInput,
    ) -> Result<Option<Self>, ReorderError> {
        let navigations = Self::list(&mut *conn).await?;
        if !navigations.iter().any(|n| n.id == id) {
            return Ok(None);
        }
        validate_move(&navigations, id, data.parent_id.as_deref())?;

        let slug = data
            .slug
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| slugify(&data.name));

        let navigation = sqlx::query_as::<_, Navigation>(&format!(
            r#"
            UPDATE navigations
            SET slug = $2, name = $3, parent_id = $4, description = $5,
                order_number = COALESCE($6, order_number), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {NAV_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(slug)
        .bind(data.name)
        .bind(data.parent_id)
        .bind(data.description)
        .bind(data.order)
        .fetch_optional(conn)
        .await?;

        Ok(navigation)
    }

    /// Soft-deletes the navigation and all of its items.
    pub async fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE navigations SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "UPDATE navigation_menus SET deleted_at = NOW() WHERE navigation_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl NavigationMenu {
    pub async fn list(
        conn: &mut PgConnection,
        navigation_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, NavigationMenu>(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM navigation_menus
            WHERE navigation_id = $1 AND deleted_at IS NULL
            ORDER BY order_number ASC NULLS LAST, created_at ASC
            "#
        ))
        .bind(navigation_id)
        .fetch_all(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, NavigationMenu>(&format!(
            "SELECT {ITEM_COLUMNS} FROM navigation_menus WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    pub async fn create(
        conn: &mut PgConnection,
        navigation_id: &str,
        data: NavigationMenuInput,
    ) -> Result<Self, sqlx::Error> {
        let slug = data
            .slug
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| slugify(&data.title));

        sqlx::query_as::<_, NavigationMenu>(&format!(
            r#"
            INSERT INTO navigation_menus (id, navigation_id, slug, "group", title, sub_title, icon,
                link_type, style, link, target_blank, enabled, parent_id, order_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(navigation_id)
        .bind(slug)
        .bind(data.group)
        .bind(data.title)
        .bind(data.sub_title)
        .bind(data.icon)
        .bind(data.link_type)
        .bind(data.style)
        .bind(data.link)
        .bind(data.target_blank)
        .bind(data.enabled)
        .bind(data.parent_id)
        .bind(data.order)
        .fetch_one(conn)
        .await
    }

    /// Overwrites every editable column. A new parent must belong to the
    /// same navigation and must not sit below the item itself.
    pub async fn update(
        conn: &mut PgConnection,
        id: &str,
        data: NavigationMenuInput,
    ) -> Result<Option<Self>, ReorderError> {
        let Some(current) = Self::find_by_id(&mut *conn, id).await? else {
            return Ok(None);
        };
        let items = Self::list(&mut *conn, &current.navigation_id).await?;
        validate_move(&items, id, data.parent_id.as_deref())?;

        let slug = data
            .slug
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| slugify(&data.title));

        let item = sqlx::query_as::<_, NavigationMenu>(&format!(
            r#"
            UPDATE navigation_menus
            SET slug = $2, "group" = $3, title = $4, sub_title = $5, icon = $6, link_type = $7,
                style = $8, link = $9, target_blank = $10, enabled = $11, parent_id = $12,
                order_number = $13, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(slug)
        .bind(data.group)
        .bind(data.title)
        .bind(data.sub_title)
        .bind(data.icon)
        .bind(data.link_type)
        .bind(data.style)
        .bind(data.link)
        .bind(data.target_blank)
        .bind(data.enabled)
        .bind(data.parent_id)
        .bind(data.order)
        .fetch_optional(conn)
        .await?;

        Ok(item)
    }

    /// Soft-deletes the item and its subtree.
    pub async fn delete_with_descendants(
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<u64, sqlx::Error> {
        let Some(item) = Self::find_by_id(&mut *conn, id).await? else {
            return Ok(0);
        };
        let siblings = Self::list(&mut *conn, &item.navigation_id).await?;
        let mut ids = descendant_ids(&siblings, id);
        ids.push(id.to_string());

        let result = sqlx::query(
            "UPDATE navigation_menus SET deleted_at = NOW() WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(&ids)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Batch parent/order update for one navigation, cycle-checked.
    pub async fn reorder(
        conn: &mut PgConnection,
        navigation_id: &str,
        updates: &[ReorderItem],
    ) -> Result<(), ReorderError> {
        let items = Self::list(&mut *conn, navigation_id).await?;
        validate_reorder(&items, updates)?;

        for item in updates {
            sqlx::query(
                r#"
                UPDATE navigation_menus
                SET parent_id = $2, order_number = $3, updated_at = NOW()
                WHERE id = $1 AND navigation_id = $4
                "#,
            )
            .bind(&item.id)
            .bind(&item.parent_id)
            .bind(item.order)
            .bind(navigation_id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Points every `page` item linking to `post_id` at the post's new
    /// primary category id. Returns the number of items rewritten.
    pub async fn relink_page(
        conn: &mut PgConnection,
        post_id: &str,
        category_id: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE navigation_menus
            SET link = $2, updated_at = NOW()
            WHERE link_type = $3
              AND deleted_at IS NULL
              AND strpos(link, $1) > 0
            "#,
        )
        .bind(post_id)
        .bind(page_link(category_id, post_id))
        .bind(PAGE_LINK)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_link() {
        assert_eq!(page_link(Some("news"), "abc123"), "news/abc123");
        assert_eq!(page_link(None, "abc123"), "abc123");
        assert_eq!(page_link(Some(""), "abc123"), "abc123");
    }

    #[test]
    fn test_menu_input_defaults() {
        let input: NavigationMenuInput = serde_json::from_value(serde_json::json!({
            "title": "About"
        }))
        .unwrap();
        assert_eq!(input.link_type, "none");
        assert_eq!(input.style, "none");
        assert_eq!(input.link, "");
        assert!(input.enabled);
        assert!(!input.target_blank);
    }
}
