/// Posts and page categories
///
/// Editor documents (`content`, `content_mobile`) are stored as opaque JSON.
/// The exported HTML is written only when a post is published, so drafts and
/// in-progress edits never change what the public site renders.
///
/// # Status transitions
///
/// ```text
/// create:  publish -> published        otherwise -> draft
/// update:  publish -> published        published -> editing
///                                      draft/editing -> unchanged
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgConnection;
use tracing::debug;

use super::navigation::NavigationMenu;
use crate::ids::generate_id;
use crate::slug::slugify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,

    /// Published, with unpublished changes saved since
    Editing,
}

/// Status after a save. `current` is `None` when the post is being created.
pub fn next_status(current: Option<PostStatus>, publish: bool) -> PostStatus {
    match (current, publish) {
        (_, true) => PostStatus::Published,
        (None, false) => PostStatus::Draft,
        (Some(PostStatus::Published), false) => PostStatus::Editing,
        (Some(status), false) => status,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub updater: Option<String>,
    pub title: Option<String>,
    pub slug: String,
    pub content: JsonValue,
    pub content_mobile: Option<JsonValue>,
    pub html: Option<String>,
    pub html_mobile: Option<String>,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub featured_video: Option<String>,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub saved_template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing row with author and last editor names
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostSummary {
    pub id: String,
    pub title: Option<String>,
    pub slug: String,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub author_name: Option<String>,
    pub updater: Option<String>,
    pub updater_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub categories: Vec<Category>,
}

/// Input of [`Post::save`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavePost {
    pub title: Option<String>,
    pub slug: Option<String>,
    #[serde(default)]
    pub content: Option<JsonValue>,
    pub content_mobile: Option<JsonValue>,
    pub html: Option<String>,
    pub html_mobile: Option<String>,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub featured_video: Option<String>,
    pub saved_template_id: Option<String>,

    /// Replaces the post's categories when non-empty. The first id becomes
    /// the primary category that navigation links point under.
    pub category_ids: Option<Vec<String>>,

    #[serde(default)]
    pub publish: bool,
}

impl SavePost {
    fn resolved_slug(&self) -> String {
        match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slugify(slug),
            _ => slugify(self.title.as_deref().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub slug: Option<String>,
    pub parent_id: Option<String>,
}

const COLUMNS: &str = "id, user_id, updater, title, slug, content, content_mobile, html, \
                       html_mobile, excerpt, featured_image, featured_video, status, \
                       published_at, saved_template_id, created_at, updated_at";

impl Post {
    /// Creates (`id = None`) or updates a post.
    ///
    /// Returns `Ok(None)` when `id` names no live post.
    pub async fn save(
        conn: &mut PgConnection,
        user_id: &str,
        id: Option<&str>,
        data: SavePost,
    ) -> Result<Option<Self>, sqlx::Error> {
        let post = match id {
            None => Some(Self::insert(&mut *conn, user_id, &data).await?),
            Some(id) => Self::apply_update(&mut *conn, user_id, id, &data).await?,
        };

        let Some(post) = post else {
            return Ok(None);
        };

        if let Some(category_ids) = data.category_ids.as_deref().filter(|ids| !ids.is_empty()) {
            Self::set_categories(&mut *conn, &post.id, category_ids).await?;

            let primary = category_ids.first().map(String::as_str);
            let relinked = NavigationMenu::relink_page(&mut *conn, &post.id, primary).await?;
            if relinked > 0 {
                debug!(post_id = %post.id, relinked, "Rewrote navigation links");
            }
        }

        Ok(Some(post))
    }

    async fn insert(
        conn: &mut PgConnection,
        user_id: &str,
        data: &SavePost,
    ) -> Result<Self, sqlx::Error> {
        let id = generate_id(None);
        let slug = match data.resolved_slug() {
            s if s.is_empty() => id.to_lowercase(),
            s => s,
        };
        let status = next_status(None, data.publish);

        sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (id, user_id, updater, title, slug, content, content_mobile, html,
                html_mobile, excerpt, featured_image, featured_video, status, published_at,
                saved_template_id)
            VALUES ($1, $2, $2, $3, $4, COALESCE($5, '[]'::JSONB), $6,
                CASE WHEN $12 THEN $7 END, CASE WHEN $12 THEN $8 END,
                $9, $10, $11, $13, CASE WHEN $12 THEN NOW() END, $14)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(user_id)
        .bind(&data.title)
        .bind(slug)
        .bind(&data.content)
        .bind(&data.content_mobile)
        .bind(&data.html)
        .bind(&data.html_mobile)
        .bind(&data.excerpt)
        .bind(&data.featured_image)
        .bind(&data.featured_video)
        .bind(data.publish)
        .bind(status)
        .bind(&data.saved_template_id)
        .fetch_one(conn)
        .await
    }

    async fn apply_update(
        conn: &mut PgConnection,
        user_id: &str,
        id: &str,
        data: &SavePost,
    ) -> Result<Option<Self>, sqlx::Error> {
        let current: Option<PostStatus> = sqlx::query_scalar(
            "SELECT status FROM posts WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(current) = current else {
            return Ok(None);
        };
        let status = next_status(Some(current), data.publish);
        let slug = Some(data.resolved_slug()).filter(|s| !s.is_empty());

        sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET updater = $2,
                title = COALESCE($3, title),
                slug = COALESCE($4, slug),
                content = COALESCE($5, content),
                content_mobile = COALESCE($6, content_mobile),
                html = CASE WHEN $12 THEN $7 ELSE html END,
                html_mobile = CASE WHEN $12 THEN $8 ELSE html_mobile END,
                excerpt = COALESCE($9, excerpt),
                featured_image = COALESCE($10, featured_image),
                featured_video = COALESCE($11, featured_video),
                status = $13,
                published_at = CASE WHEN $12 THEN NOW() ELSE published_at END,
                saved_template_id = COALESCE($14, saved_template_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(&data.title)
        .bind(slug)
        .bind(&data.content)
        .bind(&data.content_mobile)
        .bind(&data.html)
        .bind(&data.html_mobile)
        .bind(&data.excerpt)
        .bind(&data.featured_image)
        .bind(&data.featured_video)
        .bind(data.publish)
        .bind(status)
        .bind(&data.saved_template_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Post>(&format!(
            "SELECT {COLUMNS} FROM posts WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Post with its categories
    pub async fn get(conn: &mut PgConnection, id: &str) -> Result<Option<PostDetail>, sqlx::Error> {
        let Some(post) = Self::find_by_id(&mut *conn, id).await? else {
            return Ok(None);
        };
        let categories = Category::for_post(conn, id).await?;
        Ok(Some(PostDetail { post, categories }))
    }

    /// Newest first, optionally restricted to one category. Returns the page
    /// and the total number of matching posts.
    pub async fn list(
        conn: &mut PgConnection,
        category_id: Option<&str>,
        start: i64,
        limit: i64,
    ) -> Result<(Vec<PostSummary>, i64), sqlx::Error> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM posts p
            WHERE p.deleted_at IS NULL
              AND ($1::TEXT IS NULL OR EXISTS (
                  SELECT 1 FROM post_categories pc
                  WHERE pc.post_id = p.id AND pc.category_id = $1
              ))
            "#,
        )
        .bind(category_id)
        .fetch_one(&mut *conn)
        .await?;

        let posts = sqlx::query_as::<_, PostSummary>(
            r#"
            SELECT p.id, p.title, p.slug, p.excerpt, p.featured_image, p.status, p.published_at,
                   p.user_id, author.name AS author_name, p.updater, editor.name AS updater_name,
                   p.created_at, p.updated_at
            FROM posts p
            LEFT JOIN users author ON author.id = p.user_id
            LEFT JOIN users editor ON editor.id = p.updater
            WHERE p.deleted_at IS NULL
              AND ($1::TEXT IS NULL OR EXISTS (
                  SELECT 1 FROM post_categories pc
                  WHERE pc.post_id = p.id AND pc.category_id = $1
              ))
            ORDER BY p.created_at DESC, p.id DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(category_id)
        .bind(start)
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok((posts, total))
    }

    pub async fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE posts SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .execute(conn)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the post's categories. Unknown category ids are ignored.
    pub async fn set_categories(
        conn: &mut PgConnection,
        post_id: &str,
        category_ids: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM post_categories WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *conn)
            .await?;

        // position keeps the caller's order; the first category is the primary one
        sqlx::query(
            r#"
            INSERT INTO post_categories (post_id, category_id, position)
            SELECT $1, c.id, wanted.pos
            FROM unnest($2::TEXT[]) WITH ORDINALITY AS wanted(id, pos)
            JOIN page_categories c ON c.id = wanted.id AND c.deleted_at IS NULL
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(category_ids)
        .execute(conn)
        .await?;

        Ok(())
    }
}

const CATEGORY_COLUMNS: &str = "id, name, slug, parent_id, created_at, updated_at";

impl Category {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM page_categories WHERE deleted_at IS NULL ORDER BY name"
        ))
        .fetch_all(conn)
        .await
    }

    pub async fn create(conn: &mut PgConnection, data: CategoryInput) -> Result<Self, sqlx::Error> {
        let slug = match data.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slugify(slug),
            _ => slugify(&data.name),
        };

        sqlx::query_as::<_, Category>(&format!(
            r#"
            INSERT INTO page_categories (id, name, slug, parent_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(data.name)
        .bind(slug)
        .bind(data.parent_id)
        .fetch_one(conn)
        .await
    }

    pub async fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE page_categories SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Categories of a post, primary first.
    pub async fn for_post(conn: &mut PgConnection, post_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT c.id, c.name, c.slug, c.parent_id, c.created_at, c.updated_at
            FROM post_categories pc
            JOIN page_categories c ON c.id = pc.category_id AND c.deleted_at IS NULL
            WHERE pc.post_id = $1
            ORDER BY pc.position
            "#,
        )
        .bind(post_id)
        .fetch_all(conn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_status_on_create() {
        assert_eq!(next_status(None, true), PostStatus::Published);
        assert_eq!(next_status(None, false), PostStatus::Draft);
    }

    #[test]
    fn test_next_status_on_update() {
        assert_eq!(next_status(Some(PostStatus::Draft), true), PostStatus::Published);
        assert_eq!(next_status(Some(PostStatus::Draft), false), PostStatus::Draft);
        assert_eq!(next_status(Some(PostStatus::Published), false), PostStatus::Editing);
        assert_eq!(next_status(Some(PostStatus::Editing), false), PostStatus::Editing);
        assert_eq!(next_status(Some(PostStatus::Editing), true), PostStatus::Published);
    }

    #[test]
    fn test_resolved_slug_falls_back_to_title() {
        let data = SavePost {
            title: Some("Hello World!".to_string()),
            ..Default::default()
        };
        assert_eq!(data.resolved_slug(), "hello-world");

        let data = SavePost {
            title: Some("Hello".to_string()),
            slug: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(data.resolved_slug(), "hello");
    }

    #[test]
    fn test_resolved_slug_prefers_explicit() {
        let data = SavePost {
            title: Some("Hello".to_string()),
            slug: Some("Custom Slug".to_string()),
            ..Default::default()
        };
        assert_eq!(data.resolved_slug(), "custom-slug");
    }
}
