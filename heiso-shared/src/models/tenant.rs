/// Tenant model and database operations
///
/// A tenant is one customer site. Tenant rows are global: every other
/// tenant-owned table points at `tenants.id` and is isolated by row-level
/// security, but this table itself is readable without a tenant context so
/// requests can be resolved from the `X-Tenant-Id` header.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenants (
///     id VARCHAR(20) PRIMARY KEY,
///     name VARCHAR(100) NOT NULL,
///     slug VARCHAR(100) NOT NULL UNIQUE,
///     modules TEXT[] NOT NULL DEFAULT ARRAY['menu', 'role', 'navigation', 'post'],
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::ids::{generate_id, prefix};

/// Modules enabled for a tenant when none are requested
pub const DEFAULT_MODULES: [&str; 4] = ["menu", "role", "navigation", "post"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,

    /// Enabled dashboard modules, e.g. `post`, `navigation`, `role`
    pub modules: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
    pub modules: Vec<String>,
}

impl Tenant {
    /// Whether `module` is enabled for this tenant
    pub fn has_module(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }

    /// Creates a tenant with a fresh `t_` id.
    ///
    /// # Errors
    ///
    /// Unique violation when the slug is taken.
    pub async fn create<'e, E>(executor: E, data: CreateTenant) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, name, slug, modules)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, slug, modules, created_at, updated_at
            "#,
        )
        .bind(generate_id(Some(prefix::TENANT)))
        .bind(data.name)
        .bind(data.slug)
        .bind(data.modules)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, slug, modules, created_at, updated_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_slug<'e, E>(executor: E, slug: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, slug, modules, created_at, updated_at
            FROM tenants
            WHERE slug = $1
            "#,
        )
        .bind(slug)
        .fetch_optional(executor)
        .await
    }

    /// Deletes a tenant and, through foreign keys, everything it owns.
    pub async fn delete<'e, E>(executor: E, id: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
