/// Tenant-scoped transactions
///
/// Every tenant-owned table carries a `tenant_isolation` policy comparing
/// `tenant_id` with `current_setting('app.current_tenant_id', true)`. A tenant
/// transaction sets that value with `is_local = true` and drops to the
/// `heiso_app` role for its lifetime, so the policy applies to every statement
/// and disappears at commit or rollback. Nothing leaks across pooled
/// connections.
///
/// # Example
///
/// ```no_run
/// use heiso_shared::db::rls;
/// use heiso_shared::models::role::Role;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let mut tx = rls::begin(&pool, "t_8Hq2LxP0aZ").await?;
/// let roles = Role::list(&mut tx).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::trace;

/// Role every tenant transaction runs as. Created by the migrations.
pub const TENANT_ROLE: &str = "heiso_app";

/// Read-only role that sees memberships of every tenant
pub const DIRECTORY_ROLE: &str = "heiso_directory";

/// Session setting read by the row-level-security policies
pub const TENANT_SETTING: &str = "app.current_tenant_id";

/// A transaction bound to one tenant
pub type TenantTx = Transaction<'static, Postgres>;

/// Opens a transaction scoped to `tenant_id`.
///
/// # Errors
///
/// Fails when the pool cannot hand out a connection or when the connecting
/// user is not allowed to assume [`TENANT_ROLE`].
pub async fn begin(pool: &PgPool, tenant_id: &str) -> Result<TenantTx, sqlx::Error> {
    let mut tx = pool.begin().await?;
    enter(&mut tx, tenant_id).await?;
    Ok(tx)
}

/// Binds an already open transaction to `tenant_id` for the rest of its life.
///
/// Used when a transaction has to touch global tables first, e.g. creating
/// the tenant row before seeding its defaults.
pub async fn enter(conn: &mut PgConnection, tenant_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config($1, $2, true)")
        .bind(TENANT_SETTING)
        .bind(tenant_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(&format!("SET LOCAL ROLE {TENANT_ROLE}"))
        .execute(&mut *conn)
        .await?;

    trace!(tenant_id, "Entered tenant scope");
    Ok(())
}

/// Opens a read-only transaction that can see memberships of all tenants.
///
/// Only `members` and `tenants` are readable under [`DIRECTORY_ROLE`].
pub async fn begin_directory(pool: &PgPool) -> Result<TenantTx, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(&format!("SET LOCAL ROLE {DIRECTORY_ROLE}"))
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

/// Tenant the current transaction is bound to, if any
pub async fn current_tenant(
    conn: &mut PgConnection,
) -> Result<Option<String>, sqlx::Error> {
    let value: Option<String> =
        sqlx::query_scalar("SELECT NULLIF(current_setting($1, true), '')")
            .bind(TENANT_SETTING)
            .fetch_one(conn)
            .await?;
    Ok(value)
}
