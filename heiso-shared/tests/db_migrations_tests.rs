/// Integration tests for schema migrations
///
/// These tests require a running PostgreSQL database whose user may create
/// roles. Run with: cargo test --test db_migrations_tests

mod common;

use heiso_shared::db::migrations::{ensure_database_exists, get_migration_status, run_migrations};
use heiso_shared::db::rls::{DIRECTORY_ROLE, TENANT_ROLE};

#[tokio::test]
async fn test_ensure_database_exists() {
    let result = ensure_database_exists(&common::database_url()).await;
    assert!(result.is_ok(), "Failed to ensure database exists: {:?}", result.err());
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let pool = common::pool().await;

    let first = get_migration_status(&pool).await.expect("Failed to get status");
    run_migrations(&pool).await.expect("Second migration run failed");
    let second = get_migration_status(&pool).await.expect("Failed to get status");

    assert_eq!(first.applied_migrations, second.applied_migrations);
    assert!(second.is_up_to_date);
}

#[tokio::test]
async fn test_access_roles_created() {
    let pool = common::pool().await;

    for role in [TENANT_ROLE, DIRECTORY_ROLE] {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
                .bind(role)
                .fetch_one(&pool)
                .await
                .expect("Failed to query roles");
        assert!(exists, "role {role} missing");
    }
}

#[tokio::test]
async fn test_tenant_tables_force_row_level_security() {
    let pool = common::pool().await;

    let unprotected: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT c.relname::TEXT FROM pg_class c
        JOIN information_schema.columns col
          ON col.table_name = c.relname AND col.column_name = 'tenant_id'
        WHERE col.table_schema = 'public'
          AND c.relkind = 'r'
          AND NOT (c.relrowsecurity AND c.relforcerowsecurity)
        "#,
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert!(unprotected.is_empty(), "tables without RLS: {unprotected:?}");
}
