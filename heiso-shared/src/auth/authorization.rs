/// Permission resolution and checks
///
/// # Permission Model
///
/// 1. **Developers** have full access in every tenant
/// 2. **Owners** have full access in their tenant
/// 3. **Roles** with `full_access` grant everything
/// 4. Otherwise the role's `(resource, action)` grants apply
///
/// Members that have not joined (invited, in review, declined) have no
/// access at all.
///
/// # Example
///
/// ```no_run
/// use heiso_shared::auth::authorization::require_permission;
/// use heiso_shared::auth::middleware::AuthContext;
/// use heiso_shared::db::rls;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, auth: AuthContext) -> Result<(), Box<dyn std::error::Error>> {
/// let mut tx = rls::begin(&pool, &auth.tenant_id).await?;
/// require_permission(&mut tx, &auth.user_id, "post", "update").await?;
/// // ... update the post ...
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use serde::Serialize;
use sqlx::PgConnection;

use crate::models::member::Member;
use crate::models::role::{Grant, Role};
use crate::models::user::Developer;

/// Role label reported for developers
pub const DEVELOPER_ROLE: &str = "develop";

/// Role label reported for owners
pub const OWNER_ROLE: &str = "owner";

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Not a member of this tenant")]
    NotMember,

    #[error("Missing permission {resource}.{action}")]
    Forbidden { resource: String, action: String },

    #[error("Only the tenant owner can do this")]
    NotOwner,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// What a user may do in the current tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPermission {
    /// `develop`, `owner`, the role name, or empty when the member has no role
    pub role: String,

    pub full_access: bool,

    /// Grants as `resource.action` keys; empty with full access
    pub permissions: Vec<String>,
}

impl UserPermission {
    pub fn full(role: &str) -> Self {
        Self {
            role: role.to_string(),
            full_access: true,
            permissions: Vec::new(),
        }
    }

    pub fn from_grants(role: &str, grants: &[Grant]) -> Self {
        let mut permissions: Vec<String> = grants
            .iter()
            .map(|g| format!("{}.{}", g.resource, g.action))
            .collect();
        permissions.sort();
        permissions.dedup();

        Self {
            role: role.to_string(),
            full_access: false,
            permissions,
        }
    }

    pub fn can(&self, resource: &str, action: &str) -> bool {
        self.full_access
            || self
                .permissions
                .iter()
                .any(|p| p.split_once('.') == Some((resource, action)))
    }
}

/// Resolves the permissions of `user_id` in the tenant of `conn`.
///
/// # Errors
///
/// [`AuthzError::NotMember`] when the user has no joined membership and is
/// not a developer.
pub async fn resolve_permissions(
    conn: &mut PgConnection,
    user_id: &str,
) -> Result<UserPermission, AuthzError> {
    if Developer::is_developer(&mut *conn, user_id).await? {
        return Ok(UserPermission::full(DEVELOPER_ROLE));
    }

    let member = Member::find_by_user(&mut *conn, user_id)
        .await?
        .filter(Member::is_joined)
        .ok_or(AuthzError::NotMember)?;

    if member.is_owner {
        return Ok(UserPermission::full(OWNER_ROLE));
    }

    let Some(role_id) = member.role_id.as_deref() else {
        return Ok(UserPermission::from_grants("", &[]));
    };
    let Some(role) = Role::find_by_id(&mut *conn, role_id).await? else {
        return Ok(UserPermission::from_grants("", &[]));
    };

    if role.full_access {
        return Ok(UserPermission::full(&role.name));
    }

    let grants = Role::grants(conn, &role.id).await?;
    Ok(UserPermission::from_grants(&role.name, &grants))
}

/// Fails unless `user_id` may perform `action` on `resource`.
pub async fn require_permission(
    conn: &mut PgConnection,
    user_id: &str,
    resource: &str,
    action: &str,
) -> Result<UserPermission, AuthzError> {
    let permission = resolve_permissions(conn, user_id).await?;
    if permission.can(resource, action) {
        Ok(permission)
    } else {
        Err(AuthzError::Forbidden {
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }
}

/// Returns the caller's membership when the caller owns the tenant.
pub async fn require_owner(conn: &mut PgConnection, user_id: &str) -> Result<Member, AuthzError> {
    let member = Member::find_by_user(conn, user_id)
        .await?
        .ok_or(AuthzError::NotMember)?;

    if member.is_owner {
        Ok(member)
    } else {
        Err(AuthzError::NotOwner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(resource: &str, action: &str) -> Grant {
        Grant {
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn test_full_access_can_everything() {
        let p = UserPermission::full(OWNER_ROLE);
        assert!(p.can("post", "delete"));
        assert!(p.can("anything", "at_all"));
    }

    #[test]
    fn test_grants_are_exact() {
        let p = UserPermission::from_grants("Editor", &[grant("post", "read"), grant("post", "update")]);
        assert!(p.can("post", "read"));
        assert!(p.can("post", "update"));
        assert!(!p.can("post", "delete"));
        assert!(!p.can("team", "read"));
        assert_eq!(p.role, "Editor");
    }

    #[test]
    fn test_grants_deduplicated_and_sorted() {
        let p = UserPermission::from_grants(
            "Editor",
            &[grant("post", "update"), grant("file", "read"), grant("post", "update")],
        );
        assert_eq!(p.permissions, vec!["file.read", "post.update"]);
    }

    #[test]
    fn test_no_role_can_nothing() {
        let p = UserPermission::from_grants("", &[]);
        assert!(!p.full_access);
        assert!(!p.can("post", "read"));
    }
}
