/// API route handlers, one module per resource
///
/// Handlers on tenant data open a tenant transaction with [`authorize`],
/// which also checks the caller's permission before anything is read.

pub mod api_keys;
pub mod auth;
pub mod files;
pub mod health;
pub mod join;
pub mod menus;
pub mod navigations;
pub mod posts;
pub mod roles;
pub mod settings;
pub mod team;
pub mod templates;
pub mod tenants;

use heiso_shared::auth::authorization::{require_permission, UserPermission};
use heiso_shared::auth::middleware::AuthContext;
use heiso_shared::db::rls::{self, TenantTx};
use heiso_shared::models::member::Member;
use heiso_shared::tree::{build_tree, group_menu_items, MenuEntry, ReorderItem, TreeItem, TreeNode};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};

/// Opens a transaction in the caller's tenant after checking that the caller
/// may perform `action` on `resource`.
pub(crate) async fn authorize(
    state: &AppState,
    auth: &AuthContext,
    resource: &str,
    action: &str,
) -> ApiResult<TenantTx> {
    let mut tx = rls::begin(&state.db, &auth.tenant_id).await?;
    require_permission(&mut tx, &auth.user_id, resource, action).await?;
    Ok(tx)
}

/// Permission check for handlers that hand the work to a flow which opens
/// its own transaction.
pub(crate) async fn ensure_permission(
    state: &AppState,
    auth: &AuthContext,
    resource: &str,
    action: &str,
) -> ApiResult<UserPermission> {
    let mut tx = rls::begin(&state.db, &auth.tenant_id).await?;
    let permission = require_permission(&mut tx, &auth.user_id, resource, action).await?;
    tx.commit().await?;
    Ok(permission)
}

/// The caller's membership in the current tenant
pub(crate) async fn caller_member(state: &AppState, auth: &AuthContext) -> ApiResult<Member> {
    let mut tx = rls::begin(&state.db, &auth.tenant_id).await?;
    let member = Member::find_by_user(&mut tx, &auth.user_id).await?;
    tx.commit().await?;
    member.ok_or_else(|| ApiError::Forbidden("Not a member of this tenant".to_string()))
}

/// Shape of a hierarchical listing, chosen with `?view=`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Flat,
    Tree,
    Grouped,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub view: View,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Flat(Vec<T>),
    Tree(Vec<TreeItem<T>>),
    Grouped(Vec<MenuEntry<T>>),
}

impl<T: TreeNode + Clone> Listing<T> {
    pub fn new(items: Vec<T>, view: View) -> Self {
        match view {
            View::Flat => Listing::Flat(items),
            View::Tree => Listing::Tree(build_tree(&items)),
            View::Grouped => Listing::Grouped(group_menu_items(&items)),
        }
    }
}

/// Body of a reorder request
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub items: Vec<ReorderItem>,
}

/// Offset pagination
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub start: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub const MAX_LIMIT: i64 = 100;

    pub fn start(&self) -> i64 {
        self.start.unwrap_or(0).max(0)
    }

    pub fn limit(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, Self::MAX_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/// Rows removed by a cascading delete
#[derive(Debug, Serialize)]
pub struct DeletedCount {
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Node {
        id: &'static str,
        parent_id: Option<&'static str>,
    }

    impl TreeNode for Node {
        fn id(&self) -> &str {
            self.id
        }

        fn parent_id(&self) -> Option<&str> {
            self.parent_id
        }
    }

    #[test]
    fn test_listing_views() {
        let nodes = vec![
            Node { id: "a", parent_id: None },
            Node { id: "b", parent_id: Some("a") },
        ];

        let flat = serde_json::to_value(Listing::new(nodes.clone(), View::Flat)).unwrap();
        assert_eq!(flat.as_array().unwrap().len(), 2);

        let tree = serde_json::to_value(Listing::new(nodes, View::Tree)).unwrap();
        assert_eq!(tree.as_array().unwrap().len(), 1);
        assert_eq!(tree[0]["children"][0]["id"], "b");
    }

    #[test]
    fn test_view_query_default() {
        let query: ViewQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.view, View::Flat);
    }

    #[test]
    fn test_page_query_bounds() {
        let q = PageQuery {
            start: Some(-5),
            limit: Some(1000),
        };
        assert_eq!(q.start(), 0);
        assert_eq!(q.limit(10), PageQuery::MAX_LIMIT);

        let q = PageQuery::default();
        assert_eq!(q.start(), 0);
        assert_eq!(q.limit(10), 10);
    }
}
