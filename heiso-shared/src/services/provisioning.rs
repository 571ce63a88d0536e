/// Default data for a new tenant
///
/// [`seed_defaults`] is idempotent: menus are matched by path and title,
/// roles are only created when the tenant has none, and the main navigation
/// only when no navigation exists. Running it twice leaves the tenant as it
/// was after the first run.

use sqlx::PgConnection;
use tracing::{debug, info};

use crate::models::menu::{Menu, MenuInput};
use crate::models::navigation::{Navigation, NavigationInput};
use crate::models::role::{Role, RoleInput, DEFAULT_ROLES};
use crate::models::tenant::Tenant;

/// Order given to the first seeded menu; later menus count up from here
pub const MENU_ORDER_START: i32 = 1000;

/// Author recorded on the generated navigation
pub const SYSTEM_USER: &str = "system_init";

/// A dashboard menu contributed by a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleMenu {
    pub module: &'static str,
    pub group: &'static str,
    pub title: &'static str,
    pub path: &'static str,
    pub icon: &'static str,
}

/// Menus seeded for each module, in sidebar order
pub const MODULE_MENUS: [ModuleMenu; 6] = [
    ModuleMenu {
        module: "post",
        group: "content",
        title: "Posts",
        path: "/posts",
        icon: "file-text",
    },
    ModuleMenu {
        module: "post",
        group: "content",
        title: "Categories",
        path: "/categories",
        icon: "folder-tree",
    },
    ModuleMenu {
        module: "navigation",
        group: "content",
        title: "Navigation",
        path: "/navigation",
        icon: "navigation",
    },
    ModuleMenu {
        module: "menu",
        group: "system",
        title: "Menu",
        path: "/menu",
        icon: "menu",
    },
    ModuleMenu {
        module: "role",
        group: "membership",
        title: "Role",
        path: "/role",
        icon: "square-user-round",
    },
    ModuleMenu {
        module: "role",
        group: "membership",
        title: "Team",
        path: "/team",
        icon: "users-round",
    },
];

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Tenant slug already taken: {0}")]
    SlugTaken(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What a [`seed_defaults`] run created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub menus: usize,
    pub roles: usize,
    pub navigations: usize,
}

/// Menus of the enabled modules, in sidebar order
pub fn menus_for(tenant: &Tenant) -> impl Iterator<Item = &'static ModuleMenu> + '_ {
    MODULE_MENUS.iter().filter(|m| tenant.has_module(m.module))
}

/// Seeds menus, roles and the main navigation into `tenant`.
///
/// `conn` must already be scoped to `tenant` ([`crate::db::rls::enter`]).
pub async fn seed_defaults(
    conn: &mut PgConnection,
    tenant: &Tenant,
) -> Result<SeedReport, ProvisionError> {
    let mut report = SeedReport::default();

    let mut order = MENU_ORDER_START;
    for menu in menus_for(tenant) {
        if Menu::find_by_path_and_title(&mut *conn, menu.path, menu.title)
            .await?
            .is_none()
        {
            Menu::create(
                &mut *conn,
                MenuInput {
                    title: menu.title.to_string(),
                    path: Some(menu.path.to_string()),
                    icon: Some(menu.icon.to_string()),
                    group: Some(menu.group.to_string()),
                    parent_id: None,
                    order: Some(order),
                },
            )
            .await?;
            report.menus += 1;
        }
        order += 1;
    }

    if tenant.has_module("role") && Role::count(&mut *conn).await? == 0 {
        for (name, description, full_access) in DEFAULT_ROLES {
            Role::create(
                &mut *conn,
                RoleInput {
                    name: name.to_string(),
                    description: Some(description.to_string()).filter(|d| !d.is_empty()),
                    full_access,
                    login_method: None,
                },
            )
            .await?;
            report.roles += 1;
        }
    }

    if Navigation::count(&mut *conn).await? == 0 {
        Navigation::create(
            &mut *conn,
            SYSTEM_USER,
            NavigationInput {
                name: "Main Menu".to_string(),
                slug: Some("main".to_string()),
                parent_id: None,
                description: Some("Default system generated menu".to_string()),
                order: Some(0),
            },
        )
        .await?;
        report.navigations += 1;
    }

    if report == SeedReport::default() {
        debug!(tenant_id = %tenant.id, "Tenant defaults already present");
    } else {
        info!(
            tenant_id = %tenant.id,
            menus = report.menus,
            roles = report.roles,
            navigations = report.navigations,
            "Seeded tenant defaults"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tenant(modules: &[&str]) -> Tenant {
        Tenant {
            id: "t_0123456789".to_string(),
            name: "Acme".to_string(),
            slug: "acme".to_string(),
            modules: modules.iter().map(|m| m.to_string()).collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_menus_follow_modules() {
        let titles: Vec<_> = menus_for(&tenant(&["role"])).map(|m| m.title).collect();
        assert_eq!(titles, vec!["Role", "Team"]);

        assert_eq!(menus_for(&tenant(&[])).count(), 0);
    }

    #[test]
    fn test_membership_menus_grouped() {
        let all = tenant(&["menu", "role", "navigation", "post"]);
        let membership: Vec<_> = menus_for(&all)
            .filter(|m| m.group == "membership")
            .map(|m| m.path)
            .collect();
        assert_eq!(membership, vec!["/role", "/team"]);
        assert_eq!(menus_for(&all).count(), MODULE_MENUS.len());
    }

    #[test]
    fn test_menu_paths_unique() {
        let mut paths: Vec<_> = MODULE_MENUS.iter().map(|m| m.path).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), MODULE_MENUS.len());
    }
}
