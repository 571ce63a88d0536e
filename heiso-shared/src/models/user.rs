/// User model and database operations
///
/// Users are global accounts. A user joins tenants through `members` rows;
/// the same email can belong to several tenants with different roles.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id VARCHAR(20) PRIMARY KEY,
///     email VARCHAR(255) NOT NULL,          -- unique on LOWER(email)
///     name VARCHAR(100) NOT NULL,
///     password VARCHAR(255) NOT NULL,       -- Argon2id PHC string
///     avatar VARCHAR(255),
///     active BOOLEAN NOT NULL DEFAULT FALSE,
///     last_login_at TIMESTAMPTZ,
///     login_method login_method,
///     two_factor_enabled BOOLEAN NOT NULL DEFAULT FALSE,
///     must_change_password BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use heiso_shared::models::user::{CreateUser, User};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     email: "editor@example.com".to_string(),
///     name: "Editor".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     active: true,
///     must_change_password: false,
/// }).await?;
///
/// let found = User::find_by_email(&pool, "EDITOR@example.com").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::ids::{generate_id, prefix};

/// How a user may sign in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "login_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// Email + password only
    Password,

    /// Emailed one-time code only
    Otp,

    /// Either
    Both,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Password => "password",
            LoginMethod::Otp => "otp",
            LoginMethod::Both => "both",
        }
    }

    pub fn allows_password(&self) -> bool {
        !matches!(self, LoginMethod::Otp)
    }

    pub fn allows_otp(&self) -> bool {
        !matches!(self, LoginMethod::Password)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,

    /// Argon2id hash. Never serialized.
    #[serde(skip_serializing, default)]
    pub password: String,

    pub avatar: Option<String>,

    /// False for invited placeholders and deactivated members
    pub active: bool,

    pub last_login_at: Option<DateTime<Utc>>,
    pub login_method: Option<LoginMethod>,
    pub two_factor_enabled: bool,

    /// Set when someone else chose the password (admin reset, added member)
    pub must_change_password: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub name: String,

    /// Argon2id hash, not the plaintext password
    pub password_hash: String,

    pub active: bool,
    pub must_change_password: bool,
}

/// Profile fields a user may change. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub two_factor_enabled: Option<bool>,
    pub login_method: Option<LoginMethod>,
}

const COLUMNS: &str = "id, email, name, password, avatar, active, last_login_at, login_method, \
                       two_factor_enabled, must_change_password, created_at, updated_at";

impl User {
    /// Name shown when the account has none: the local part of the email
    pub fn default_name(email: &str) -> String {
        email.split('@').next().unwrap_or(email).to_string()
    }

    /// Creates a user with a fresh `u_` id.
    ///
    /// # Errors
    ///
    /// Unique violation when the email (case-insensitive) already exists.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, password, active, must_change_password)
            VALUES ($1, LOWER($2), $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(Some(prefix::USER)))
        .bind(data.email)
        .bind(data.name)
        .bind(data.password_hash)
        .bind(data.active)
        .bind(data.must_change_password)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Case-insensitive lookup
    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email.trim())
        .fetch_optional(executor)
        .await
    }

    /// Replaces the password hash and the `must_change_password` flag.
    pub async fn set_password<'e, E>(
        executor: E,
        id: &str,
        password_hash: &str,
        must_change_password: bool,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password = $2, must_change_password = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(must_change_password)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Activates a returning user on signup: new password, optional new name,
    /// `active = true`, `must_change_password = false`.
    pub async fn activate_with_password<'e, E>(
        executor: E,
        id: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                password = $3,
                active = TRUE,
                must_change_password = FALSE,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(password_hash)
        .fetch_one(executor)
        .await
    }

    pub async fn set_active<'e, E>(executor: E, id: &str, active: bool) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("UPDATE users SET active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_login<'e, E>(executor: E, id: &str) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn update_profile<'e, E>(
        executor: E,
        id: &str,
        data: UpdateProfile,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                avatar = COALESCE($3, avatar),
                two_factor_enabled = COALESCE($4, two_factor_enabled),
                login_method = COALESCE($5, login_method),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.name)
        .bind(data.avatar)
        .bind(data.two_factor_enabled)
        .bind(data.login_method)
        .fetch_optional(executor)
        .await
    }

    /// Removes the account. Codes and reset tokens cascade.
    pub async fn delete<'e, E>(executor: E, id: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Platform developers. A developer has full access in every tenant.
pub struct Developer;

impl Developer {
    pub async fn is_developer<'e, E>(executor: E, user_id: &str) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM developers WHERE user_id = $1 AND deleted_at IS NULL)",
        )
        .bind(user_id)
        .fetch_one(executor)
        .await
    }

    pub async fn grant<'e, E>(executor: E, user_id: &str) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO developers (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET deleted_at = NULL
            "#,
        )
        .bind(user_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_uses_local_part() {
        assert_eq!(User::default_name("jane.doe@example.com"), "jane.doe");
        assert_eq!(User::default_name("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_login_method_rules() {
        assert!(LoginMethod::Password.allows_password());
        assert!(!LoginMethod::Password.allows_otp());
        assert!(LoginMethod::Otp.allows_otp());
        assert!(!LoginMethod::Otp.allows_password());
        assert!(LoginMethod::Both.allows_password());
        assert!(LoginMethod::Both.allows_otp());
    }

    #[test]
    fn test_login_method_serialization() {
        assert_eq!(serde_json::to_string(&LoginMethod::Both).unwrap(), "\"both\"");
        let parsed: LoginMethod = serde_json::from_str("\"otp\"").unwrap();
        assert_eq!(parsed, LoginMethod::Otp);
        assert_eq!(LoginMethod::Password.as_str(), "password");
    }

    #[test]
    fn test_password_not_serialized() {
        let user = User {
            id: "u_0123456789".to_string(),
            email: "a@example.com".to_string(),
            name: "a".to_string(),
            password: "$argon2id$secret".to_string(),
            avatar: None,
            active: true,
            last_login_at: None,
            login_method: None,
            two_factor_enabled: false,
            must_change_password: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "a@example.com");
    }
}
