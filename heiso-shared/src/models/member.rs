/// Tenant membership model
///
/// A member row links an email (and, once known, a user) to a tenant with a
/// role, an ownership flag and a lifecycle status:
///
/// ```text
/// invited --accept--> joined
///    |                  ^
///    +--decline--> declined
/// review --(owner approves)--> joined
/// ```
///
/// All functions take a connection from a tenant transaction
/// ([`crate::db::rls::begin`]); row-level security restricts them to that
/// tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use super::user::LoginMethod;
use crate::ids::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Invited,
    Joined,
    Review,
    Declined,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Invited => "invited",
            MemberStatus::Joined => "joined",
            MemberStatus::Review => "review",
            MemberStatus::Declined => "declined",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: String,
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub email: String,
    pub role_id: Option<String>,

    #[serde(skip_serializing)]
    pub invite_token: Option<String>,

    pub token_expired_at: Option<DateTime<Utc>>,
    pub is_owner: bool,
    pub login_method: Option<LoginMethod>,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Member joined with its user and role, as shown on the team page
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamMember {
    pub id: String,
    pub user_id: Option<String>,
    pub email: String,
    pub role_id: Option<String>,
    pub role_name: Option<String>,
    pub is_owner: bool,
    pub status: MemberStatus,
    pub token_expired_at: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub active: Option<bool>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub user_id: Option<String>,
    pub email: String,
    pub role_id: Option<String>,
    pub invite_token: Option<String>,
    pub token_expired_at: Option<DateTime<Utc>>,
    pub is_owner: bool,
    pub status: MemberStatus,
}

const COLUMNS: &str = "id, tenant_id, user_id, email, role_id, invite_token, token_expired_at, \
                       is_owner, login_method, status, created_at, updated_at, deleted_at";

impl Member {
    pub fn is_joined(&self) -> bool {
        self.status == MemberStatus::Joined
    }

    /// Whether the invitation can still be answered at `now`
    pub fn invite_is_valid(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none()
            && self.invite_token.is_some()
            && self.token_expired_at.map_or(false, |exp| exp > now)
    }

    pub async fn create(conn: &mut PgConnection, data: NewMember) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO members (id, user_id, email, role_id, invite_token, token_expired_at, is_owner, status)
            VALUES ($1, $2, LOWER($3), $4, $5, $6, $7, $8)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(data.user_id)
        .bind(data.email)
        .bind(data.role_id)
        .bind(data.invite_token)
        .bind(data.token_expired_at)
        .bind(data.is_owner)
        .bind(data.status)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {COLUMNS} FROM members WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    pub async fn find_by_email(
        conn: &mut PgConnection,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {COLUMNS} FROM members WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL"
        ))
        .bind(email.trim())
        .fetch_optional(conn)
        .await
    }

    pub async fn find_by_user(
        conn: &mut PgConnection,
        user_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {COLUMNS} FROM members WHERE user_id = $1 AND deleted_at IS NULL"
        ))
        .bind(user_id)
        .fetch_optional(conn)
        .await
    }

    /// Looks up a member by invite token, ignoring expiry.
    pub async fn find_by_invite_token(
        conn: &mut PgConnection,
        token: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {COLUMNS} FROM members WHERE invite_token = $1 AND deleted_at IS NULL"
        ))
        .bind(token)
        .fetch_optional(conn)
        .await
    }

    /// Team listing: owners first, then by creation time.
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<TeamMember>, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(
            r#"
            SELECT m.id, m.user_id, m.email, m.role_id, r.name AS role_name, m.is_owner,
                   m.status, m.token_expired_at, u.name, u.avatar, u.active,
                   u.last_login_at, m.created_at
            FROM members m
            LEFT JOIN users u ON u.id = m.user_id
            LEFT JOIN roles r ON r.id = m.role_id AND r.deleted_at IS NULL
            WHERE m.deleted_at IS NULL
            ORDER BY m.is_owner DESC, m.created_at ASC
            "#,
        )
        .fetch_all(conn)
        .await
    }

    /// Updates role and/or status. `None` leaves the column untouched.
    pub async fn update(
        conn: &mut PgConnection,
        id: &str,
        role_id: Option<&str>,
        status: Option<MemberStatus>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            r#"
            UPDATE members
            SET role_id = COALESCE($2, role_id),
                status = COALESCE($3, status),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role_id)
        .bind(status)
        .fetch_optional(conn)
        .await
    }

    /// Stores (or clears, with `None`) the invitation token and its expiry.
    pub async fn set_invite(
        conn: &mut PgConnection,
        id: &str,
        token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET invite_token = $2, token_expired_at = $3, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Answers an invitation: new status, token and expiry cleared.
    ///
    /// The `invite_token = $3` guard makes concurrent answers race-free: only
    /// one of them sees the token.
    pub async fn answer_invite(
        conn: &mut PgConnection,
        id: &str,
        status: MemberStatus,
        token: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            r#"
            UPDATE members
            SET status = $2, invite_token = NULL, token_expired_at = NULL, updated_at = NOW()
            WHERE id = $1 AND invite_token = $3 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(token)
        .fetch_optional(conn)
        .await
    }

    pub async fn bind_user(
        conn: &mut PgConnection,
        id: &str,
        user_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE members SET user_id = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sets the owner flag and role in one statement.
    pub async fn set_ownership(
        conn: &mut PgConnection,
        id: &str,
        is_owner: bool,
        role_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET is_owner = $2, role_id = $3, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(is_owner)
        .bind(role_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// First-login review: the first member of a tenant becomes its owner.
    pub async fn promote_to_joined(
        conn: &mut PgConnection,
        id: &str,
        is_owner: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            r#"
            UPDATE members
            SET status = 'joined', is_owner = is_owner OR $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(is_owner)
        .fetch_optional(conn)
        .await
    }

    /// Removes the row outright (revoked invitations, leaving a team).
    pub async fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM members WHERE deleted_at IS NULL")
            .fetch_one(conn)
            .await
    }

    pub async fn has_owner(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM members WHERE is_owner AND deleted_at IS NULL)",
        )
        .fetch_one(conn)
        .await
    }

    /// Memberships of `user_id` in every tenant.
    ///
    /// Needs a directory transaction ([`crate::db::rls::begin_directory`]);
    /// inside a tenant transaction it only counts that tenant.
    pub async fn count_for_user(conn: &mut PgConnection, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM members WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(conn)
        .await
    }
}
