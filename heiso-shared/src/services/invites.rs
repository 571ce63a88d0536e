/// Answering invitations by token
///
/// Tokens are single use: accepting or declining clears the token in the
/// same statement that checks it, so a second answer finds nothing.

use chrono::Utc;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::info;

use crate::db::rls;
use crate::models::member::{Member, MemberStatus};
use crate::models::user::User;

#[derive(Debug, thiserror::Error)]
pub enum InviteError {
    #[error("Invalid invitation token")]
    InvalidToken,

    #[error("Invitation has expired")]
    Expired,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Account already bound to an invitation
#[derive(Debug, Clone, Serialize)]
pub struct InvitedUser {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingInvite {
    #[serde(flatten)]
    pub member: Member,
    pub user: Option<InvitedUser>,
}

async fn lookup(conn: &mut PgConnection, token: &str) -> Result<Member, InviteError> {
    let member = Member::find_by_invite_token(&mut *conn, token)
        .await?
        .ok_or(InviteError::InvalidToken)?;

    if member.invite_is_valid(Utc::now()) {
        Ok(member)
    } else {
        Err(InviteError::Expired)
    }
}

/// Resolves a token that can still be answered.
pub async fn find_valid(
    pool: &PgPool,
    tenant_id: &str,
    token: &str,
) -> Result<PendingInvite, InviteError> {
    if token.is_empty() {
        return Err(InviteError::InvalidToken);
    }

    let mut tx = rls::begin(pool, tenant_id).await?;
    let member = lookup(&mut tx, token).await?;

    let user = match member.user_id.as_deref() {
        Some(user_id) => User::find_by_id(&mut *tx, user_id).await?.map(|u| InvitedUser {
            id: u.id,
            name: u.name,
            avatar: u.avatar,
        }),
        None => None,
    };

    tx.commit().await?;
    Ok(PendingInvite { member, user })
}

/// Joins the team and activates the bound account.
pub async fn accept(pool: &PgPool, tenant_id: &str, token: &str) -> Result<Member, InviteError> {
    answer(pool, tenant_id, token, MemberStatus::Joined).await
}

pub async fn decline(pool: &PgPool, tenant_id: &str, token: &str) -> Result<Member, InviteError> {
    answer(pool, tenant_id, token, MemberStatus::Declined).await
}

async fn answer(
    pool: &PgPool,
    tenant_id: &str,
    token: &str,
    status: MemberStatus,
) -> Result<Member, InviteError> {
    let mut tx = rls::begin(pool, tenant_id).await?;

    let member = lookup(&mut tx, token).await?;
    let member = Member::answer_invite(&mut tx, &member.id, status, token)
        .await?
        .ok_or(InviteError::InvalidToken)?;

    if status == MemberStatus::Joined {
        if let Some(user_id) = member.user_id.as_deref() {
            User::set_active(&mut *tx, user_id, true).await?;
        }
    }

    tx.commit().await?;

    info!(tenant_id, member_id = %member.id, status = status.as_str(), "Invitation answered");
    Ok(member)
}
