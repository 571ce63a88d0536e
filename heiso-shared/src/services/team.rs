/// Team management: invitations, membership changes and ownership
///
/// Every function opens its own tenant transaction. Invitation mail is sent
/// after commit; a failed delivery is logged and the invite still stands,
/// since it can be resent.

use chrono::{Duration, Utc};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use validator::Validate;

use crate::auth::password::{hash_password, validate_password_strength, PasswordError};
use crate::db::rls;
use crate::ids::generate_invite_token;
use crate::mail::Notifier;
use crate::models::member::{Member, MemberStatus, NewMember, TeamMember};
use crate::models::role::Role;
use crate::models::tenant::Tenant;
use crate::models::user::{CreateUser, UpdateProfile, User};

/// Days an invitation link stays valid
pub const INVITE_TTL_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum TeamError {
    #[error("This email is already a member of the team")]
    EmailRepeat,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Acting member not found")]
    ActorMemberNotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Member has not activated an account yet")]
    UserNotActivated,

    #[error("Target member must be joined")]
    NotJoined,

    #[error("No role available for the former owner")]
    NoDefaultRole,

    #[error("Role not found")]
    RoleNotFound,

    #[error("The owner cannot leave the team; transfer ownership first")]
    OwnerCannotLeave,

    #[error("{0}")]
    WeakPassword(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Invitation {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub role_id: Option<String>,

    /// Creates (or renames) the account ahead of signup
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,

    #[serde(default)]
    pub is_owner: bool,
}

fn invite_expiry() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::days(INVITE_TTL_DAYS)
}

async fn ensure_role(conn: &mut PgConnection, role_id: Option<&str>) -> Result<(), TeamError> {
    if let Some(role_id) = role_id {
        Role::find_by_id(conn, role_id)
            .await?
            .ok_or(TeamError::RoleNotFound)?;
    }
    Ok(())
}

/// The member row of `user`: by user id, else by email (binding the user).
pub async fn member_for_user(
    conn: &mut PgConnection,
    user: &User,
) -> Result<Option<Member>, sqlx::Error> {
    if let Some(member) = Member::find_by_user(&mut *conn, &user.id).await? {
        return Ok(Some(member));
    }

    match Member::find_by_email(&mut *conn, &user.email).await? {
        Some(mut member) if member.user_id.is_none() => {
            Member::bind_user(&mut *conn, &member.id, &user.id).await?;
            member.user_id = Some(user.id.clone());
            Ok(Some(member))
        }
        other => Ok(other),
    }
}

pub async fn list_members(pool: &PgPool, tenant_id: &str) -> Result<Vec<TeamMember>, TeamError> {
    let mut tx = rls::begin(pool, tenant_id).await?;
    let members = Member::list(&mut tx).await?;
    tx.commit().await?;
    Ok(members)
}

/// Invites `email` into `tenant` and mails the join link.
pub async fn invite(
    pool: &PgPool,
    notifier: &Notifier,
    tenant: &Tenant,
    invitation: Invitation,
) -> Result<Member, TeamError> {
    let email = invitation.email.trim().to_lowercase();
    let mut tx = rls::begin(pool, &tenant.id).await?;

    if Member::find_by_email(&mut tx, &email).await?.is_some() {
        return Err(TeamError::EmailRepeat);
    }

    let role_id = invitation.role_id.filter(|_| !invitation.is_owner);
    ensure_role(&mut tx, role_id.as_deref()).await?;

    let name = invitation
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let user_id = match (User::find_by_email(&mut *tx, &email).await?, name) {
        (Some(user), Some(name)) => {
            User::update_profile(
                &mut *tx,
                &user.id,
                UpdateProfile {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
            )
            .await?;
            Some(user.id)
        }
        (Some(user), None) => Some(user.id),
        (None, Some(name)) => {
            // Unusable password until the invitee signs up
            let placeholder = hash_password(&generate_invite_token())?;
            let user = User::create(
                &mut *tx,
                CreateUser {
                    email: email.clone(),
                    name: name.to_string(),
                    password_hash: placeholder,
                    active: false,
                    must_change_password: true,
                },
            )
            .await?;
            Some(user.id)
        }
        (None, None) => None,
    };

    let token = generate_invite_token();
    let member = Member::create(
        &mut tx,
        NewMember {
            user_id,
            email: email.clone(),
            role_id,
            invite_token: Some(token.clone()),
            token_expired_at: Some(invite_expiry()),
            is_owner: invitation.is_owner,
            status: MemberStatus::Invited,
        },
    )
    .await?;

    tx.commit().await?;

    info!(
        tenant_id = %tenant.id,
        member_id = %member.id,
        is_owner = member.is_owner,
        "Member invited"
    );

    if let Err(e) = notifier.invite(&email, &tenant.name, &token).await {
        warn!(member_id = %member.id, error = %e, "Failed to send invitation");
    }

    Ok(member)
}

/// Changes role and/or status. Setting a status also (de)activates the
/// bound account: only joined members may sign in. Moving a member from
/// `review` to `joined` mails an approval notice.
pub async fn update_member(
    pool: &PgPool,
    notifier: &Notifier,
    tenant: &Tenant,
    member_id: &str,
    role_id: Option<&str>,
    status: Option<MemberStatus>,
) -> Result<Member, TeamError> {
    let mut tx = rls::begin(pool, &tenant.id).await?;

    ensure_role(&mut tx, role_id).await?;

    let previous = Member::find_by_id(&mut tx, member_id)
        .await?
        .ok_or(TeamError::MemberNotFound)?;

    let member = Member::update(&mut tx, member_id, role_id, status)
        .await?
        .ok_or(TeamError::MemberNotFound)?;

    if let (Some(status), Some(user_id)) = (status, member.user_id.as_deref()) {
        User::set_active(&mut *tx, user_id, status == MemberStatus::Joined).await?;
    }

    tx.commit().await?;

    info!(tenant_id = %tenant.id, member_id, status = ?member.status, "Member updated");

    if previous.status == MemberStatus::Review && member.status == MemberStatus::Joined {
        if let Err(e) = notifier.approved(&member.email, &tenant.name).await {
            warn!(member_id, error = %e, "Failed to send approval notice");
        }
    }

    Ok(member)
}

/// Issues a fresh token (valid another 7 days) and mails it again.
pub async fn resend_invite(
    pool: &PgPool,
    notifier: &Notifier,
    tenant: &Tenant,
    member_id: &str,
) -> Result<Member, TeamError> {
    let mut tx = rls::begin(pool, &tenant.id).await?;

    let mut member = Member::find_by_id(&mut tx, member_id)
        .await?
        .ok_or(TeamError::MemberNotFound)?;

    let token = generate_invite_token();
    let expires_at = invite_expiry();
    Member::set_invite(&mut tx, member_id, Some(&token), Some(expires_at)).await?;
    tx.commit().await?;

    member.invite_token = Some(token.clone());
    member.token_expired_at = Some(expires_at);

    if let Err(e) = notifier.invite(&member.email, &tenant.name, &token).await {
        warn!(member_id, error = %e, "Failed to resend invitation");
    }

    Ok(member)
}

/// Removes an invitation outright.
pub async fn revoke_invite(pool: &PgPool, tenant_id: &str, member_id: &str) -> Result<(), TeamError> {
    let mut tx = rls::begin(pool, tenant_id).await?;
    if !Member::delete(&mut tx, member_id).await? {
        return Err(TeamError::MemberNotFound);
    }
    tx.commit().await?;

    info!(tenant_id, member_id, "Invitation revoked");
    Ok(())
}

/// Removes a member. The account goes too when it belongs to no other
/// tenant. Returns whether the account was deleted.
pub async fn leave_team(pool: &PgPool, tenant_id: &str, member_id: &str) -> Result<bool, TeamError> {
    let mut tx = rls::begin(pool, tenant_id).await?;

    let member = Member::find_by_id(&mut tx, member_id)
        .await?
        .ok_or(TeamError::MemberNotFound)?;
    if member.is_owner {
        return Err(TeamError::OwnerCannotLeave);
    }

    Member::delete(&mut tx, member_id).await?;
    tx.commit().await?;

    let Some(user_id) = member.user_id else {
        return Ok(false);
    };

    let mut directory = rls::begin_directory(pool).await?;
    let remaining = Member::count_for_user(&mut directory, &user_id).await?;
    directory.commit().await?;

    let user_deleted = remaining == 0 && User::delete(pool, &user_id).await?;

    info!(tenant_id, member_id, user_deleted, "Member left team");
    Ok(user_deleted)
}

/// Adds an account directly, skipping the invitation. New accounts get
/// `initial_password` and must change it on first sign-in; existing
/// accounts keep theirs.
pub async fn add_member(
    pool: &PgPool,
    tenant_id: &str,
    email: &str,
    role_id: &str,
    initial_password: &str,
) -> Result<(User, Member), TeamError> {
    let email = email.trim().to_lowercase();
    let mut tx = rls::begin(pool, tenant_id).await?;

    if Member::find_by_email(&mut tx, &email).await?.is_some() {
        return Err(TeamError::EmailRepeat);
    }
    ensure_role(&mut tx, Some(role_id)).await?;

    let user = match User::find_by_email(&mut *tx, &email).await? {
        Some(user) => user,
        None => {
            validate_password_strength(initial_password).map_err(TeamError::WeakPassword)?;
            User::create(
                &mut *tx,
                CreateUser {
                    name: User::default_name(&email),
                    email: email.clone(),
                    password_hash: hash_password(initial_password)?,
                    active: true,
                    must_change_password: true,
                },
            )
            .await?
        }
    };

    let member = Member::create(
        &mut tx,
        NewMember {
            user_id: Some(user.id.clone()),
            email,
            role_id: Some(role_id.to_string()),
            invite_token: None,
            token_expired_at: None,
            is_owner: false,
            status: MemberStatus::Joined,
        },
    )
    .await?;

    tx.commit().await?;

    info!(tenant_id, member_id = %member.id, user_id = %user.id, "Member added");
    Ok((user, member))
}

/// Hands ownership from `current_owner_id` (which must be the acting user's
/// owner membership) to the joined member `new_owner_id`. The former owner
/// takes the tenant's default role.
pub async fn transfer_ownership(
    pool: &PgPool,
    tenant_id: &str,
    actor_user_id: &str,
    new_owner_id: &str,
    current_owner_id: &str,
) -> Result<(), TeamError> {
    let mut tx = rls::begin(pool, tenant_id).await?;

    Member::find_by_id(&mut tx, current_owner_id)
        .await?
        .filter(|m| m.is_owner && m.user_id.as_deref() == Some(actor_user_id))
        .ok_or(TeamError::PermissionDenied)?;

    let target = Member::find_by_id(&mut tx, new_owner_id)
        .await?
        .ok_or(TeamError::MemberNotFound)?;
    if !target.is_joined() {
        return Err(TeamError::NotJoined);
    }

    let default_role = Role::default_role(&mut tx)
        .await?
        .ok_or(TeamError::NoDefaultRole)?;

    Member::set_ownership(&mut tx, new_owner_id, true, None).await?;
    Member::set_ownership(&mut tx, current_owner_id, false, Some(&default_role.id)).await?;

    tx.commit().await?;

    info!(
        tenant_id,
        from = current_owner_id,
        to = new_owner_id,
        "Ownership transferred"
    );
    Ok(())
}

/// Owner-initiated password reset. The member must change it at next sign-in.
pub async fn reset_member_password(
    pool: &PgPool,
    tenant_id: &str,
    actor_user_id: &str,
    actor_member_id: &str,
    target_member_id: &str,
    new_password: &str,
) -> Result<(), TeamError> {
    let mut tx = rls::begin(pool, tenant_id).await?;

    let actor = Member::find_by_id(&mut tx, actor_member_id)
        .await?
        .ok_or(TeamError::ActorMemberNotFound)?;
    if actor.user_id.as_deref() != Some(actor_user_id) || !actor.is_owner {
        return Err(TeamError::PermissionDenied);
    }

    let target = Member::find_by_id(&mut tx, target_member_id)
        .await?
        .ok_or(TeamError::MemberNotFound)?;
    let user_id = target.user_id.ok_or(TeamError::UserNotActivated)?;

    validate_password_strength(new_password).map_err(TeamError::WeakPassword)?;
    User::set_password(&mut *tx, &user_id, &hash_password(new_password)?, true).await?;

    tx.commit().await?;

    info!(tenant_id, member_id = target_member_id, "Member password reset by owner");
    Ok(())
}

/// Binds `user` to the tenant of `conn` on first sign-in.
///
/// - no member row: the first member of an ownerless tenant becomes its
///   joined owner; anyone else lands in `review` for the owner to approve
/// - invited: the invitation is taken as accepted
/// - review or declined: unchanged, unless the tenant has no owner yet
///
/// New owners without a role get the tenant's default role.
pub async fn ensure_member_on_first_login(
    conn: &mut PgConnection,
    user: &User,
) -> Result<Member, TeamError> {
    let has_owner = Member::has_owner(&mut *conn).await?;
    let existing = member_for_user(&mut *conn, user).await?;

    let member = match existing {
        Some(member) if member.is_joined() => return Ok(member),
        Some(member) => {
            if member.status == MemberStatus::Invited || !has_owner {
                Member::promote_to_joined(&mut *conn, &member.id, !has_owner)
                    .await?
                    .ok_or(TeamError::MemberNotFound)?
            } else {
                return Ok(member);
            }
        }
        None => {
            Member::create(
                &mut *conn,
                NewMember {
                    user_id: Some(user.id.clone()),
                    email: user.email.clone(),
                    role_id: None,
                    invite_token: None,
                    token_expired_at: None,
                    is_owner: !has_owner,
                    status: if has_owner {
                        MemberStatus::Review
                    } else {
                        MemberStatus::Joined
                    },
                },
            )
            .await?
        }
    };

    let member = match Role::default_role(&mut *conn).await? {
        Some(role) if member.is_owner && member.role_id.is_none() => {
            Member::update(&mut *conn, &member.id, Some(&role.id), None)
                .await?
                .ok_or(TeamError::MemberNotFound)?
        }
        _ => member,
    };

    info!(member_id = %member.id, status = ?member.status, "Member bound on first sign-in");
    Ok(member)
}

pub async fn tenant_has_owner(pool: &PgPool, tenant_id: &str) -> Result<bool, TeamError> {
    let mut tx = rls::begin(pool, tenant_id).await?;
    let has_owner = Member::has_owner(&mut tx).await?;
    tx.commit().await?;
    Ok(has_owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_expiry_is_a_week_out() {
        let expiry = invite_expiry();
        let hours = (expiry - Utc::now()).num_hours();
        assert!((167..=168).contains(&hours));
    }

    #[test]
    fn test_invitation_owner_defaults_false() {
        let invitation: Invitation =
            serde_json::from_str(r#"{"email":"a@example.com","role_id":null}"#).unwrap();
        assert!(!invitation.is_owner);
        assert!(invitation.name.is_none());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(TeamError::EmailRepeat.to_string(), "This email is already a member of the team");
        assert_eq!(
            TeamError::WeakPassword("too short".to_string()).to_string(),
            "too short"
        );
    }
}
