/// Sign-in, signup and tenant initialization
///
/// # Login
///
/// A password login succeeds when the account exists, the password matches,
/// the account is active, the user is a joined member of the tenant (or a
/// developer) and the login method of that membership allows passwords.
/// Accounts with two-factor enabled get a login code instead of tokens and
/// finish with [`super::otp::verify`].
///
/// # Login method precedence
///
/// developer or owner => `both`; otherwise the member override, then the
/// role's method, then the account's own preference, then `both`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use validator::Validate;

use super::otp::{self, OtpError};
use super::provisioning::{seed_defaults, ProvisionError};
use super::team::{ensure_member_on_first_login, member_for_user, TeamError};
use crate::auth::authorization::{resolve_permissions, AuthzError, UserPermission};
use crate::auth::jwt::{issue_token_pair, refresh_access_token, validate_refresh_token, JwtError, TokenPair};
use crate::auth::password::{hash_password, validate_password_strength, verify_password, PasswordError};
use crate::db::rls;
use crate::mail::Notifier;
use crate::models::api_key::{ApiKey, CreateApiKey, DEFAULT_KEY_NAME};
use crate::models::member::{Member, MemberStatus, NewMember};
use crate::models::role::Role;
use crate::models::tenant::{CreateTenant, Tenant, DEFAULT_MODULES};
use crate::models::user::{CreateUser, Developer, LoginMethod, User};
use crate::slug::slugify;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is not active")]
    NotActive,

    #[error("Not a member of this tenant")]
    NotMember,

    #[error("Password sign-in is not enabled for this account")]
    LoginMethodNotAllowed,

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Session is no longer valid")]
    SessionEnded,

    #[error("{0}")]
    WeakPassword(String),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    Team(#[from] TeamError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Jwt(#[from] JwtError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginOutcome {
    Authenticated {
        user: User,
        #[serde(flatten)]
        tokens: TokenPair,
        must_change_password: bool,
    },
    TwoFactorRequired {
        email: String,
        expires_at: DateTime<Utc>,
    },
}

/// Plaintext of a key shown exactly once
#[derive(Debug, Clone, Serialize)]
pub struct IssuedApiKey {
    pub id: String,
    pub name: String,
    pub key: String,
    pub truncated_key: String,
}

impl IssuedApiKey {
    fn new(api_key: ApiKey, plaintext: String) -> Self {
        Self {
            id: api_key.id,
            name: api_key.name,
            key: plaintext,
            truncated_key: api_key.truncated_key,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Signup {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupOutcome {
    pub user: User,
    pub member_status: MemberStatus,
    pub is_owner: bool,

    /// Only for members that can sign in right away
    pub tokens: Option<TokenPair>,

    /// Default key of a new owner
    pub api_key: Option<IssuedApiKey>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitializeTenant {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 100, message = "Slug must be 1 to 100 characters"))]
    pub slug: Option<String>,

    pub modules: Option<Vec<String>>,

    #[validate(email(message = "Invalid email format"))]
    pub owner_email: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub owner_name: Option<String>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub owner_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantInitialized {
    pub tenant: Tenant,
    pub user: User,
    pub tokens: TokenPair,
    pub api_key: IssuedApiKey,
}

/// Login method that applies to `user` given its membership.
pub async fn login_method_for(
    conn: &mut PgConnection,
    user: &User,
    developer: bool,
    member: Option<&Member>,
) -> Result<LoginMethod, sqlx::Error> {
    if developer {
        return Ok(LoginMethod::Both);
    }

    let fallback = user.login_method.unwrap_or(LoginMethod::Both);
    let Some(member) = member else {
        return Ok(fallback);
    };

    if member.is_owner {
        return Ok(LoginMethod::Both);
    }
    if let Some(method) = member.login_method {
        return Ok(method);
    }

    let role_method = match member.role_id.as_deref() {
        Some(role_id) => Role::find_by_id(conn, role_id)
            .await?
            .and_then(|r| r.login_method),
        None => None,
    };

    Ok(role_method.unwrap_or(fallback))
}

/// Login method shown on the sign-in form. Unknown emails get `both`.
pub async fn login_method(pool: &PgPool, tenant_id: &str, email: &str) -> Result<LoginMethod, AccountError> {
    let Some(user) = User::find_by_email(pool, email).await? else {
        return Ok(LoginMethod::Both);
    };

    let mut tx = rls::begin(pool, tenant_id).await?;
    let developer = Developer::is_developer(&mut *tx, &user.id).await?;
    let member = member_for_user(&mut tx, &user).await?;
    let method = login_method_for(&mut tx, &user, developer, member.as_ref()).await?;
    tx.commit().await?;

    Ok(method)
}

pub async fn login(
    pool: &PgPool,
    notifier: &Notifier,
    jwt_secret: &str,
    tenant_id: &str,
    email: &str,
    password: &str,
) -> Result<LoginOutcome, AccountError> {
    let user = User::find_by_email(pool, email)
        .await?
        .ok_or(AccountError::InvalidCredentials)?;

    if !verify_password(password, &user.password)? {
        warn!(user_id = %user.id, tenant_id, "Failed password login");
        return Err(AccountError::InvalidCredentials);
    }
    if !user.active {
        return Err(AccountError::NotActive);
    }

    let mut tx = rls::begin(pool, tenant_id).await?;

    let developer = Developer::is_developer(&mut *tx, &user.id).await?;
    let member = member_for_user(&mut tx, &user).await?;
    if !developer {
        match &member {
            None => return Err(AccountError::NotMember),
            Some(m) if !m.is_joined() => return Err(AccountError::NotActive),
            Some(_) => {}
        }
    }

    let method = login_method_for(&mut tx, &user, developer, member.as_ref()).await?;
    tx.commit().await?;

    if !method.allows_password() {
        return Err(AccountError::LoginMethodNotAllowed);
    }

    if user.two_factor_enabled {
        let issued = otp::issue(pool, notifier, &user).await?;
        info!(user_id = %user.id, tenant_id, "Two-factor code required");
        return Ok(LoginOutcome::TwoFactorRequired {
            email: user.email,
            expires_at: issued.expires_at,
        });
    }

    User::touch_last_login(pool, &user.id).await?;
    let tokens = issue_token_pair(&user.id, tenant_id, jwt_secret)?;

    info!(user_id = %user.id, tenant_id, developer, "User logged in");
    Ok(LoginOutcome::Authenticated {
        must_change_password: user.must_change_password,
        user,
        tokens,
    })
}

/// Creates an account, or claims one that has never signed in (an invited
/// placeholder), and binds it to the tenant.
pub async fn signup(
    pool: &PgPool,
    jwt_secret: &str,
    tenant_id: &str,
    input: Signup,
) -> Result<SignupOutcome, AccountError> {
    validate_password_strength(&input.password).map_err(AccountError::WeakPassword)?;
    let password_hash = hash_password(&input.password)?;

    let email = input.email.trim().to_lowercase();
    let name = input
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let mut tx = rls::begin(pool, tenant_id).await?;

    let user = match User::find_by_email(&mut *tx, &email).await? {
        Some(existing) if existing.last_login_at.is_some() => {
            return Err(AccountError::EmailTaken);
        }
        Some(existing) => {
            User::activate_with_password(&mut *tx, &existing.id, name, &password_hash).await?
        }
        None => {
            User::create(
                &mut *tx,
                CreateUser {
                    name: name.map(str::to_string).unwrap_or_else(|| User::default_name(&email)),
                    email,
                    password_hash,
                    active: true,
                    must_change_password: false,
                },
            )
            .await?
        }
    };

    let member = ensure_member_on_first_login(&mut tx, &user).await?;

    let api_key = if member.is_owner && !ApiKey::exists_for_user(&mut tx, &user.id).await? {
        let (api_key, plaintext) = ApiKey::create(
            &mut tx,
            &user.id,
            CreateApiKey {
                name: DEFAULT_KEY_NAME.to_string(),
                expires_at: None,
                rate_limit: None,
            },
        )
        .await?;
        info!(user_id = %user.id, tenant_id, key_id = %api_key.id, "Default API key issued");
        Some(IssuedApiKey::new(api_key, plaintext))
    } else {
        None
    };

    tx.commit().await?;

    let tokens = if member.is_joined() {
        Some(issue_token_pair(&user.id, tenant_id, jwt_secret)?)
    } else {
        None
    };

    info!(
        user_id = %user.id,
        tenant_id,
        status = member.status.as_str(),
        is_owner = member.is_owner,
        "User signed up"
    );

    Ok(SignupOutcome {
        user,
        member_status: member.status,
        is_owner: member.is_owner,
        tokens,
        api_key,
    })
}

/// Creates a tenant with its defaults and owner in one transaction.
///
/// An existing account can own the new tenant when `owner_password` matches
/// its password.
pub async fn initialize_tenant(
    pool: &PgPool,
    jwt_secret: &str,
    input: InitializeTenant,
) -> Result<TenantInitialized, AccountError> {
    validate_password_strength(&input.owner_password).map_err(AccountError::WeakPassword)?;

    let slug = slugify(input.slug.as_deref().unwrap_or(&input.name));
    let modules = input
        .modules
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_MODULES.iter().map(|m| m.to_string()).collect());
    let email = input.owner_email.trim().to_lowercase();

    let mut tx = pool.begin().await?;

    if Tenant::find_by_slug(&mut *tx, &slug).await?.is_some() {
        return Err(ProvisionError::SlugTaken(slug).into());
    }

    let tenant = Tenant::create(
        &mut *tx,
        CreateTenant {
            name: input.name.trim().to_string(),
            slug,
            modules,
        },
    )
    .await?;

    rls::enter(&mut tx, &tenant.id).await?;
    seed_defaults(&mut tx, &tenant).await?;

    let user = match User::find_by_email(&mut *tx, &email).await? {
        Some(existing) => {
            if !verify_password(&input.owner_password, &existing.password)? {
                return Err(AccountError::EmailTaken);
            }
            if !existing.active {
                User::set_active(&mut *tx, &existing.id, true).await?;
            }
            existing
        }
        None => {
            User::create(
                &mut *tx,
                CreateUser {
                    name: input
                        .owner_name
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| User::default_name(&email)),
                    email: email.clone(),
                    password_hash: hash_password(&input.owner_password)?,
                    active: true,
                    must_change_password: false,
                },
            )
            .await?
        }
    };

    let role = Role::default_role(&mut tx).await?;
    Member::create(
        &mut tx,
        NewMember {
            user_id: Some(user.id.clone()),
            email,
            role_id: role.map(|r| r.id),
            invite_token: None,
            token_expired_at: None,
            is_owner: true,
            status: MemberStatus::Joined,
        },
    )
    .await?;

    let (api_key, plaintext) = ApiKey::create(
        &mut tx,
        &user.id,
        CreateApiKey {
            name: DEFAULT_KEY_NAME.to_string(),
            expires_at: None,
            rate_limit: None,
        },
    )
    .await?;

    tx.commit().await?;

    let tokens = issue_token_pair(&user.id, &tenant.id, jwt_secret)?;

    info!(tenant_id = %tenant.id, slug = %tenant.slug, owner_id = %user.id, "Tenant initialized");

    Ok(TenantInitialized {
        tenant,
        user,
        tokens,
        api_key: IssuedApiKey::new(api_key, plaintext),
    })
}

/// The signed-in account. Deactivated accounts are refused.
pub async fn me(pool: &PgPool, user_id: &str) -> Result<User, AccountError> {
    let user = User::find_by_id(pool, user_id)
        .await?
        .ok_or(AccountError::UserNotFound)?;
    if !user.active {
        return Err(AccountError::SessionEnded);
    }
    Ok(user)
}

/// Exchanges a refresh token for a new access token. The account must still
/// be active and, unless it is a developer, a joined member of the token's tenant.
pub async fn refresh_session(
    pool: &PgPool,
    jwt_secret: &str,
    refresh_token: &str,
) -> Result<String, AccountError> {
    let claims = validate_refresh_token(refresh_token, jwt_secret)?;

    let user = User::find_by_id(pool, &claims.sub)
        .await?
        .filter(|u| u.active)
        .ok_or(AccountError::SessionEnded)?;

    let mut tx = rls::begin(pool, &claims.tenant_id).await?;
    let developer = Developer::is_developer(&mut *tx, &user.id).await?;
    let joined = member_for_user(&mut tx, &user)
        .await?
        .is_some_and(|m| m.is_joined());
    tx.commit().await?;

    if !developer && !joined {
        warn!(user_id = %user.id, tenant_id = %claims.tenant_id, "Refresh refused for ended membership");
        return Err(AccountError::SessionEnded);
    }

    Ok(refresh_access_token(refresh_token, jwt_secret)?)
}

pub async fn permissions(
    pool: &PgPool,
    tenant_id: &str,
    user_id: &str,
) -> Result<UserPermission, AccountError> {
    let mut tx = rls::begin(pool, tenant_id).await?;
    let permission = resolve_permissions(&mut tx, user_id).await?;
    tx.commit().await?;
    Ok(permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u_0123456789".to_string(),
            email: "owner@example.com".to_string(),
            name: "owner".to_string(),
            password: "$argon2id$hash".to_string(),
            avatar: None,
            active: true,
            last_login_at: None,
            login_method: None,
            two_factor_enabled: false,
            must_change_password: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_authenticated_outcome_shape() {
        let outcome = LoginOutcome::Authenticated {
            user: user(),
            tokens: TokenPair {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
                expires_in: 86400,
            },
            must_change_password: true,
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "authenticated");
        assert_eq!(json["access_token"], "a");
        assert_eq!(json["must_change_password"], true);
        assert!(json["user"].get("password").is_none());
    }

    #[test]
    fn test_signup_validation() {
        let bad = Signup {
            name: Some(String::new()),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));

        let good = Signup {
            name: None,
            email: "editor@example.com".to_string(),
            password: "Correct1Horse".to_string(),
        };
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_two_factor_outcome_shape() {
        let outcome = LoginOutcome::TwoFactorRequired {
            email: "owner@example.com".to_string(),
            expires_at: Utc::now(),
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "two_factor_required");
        assert!(json.get("access_token").is_none());
    }
}
