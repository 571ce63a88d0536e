/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use heiso_api::{app::{build_router, AppState}, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::from_config(pool, config)?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer, routes};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use heiso_shared::auth::middleware::{auth_middleware, AuthSettings, API_KEY_HEADER, TENANT_HEADER};
use heiso_shared::mail::{HttpMailer, LogMailer, Notifier, SharedMailer};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(db: PgPool, config: Config, mailer: SharedMailer) -> Self {
        let notifier = Notifier::new(mailer, config.mail.from.clone(), config.mail.base_host.clone());
        Self {
            db,
            config: Arc::new(config),
            notifier,
        }
    }

    /// Picks the HTTP relay when `MAIL_API_URL` is set, otherwise logs mail.
    pub fn from_config(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let mailer: SharedMailer = match &config.mail.relay_url {
            Some(url) => {
                info!(relay = %url, "Sending mail through HTTP relay");
                Arc::new(HttpMailer::new(url.clone(), config.mail.relay_key.clone())?)
            }
            None => {
                info!("MAIL_API_URL not set, outgoing mail will only be logged");
                Arc::new(LogMailer)
            }
        };
        Ok(Self::new(db, config, mailer))
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete router
///
/// ```text
/// /health, /health/ready                     public
/// /v1/auth/{register,login,...}              public, X-Tenant-Id
/// /v1/tenants/{initialize,owner}             public
/// /v1/join/...                               public, X-Tenant-Id
/// /v1/{auth/me,team,roles,posts,...}         Bearer JWT or X-Api-Key
/// ```
///
/// Layers, outermost first: security headers, CORS, compression, tracing.
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/ready", get(routes::health::readiness));

    let public_auth = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/login-method", post(routes::auth::login_method))
        .route("/refresh", post(routes::auth::refresh))
        .route("/otp/request", post(routes::auth::request_otp))
        .route("/otp/verify", post(routes::auth::verify_otp))
        .route("/otp/status", post(routes::auth::otp_status))
        .route("/password/forgot", post(routes::auth::forgot_password))
        .route("/password/reset", post(routes::auth::reset_password));

    let tenant_routes = Router::new()
        .route("/initialize", post(routes::tenants::initialize))
        .route("/owner", get(routes::tenants::has_owner));

    let join_routes = Router::new()
        .route("/validate", get(routes::join::validate))
        .route("/:token", get(routes::join::show))
        .route("/:token/accept", post(routes::join::accept))
        .route("/:token/decline", post(routes::join::decline));

    let protected = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/password/change", post(routes::auth::change_password))
        .route("/me/permissions", get(routes::auth::my_permissions))
        .nest("/team", routes::team::router())
        .nest("/roles", routes::roles::router())
        .nest("/permissions", routes::roles::permission_router())
        .nest("/menus", routes::menus::router())
        .nest("/navigations", routes::navigations::router())
        .nest("/posts", routes::posts::router())
        .nest("/categories", routes::posts::category_router())
        .nest("/templates", routes::templates::router())
        .nest("/files", routes::files::router())
        .nest("/settings", routes::settings::router())
        .nest("/site-settings", routes::settings::site_router())
        .nest("/api-keys", routes::api_keys::router())
        .layer(axum::middleware::from_fn_with_state(
            AuthSettings::new(state.db.clone(), state.jwt_secret()),
            auth_middleware,
        ));

    let v1_routes = Router::new()
        .nest("/auth", public_auth)
        .nest("/tenants", tenant_routes)
        .nest("/join", join_routes)
        .merge(protected);

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        HeaderName::from_static(TENANT_HEADER),
        HeaderName::from_static(API_KEY_HEADER),
        HeaderName::from_static(routes::tenants::PROVISION_HEADER),
    ];
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if config.allows_any_origin() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

