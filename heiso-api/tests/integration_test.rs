/// End-to-end tests through the HTTP router
///
/// Run with: cargo test -p heiso-api --test integration_test

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{value_after, TestContext, PASSWORD, PROVISION_TOKEN};
use heiso_shared::auth::jwt::issue_token_pair;
use heiso_shared::auth::password::hash_password;
use heiso_shared::models::user::{CreateUser, User};
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new().await.unwrap();

    let res = ctx.send(Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["database"], "connected");

    let res = ctx.send(Method::GET, "/health/ready", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["migrations"]["is_up_to_date"], true);
}

#[tokio::test]
async fn test_login_validation_and_missing_tenant() {
    let ctx = TestContext::new().await.unwrap();

    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "not-an-email", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"], "validation_error");
    assert_eq!(res.body["details"][0]["field"], "email");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "email": ctx.init.user.email, "password": PASSWORD }).to_string(),
        ))
        .unwrap();
    let res = common::call(&ctx.app, request).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "missing_tenant");
}

#[tokio::test]
async fn test_password_login() {
    let ctx = TestContext::new().await.unwrap();

    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": ctx.init.user.email, "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "authenticated");
    assert!(res.body["access_token"].is_string());

    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": ctx.init.user.email, "password": "Wrong1Password" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_credentials() {
    let ctx = TestContext::new().await.unwrap();

    let res = ctx.send(Method::GET, "/v1/menus", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = ctx.send(Method::GET, "/v1/menus", Some("garbage"), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = ctx.owner(Method::GET, "/v1/auth/me", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["email"], ctx.init.user.email);
}

#[tokio::test]
async fn test_tenant_isolation() {
    let a = TestContext::new().await.unwrap();
    let b = TestContext::new().await.unwrap();

    let res = a
        .owner(
            Method::POST,
            "/v1/posts",
            Some(json!({ "title": "Only in A", "content": { "blocks": [] } })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let post_id = res.body["id"].as_str().unwrap().to_string();

    // A's token against B's tenant header
    let token = a.owner_token().to_string();
    let res = a
        .send_to(b.tenant_id(), Method::GET, "/v1/posts", Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    // B's owner cannot see A's post
    let res = b.owner(Method::GET, &format!("/v1/posts/{}", post_id), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = b.owner(Method::GET, "/v1/posts", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["total"], 0);
}

#[tokio::test]
async fn test_non_member_is_forbidden() {
    let ctx = TestContext::new().await.unwrap();

    let outsider = User::create(
        &ctx.db,
        CreateUser {
            email: common::unique_email(),
            name: "Outsider".to_string(),
            password_hash: hash_password(PASSWORD).unwrap(),
            active: true,
            must_change_password: false,
        },
    )
    .await
    .unwrap();
    let tokens = issue_token_pair(&outsider.id, ctx.tenant_id(), common::JWT_SECRET).unwrap();

    let res = ctx
        .send(Method::GET, "/v1/menus", Some(&tokens.access_token), None)
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_otp_login_through_mail() {
    let ctx = TestContext::new().await.unwrap();
    let email = ctx.init.user.email.clone();

    let res = ctx
        .send(Method::POST, "/v1/auth/otp/request", None, Some(json!({ "email": email })))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["expires_at"].is_string());

    let res = ctx
        .send(Method::POST, "/v1/auth/otp/status", None, Some(json!({ "email": email })))
        .await;
    assert_eq!(res.body["has_valid_code"], true);

    let code = value_after(&ctx.last_mail_to(&email), "<strong>");
    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/otp/verify",
            None,
            Some(json!({ "email": email, "code": code })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "authenticated");

    // Codes are single use
    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/otp/verify",
            None,
            Some(json!({ "email": email, "code": code })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invite_accept_once() {
    let ctx = TestContext::new().await.unwrap();
    let email = common::unique_email();

    let res = ctx
        .owner(
            Method::POST,
            "/v1/team/invite",
            Some(json!({ "email": email, "name": "New Person" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["status"], "invited");

    let res = ctx
        .owner(Method::POST, "/v1/team/invite", Some(json!({ "email": email })))
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.body["error"], "email_repeat");

    let token = value_after(&ctx.last_mail_to(&email), "token=");

    let res = ctx
        .send(Method::GET, &format!("/v1/join/validate?token={}", token), None, None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["valid"], true);

    let res = ctx
        .send(Method::POST, &format!("/v1/join/{}/accept", token), None, None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "joined");

    let res = ctx
        .send(Method::POST, &format!("/v1/join/{}/accept", token), None, None)
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], "invalid_token");
}

#[tokio::test]
async fn test_join_validate_errors() {
    let ctx = TestContext::new().await.unwrap();

    let res = ctx.send(Method::GET, "/v1/join/validate", None, None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "missing_token");

    let res = ctx
        .send(Method::GET, "/v1/join/validate?token=doesnotexist", None, None)
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], "invalid_token");
}

#[tokio::test]
async fn test_password_reset_flow() {
    let ctx = TestContext::new().await.unwrap();
    let email = ctx.init.user.email.clone();

    // Same answer for unknown addresses
    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/password/forgot",
            None,
            Some(json!({ "email": common::unique_email() })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = ctx
        .send(Method::POST, "/v1/auth/password/forgot", None, Some(json!({ "email": email })))
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let token = value_after(&ctx.last_mail_to(&email), "token=");
    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/password/reset",
            None,
            Some(json!({ "token": token, "password": "Another2Horse" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": "Another2Horse" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    // Tokens are single use
    let res = ctx
        .send(
            Method::POST,
            "/v1/auth/password/reset",
            None,
            Some(json!({ "token": token, "password": "Third3Horse" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_key_lifecycle() {
    let ctx = TestContext::new().await.unwrap();

    let res = ctx
        .owner(Method::POST, "/v1/api-keys", Some(json!({ "name": "CI" })))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let id = res.body["id"].as_str().unwrap().to_string();
    let plaintext = res.body["plaintext_key"].as_str().unwrap().to_string();
    assert!(res.body.get("key").is_none());

    // The key authenticates on its own
    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/auth/me")
        .header("x-api-key", &plaintext)
        .header("x-tenant-id", ctx.tenant_id())
        .body(Body::empty())
        .unwrap();
    let res = common::call(&ctx.app, request).await;
    assert_eq!(res.status, StatusCode::OK);

    // Default key from initialization plus the new one
    let res = ctx.owner(Method::GET, "/v1/api-keys?limit=1", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["total"], 2);
    assert_eq!(res.body["items"].as_array().unwrap().len(), 1);

    let res = ctx
        .owner(Method::PUT, &format!("/v1/api-keys/{}", id), Some(json!({ "name": "Deploy" })))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["name"], "Deploy");

    let res = ctx.owner(Method::DELETE, &format!("/v1/api-keys/{}", id), None).await;
    assert_eq!(res.status, StatusCode::OK);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/auth/me")
        .header("x-api-key", &plaintext)
        .header("x-tenant-id", ctx.tenant_id())
        .body(Body::empty())
        .unwrap();
    let res = common::call(&ctx.app, request).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_post_status_transitions() {
    let ctx = TestContext::new().await.unwrap();

    let res = ctx
        .owner(Method::POST, "/v1/posts", Some(json!({ "title": "About Us" })))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["status"], "draft");
    assert_eq!(res.body["slug"], "about-us");
    let id = res.body["id"].as_str().unwrap().to_string();
    let uri = format!("/v1/posts/{}", id);

    let res = ctx
        .owner(Method::PUT, &uri, Some(json!({ "title": "About Us", "publish": true })))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "published");
    assert!(res.body["published_at"].is_string());

    let res = ctx
        .owner(Method::PUT, &uri, Some(json!({ "title": "About Us (edited)" })))
        .await;
    assert_eq!(res.body["status"], "editing");

    let res = ctx.owner(Method::DELETE, &uri, None).await;
    assert_eq!(res.status, StatusCode::OK);

    let res = ctx.owner(Method::GET, &uri, None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_menu_tree_and_reorder() {
    let ctx = TestContext::new().await.unwrap();

    let res = ctx
        .owner(Method::POST, "/v1/menus", Some(json!({ "title": "Parent", "path": "/parent" })))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let parent = res.body["id"].as_str().unwrap().to_string();

    let res = ctx
        .owner(
            Method::POST,
            "/v1/menus",
            Some(json!({ "title": "Child", "path": "/parent/child", "parent_id": parent })),
        )
        .await;
    let child = res.body["id"].as_str().unwrap().to_string();

    // A cycle is rejected as a whole
    let res = ctx
        .owner(
            Method::POST,
            "/v1/menus/reorder",
            Some(json!({ "items": [
                { "id": parent, "parent_id": child, "order": 0 },
                { "id": child, "parent_id": parent, "order": 0 }
            ] })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    // So is moving a menu below its own child
    let res = ctx
        .owner(
            Method::PUT,
            &format!("/v1/menus/{}", parent),
            Some(json!({ "title": "Parent", "path": "/parent", "parent_id": child })),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = ctx.owner(Method::GET, "/v1/menus?view=tree", None).await;
    assert_eq!(res.status, StatusCode::OK);
    let tree = res.body.as_array().unwrap();
    let node = tree.iter().find(|n| n["id"] == parent.as_str()).unwrap();
    assert_eq!(node["children"][0]["id"], child.as_str());

    let res = ctx.owner(Method::DELETE, &format!("/v1/menus/{}", parent), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["deleted"], 2);
}

#[tokio::test]
async fn test_tenant_initialize_requires_token() {
    let ctx = TestContext::new().await.unwrap();
    let body = json!({
        "name": "Globex",
        "owner_email": common::unique_email(),
        "owner_password": PASSWORD,
    });

    let res = ctx
        .send(Method::POST, "/v1/tenants/initialize", None, Some(body.clone()))
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/tenants/initialize")
        .header("content-type", "application/json")
        .header("x-provision-token", PROVISION_TOKEN)
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = common::call(&ctx.app, request).await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert!(res.body["api_key"]["key"].as_str().unwrap().starts_with("sk_"));
}

#[tokio::test]
async fn test_refresh_token_exchange() {
    let ctx = TestContext::new().await.unwrap();
    let refresh_token = ctx.init.tokens.refresh_token.clone();

    let res = ctx
        .send(Method::POST, "/v1/auth/refresh", None, Some(json!({ "refresh_token": refresh_token })))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body["access_token"].as_str().is_some());

    let access_token = ctx.owner_token().to_string();
    let res = ctx
        .send(Method::POST, "/v1/auth/refresh", None, Some(json!({ "refresh_token": access_token })))
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}
