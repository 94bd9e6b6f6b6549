//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth (register, login, logout, me)
//! - Articles and newsletters with their review workflow
//! - Comments
//! - Publishers, invitations and join requests
//! - Subscriptions and the subscribed-articles feed
//! - Content forms
//! - Admin (users, stats) and health

pub mod admin;
pub mod articles;
pub mod auth;
pub mod comments;
pub mod common;
pub mod forms;
pub mod health;
pub mod middleware;
pub mod newsletters;
pub mod publishers;
pub mod responses;
pub mod subscriptions;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, RequestStats, Viewer};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need a session)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route("/articles", post(articles::create_article))
        .route("/articles/mine", get(articles::my_articles))
        .route("/articles/review-queue", get(articles::review_queue))
        .route(
            "/articles/{id}",
            put(articles::update_article).delete(articles::delete_article),
        )
        .route("/articles/{id}/approve", post(articles::approve_article))
        .route("/articles/{id}/reject", post(articles::reject_article))
        .route("/articles/{id}/comments", post(comments::create_comment))
        .route("/comments/{id}", delete(comments::delete_comment))
        .route("/newsletters", post(newsletters::create_newsletter))
        .route("/newsletters/mine", get(newsletters::my_newsletters))
        .route("/newsletters/review-queue", get(newsletters::review_queue))
        .route(
            "/newsletters/{id}",
            put(newsletters::update_newsletter).delete(newsletters::delete_newsletter),
        )
        .route("/newsletters/{id}/approve", post(newsletters::approve_newsletter))
        .route("/newsletters/{id}/reject", post(newsletters::reject_newsletter))
        .route(
            "/newsletters/{id}/subscribe",
            post(newsletters::subscribe).delete(newsletters::unsubscribe),
        )
        .route("/newsletters/{id}/issues", post(newsletters::create_issue))
        .route(
            "/newsletters/{id}/issues/{issue_id}/dispatch",
            post(newsletters::dispatch_issue),
        )
        .route("/subscriptions", get(subscriptions::my_subscriptions))
        .route(
            "/subscriptions/publishers/{id}",
            post(subscriptions::subscribe_publisher).delete(subscriptions::unsubscribe_publisher),
        )
        .route(
            "/subscriptions/journalists/{id}",
            post(subscriptions::subscribe_journalist)
                .delete(subscriptions::unsubscribe_journalist),
        )
        .route("/publishers", post(publishers::create_publisher))
        .route("/publishers/{id}/invitations", post(publishers::invite_member))
        .route(
            "/publishers/{id}/join-requests",
            post(publishers::request_join).get(publishers::list_join_requests),
        )
        .route("/invitations", get(publishers::my_invitations))
        .route("/invitations/{token}/accept", post(publishers::accept_invitation))
        .route("/join-requests/{id}/approve", post(publishers::approve_join_request))
        .route("/join-requests/{id}/reject", post(publishers::reject_join_request))
        .route("/forms/{kind}", get(forms::get_form))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes; a valid session still identifies the viewer
    Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth::public_router())
        .route("/articles", get(articles::list_articles))
        .route("/articles/{id}", get(articles::get_article))
        .route("/articles/{id}/comments", get(comments::list_comments))
        .route("/newsletters", get(newsletters::list_newsletters))
        .route("/newsletters/{id}", get(newsletters::get_newsletter))
        .route("/newsletters/{id}/issues", get(newsletters::list_issues))
        .route("/publishers", get(publishers::list_publishers))
        .route("/publishers/{id}", get(publishers::get_publisher))
        .route(
            "/subscribed-articles/{user_id}",
            get(subscriptions::subscribed_articles),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .merge(admin_routes)
        .merge(protected_routes)
}

/// CORS with cookie credentials for a single origin; `*` allows any origin without credentials
fn cors_layer(cors_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE]);

    if cors_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
        Err(_) => {
            tracing::warn!("Invalid CORS origin '{}', cross-origin requests disabled", cors_origin);
            cors
        }
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::repositories::test_support::{seed_publisher, seed_user, setup_pool};
    use crate::db::repositories::{SessionRepository, SqlxSessionRepository};
    use crate::db::DynDatabasePool;
    use crate::models::{Session, User, UserRole};
    use crate::services::notification::test_doubles::{RecordingAnnouncer, RecordingNotifier};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        pool: DynDatabasePool,
        notifier: Arc<RecordingNotifier>,
        announcer: Arc<RecordingAnnouncer>,
    }

    impl TestApp {
        async fn new() -> Self {
            Self::with_cors("http://localhost:3000").await
        }

        async fn with_cors(cors_origin: &str) -> Self {
            let pool = setup_pool().await;
            let notifier = Arc::new(RecordingNotifier::default());
            let announcer = Arc::new(RecordingAnnouncer::default());
            let state = AppState::build(
                pool.clone(),
                &Config::default(),
                notifier.clone(),
                announcer.clone(),
            );
            Self {
                router: build_router(state, cors_origin),
                pool,
                notifier,
                announcer,
            }
        }

        /// Seed a user and open a session for them
        async fn user(&self, name: &str, role: UserRole) -> (User, String) {
            let email = format!("{}@example.com", name);
            let user = seed_user(&self.pool, name, Some(&email), role).await;
            let session = SqlxSessionRepository::new(self.pool.clone())
                .create(&Session::new(user.id, chrono::Duration::days(1)))
                .await
                .unwrap();
            (user, session.id)
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = match body {
                Some(value) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(value.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            self.call(Method::GET, uri, token, None).await
        }

        async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
            self.call(Method::POST, uri, Some(token), Some(body)).await
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pending_migrations"], 0);
    }

    #[tokio::test]
    async fn test_register_login_logout() {
        let app = TestApp::new().await;

        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({"username": "root", "password": "correct-horse", "role": "reader"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["role"], "admin");

        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({"username": "bob", "email": "Bob@Example.com", "password": "correct-horse", "role": "editor"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["role"], "editor");
        assert_eq!(body["user"]["email"], "bob@example.com");

        let (status, _) = app
            .call(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({"username": "mallory", "password": "correct-horse", "role": "admin"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({"username": "bob", "password": "correct-horse", "role": "reader"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"username_or_email": "bob", "password": "wrong-password"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"username_or_email": "bob@example.com", "password": "correct-horse"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = app.get("/api/v1/auth/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "bob");

        let (status, _) = app
            .call(Method::POST, "/api/v1/auth/logout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.get("/api/v1/auth/me", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_rate_limited_per_username() {
        let app = TestApp::new().await;

        for _ in 0..5 {
            let (status, _) = app
                .call(
                    Method::POST,
                    "/api/v1/auth/login",
                    None,
                    Some(json!({"username_or_email": "ghost", "password": "nope"})),
                )
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"username_or_email": "ghost", "password": "nope"})),
            )
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["details"]["retry_after"], 900);
    }

    #[tokio::test]
    async fn test_protected_routes_require_session() {
        let app = TestApp::new().await;
        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/articles",
                None,
                Some(json!({"title": "Anon", "content": "x"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = app.get("/api/v1/subscriptions", Some("not-a-session")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_publish_flow_notifies_daily_subscribers() {
        let app = TestApp::new().await;
        let (bob, bob_token) = app.user("bob", UserRole::Editor).await;
        let (alice, alice_token) = app.user("alice", UserRole::Journalist).await;
        let (carol, carol_token) = app.user("carol", UserRole::Reader).await;
        let daily = seed_publisher(&app.pool, "Daily", bob.id).await;

        // Alice joins Daily through an invitation; the token works once
        let (status, invitation) = app
            .post(
                &format!("/api/v1/publishers/{}/invitations", daily.id),
                &bob_token,
                json!({"email": "Alice@example.com", "role": "journalist"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let accept = format!(
            "/api/v1/invitations/{}/accept",
            invitation["token"].as_str().unwrap()
        );
        let (status, _) = app.post(&accept, &alice_token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.post(&accept, &alice_token, json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, details) = app.get(&format!("/api/v1/publishers/{}", daily.id), None).await;
        assert_eq!(details["members"].as_array().unwrap().len(), 2);

        // Carol follows Daily and Alice
        let (status, body) = app
            .post(
                &format!("/api/v1/subscriptions/publishers/{}", daily.id),
                &carol_token,
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        app.post(
            &format!("/api/v1/subscriptions/journalists/{}", alice.id),
            &carol_token,
            json!({}),
        )
        .await;

        let (status, created) = app
            .post(
                "/api/v1/articles",
                &alice_token,
                json!({"title": "Test", "content": "Breaking news", "status": "pending"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["content"]["publisher_id"], daily.id);
        assert_eq!(created["content"]["author_id"], alice.id);
        let id = created["content"]["id"].as_i64().unwrap();

        let (_, queue) = app.get("/api/v1/articles/review-queue", Some(&bob_token)).await;
        assert_eq!(queue.as_array().unwrap().len(), 1);

        let approve = format!("/api/v1/articles/{}/approve", id);
        let (status, approved) = app.post(&approve, &bob_token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["content"]["status"], "published");
        assert_eq!(approved["content"]["author_id"], alice.id);
        assert_eq!(approved["notifications"]["attempted"], 1);
        assert_eq!(approved["notifications"]["delivered"], 1);

        let messages = app.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "carol@example.com");
        assert!(messages[0].1.contains("Test"));
        assert_eq!(app.announcer.posts.lock().unwrap().len(), 1);

        // Approving again changes nothing and notifies nobody
        let (status, again) = app.post(&approve, &bob_token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(again.get("notifications").is_none());
        assert_eq!(app.notifier.messages().len(), 1);

        let (status, feed) = app
            .get(&format!("/api/v1/subscribed-articles/{}", carol.id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            feed,
            json!([{"title": "Test", "content": "Breaking news", "author": alice.id, "publisher": daily.id}])
        );
    }

    #[tokio::test]
    async fn test_independent_journalist_flow() {
        let app = TestApp::new().await;
        let (_, dana_token) = app.user("dana", UserRole::Journalist).await;
        let (_, eve_token) = app.user("eve", UserRole::Editor).await;

        let (status, form) = app.get("/api/v1/forms/article", Some(&dana_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!form["fields"].as_array().unwrap().contains(&json!("publisher")));
        assert_eq!(form["status_choices"], json!(["draft"]));

        let (status, body) = app
            .post(
                "/api/v1/articles",
                &dana_token,
                json!({"title": "Solo", "content": "On my own", "status": "pending"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["status"].is_array());

        let (status, created) = app
            .post(
                "/api/v1/articles",
                &dana_token,
                json!({"title": "Solo", "content": "On my own"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["content"]["publisher_id"], Value::Null);
        assert_eq!(created["content"]["status"], "draft");
        let id = created["content"]["id"].as_i64().unwrap();

        let (status, body) = app
            .post(&format!("/api/v1/articles/{}/approve", id), &eve_token, json!({}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        // Drafts stay hidden from everyone but the author
        let (status, _) = app.get(&format!("/api/v1/articles/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app.get(&format!("/api/v1/articles/{}", id), Some(&dana_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_feed_of_unknown_user_is_not_found() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/v1/subscribed-articles/4242", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_newsletter_issue_dispatch_once() {
        let app = TestApp::new().await;
        let (bob, bob_token) = app.user("bob", UserRole::Editor).await;
        let (_, carol_token) = app.user("carol", UserRole::Reader).await;
        let daily = seed_publisher(&app.pool, "Daily", bob.id).await;

        app.post(
            &format!("/api/v1/subscriptions/publishers/{}", daily.id),
            &carol_token,
            json!({}),
        )
        .await;

        let (status, created) = app
            .post(
                "/api/v1/newsletters",
                &bob_token,
                json!({
                    "title": "Morning Brief",
                    "description": "Daily digest",
                    "subject": "Your morning brief",
                    "status": "published"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["notifications"]["delivered"], 1);
        let id = created["content"]["id"].as_i64().unwrap();

        let (status, body) = app
            .post(&format!("/api/v1/newsletters/{}/subscribe", id), &carol_token, json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subscribed"], true);

        let (status, issue) = app
            .post(
                &format!("/api/v1/newsletters/{}/issues", id),
                &bob_token,
                json!({"subject": "Issue #1", "body": "Top stories"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let dispatch = format!(
            "/api/v1/newsletters/{}/issues/{}/dispatch",
            id,
            issue["id"].as_i64().unwrap()
        );

        let (status, sent) = app.post(&dispatch, &bob_token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sent["content"]["is_draft"], false);
        assert_eq!(sent["notifications"]["delivered"], 1);
        let messages = app.notifier.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].1, "Issue #1");

        let (status, _) = app.post(&dispatch, &bob_token, json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(app.notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_comments_and_join_requests() {
        let app = TestApp::new().await;
        let (bob, bob_token) = app.user("bob", UserRole::Editor).await;
        let (_, carol_token) = app.user("carol", UserRole::Reader).await;
        let (_, frank_token) = app.user("frank", UserRole::Journalist).await;
        let daily = seed_publisher(&app.pool, "Daily", bob.id).await;

        let (_, created) = app
            .post(
                "/api/v1/articles",
                &bob_token,
                json!({"title": "Open thread", "content": "Discuss", "status": "published"}),
            )
            .await;
        let article_id = created["content"]["id"].as_i64().unwrap();
        let comments = format!("/api/v1/articles/{}/comments", article_id);

        let (status, root) = app.post(&comments, &carol_token, json!({"content": "First"})).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = app
            .post(
                &comments,
                &bob_token,
                json!({"content": "Welcome", "parent_id": root["id"]}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, threads) = app.get(&comments, None).await;
        assert_eq!(threads[0]["replies"][0]["content"], "Welcome");

        // Join requests are idempotent and decided by members
        let join = format!("/api/v1/publishers/{}/join-requests", daily.id);
        let (status, first) = app.post(&join, &frank_token, json!({})).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, second) = app.post(&join, &frank_token, json!({})).await;
        assert_eq!(first["id"], second["id"]);

        let (status, _) = app.get(&join, Some(&frank_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (_, pending) = app.get(&format!("{}?status=pending", join), Some(&bob_token)).await;
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let approve = format!("/api/v1/join-requests/{}/approve", first["id"]);
        let (status, decided) = app.post(&approve, &bob_token, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decided["status"], "approved");
        let (status, _) = app.post(&approve, &bob_token, json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_admin_routes() {
        let app = TestApp::new().await;
        let (_, root_token) = app.user("root", UserRole::Admin).await;
        let (carol, carol_token) = app.user("carol", UserRole::Reader).await;

        let (status, _) = app.get("/api/v1/admin/users", Some(&carol_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.get("/api/v1/admin/users?per_page=1", Some(&root_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["users"].as_array().unwrap().len(), 1);

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/v1/admin/users/{}/role", carol.id),
                Some(&root_token),
                Some(json!({"role": "journalist"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "journalist");

        let (status, body) = app.get("/api/v1/admin/stats", Some(&root_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database_driver"], "sqlite");
        assert!(body["total_requests"].as_u64().unwrap() >= 3);
    }

    async fn preflight(app: &TestApp, origin: &str) -> axum::http::HeaderMap {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/articles")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        app.router.clone().oneshot(request).await.unwrap().headers().clone()
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = TestApp::new().await;
        let headers = preflight(&app, "http://localhost:3000").await;
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

        let open = TestApp::with_cors("*").await;
        let headers = preflight(&open, "https://elsewhere.example").await;
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());

        let closed = TestApp::with_cors("not a header\n").await;
        let headers = preflight(&closed, "http://localhost:3000").await;
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
