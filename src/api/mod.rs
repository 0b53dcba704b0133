pub mod auth;
pub mod error;
pub mod rate_limit;
mod role_requests;
mod tickets;
mod users;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public, tightly rate limited)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/verify", post(auth::verify))
        .route("/resend", post(auth::resend))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Protected API routes
    let api_routes = Router::new()
        // Accounts
        .route("/me", get(users::me).put(users::update_me))
        .route("/users", get(users::list_users))
        // Role requests
        .route("/role-requests", get(role_requests::list_role_requests))
        .route("/role-requests/stats", get(role_requests::role_request_stats))
        .route(
            "/role-requests/:id/approve",
            post(role_requests::approve_role_request),
        )
        .route(
            "/role-requests/:id/reject",
            post(role_requests::reject_role_request),
        )
        // Tickets
        .route(
            "/tickets",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route("/tickets/summary", get(tickets::ticket_summary))
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id/actions", get(tickets::ticket_actions))
        .route("/tickets/:id/status", put(tickets::change_status))
        .route("/tickets/:id/assign", put(tickets::assign_ticket))
        .route("/tickets/:id/reopen", post(tickets::reopen_ticket))
        .route("/tickets/:id/comments", post(tickets::add_comment))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notifications::testing::RecordingNotifier;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        notifier: Arc<RecordingNotifier>,
    }

    impl TestApp {
        async fn new() -> Self {
            Self::with_config(Config::default()).await
        }

        async fn with_config(config: Config) -> Self {
            let db = crate::db::init_memory().await.unwrap();
            let notifier = Arc::new(RecordingNotifier::default());
            let state = Arc::new(AppState::new(config, db, notifier.clone()));
            Self {
                router: create_router(state),
                notifier,
            }
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
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn register(&self, email: &str, role: &str, department: Option<&str>) -> (StatusCode, Value) {
            self.call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "name": "Test Person",
                    "email": email,
                    "password": "ward7office",
                    "requested_role": role,
                    "department": department,
                })),
            )
            .await
        }

        async fn login(&self, email: &str) -> String {
            let (status, body) = self
                .call(
                    Method::POST,
                    "/api/auth/login",
                    None,
                    Some(json!({"email": email, "password": "ward7office"})),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "login failed: {}", body);
            body["token"].as_str().unwrap().to_string()
        }

        /// Register and verify a citizen, returning a session token
        async fn citizen(&self, email: &str) -> String {
            let (status, _) = self.register(email, "citizen", None).await;
            assert_eq!(status, StatusCode::ACCEPTED);
            let code = self.notifier.code_for(email).await.unwrap();
            let (status, body) = self
                .call(
                    Method::POST,
                    "/api/auth/verify",
                    None,
                    Some(json!({"email": email, "code": code})),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            body["token"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_need_session() {
        let app = TestApp::new().await;
        let (status, body) = app.call(Method::GET, "/api/tickets", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _) = app
            .call(Method::GET, "/api/me", Some("not-a-real-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_and_role_request_review() {
        let app = TestApp::new().await;

        let (status, body) = app.register("root@example.org", "admin", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "auto_approved");
        let admin = app.login("root@example.org").await;

        let (status, body) = app
            .register("meera@example.org", "employee", Some("Electrical"))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "requires_approval");
        let request_id = body["request"]["id"].as_str().unwrap().to_string();
        assert!(body["request"].get("password_hash").is_none());

        let (status, body) = app
            .register("meera@example.org", "citizen", None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "duplicate_email");

        let (status, body) = app
            .call(Method::GET, "/api/role-requests/stats", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pending"], 1);

        let uri = format!("/api/role-requests/{}/approve", request_id);
        let (status, _) = app.call(Method::POST, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app.call(Method::POST, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "already_reviewed");

        let employee = app.login("meera@example.org").await;
        let (_, me) = app.call(Method::GET, "/api/me", Some(&employee), None).await;
        assert_eq!(me["role"], "employee");
        assert_eq!(me["department"], "Electrical");

        let (status, _) = app
            .call(Method::GET, "/api/role-requests", Some(&employee), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_invalid_department_is_unprocessable() {
        let app = TestApp::new().await;
        let (status, body) = app.register("e@example.org", "employee", Some("Parks")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["details"]["field"], "department");
    }

    #[tokio::test]
    async fn test_ticket_flow_over_http() {
        let app = TestApp::new().await;
        app.register("root@example.org", "admin", None).await;
        let admin = app.login("root@example.org").await;
        let citizen = app.citizen("asha@example.org").await;

        let (status, ticket) = app
            .call(
                Method::POST,
                "/api/tickets",
                Some(&citizen),
                Some(json!({
                    "title": "Streetlight out",
                    "description": "Dark since Monday",
                    "category": "Electrical",
                    "priority": "High",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ticket["status"], "Pending");
        assert_eq!(ticket["suggested_department"], "Electrical");
        assert_eq!(ticket["overdue"], false);
        let id = ticket["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/tickets/{}/status", id),
                Some(&admin),
                Some(json!({"status": "Resolved"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "illegal_transition");
        assert_eq!(body["error"]["details"]["from"], "Pending");

        let (status, _) = app
            .call(
                Method::PUT,
                &format!("/api/tickets/{}/assign", id),
                Some(&citizen),
                Some(json!({"department": "Electrical"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/tickets/{}/assign", id),
                Some(&admin),
                Some(json!({"department": "Electrical"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assigned_department"], "Electrical");

        let (_, actions) = app
            .call(Method::GET, &format!("/api/tickets/{}/actions", id), Some(&admin), None)
            .await;
        assert_eq!(actions["next_statuses"], json!(["Open"]));

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/tickets/{}/comments", id),
                Some(&citizen),
                Some(json!({"text": "It is on the corner of 5th Cross"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/tickets/{}/reopen", id),
                Some(&citizen),
                Some(json!({"reason": ""})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["details"]["field"], "reason");

        let (_, list) = app.call(Method::GET, "/api/tickets", Some(&citizen), None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (_, summary) = app
            .call(Method::GET, "/api/tickets/summary", Some(&admin), None)
            .await;
        assert_eq!(summary["total"], 1);
        assert_eq!(summary["pending"], 1);

        let (status, _) = app
            .call(Method::GET, "/api/tickets?status=bogus", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_auth_routes_are_rate_limited() {
        let mut config = Config::default();
        config.rate_limit.auth_requests_per_window = 2;
        let app = TestApp::with_config(config).await;

        let attempt = || {
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", "203.0.113.50")
                .body(Body::from(
                    json!({"email": "nobody@example.org", "password": "guess1234"}).to_string(),
                ))
                .unwrap()
        };

        for _ in 0..2 {
            let response = app.router.clone().oneshot(attempt()).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().contains_key("X-RateLimit-Remaining"));
        }

        let response = app.router.clone().oneshot(attempt()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
    }

    #[tokio::test]
    async fn test_logout_revokes_session() {
        let app = TestApp::new().await;
        let token = app.citizen("asha@example.org").await;

        let (status, _) = app
            .call(Method::POST, "/api/auth/logout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.call(Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
