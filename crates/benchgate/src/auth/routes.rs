//! Login route handlers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Form, Router,
    extract::{ConnectInfo, FromRequestParts, RawQuery, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use super::{AuthGate, LoginError, cookie};

/// Peer address for the failed-attempt record. Present when the server
/// runs with connect-info, absent for in-process routers and tests.
struct RemoteAddr(Option<SocketAddr>);

impl<S> FromRequestParts<S> for RemoteAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub password: Option<String>,
    /// Mount point of the gate, used as the cookie path.
    pub base: Option<String>,
}

/// Resolve the post-login destination: the `to` query parameter (default
/// `/`) with `to` itself stripped from the forwarded query and every
/// other parameter preserved.
fn redirect_location(query: Option<&str>) -> String {
    let mut to = None;
    let mut rest = url::form_urlencoded::Serializer::new(String::new());
    let mut has_rest = false;

    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "to" {
                if to.is_none() && !value.is_empty() {
                    to = Some(value.into_owned());
                }
            } else {
                rest.append_pair(&key, &value);
                has_rest = true;
            }
        }
    }

    let to = to.unwrap_or_else(|| "/".to_string());
    if has_rest {
        format!("{}?{}", to, rest.finish())
    } else {
        to
    }
}

fn redirect(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn login_page(
    State(gate): State<Arc<AuthGate>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    if gate.authenticated(&headers) {
        return redirect(redirect_location(query.as_deref()));
    }
    Html(gate.render_page(None)).into_response()
}

async fn submit_login(
    State(gate): State<Arc<AuthGate>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    RemoteAddr(remote): RemoteAddr,
    Form(form): Form<LoginForm>,
) -> Response {
    match gate.attempt_login(form.password.as_deref()) {
        Ok(cookie_value) => {
            let host = headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("");
            let domain = cookie::cookie_domain(host, &gate.config().proxy_domains);
            let path = form.base.as_deref().filter(|b| !b.is_empty()).unwrap_or("/");
            let set_cookie = cookie::session_cookie(&cookie_value, domain.as_deref(), path);

            (
                StatusCode::FOUND,
                [
                    (header::SET_COOKIE, set_cookie),
                    (header::LOCATION, redirect_location(query.as_deref())),
                ],
            )
                .into_response()
        }
        Err(error) => {
            if matches!(error, LoginError::IncorrectPassword) {
                log_failed_attempt(&headers, remote);
            }
            Html(gate.render_page(Some(&error))).into_response()
        }
    }
}

fn log_failed_attempt(headers: &HeaderMap, remote: Option<SocketAddr>) {
    let remote_address = remote.map(|addr| addr.to_string());
    tracing::error!(
        x_forwarded_for = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok()),
        remote_address = remote_address.as_deref(),
        user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok()),
        timestamp = chrono::Utc::now().timestamp(),
        "Failed login attempt"
    );
}

pub fn routes(gate: Arc<AuthGate>) -> Router {
    Router::new()
        .route("/login", get(login_page).post(submit_login))
        .with_state(gate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::config::{AuthConfig, PasswordSource};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        let gate = Arc::new(AuthGate::new(AuthConfig::with_password(
            "swordfish",
            "/tmp/config.yaml",
        )));
        routes(gate)
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_password(password: &str) -> Request<Body> {
        Request::post("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("password={password}")))
            .unwrap()
    }

    #[tokio::test]
    async fn get_renders_the_login_page() {
        let app = app();
        let response = app
            .oneshot(Request::get("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Check the config file at"));
    }

    #[tokio::test]
    async fn correct_password_sets_cookie_and_redirects() {
        let app = app();
        let response = app.oneshot(post_password("swordfish")).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("key={}", hash_password("swordfish"))));
        assert!(cookie.contains("Max-Age=600000"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
    }

    #[tokio::test]
    async fn redirect_honors_to_and_keeps_other_params() {
        let app = app();
        let request = Request::post("/login?to=/workspace&tkn=1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("password=swordfish"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/workspace?tkn=1");
    }

    #[tokio::test]
    async fn base_becomes_the_cookie_path() {
        let app = app();
        let request = Request::post("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("password=swordfish&base=/editor"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Path=/editor"));
    }

    #[tokio::test]
    async fn wrong_password_renders_the_generic_error() {
        let app = app();
        let response = app.oneshot(post_password("marlin")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let html = body_text(response).await;
        assert!(html.contains("Incorrect password"));
    }

    #[tokio::test]
    async fn missing_password_renders_its_own_message() {
        let app = app();
        let request = Request::post("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Missing password"));
    }

    #[tokio::test]
    async fn attempts_beyond_both_buckets_are_rate_limited() {
        let app = app();

        // 2 minute-bucket tokens + 12 hour-bucket tokens.
        for _ in 0..14 {
            let response = app.clone().oneshot(post_password("marlin")).await.unwrap();
            let html = body_text(response).await;
            assert!(html.contains("Incorrect password"));
        }

        // Exhausted: even the correct password is refused now.
        let response = app.clone().oneshot(post_password("swordfish")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Login rate limited!"));
    }

    #[tokio::test]
    async fn hashed_secret_outranks_a_plaintext_match() {
        let mut config = AuthConfig::with_password("decoy", "/tmp/config.yaml");
        config.hashed_password = Some(hash_password("real"));
        config.source = PasswordSource::EnvHashedPassword;
        let app = routes(Arc::new(AuthGate::new(config)));

        let response = app.clone().oneshot(post_password("decoy")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Incorrect password"));

        let response = app.oneshot(post_password("real")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("key={}", hash_password("real"))));
    }

    #[tokio::test]
    async fn authenticated_get_redirects_and_strips_to() {
        let app = app();
        let request = Request::get("/login?to=/foo&x=1")
            .header(header::COOKIE, format!("key={}", hash_password("swordfish")))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/foo?x=1");
    }

    #[tokio::test]
    async fn unauthenticated_get_with_query_still_renders() {
        let app = app();
        let request = Request::get("/login?to=/foo")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn redirect_location_defaults_to_root() {
        assert_eq!(redirect_location(None), "/");
        assert_eq!(redirect_location(Some("")), "/");
        assert_eq!(redirect_location(Some("to=")), "/");
        assert_eq!(redirect_location(Some("to=/abc")), "/abc");
        assert_eq!(redirect_location(Some("to=/abc&x=1&y=2")), "/abc?x=1&y=2");
        assert_eq!(redirect_location(Some("x=1")), "/?x=1");
    }
}
