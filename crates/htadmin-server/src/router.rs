//! HTTP surface: `POST /uac/create` and `POST /uac/delete` behind basic auth.

use crate::config::AdminCredentials;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use htadmin::{FileError, GENERATED_PASSWORD_LEN, HtpasswdFile, StoreError, generate_password};
use serde::Deserialize;
use std::sync::Arc;
use zeroize::Zeroizing;

const REALM_CHALLENGE: &str = "Basic realm=\"Authorization Required\"";

#[derive(Clone)]
pub struct AppState {
    htpasswd: HtpasswdFile,
    admins: Arc<AdminCredentials>,
}

impl AppState {
    pub fn new(htpasswd: HtpasswdFile, admins: AdminCredentials) -> Self {
        Self {
            htpasswd,
            admins: Arc::new(admins),
        }
    }
}

/// Request body for both endpoints. Any `password` sent by the client is
/// ignored; the server always generates one.
#[derive(Debug, Deserialize)]
struct Account {
    name: String,
}

pub fn setup_router(state: AppState) -> Router {
    Router::new()
        .route("/uac/create", post(create_user))
        .route("/uac/delete", post(delete_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth))
        .with_state(state)
}

fn basic_credentials(request: &Request) -> Option<(String, String)> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

async fn basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match basic_credentials(&request) {
        Some((name, password)) if state.admins.check(&name, &password) => {
            tracing::debug!(admin = %name, uri = %request.uri(), "admin authorized");
            next.run(request).await
        }
        _ => {
            tracing::warn!(uri = %request.uri(), "rejected request without valid admin credentials");
            (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, REALM_CHALLENGE)],
            )
                .into_response()
        }
    }
}

/// Formats an error and its sources as `outer: inner: innermost`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn status_for(err: &FileError) -> StatusCode {
    match err {
        FileError::UserAlreadyExists { .. } | FileError::UserNotFound { .. } => {
            StatusCode::CONFLICT
        }
        FileError::Update { source, .. } => match source {
            StoreError::EmptyPassword | StoreError::InvalidUsername { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: FileError) -> Response {
    let status = status_for(&err);
    let text = error_chain(&err);
    if status.is_server_error() {
        tracing::error!(error = %text, "htpasswd operation failed");
    } else {
        tracing::info!(error = %text, "htpasswd operation refused");
    }
    (status, text).into_response()
}

fn bad_body(rejection: JsonRejection) -> Response {
    (StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
}

async fn run_blocking<F>(f: F) -> Result<(), Response>
where
    F: FnOnce() -> Result<(), FileError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(failure(err)),
        Err(join) => {
            tracing::error!(error = %join, "htpasswd task failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<Account>, JsonRejection>,
) -> Response {
    let Json(account) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    let password = Zeroizing::new(generate_password(GENERATED_PASSWORD_LEN));

    let file = state.htpasswd.clone();
    let name = account.name.clone();
    let secret = password.clone();
    match run_blocking(move || file.create_user(&name, &secret)).await {
        Ok(()) => (StatusCode::OK, format!("Success\n{}", password.as_str())).into_response(),
        Err(response) => response,
    }
}

async fn delete_user(
    State(state): State<AppState>,
    body: Result<Json<Account>, JsonRejection>,
) -> Response {
    let Json(account) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_body(rejection),
    };

    let file = state.htpasswd.clone();
    let name = account.name.clone();
    match run_blocking(move || file.delete_user(&name)).await {
        Ok(()) => (
            StatusCode::OK,
            format!("User {:?} deleted successfully", account.name),
        )
            .into_response(),
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use std::fs;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    const ADMIN: (&str, &str) = ("admin", "letmein");

    fn app(dir: &TempDir) -> Router {
        let mut admins = AdminCredentials::default();
        admins.insert(ADMIN.0, ADMIN.1);
        let file = HtpasswdFile::new(dir.path().join(".htpasswd"));
        setup_router(AppState::new(file, admins))
    }

    fn auth_header(name: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{name}:{password}")))
    }

    fn request(uri: &str, body: &str, auth: Option<(&str, &str)>) -> Request {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some((name, password)) = auth {
            builder = builder.header(header::AUTHORIZATION, auth_header(name, password));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, req: Request) -> (StatusCode, String) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_requires_admin_credentials() {
        let dir = tempdir().unwrap();
        let app = app(&dir);

        for auth in [None, Some(("admin", "wrong")), Some(("root", "letmein"))] {
            let response = app
                .clone()
                .oneshot(request("/uac/create", r#"{"name":"alice"}"#, auth))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                response.headers()[header::WWW_AUTHENTICATE],
                REALM_CHALLENGE
            );
        }
        assert!(!dir.path().join(".htpasswd").exists());
    }

    #[tokio::test]
    async fn test_create_and_delete_flow() {
        let dir = tempdir().unwrap();
        let app = app(&dir);
        let path = dir.path().join(".htpasswd");

        let (status, body) = send(
            &app,
            request(
                "/uac/create",
                r#"{"name":"alice","password":"ignored"}"#,
                Some(ADMIN),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let password = body.strip_prefix("Success\n").unwrap();
        assert_eq!(password.len(), GENERATED_PASSWORD_LEN);
        assert_ne!(password, "ignored");

        let passwords = HtpasswdFile::new(&path).load().unwrap();
        assert!(passwords.get("alice").unwrap().starts_with("$apr1$"));
        assert!(passwords.verify("alice", password).unwrap());
        let before = fs::read(&path).unwrap();

        let (status, body) =
            send(&app, request("/uac/create", r#"{"name":"alice"}"#, Some(ADMIN))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "User 'alice' already exists");
        assert_eq!(fs::read(&path).unwrap(), before);

        let (status, body) =
            send(&app, request("/uac/delete", r#"{"name":"alice"}"#, Some(ADMIN))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"User "alice" deleted successfully"#);
        assert!(HtpasswdFile::new(&path).load().unwrap().is_empty());

        let (status, _) =
            send(&app, request("/uac/delete", r#"{"name":"alice"}"#, Some(ADMIN))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let dir = tempdir().unwrap();
        let app = app(&dir);

        let (status, _) = send(&app, request("/uac/create", "{not json", Some(ADMIN))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, request("/uac/create", "{}", Some(ADMIN))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            send(&app, request("/uac/create", r#"{"name":"a:b"}"#, Some(ADMIN))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid username"), "{body}");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let app = app(&dir);
        let path = dir.path().join(".htpasswd");
        fs::write(&path, "alice:h1\nalice:h2\n").unwrap();

        let (status, body) =
            send(&app, request("/uac/create", r#"{"name":"bob"}"#, Some(ADMIN))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("defined more than once"), "{body}");
        assert_eq!(fs::read_to_string(&path).unwrap(), "alice:h1\nalice:h2\n");
    }

    #[test]
    fn test_error_chain() {
        let inner = std::io::Error::other("disk on fire");
        let outer = FileError::FileSave {
            source: inner,
            path: "x".into(),
        };
        assert_eq!(
            error_chain(&outer),
            "Failed to save htpasswd file 'x': disk on fire"
        );
    }
}
