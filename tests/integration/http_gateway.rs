// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::significant_drop_tightening
)]

//! Integration tests for the HTTP backend client.
//!
//! Runs `HttpBoardApi` against an in-process axum server that mimics the
//! board service: bearer-token checks, a cookie-based refresh endpoint, and
//! `{message}` error documents.
//!
//! These tests validate:
//! - Login stores the token and later requests carry it as a bearer header
//! - A 401 triggers exactly one refresh followed by one retry
//! - A failed refresh clears the session and surfaces `Unauthorized`
//! - Server error messages reach the caller
//! - Ids are percent-encoded into the request path
//! - A profile update refreshes the session's cached profile

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};

use kanban::api::http::HttpBoardApi;
use kanban::api::{ApiError, BoardApi};
use kanban::gateway::BoardGateway;
use kanban::session::Session;
use kanban::store::BoardStore;
use kanban_proto::board::{BoardId, ColumnId, Reaction, TaskId, UserId};

// =============================================================================
// Fake board service
// =============================================================================

#[derive(Default)]
struct Backend {
    /// Token the server currently accepts.
    valid_token: String,
    /// Whether the refresh endpoint issues a new token.
    refresh_enabled: bool,
    /// Token handed out by the next successful refresh.
    next_token: String,
    refreshes: usize,
    /// `Authorization` header of every authenticated request, in order.
    auth_headers: Vec<Option<String>>,
    /// `Cookie` header seen by the refresh endpoint.
    refresh_cookie: Option<String>,
    /// Board ids received by the delete endpoint, after path decoding.
    deleted: Vec<String>,
    /// Bodies received by the comment endpoint.
    comments: Vec<Value>,
    /// Reaction requests as `(method, segment)`.
    reactions: Vec<(String, String)>,
    /// Profile saved by the last accepted update.
    profile: Option<Value>,
    profile_fetches: usize,
}

type Shared = Arc<Mutex<Backend>>;

fn board_json() -> Value {
    json!({
        "_id": "b1",
        "owner": "u1",
        "collaborators": [],
        "title": "Sprint",
        "columns": [{
            "_id": "c1",
            "title": "Todo",
            "tasks": [task_json(&[], &["u1"])]
        }]
    })
}

fn task_json(likes: &[&str], dislikes: &[&str]) -> Value {
    json!({
        "_id": "t1",
        "columnId": "c1",
        "title": "Write docs",
        "likes": likes,
        "dislikes": dislikes,
    })
}

fn authorized(state: &Shared, headers: &HeaderMap) -> bool {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut backend = state.lock();
    let ok = auth.as_deref() == Some(format!("Bearer {}", backend.valid_token).as_str());
    backend.auth_headers.push(auth);
    ok
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"message": "jwt expired"}))).into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] != "secret" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Invalid credentials"})),
        )
            .into_response();
    }
    (
        [(header::SET_COOKIE, "refreshToken=r1; Path=/; HttpOnly")],
        Json(json!({"token": "t-1", "_id": "u1", "username": "alice"})),
    )
        .into_response()
}

async fn refresh(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut backend = state.lock();
    backend.refreshes += 1;
    backend.refresh_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if !backend.refresh_enabled {
        return unauthorized();
    }
    backend.valid_token = backend.next_token.clone();
    Json(json!({"token": backend.next_token})).into_response()
}

async fn list_boards(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    Json(json!([board_json()])).into_response()
}

async fn create_board(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match body["title"].as_str() {
        Some("Sprint") => (
            StatusCode::CONFLICT,
            Json(json!({"message": "Board already exists"})),
        )
            .into_response(),
        Some("boom") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => Json(board_json()).into_response(),
    }
}

async fn delete_board(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(board_id): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.lock().deleted.push(board_id);
    Json(json!({"message": "Board deleted"})).into_response()
}

async fn comment(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.lock().comments.push(body.clone());
    let mut task = task_json(&[], &["u1"]);
    task["comments"] = json!([{
        "_id": "m1",
        "commenterId": "u1",
        "commenterUsername": "alice",
        "text": body["comment"],
    }]);
    Json(task).into_response()
}

async fn add_reaction(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_, _, _, reaction)): Path<(String, String, String, String)>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.lock().reactions.push(("POST".into(), reaction.clone()));
    let task = if reaction == "like" {
        task_json(&["u1"], &[])
    } else {
        task_json(&[], &["u1"])
    };
    Json(task).into_response()
}

async fn remove_reaction(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((_, _, _, reaction)): Path<(String, String, String, String)>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.lock().reactions.push(("DELETE".into(), reaction));
    Json(task_json(&[], &[])).into_response()
}

async fn get_profile(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let mut backend = state.lock();
    backend.profile_fetches += 1;
    let profile = backend
        .profile
        .clone()
        .unwrap_or_else(|| json!({"_id": "u1", "username": "alice", "email": "alice@example.com"}));
    Json(profile).into_response()
}

async fn put_profile(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if body["email"] == "taken@example.com" {
        return (
            StatusCode::CONFLICT,
            Json(json!({"message": "Email already in use"})),
        )
            .into_response();
    }
    let profile = json!({"_id": "u1", "username": body["username"], "email": body["email"]});
    state.lock().profile = Some(profile.clone());
    Json(profile).into_response()
}

/// Starts the fake service and returns its `/api` base URL.
async fn start_backend(state: Shared) -> String {
    let reaction = "/api/boards/{board}/columns/{column}/tasks/{task}/{reaction}";
    let app = Router::new()
        .route("/api/users/login", post(login))
        .route("/api/users/refresh-token", post(refresh))
        .route("/api/users/profile", get(get_profile).put(put_profile))
        .route("/api/boards", get(list_boards).post(create_board))
        .route("/api/boards/{board}", delete(delete_board))
        .route(
            "/api/boards/{board}/columns/{column}/tasks/{task}/comment",
            post(comment),
        )
        .route(reaction, post(add_reaction).delete(remove_reaction))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn backend(valid_token: &str) -> Shared {
    Arc::new(Mutex::new(Backend {
        valid_token: valid_token.to_string(),
        ..Backend::default()
    }))
}

fn client(base: &str, session: &Arc<Session>) -> HttpBoardApi {
    HttpBoardApi::new(base, Arc::clone(session), Duration::from_secs(5)).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn login_then_requests_carry_bearer_token() {
    let state = backend("t-1");
    let base = start_backend(Arc::clone(&state)).await;
    let session = Arc::new(Session::new());
    let api = client(&base, &session);

    let user_id = session.login(&api, "alice@example.com", "secret").await.unwrap();
    assert_eq!(user_id, UserId::from("u1"));
    assert_eq!(session.token().as_deref(), Some("t-1"));

    let boards = api.list_boards().await.unwrap();
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0].columns[0].tasks[0].id, TaskId::from("t1"));
    assert_eq!(
        state.lock().auth_headers,
        vec![Some("Bearer t-1".to_string())]
    );
}

#[tokio::test]
async fn bad_credentials_surface_server_message() {
    let base = start_backend(backend("t-1")).await;
    let session = Arc::new(Session::new());
    let api = client(&base, &session);

    let err = session
        .login(&api, "alice@example.com", "wrong")
        .await
        .unwrap_err();

    match err {
        ApiError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn expired_token_is_refreshed_once_and_retried() {
    let state = backend("t-1");
    let base = start_backend(Arc::clone(&state)).await;
    let session = Arc::new(Session::new());
    let api = client(&base, &session);
    session.login(&api, "alice@example.com", "secret").await.unwrap();

    // The server rotates its key: t-1 is no longer accepted.
    {
        let mut backend = state.lock();
        backend.valid_token = "t-2".to_string();
        backend.next_token = "t-2".to_string();
        backend.refresh_enabled = true;
    }

    let boards = api.list_boards().await.unwrap();
    assert_eq!(boards.len(), 1);
    assert_eq!(session.token().as_deref(), Some("t-2"));

    let backend = state.lock();
    assert_eq!(backend.refreshes, 1);
    assert_eq!(
        backend.auth_headers,
        vec![Some("Bearer t-1".to_string()), Some("Bearer t-2".to_string())]
    );
    assert!(
        backend
            .refresh_cookie
            .as_deref()
            .is_some_and(|c| c.contains("refreshToken=r1"))
    );
}

#[tokio::test]
async fn failed_refresh_clears_session() {
    let state = backend("t-1");
    let base = start_backend(Arc::clone(&state)).await;
    let session = Arc::new(Session::with_token("stale"));
    session.set_user_id(UserId::from("u1"));
    let api = client(&base, &session);

    let err = api.list_boards().await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized));
    assert!(err.requires_login());
    assert!(session.token().is_none());
    assert!(session.user_id().is_none());
    let backend = state.lock();
    assert_eq!(backend.refreshes, 1);
    assert_eq!(backend.auth_headers.len(), 1);
}

#[tokio::test]
async fn gateway_reports_expired_session() {
    let base = start_backend(backend("t-1")).await;
    let session = Arc::new(Session::with_token("stale"));
    let api = Arc::new(client(&base, &session));
    let gateway = BoardGateway::new(api, BoardStore::shared(), Arc::clone(&session));

    let err = gateway.load_boards().await.unwrap_err();

    assert!(err.requires_login());
    assert_eq!(err.notice(), "Your session has expired. Please log in again.");
    assert!(gateway.store().lock().boards().is_empty());
}

#[tokio::test]
async fn rejections_carry_message_or_status_text() {
    let base = start_backend(backend("t-1")).await;
    let session = Arc::new(Session::with_token("t-1"));
    let api = client(&base, &session);

    match api.create_board("Sprint").await.unwrap_err() {
        ApiError::Rejected { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "Board already exists");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    match api.create_board("boom").await.unwrap_err() {
        ApiError::Rejected { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Internal Server Error");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn ids_are_percent_encoded_in_paths() {
    let state = backend("t-1");
    let base = start_backend(Arc::clone(&state)).await;
    let session = Arc::new(Session::with_token("t-1"));
    let api = client(&base, &session);

    api.delete_board(&BoardId::from("a/b c")).await.unwrap();

    assert_eq!(state.lock().deleted, vec!["a/b c".to_string()]);
}

#[tokio::test]
async fn gateway_comment_and_reaction_over_http() {
    let state = backend("t-1");
    let base = start_backend(Arc::clone(&state)).await;
    let session = Arc::new(Session::with_token("t-1"));
    session.set_user_id(UserId::from("u1"));
    let api = Arc::new(client(&base, &session));
    let gateway = BoardGateway::new(api, BoardStore::shared(), session);
    gateway.load_boards().await.unwrap();

    let task = gateway
        .add_comment(&ColumnId::from("c1"), &TaskId::from("t1"), "  on it ")
        .await
        .unwrap();
    assert_eq!(task.comments[0].text, "on it");

    // The fixture task holds u1's dislike: liking it clears that first.
    let task = gateway.toggle_like(&TaskId::from("t1")).await.unwrap();
    assert_eq!(task.reaction_of(&UserId::from("u1")), Some(Reaction::Like));

    let backend = state.lock();
    assert_eq!(backend.comments, vec![json!({"comment": "on it"})]);
    assert_eq!(
        backend.reactions,
        vec![
            ("DELETE".to_string(), "dislike".to_string()),
            ("POST".to_string(), "like".to_string())
        ]
    );
}

#[tokio::test]
async fn profile_update_refreshes_cached_profile() {
    let state = backend("t-1");
    let base = start_backend(Arc::clone(&state)).await;
    let session = Arc::new(Session::with_token("t-1"));
    let api = client(&base, &session);

    let before = session.load_user(&api).await.unwrap();
    assert_eq!(before.username, "alice");

    let err = session
        .update_profile(&api, "alice", "taken@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Rejected { status: 409, .. }));
    assert_eq!(session.user(), Some(before));

    let user = session
        .update_profile(&api, "Alice B", "alice@example.org")
        .await
        .unwrap();
    assert_eq!(user.id, UserId::from("u1"));
    assert_eq!(user.email, "alice@example.org");
    assert_eq!(session.user(), Some(user.clone()));
    assert_eq!(session.load_user(&api).await.unwrap(), user);

    let backend = state.lock();
    assert_eq!(backend.profile_fetches, 1);
    assert_eq!(backend.profile.as_ref().unwrap()["username"], "Alice B");
}
