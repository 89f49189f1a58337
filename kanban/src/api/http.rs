//! HTTP backend client built on `reqwest`.
//!
//! Every authenticated request carries the session's bearer token. A `401`
//! triggers exactly one refresh (cookie-based, `POST /users/refresh-token`)
//! followed by one retry; if either fails the session is cleared and
//! [`ApiError::Unauthorized`] is returned.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use kanban_proto::api::{
    AuthResponse, ColumnTitle, CreateBoard, ErrorBody, Login, MoveColumn, MoveTask, NewComment,
    NewTask, RefreshResponse, Register, ReorderTasks, ShareBoard, UpdateProfile, User,
};
use kanban_proto::board::{Board, BoardId, Column, ColumnId, Reaction, Task, TaskId};

use super::{ApiError, BoardApi, UserApi, reaction_segment};
use crate::session::Session;

/// REST client for the board and user endpoints.
#[derive(Debug, Clone)]
pub struct HttpBoardApi {
    client: reqwest::Client,
    /// `…/api/` with a trailing slash so relative joins keep the prefix.
    base: Url,
    session: Arc<Session>,
}

impl HttpBoardApi {
    /// Creates a client rooted at `api_url` (e.g. `http://localhost:8080/api`).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `api_url` is not an absolute
    /// http(s) URL, or [`ApiError::Transport`] if the TLS backend cannot be
    /// initialised.
    pub fn new(api_url: &str, session: Arc<Session>, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = Url::parse(api_url).map_err(|e| ApiError::InvalidUrl(format!("{api_url}: {e}")))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!("{api_url}: not an http(s) base url")));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base,
            session,
        })
    }

    /// The session whose token this client sends.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Builds an endpoint URL from raw path segments. Ids are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::InvalidUrl(self.base.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn board_url(&self, board: &BoardId, rest: &[&str]) -> Result<Url, ApiError> {
        let mut segments = vec!["boards", board.as_str()];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn task_url(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        rest: &[&str],
    ) -> Result<Url, ApiError> {
        let mut segments = vec!["columns", column.as_str(), "tasks", task.as_str()];
        segments.extend_from_slice(rest);
        self.board_url(board, &segments)
    }

    /// Sends one request with the current token.
    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        authenticated: bool,
    ) -> Result<Response, ApiError> {
        let mut request = self.client.request(method, url);
        if authenticated && let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Sends an authenticated request, refreshing the token once on `401`.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let response = self
            .dispatch(method.clone(), url.clone(), body, true)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        tracing::debug!(%url, "access token rejected, refreshing");
        self.refresh_token().await?;

        let response = self.dispatch(method, url.clone(), body, true).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(%url, "refreshed token rejected, session cleared");
            self.session.clear();
            return Err(ApiError::Unauthorized);
        }
        check_status(response).await
    }

    /// Exchanges the refresh cookie for a new bearer token.
    async fn refresh_token(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["users", "refresh-token"])?;
        let outcome: Result<RefreshResponse, ApiError> = async {
            let response = self.dispatch(Method::POST, url, None, false).await?;
            let response = check_status(response).await?;
            decode::<RefreshResponse>(response).await
        }
        .await;

        match outcome {
            Ok(refreshed) => {
                self.session.set_token(refreshed.token);
                tracing::info!("access token refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(err = %e, "token refresh failed, session cleared");
                self.session.clear();
                Err(ApiError::Unauthorized)
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let response = self.execute(method, url, body).await?;
        decode(response).await
    }

    async fn fetch_public<T: DeserializeOwned>(&self, url: Url, body: &Value) -> Result<T, ApiError> {
        let response = self.dispatch(Method::POST, url, Some(body), false).await?;
        let response = check_status(response).await?;
        decode(response).await
    }
}

/// Serialises a request body.
fn to_body(body: &impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Decode(format!("request body: {e}")))
}

/// Turns a non-success response into [`ApiError::Rejected`].
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .map(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    tracing::debug!(status = status.as_u16(), %message, "request rejected");
    Err(ApiError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

impl BoardApi for HttpBoardApi {
    async fn list_boards(&self) -> Result<Vec<Board>, ApiError> {
        self.fetch(Method::GET, self.endpoint(&["boards"])?, None).await
    }

    async fn create_board(&self, title: &str) -> Result<Board, ApiError> {
        let body = to_body(&CreateBoard {
            title: title.to_string(),
        })?;
        self.fetch(Method::POST, self.endpoint(&["boards"])?, Some(&body))
            .await
    }

    async fn share_board(&self, board: &BoardId, email: &str) -> Result<(), ApiError> {
        let body = to_body(&ShareBoard {
            email: email.to_string(),
        })?;
        self.execute(Method::POST, self.board_url(board, &["share"])?, Some(&body))
            .await?;
        Ok(())
    }

    async fn delete_board(&self, board: &BoardId) -> Result<(), ApiError> {
        self.execute(Method::DELETE, self.board_url(board, &[])?, None)
            .await?;
        Ok(())
    }

    async fn add_column(&self, board: &BoardId, title: &str) -> Result<Board, ApiError> {
        let body = to_body(&ColumnTitle {
            column_title: title.to_string(),
        })?;
        self.fetch(Method::POST, self.board_url(board, &["columns"])?, Some(&body))
            .await
    }

    async fn rename_column(
        &self,
        board: &BoardId,
        column: &ColumnId,
        title: &str,
    ) -> Result<Board, ApiError> {
        let body = to_body(&ColumnTitle {
            column_title: title.to_string(),
        })?;
        let url = self.board_url(board, &["columns", column.as_str()])?;
        self.fetch(Method::PUT, url, Some(&body)).await
    }

    async fn move_column(
        &self,
        board: &BoardId,
        column: &ColumnId,
        new_index: usize,
    ) -> Result<Board, ApiError> {
        let body = to_body(&MoveColumn { new_index })?;
        let url = self.board_url(board, &["columns", column.as_str(), "move"])?;
        self.fetch(Method::PUT, url, Some(&body)).await
    }

    async fn delete_column(&self, board: &BoardId, column: &ColumnId) -> Result<Board, ApiError> {
        let url = self.board_url(board, &["columns", column.as_str()])?;
        self.fetch(Method::DELETE, url, None).await
    }

    async fn add_task(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &NewTask,
    ) -> Result<Board, ApiError> {
        let body = to_body(task)?;
        let url = self.board_url(board, &["columns", column.as_str(), "tasks"])?;
        self.fetch(Method::POST, url, Some(&body)).await
    }

    async fn update_task(&self, board: &BoardId, task: &Task) -> Result<Board, ApiError> {
        let body = to_body(task)?;
        let url = self.task_url(board, &task.column_id, &task.id, &[])?;
        self.fetch(Method::PUT, url, Some(&body)).await
    }

    async fn move_task(
        &self,
        board: &BoardId,
        task: &TaskId,
        source: &ColumnId,
        destination: &ColumnId,
    ) -> Result<Board, ApiError> {
        let body = to_body(&MoveTask {
            source_column_id: source.clone(),
            destination_column_id: destination.clone(),
        })?;
        let url = self.board_url(board, &["tasks", task.as_str(), "move"])?;
        self.fetch(Method::PUT, url, Some(&body)).await
    }

    async fn reorder_tasks(
        &self,
        board: &BoardId,
        column: &ColumnId,
        new_order: &[Task],
    ) -> Result<Column, ApiError> {
        let body = to_body(&ReorderTasks {
            new_order: new_order.to_vec(),
        })?;
        let url = self.board_url(board, &["columns", column.as_str(), "reorder"])?;
        self.fetch(Method::PUT, url, Some(&body)).await
    }

    async fn delete_task(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
    ) -> Result<Board, ApiError> {
        let url = self.task_url(board, column, task, &[])?;
        self.fetch(Method::DELETE, url, None).await
    }

    async fn add_comment(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        text: &str,
    ) -> Result<Task, ApiError> {
        let body = to_body(&NewComment {
            comment: text.to_string(),
        })?;
        let url = self.task_url(board, column, task, &["comment"])?;
        self.fetch(Method::POST, url, Some(&body)).await
    }

    async fn add_reaction(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        reaction: Reaction,
    ) -> Result<Task, ApiError> {
        let url = self.task_url(board, column, task, &[reaction_segment(reaction)])?;
        self.fetch(Method::POST, url, None).await
    }

    async fn remove_reaction(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        reaction: Reaction,
    ) -> Result<Task, ApiError> {
        let url = self.task_url(board, column, task, &[reaction_segment(reaction)])?;
        self.fetch(Method::DELETE, url, None).await
    }
}

impl UserApi for HttpBoardApi {
    async fn register(&self, request: &Register) -> Result<AuthResponse, ApiError> {
        let body = to_body(request)?;
        self.fetch_public(self.endpoint(&["users", "register"])?, &body)
            .await
    }

    async fn login(&self, request: &Login) -> Result<AuthResponse, ApiError> {
        let body = to_body(request)?;
        self.fetch_public(self.endpoint(&["users", "login"])?, &body)
            .await
    }

    async fn profile(&self) -> Result<User, ApiError> {
        self.fetch(Method::GET, self.endpoint(&["users", "profile"])?, None)
            .await
    }

    async fn update_profile(&self, request: &UpdateProfile) -> Result<User, ApiError> {
        let body = to_body(request)?;
        self.fetch(Method::PUT, self.endpoint(&["users", "profile"])?, Some(&body))
            .await
    }
}
