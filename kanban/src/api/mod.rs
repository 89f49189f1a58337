//! REST contract between the client and the board server.
//!
//! Defines the [`BoardApi`] and [`UserApi`] traits that every backend
//! client must satisfy. Implementations:
//! - [`http::HttpBoardApi`]: `reqwest` client with bearer auth and a single
//!   transparent token refresh on `401`
//! - [`memory::InMemoryBoardApi`]: in-process server model for tests and
//!   offline use

pub mod http;
pub mod memory;

use std::future::Future;

use kanban_proto::api::{AuthResponse, Login, NewTask, Register, UpdateProfile, User};
use kanban_proto::board::{Board, BoardId, Column, ColumnId, Reaction, Task, TaskId};

/// Errors surfaced by a backend client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (DNS, refused, timeout).
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason, or the canonical status text.
        message: String,
    },

    /// The token was rejected and could not be refreshed. The user must log
    /// in again.
    #[error("session expired, please log in again")]
    Unauthorized,

    /// The response body did not match the expected document.
    #[error("malformed response: {0}")]
    Decode(String),

    /// An endpoint URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Whether the front end should send the user back to the login screen.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Board, column and task operations.
///
/// Structural mutations answer with the canonical [`Board`]; the in-column
/// reorder answers with the canonical [`Column`]; comment and reaction
/// mutations answer with the canonical [`Task`].
pub trait BoardApi: Send + Sync {
    /// `GET /boards`
    fn list_boards(&self) -> impl Future<Output = Result<Vec<Board>, ApiError>> + Send;

    /// `POST /boards`
    fn create_board(&self, title: &str) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `POST /boards/{boardId}/share`
    fn share_board(
        &self,
        board: &BoardId,
        email: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `DELETE /boards/{boardId}`
    fn delete_board(&self, board: &BoardId) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /boards/{boardId}/columns`
    fn add_column(
        &self,
        board: &BoardId,
        title: &str,
    ) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `PUT /boards/{boardId}/columns/{columnId}`
    fn rename_column(
        &self,
        board: &BoardId,
        column: &ColumnId,
        title: &str,
    ) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `PUT /boards/{boardId}/columns/{columnId}/move`
    fn move_column(
        &self,
        board: &BoardId,
        column: &ColumnId,
        new_index: usize,
    ) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `DELETE /boards/{boardId}/columns/{columnId}`
    fn delete_column(
        &self,
        board: &BoardId,
        column: &ColumnId,
    ) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `POST /boards/{boardId}/columns/{columnId}/tasks`
    fn add_task(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &NewTask,
    ) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `PUT /boards/{boardId}/columns/{task.columnId}/tasks/{task._id}`
    fn update_task(
        &self,
        board: &BoardId,
        task: &Task,
    ) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `PUT /boards/{boardId}/tasks/{taskId}/move`
    fn move_task(
        &self,
        board: &BoardId,
        task: &TaskId,
        source: &ColumnId,
        destination: &ColumnId,
    ) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `PUT /boards/{boardId}/columns/{columnId}/reorder`
    fn reorder_tasks(
        &self,
        board: &BoardId,
        column: &ColumnId,
        new_order: &[Task],
    ) -> impl Future<Output = Result<Column, ApiError>> + Send;

    /// `DELETE /boards/{boardId}/columns/{columnId}/tasks/{taskId}`
    fn delete_task(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
    ) -> impl Future<Output = Result<Board, ApiError>> + Send;

    /// `POST .../tasks/{taskId}/comment`
    fn add_comment(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        text: &str,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// `POST .../tasks/{taskId}/like` or `.../dislike`
    fn add_reaction(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        reaction: Reaction,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// `DELETE .../tasks/{taskId}/like` or `.../dislike`
    fn remove_reaction(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        reaction: Reaction,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;
}

/// Account operations.
pub trait UserApi: Send + Sync {
    /// `POST /users/register` (public)
    fn register(
        &self,
        request: &Register,
    ) -> impl Future<Output = Result<AuthResponse, ApiError>> + Send;

    /// `POST /users/login` (public)
    fn login(&self, request: &Login) -> impl Future<Output = Result<AuthResponse, ApiError>> + Send;

    /// `GET /users/profile`
    fn profile(&self) -> impl Future<Output = Result<User, ApiError>> + Send;

    /// `PUT /users/profile`
    fn update_profile(
        &self,
        request: &UpdateProfile,
    ) -> impl Future<Output = Result<User, ApiError>> + Send;
}

/// Path segment for a reaction endpoint.
pub(crate) const fn reaction_segment(reaction: Reaction) -> &'static str {
    match reaction {
        Reaction::Like => "like",
        Reaction::Dislike => "dislike",
    }
}
