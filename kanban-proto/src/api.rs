//! REST request and response bodies.
//!
//! Every board-structural mutation answers with the canonical [`Board`],
//! an in-column reorder answers with the canonical [`Column`], and comment
//! or reaction mutations answer with the canonical [`Task`].
//!
//! [`Board`]: crate::board::Board
//! [`Column`]: crate::board::Column
//! [`Task`]: crate::board::Task

use serde::{Deserialize, Serialize};

use crate::board::{ColumnId, Priority, Task, UserId};

/// Maximum board, column or task title length accepted by the client.
pub const MAX_TITLE_LENGTH: usize = 256;

/// `POST /boards`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBoard {
    /// Title of the new board.
    pub title: String,
}

/// `POST /boards/{boardId}/share`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareBoard {
    /// E-mail of the user to invite.
    pub email: String,
}

/// `POST /boards/{boardId}/columns` and `PUT /boards/{boardId}/columns/{columnId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnTitle {
    /// Column heading.
    pub column_title: String,
}

/// `PUT /boards/{boardId}/columns/{columnId}/move`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveColumn {
    /// Target position in the board's column order.
    pub new_index: usize,
}

/// `POST /boards/{boardId}/columns/{columnId}/tasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Card title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Initial priority.
    pub priority: Priority,
    /// Initial labels.
    pub tags: Vec<String>,
}

/// `PUT /boards/{boardId}/tasks/{taskId}/move`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTask {
    /// Column the task is leaving.
    pub source_column_id: ColumnId,
    /// Column the task is joining. The server appends it.
    pub destination_column_id: ColumnId,
}

/// `PUT /boards/{boardId}/columns/{columnId}/reorder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderTasks {
    /// The column's full task list in the requested order.
    pub new_order: Vec<Task>,
}

/// `POST /boards/{boardId}/columns/{columnId}/tasks/{taskId}/comment`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    /// Comment body.
    pub comment: String,
}

/// A user account as returned by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned identifier.
    #[serde(rename = "_id")]
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Login e-mail.
    pub email: String,
}

/// `POST /users/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    /// Account e-mail.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// `POST /users/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Desired display name.
    pub username: String,
    /// Account e-mail.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// `PUT /users/profile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfile {
    /// New display name.
    pub username: String,
    /// New e-mail.
    pub email: String,
}

/// Answer to login and register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// The authenticated user's id.
    #[serde(rename = "_id")]
    pub user_id: UserId,
}

/// Answer to the token refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// Fresh bearer token.
    pub token: String,
}

/// Error document returned by the server on rejected requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    #[serde(default)]
    pub message: String,
}
