//! Board mutations as request/response units.
//!
//! Each [`BoardGateway`] method captures a [`ViewTicket`], sends exactly one
//! request (two for a conflicting reaction toggle), and commits the server's
//! canonical answer into the [`BoardStore`](crate::store::BoardStore). A
//! failure returns a [`GatewayError`] and leaves the store untouched; the
//! caller shows [`GatewayError::notice`] as a transient notification.

use std::sync::Arc;

use kanban_proto::api::{MAX_TITLE_LENGTH, NewTask};
use kanban_proto::board::{Board, BoardId, Column, ColumnId, Reaction, Task, TaskId, UserId};

use crate::api::{ApiError, BoardApi};
use crate::drag::DropAction;
use crate::session::Session;
use crate::store::{SharedStore, ViewTicket};

/// One half of a reaction toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionStep {
    /// `POST .../like` or `.../dislike`
    Add(Reaction),
    /// `DELETE .../like` or `.../dislike`
    Remove(Reaction),
}

impl std::fmt::Display for ReactionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add(reaction) => write!(f, "adding {reaction}"),
            Self::Remove(reaction) => write!(f, "removing {reaction}"),
        }
    }
}

/// Errors returned by [`BoardGateway`] operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No board is selected.
    #[error("no board selected")]
    NoBoard,

    /// The session has no user id.
    #[error("not logged in")]
    NoUser,

    /// The task is not on the current board.
    #[error("task {0} not found on the current board")]
    TaskNotFound(TaskId),

    /// Input rejected before sending.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// The server or network rejected the request.
    #[error("{action} failed: {source}")]
    Request {
        /// What was being attempted.
        action: &'static str,
        /// Underlying api error.
        source: ApiError,
    },

    /// A task edit was rejected. The draft is handed back so the editor can
    /// be reopened with the user's changes.
    #[error("task update failed: {source}")]
    EditRejected {
        /// The edit the user submitted.
        draft: Box<Task>,
        /// Underlying api error.
        source: ApiError,
    },

    /// A task edit failed before anything was sent (bad title, no board).
    /// The draft is handed back like [`GatewayError::EditRejected`].
    #[error("task update not sent: {cause}")]
    EditNotSent {
        /// The edit the user submitted.
        draft: Box<Task>,
        /// Why it was not sent.
        cause: Box<Self>,
    },

    /// The first request of a reaction toggle succeeded and stays committed,
    /// the second failed.
    #[error("reaction partly applied ({applied} succeeded, {failed} failed): {source}")]
    ReactionIncomplete {
        /// Step that went through.
        applied: ReactionStep,
        /// Step that failed.
        failed: ReactionStep,
        /// Underlying api error.
        source: ApiError,
    },
}

impl GatewayError {
    fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Request { source, .. }
            | Self::EditRejected { source, .. }
            | Self::ReactionIncomplete { source, .. } => Some(source),
            Self::EditNotSent { cause, .. } => cause.api_error(),
            _ => None,
        }
    }

    /// The unsaved edit carried by a failed task update.
    #[must_use]
    pub fn draft(&self) -> Option<&Task> {
        match self {
            Self::EditRejected { draft, .. } | Self::EditNotSent { draft, .. } => Some(draft),
            _ => None,
        }
    }

    /// Whether the user has to log in again.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        self.api_error().is_some_and(ApiError::requires_login)
    }

    /// Short text for a transient notification.
    #[must_use]
    pub fn notice(&self) -> String {
        if self.requires_login() {
            return "Your session has expired. Please log in again.".to_string();
        }
        match self {
            Self::NoBoard => "Select a board first.".to_string(),
            Self::NoUser => "Log in first.".to_string(),
            Self::TaskNotFound(_) => "That task no longer exists.".to_string(),
            Self::Invalid(reason) => format!("Invalid input: {reason}."),
            Self::Request { action, .. } => format!("Could not {action}. Please try again."),
            Self::EditRejected { .. } => "Could not save the task. Another editor may have \
                 changed it in the meantime; your changes were kept."
                .to_string(),
            Self::EditNotSent { cause, .. } => format!("{} Your changes were kept.", cause.notice()),
            Self::ReactionIncomplete {
                applied, failed, ..
            } => format!("Reaction only partly saved: {applied} worked, {failed} failed."),
        }
    }
}

fn failed(action: &'static str) -> impl FnOnce(ApiError) -> GatewayError {
    move |source| {
        tracing::warn!(action, error = %source, "board request failed");
        GatewayError::Request { action, source }
    }
}

fn validate_title(title: &str) -> Result<String, GatewayError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(GatewayError::Invalid("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(GatewayError::Invalid(format!(
            "title must be at most {MAX_TITLE_LENGTH} characters"
        )));
    }
    Ok(title.to_string())
}

/// Sends board mutations and commits their canonical results.
pub struct BoardGateway<A: BoardApi> {
    api: Arc<A>,
    store: SharedStore,
    session: Arc<Session>,
}

impl<A: BoardApi> BoardGateway<A> {
    /// Creates a gateway over `api` committing into `store`.
    pub const fn new(api: Arc<A>, store: SharedStore, session: Arc<Session>) -> Self {
        Self {
            api,
            store,
            session,
        }
    }

    /// The store results are committed to.
    #[must_use]
    pub const fn store(&self) -> &SharedStore {
        &self.store
    }

    /// The backend client.
    #[must_use]
    pub const fn api(&self) -> &Arc<A> {
        &self.api
    }

    fn ticket(&self) -> Result<ViewTicket, GatewayError> {
        self.store.lock().ticket().ok_or(GatewayError::NoBoard)
    }

    fn commit_board(&self, ticket: &ViewTicket, board: &Board) {
        self.store.lock().commit_board(ticket, board.clone());
    }

    /// Fetches every board visible to the user.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Request`] if the list cannot be fetched.
    pub async fn load_boards(&self) -> Result<usize, GatewayError> {
        let ticket = self.store.lock().list_ticket();
        let boards = self.api.list_boards().await.map_err(failed("load boards"))?;
        let count = boards.len();
        if self.store.lock().set_boards(ticket, boards) {
            tracing::debug!(count, "boards loaded");
        }
        Ok(count)
    }

    /// Creates a board and makes it current.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Invalid`] for a bad title, otherwise the request error.
    pub async fn create_board(&self, title: &str) -> Result<Board, GatewayError> {
        let title = validate_title(title)?;
        let ticket = self.store.lock().list_ticket();
        let board = self
            .api
            .create_board(&title)
            .await
            .map_err(failed("create board"))?;
        self.store.lock().insert_board(ticket, board.clone());
        tracing::info!(board_id = %board.id, "board created");
        Ok(board)
    }

    /// Invites a user by e-mail.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Invalid`] for an address without `@`, otherwise the
    /// request error.
    pub async fn share_board(&self, board_id: &BoardId, email: &str) -> Result<(), GatewayError> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(GatewayError::Invalid(format!("'{email}' is not an e-mail address")));
        }
        self.api
            .share_board(board_id, email)
            .await
            .map_err(failed("share board"))?;
        tracing::info!(%board_id, "board shared");
        Ok(())
    }

    /// Deletes a board and drops it from the store.
    ///
    /// # Errors
    ///
    /// The request error (e.g. 403 when the user is not the owner).
    pub async fn delete_board(&self, board_id: &BoardId) -> Result<(), GatewayError> {
        let ticket = self.store.lock().list_ticket();
        self.api
            .delete_board(board_id)
            .await
            .map_err(failed("delete board"))?;
        self.store.lock().remove_board(ticket, board_id);
        tracing::info!(%board_id, "board deleted");
        Ok(())
    }

    /// Appends a column to the current board.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoBoard`], [`GatewayError::Invalid`] or the request
    /// error.
    pub async fn add_column(&self, title: &str) -> Result<Board, GatewayError> {
        let title = validate_title(title)?;
        let ticket = self.ticket()?;
        let board = self
            .api
            .add_column(&ticket.board_id, &title)
            .await
            .map_err(failed("add column"))?;
        self.commit_board(&ticket, &board);
        Ok(board)
    }

    /// Renames a column on the current board.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoBoard`], [`GatewayError::Invalid`] or the request
    /// error.
    pub async fn rename_column(&self, column_id: &ColumnId, title: &str) -> Result<Board, GatewayError> {
        let title = validate_title(title)?;
        let ticket = self.ticket()?;
        let board = self
            .api
            .rename_column(&ticket.board_id, column_id, &title)
            .await
            .map_err(failed("rename column"))?;
        self.commit_board(&ticket, &board);
        Ok(board)
    }

    /// Moves a column to `new_index`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoBoard`] or the request error.
    pub async fn move_column(&self, column_id: &ColumnId, new_index: usize) -> Result<Board, GatewayError> {
        let ticket = self.ticket()?;
        let board = self
            .api
            .move_column(&ticket.board_id, column_id, new_index)
            .await
            .map_err(failed("move column"))?;
        self.commit_board(&ticket, &board);
        Ok(board)
    }

    /// Deletes a column and its tasks.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoBoard`] or the request error.
    pub async fn delete_column(&self, column_id: &ColumnId) -> Result<Board, GatewayError> {
        let ticket = self.ticket()?;
        let board = self
            .api
            .delete_column(&ticket.board_id, column_id)
            .await
            .map_err(failed("delete column"))?;
        self.commit_board(&ticket, &board);
        Ok(board)
    }

    /// Adds a task at the end of a column.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoBoard`], [`GatewayError::Invalid`] or the request
    /// error.
    pub async fn add_task(&self, column_id: &ColumnId, task: NewTask) -> Result<Board, GatewayError> {
        let task = NewTask {
            title: validate_title(&task.title)?,
            ..task
        };
        let ticket = self.ticket()?;
        let board = self
            .api
            .add_task(&ticket.board_id, column_id, &task)
            .await
            .map_err(failed("add task"))?;
        self.commit_board(&ticket, &board);
        Ok(board)
    }

    /// Saves an edited task.
    ///
    /// # Errors
    ///
    /// [`GatewayError::EditRejected`] carrying `draft` back when the server
    /// or network rejects the edit, [`GatewayError::EditNotSent`] carrying it
    /// back when the edit could not be sent at all.
    pub async fn update_task(&self, draft: Task) -> Result<Board, GatewayError> {
        let ticket = match validate_title(&draft.title).and_then(|_| self.ticket()) {
            Ok(ticket) => ticket,
            Err(cause) => {
                return Err(GatewayError::EditNotSent {
                    draft: Box::new(draft),
                    cause: Box::new(cause),
                });
            }
        };
        match self.api.update_task(&ticket.board_id, &draft).await {
            Ok(board) => {
                self.commit_board(&ticket, &board);
                Ok(board)
            }
            Err(source) => {
                tracing::warn!(task_id = %draft.id, error = %source, "task update rejected");
                Err(GatewayError::EditRejected {
                    draft: Box::new(draft),
                    source,
                })
            }
        }
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoBoard`] or the request error.
    pub async fn delete_task(&self, column_id: &ColumnId, task_id: &TaskId) -> Result<Board, GatewayError> {
        let ticket = self.ticket()?;
        let board = self
            .api
            .delete_task(&ticket.board_id, column_id, task_id)
            .await
            .map_err(failed("delete task"))?;
        self.commit_board(&ticket, &board);
        Ok(board)
    }

    /// Moves a task to another column. The server decides where it lands.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoBoard`] or the request error.
    pub async fn move_task(
        &self,
        task_id: &TaskId,
        source: &ColumnId,
        destination: &ColumnId,
    ) -> Result<Board, GatewayError> {
        let ticket = self.ticket()?;
        let board = self
            .api
            .move_task(&ticket.board_id, task_id, source, destination)
            .await
            .map_err(failed("move task"))?;
        self.commit_board(&ticket, &board);
        Ok(board)
    }

    /// Replaces a column's task order. Only that column is committed.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NoBoard`] or the request error.
    pub async fn reorder_tasks(&self, column_id: &ColumnId, new_order: &[Task]) -> Result<Column, GatewayError> {
        let ticket = self.ticket()?;
        let column = self
            .api
            .reorder_tasks(&ticket.board_id, column_id, new_order)
            .await
            .map_err(failed("reorder tasks"))?;
        self.store.lock().commit_column(&ticket, column.clone());
        Ok(column)
    }

    /// Posts a comment.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Invalid`] for an empty comment, otherwise
    /// [`GatewayError::NoBoard`] or the request error.
    pub async fn add_comment(
        &self,
        column_id: &ColumnId,
        task_id: &TaskId,
        text: &str,
    ) -> Result<Task, GatewayError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GatewayError::Invalid("comment must not be empty".to_string()));
        }
        let ticket = self.ticket()?;
        let task = self
            .api
            .add_comment(&ticket.board_id, column_id, task_id, text)
            .await
            .map_err(failed("add comment"))?;
        self.store.lock().commit_task(&ticket, task.clone());
        Ok(task)
    }

    /// Likes a task, or removes the like if already set.
    ///
    /// # Errors
    ///
    /// See [`toggle_reaction`](Self::toggle_reaction).
    pub async fn toggle_like(&self, task_id: &TaskId) -> Result<Task, GatewayError> {
        self.toggle_reaction(task_id, Reaction::Like).await
    }

    /// Dislikes a task, or removes the dislike if already set.
    ///
    /// # Errors
    ///
    /// See [`toggle_reaction`](Self::toggle_reaction).
    pub async fn toggle_dislike(&self, task_id: &TaskId) -> Result<Task, GatewayError> {
        self.toggle_reaction(task_id, Reaction::Dislike).await
    }

    /// Toggles `reaction` for the session user.
    ///
    /// If the user holds the opposite reaction it is removed first, then
    /// `reaction` is added. The two requests are independent: each response
    /// is committed as it arrives and a failed second request does not undo
    /// the first.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NoUser`] / [`GatewayError::NoBoard`] /
    ///   [`GatewayError::TaskNotFound`] before anything is sent
    /// - [`GatewayError::Request`] if the first request fails
    /// - [`GatewayError::ReactionIncomplete`] if only the first went through
    pub async fn toggle_reaction(&self, task_id: &TaskId, reaction: Reaction) -> Result<Task, GatewayError> {
        let user_id = self.session.user_id().ok_or(GatewayError::NoUser)?;
        let (ticket, column_id, current) = self.locate_reaction(task_id, &user_id)?;
        let board_id = ticket.board_id.clone();

        if current == Some(reaction) {
            let task = self
                .api
                .remove_reaction(&board_id, &column_id, task_id, reaction)
                .await
                .map_err(failed("remove reaction"))?;
            self.store.lock().commit_task(&ticket, task.clone());
            return Ok(task);
        }

        if let Some(previous) = current {
            let cleared = self
                .api
                .remove_reaction(&board_id, &column_id, task_id, previous)
                .await
                .map_err(failed("remove reaction"))?;
            self.store.lock().commit_task(&ticket, cleared);

            return match self.api.add_reaction(&board_id, &column_id, task_id, reaction).await {
                Ok(task) => {
                    self.store.lock().commit_task(&ticket, task.clone());
                    Ok(task)
                }
                Err(source) => {
                    tracing::warn!(
                        %task_id,
                        %reaction,
                        error = %source,
                        "reaction toggle left half applied"
                    );
                    Err(GatewayError::ReactionIncomplete {
                        applied: ReactionStep::Remove(previous),
                        failed: ReactionStep::Add(reaction),
                        source,
                    })
                }
            };
        }

        let task = self
            .api
            .add_reaction(&board_id, &column_id, task_id, reaction)
            .await
            .map_err(failed("add reaction"))?;
        self.store.lock().commit_task(&ticket, task.clone());
        Ok(task)
    }

    fn locate_reaction(
        &self,
        task_id: &TaskId,
        user_id: &UserId,
    ) -> Result<(ViewTicket, ColumnId, Option<Reaction>), GatewayError> {
        let store = self.store.lock();
        let ticket = store.ticket().ok_or(GatewayError::NoBoard)?;
        let board = store.current().ok_or(GatewayError::NoBoard)?;
        let (column, task) = board
            .columns
            .iter()
            .find_map(|c| c.tasks.iter().find(|t| &t.id == task_id).map(|t| (c, t)))
            .ok_or_else(|| GatewayError::TaskNotFound(task_id.clone()))?;
        Ok((ticket, column.id.clone(), task.reaction_of(user_id)))
    }

    /// Sends the request a drag-and-drop resolved to.
    ///
    /// # Errors
    ///
    /// The error of the underlying move or reorder.
    pub async fn apply_drop(&self, action: DropAction) -> Result<(), GatewayError> {
        match action {
            DropAction::MoveColumn {
                column_id,
                new_index,
            } => self.move_column(&column_id, new_index).await.map(drop),
            DropAction::MoveTask {
                task_id,
                source_column_id,
                destination_column_id,
            } => self
                .move_task(&task_id, &source_column_id, &destination_column_id)
                .await
                .map(drop),
            DropAction::ReorderTasks {
                column_id,
                new_order,
            } => self.reorder_tasks(&column_id, &new_order).await.map(drop),
        }
    }
}
