//! In-process server model implementing [`BoardApi`] and [`UserApi`].
//!
//! Behaves like the real backend for the operations the client relies on:
//! every mutation returns the canonical document, cross-column moves append
//! to the destination, and reactions are stored exactly as requested (the
//! server does not clear an opposite reaction by itself). Every call is
//! recorded so tests can assert on the exact request sequence, and failures
//! can be injected per call.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use kanban_proto::api::{AuthResponse, Login, NewTask, Register, UpdateProfile, User};
use kanban_proto::board::{
    Board, BoardId, Column, ColumnId, Comment, CommentId, DEFAULT_TASK_COLOR, Reaction, Task,
    TaskId, UserId,
};

use super::{ApiError, BoardApi, UserApi};

/// One request received by the in-memory server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `GET /boards`
    ListBoards,
    /// `POST /boards`
    CreateBoard,
    /// `POST /boards/{id}/share`
    ShareBoard,
    /// `DELETE /boards/{id}`
    DeleteBoard,
    /// `POST /boards/{id}/columns`
    AddColumn,
    /// `PUT /boards/{id}/columns/{id}`
    RenameColumn,
    /// `PUT /boards/{id}/columns/{id}/move`
    MoveColumn {
        /// Requested position.
        new_index: usize,
    },
    /// `DELETE /boards/{id}/columns/{id}`
    DeleteColumn,
    /// `POST .../tasks`
    AddTask,
    /// `PUT .../tasks/{id}`
    UpdateTask,
    /// `PUT /boards/{id}/tasks/{id}/move`
    MoveTask,
    /// `PUT .../reorder`
    ReorderTasks {
        /// Requested task order.
        order: Vec<TaskId>,
    },
    /// `DELETE .../tasks/{id}`
    DeleteTask,
    /// `POST .../comment`
    AddComment,
    /// `POST .../like` or `.../dislike`
    AddReaction(Reaction),
    /// `DELETE .../like` or `.../dislike`
    RemoveReaction(Reaction),
    /// `POST /users/register`
    Register,
    /// `POST /users/login`
    Login,
    /// `GET /users/profile`
    Profile,
    /// `PUT /users/profile`
    UpdateProfile,
}

/// Predicate selecting which call an injected failure applies to.
pub type CallMatcher = fn(&ApiCall) -> bool;

struct InjectedFailure {
    matcher: CallMatcher,
    status: u16,
}

#[derive(Default)]
struct MemoryState {
    boards: Vec<Board>,
    next_id: u64,
    calls: Vec<ApiCall>,
    failures: Vec<InjectedFailure>,
    profile_fetches: usize,
    /// Profile saved by `update_profile`, shadowing the initial one.
    profile: Option<User>,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Records the call and fires a matching injected failure, if any.
    fn record(&mut self, call: ApiCall) -> Result<(), ApiError> {
        let failure = self.failures.iter().position(|f| (f.matcher)(&call));
        self.calls.push(call);
        if let Some(index) = failure {
            let failure = self.failures.remove(index);
            return Err(ApiError::Rejected {
                status: failure.status,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn board_mut(&mut self, board: &BoardId) -> Result<&mut Board, ApiError> {
        self.boards
            .iter_mut()
            .find(|b| &b.id == board)
            .ok_or_else(|| not_found(format!("board {board}")))
    }

    fn column_mut(&mut self, board: &BoardId, column: &ColumnId) -> Result<&mut Column, ApiError> {
        self.board_mut(board)?
            .columns
            .iter_mut()
            .find(|c| &c.id == column)
            .ok_or_else(|| not_found(format!("column {column}")))
    }

    fn task_mut(
        &mut self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
    ) -> Result<&mut Task, ApiError> {
        self.column_mut(board, column)?
            .tasks
            .iter_mut()
            .find(|t| &t.id == task)
            .ok_or_else(|| not_found(format!("task {task}")))
    }

    fn board(&self, board: &BoardId) -> Result<Board, ApiError> {
        self.boards
            .iter()
            .find(|b| &b.id == board)
            .cloned()
            .ok_or_else(|| not_found(format!("board {board}")))
    }
}

fn not_found(what: String) -> ApiError {
    ApiError::Rejected {
        status: 404,
        message: format!("{what} not found"),
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::Rejected {
        status: 400,
        message: message.into(),
    }
}

/// Server model shared by tests and offline runs.
pub struct InMemoryBoardApi {
    user: User,
    latency: Mutex<Option<Duration>>,
    state: Mutex<MemoryState>,
}

impl InMemoryBoardApi {
    /// Creates an empty server acting for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let username = user_id.as_str().to_string();
        Self {
            user: User {
                email: format!("{username}@example.com"),
                id: user_id,
                username,
            },
            latency: Mutex::new(None),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Seeds the server with existing boards.
    #[must_use]
    pub fn with_boards(self, boards: Vec<Board>) -> Self {
        self.state.lock().boards = boards;
        self
    }

    /// Delays every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Makes the next call matching `matcher` fail with `status`.
    pub fn fail_next(&self, matcher: CallMatcher, status: u16) {
        self.state
            .lock()
            .failures
            .push(InjectedFailure { matcher, status });
    }

    /// Every call received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().calls.clone()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Current server-side copy of a board.
    #[must_use]
    pub fn board(&self, board: &BoardId) -> Option<Board> {
        self.state.lock().board(board).ok()
    }

    /// Number of profile fetches served.
    #[must_use]
    pub fn profile_fetches(&self) -> usize {
        self.state.lock().profile_fetches
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn auth_response(&self) -> AuthResponse {
        AuthResponse {
            token: format!("token-{}", self.user.id),
            user_id: self.user.id.clone(),
        }
    }
}

impl BoardApi for InMemoryBoardApi {
    async fn list_boards(&self) -> Result<Vec<Board>, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::ListBoards)?;
        Ok(state
            .boards
            .iter()
            .filter(|b| b.is_member(&self.user.id))
            .cloned()
            .collect())
    }

    async fn create_board(&self, title: &str) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::CreateBoard)?;
        let board = Board {
            id: BoardId::new(state.next_id("board")),
            owner: self.user.id.clone(),
            collaborator_ids: BTreeSet::new(),
            title: title.to_string(),
            columns: Vec::new(),
        };
        state.boards.push(board.clone());
        Ok(board)
    }

    async fn share_board(&self, board: &BoardId, email: &str) -> Result<(), ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::ShareBoard)?;
        let board = state.board_mut(board)?;
        let invited = email.split('@').next().unwrap_or(email);
        board.collaborator_ids.insert(UserId::from(invited));
        Ok(())
    }

    async fn delete_board(&self, board: &BoardId) -> Result<(), ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::DeleteBoard)?;
        let index = state
            .boards
            .iter()
            .position(|b| &b.id == board)
            .ok_or_else(|| not_found(format!("board {board}")))?;
        if state.boards[index].owner != self.user.id {
            return Err(ApiError::Rejected {
                status: 403,
                message: "only the owner can delete a board".to_string(),
            });
        }
        state.boards.remove(index);
        Ok(())
    }

    async fn add_column(&self, board: &BoardId, title: &str) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::AddColumn)?;
        let id = ColumnId::new(state.next_id("column"));
        state.board_mut(board)?.columns.push(Column {
            id,
            title: title.to_string(),
            tasks: Vec::new(),
        });
        state.board(board)
    }

    async fn rename_column(
        &self,
        board: &BoardId,
        column: &ColumnId,
        title: &str,
    ) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::RenameColumn)?;
        state.column_mut(board, column)?.title = title.to_string();
        state.board(board)
    }

    async fn move_column(
        &self,
        board: &BoardId,
        column: &ColumnId,
        new_index: usize,
    ) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::MoveColumn { new_index })?;
        let columns = &mut state.board_mut(board)?.columns;
        let from = columns
            .iter()
            .position(|c| &c.id == column)
            .ok_or_else(|| not_found(format!("column {column}")))?;
        let moved = columns.remove(from);
        let to = new_index.min(columns.len());
        columns.insert(to, moved);
        state.board(board)
    }

    async fn delete_column(&self, board: &BoardId, column: &ColumnId) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::DeleteColumn)?;
        let columns = &mut state.board_mut(board)?.columns;
        let before = columns.len();
        columns.retain(|c| &c.id != column);
        if columns.len() == before {
            return Err(not_found(format!("column {column}")));
        }
        state.board(board)
    }

    async fn add_task(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &NewTask,
    ) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::AddTask)?;
        let now = Utc::now();
        let new_task = Task {
            id: TaskId::new(state.next_id("task")),
            column_id: column.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            tags: task.tags.clone(),
            color: DEFAULT_TASK_COLOR.to_string(),
            comments: Vec::new(),
            liker_ids: BTreeSet::new(),
            disliker_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        state.column_mut(board, column)?.tasks.push(new_task);
        state.board(board)
    }

    async fn update_task(&self, board: &BoardId, task: &Task) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::UpdateTask)?;
        let stored = state.task_mut(board, &task.column_id, &task.id)?;
        stored.title.clone_from(&task.title);
        stored.description.clone_from(&task.description);
        stored.priority = task.priority;
        stored.tags.clone_from(&task.tags);
        stored.color.clone_from(&task.color);
        stored.updated_at = Utc::now();
        state.board(board)
    }

    async fn move_task(
        &self,
        board: &BoardId,
        task: &TaskId,
        source: &ColumnId,
        destination: &ColumnId,
    ) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::MoveTask)?;
        state.column_mut(board, destination)?;
        let source_column = state.column_mut(board, source)?;
        let index = source_column
            .task_index(task)
            .ok_or_else(|| not_found(format!("task {task}")))?;
        let mut moved = source_column.tasks.remove(index);
        moved.column_id = destination.clone();
        moved.updated_at = Utc::now();
        state.column_mut(board, destination)?.tasks.push(moved);
        state.board(board)
    }

    async fn reorder_tasks(
        &self,
        board: &BoardId,
        column: &ColumnId,
        new_order: &[Task],
    ) -> Result<Column, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        let order: Vec<TaskId> = new_order.iter().map(|t| t.id.clone()).collect();
        state.record(ApiCall::ReorderTasks {
            order: order.clone(),
        })?;
        let stored = state.column_mut(board, column)?;
        let current: BTreeSet<&TaskId> = stored.tasks.iter().map(|t| &t.id).collect();
        let requested: BTreeSet<&TaskId> = order.iter().collect();
        if current != requested || order.len() != stored.tasks.len() {
            return Err(bad_request("new order is not a permutation of the column"));
        }
        let mut remaining = std::mem::take(&mut stored.tasks);
        for id in &order {
            if let Some(index) = remaining.iter().position(|t| &t.id == id) {
                stored.tasks.push(remaining.remove(index));
            }
        }
        Ok(stored.clone())
    }

    async fn delete_task(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
    ) -> Result<Board, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::DeleteTask)?;
        let tasks = &mut state.column_mut(board, column)?.tasks;
        let before = tasks.len();
        tasks.retain(|t| &t.id != task);
        if tasks.len() == before {
            return Err(not_found(format!("task {task}")));
        }
        state.board(board)
    }

    async fn add_comment(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        text: &str,
    ) -> Result<Task, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::AddComment)?;
        let id = CommentId::new(state.next_id("comment"));
        let stored = state.task_mut(board, column, task)?;
        stored.comments.push(Comment {
            id,
            commenter_id: self.user.id.clone(),
            commenter_username: self.user.username.clone(),
            text: text.to_string(),
            like_count: 0,
            dislike_count: 0,
            created_at: Utc::now(),
        });
        Ok(stored.clone())
    }

    async fn add_reaction(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        reaction: Reaction,
    ) -> Result<Task, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::AddReaction(reaction))?;
        let stored = state.task_mut(board, column, task)?;
        let set = match reaction {
            Reaction::Like => &mut stored.liker_ids,
            Reaction::Dislike => &mut stored.disliker_ids,
        };
        set.insert(self.user.id.clone());
        Ok(stored.clone())
    }

    async fn remove_reaction(
        &self,
        board: &BoardId,
        column: &ColumnId,
        task: &TaskId,
        reaction: Reaction,
    ) -> Result<Task, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::RemoveReaction(reaction))?;
        let stored = state.task_mut(board, column, task)?;
        let set = match reaction {
            Reaction::Like => &mut stored.liker_ids,
            Reaction::Dislike => &mut stored.disliker_ids,
        };
        set.remove(&self.user.id);
        Ok(stored.clone())
    }
}

impl UserApi for InMemoryBoardApi {
    async fn register(&self, _request: &Register) -> Result<AuthResponse, ApiError> {
        self.delay().await;
        self.state.lock().record(ApiCall::Register)?;
        Ok(self.auth_response())
    }

    async fn login(&self, _request: &Login) -> Result<AuthResponse, ApiError> {
        self.delay().await;
        self.state.lock().record(ApiCall::Login)?;
        Ok(self.auth_response())
    }

    async fn profile(&self) -> Result<User, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::Profile)?;
        state.profile_fetches += 1;
        Ok(state.profile.clone().unwrap_or_else(|| self.user.clone()))
    }

    async fn update_profile(&self, request: &UpdateProfile) -> Result<User, ApiError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.record(ApiCall::UpdateProfile)?;
        let user = User {
            id: self.user.id.clone(),
            username: request.username.clone(),
            email: request.email.clone(),
        };
        state.profile = Some(user.clone());
        Ok(user)
    }
}
