//! In-memory board state, replaced wholesale from server responses.
//!
//! The store keeps the list of boards the user can see and which one is
//! current. It is never mutated speculatively: every change arrives as a
//! canonical document from the server and is committed against a
//! [`ViewTicket`] captured before the request was sent. Switching boards or
//! detaching the view bumps the epoch so late responses are discarded rather
//! than applied to a view that no longer exists.

use std::sync::Arc;

use parking_lot::Mutex;

use kanban_proto::board::{Board, BoardId, Column, ColumnId, Task};

/// Store handle shared between the gateway and the front end.
pub type SharedStore = Arc<Mutex<BoardStore>>;

/// Identifies the view a request was issued from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTicket {
    /// Board that was current when the request was issued.
    pub board_id: BoardId,
    epoch: u64,
}

/// Epoch snapshot for requests that replace the board list itself
/// (load, create, delete), taken before the request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTicket {
    epoch: u64,
}

/// The loaded boards and the current selection.
#[derive(Debug, Default)]
pub struct BoardStore {
    boards: Vec<Board>,
    current: Option<BoardId>,
    epoch: u64,
}

impl BoardStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a new store for sharing.
    #[must_use]
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// All boards, in server order.
    #[must_use]
    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    /// The board currently displayed.
    #[must_use]
    pub fn current(&self) -> Option<&Board> {
        let id = self.current.as_ref()?;
        self.boards.iter().find(|b| &b.id == id)
    }

    fn current_mut(&mut self) -> Option<&mut Board> {
        let id = self.current.as_ref()?;
        self.boards.iter_mut().find(|b| &b.id == id)
    }

    /// Ticket for a request issued against the current board.
    #[must_use]
    pub fn ticket(&self) -> Option<ViewTicket> {
        self.current.as_ref().map(|id| ViewTicket {
            board_id: id.clone(),
            epoch: self.epoch,
        })
    }

    /// Whether a response for `ticket` may still be applied.
    #[must_use]
    pub fn is_current(&self, ticket: &ViewTicket) -> bool {
        ticket.epoch == self.epoch && self.current.as_ref() == Some(&ticket.board_id)
    }

    /// Ticket for a request that will replace or extend the board list.
    #[must_use]
    pub const fn list_ticket(&self) -> ListTicket {
        ListTicket { epoch: self.epoch }
    }

    fn is_fresh(&self, ticket: ListTicket, what: &str) -> bool {
        let fresh = ticket.epoch == self.epoch;
        if !fresh {
            tracing::debug!(what, "discarding stale board list response");
        }
        fresh
    }

    fn bump(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Replaces the board list. Keeps the current selection if it still
    /// exists, otherwise selects the first board.
    ///
    /// Returns `false` (and changes nothing) if the view moved on since
    /// `ticket` was taken.
    pub fn set_boards(&mut self, ticket: ListTicket, boards: Vec<Board>) -> bool {
        if !self.is_fresh(ticket, "load boards") {
            return false;
        }
        let keep = self
            .current
            .as_ref()
            .is_some_and(|id| boards.iter().any(|b| &b.id == id));
        if !keep {
            self.current = boards.first().map(|b| b.id.clone());
        }
        self.boards = boards;
        self.bump();
        true
    }

    /// Switches the current board. Returns `false` if `board_id` is unknown.
    pub fn select(&mut self, board_id: &BoardId) -> bool {
        if !self.boards.iter().any(|b| &b.id == board_id) {
            return false;
        }
        self.current = Some(board_id.clone());
        self.bump();
        true
    }

    /// Adds a freshly created board and makes it current.
    ///
    /// Returns `false` if `ticket` is stale.
    pub fn insert_board(&mut self, ticket: ListTicket, board: Board) -> bool {
        if !self.is_fresh(ticket, "create board") {
            return false;
        }
        self.current = Some(board.id.clone());
        self.boards.retain(|b| b.id != board.id);
        self.boards.push(board);
        self.bump();
        true
    }

    /// Removes a deleted board. If it was current, the first remaining board
    /// becomes current. A stale `ticket` leaves the store untouched.
    pub fn remove_board(&mut self, ticket: ListTicket, board_id: &BoardId) -> Option<Board> {
        if !self.is_fresh(ticket, "delete board") {
            return None;
        }
        let index = self.boards.iter().position(|b| &b.id == board_id)?;
        let removed = self.boards.remove(index);
        if self.current.as_ref() == Some(board_id) {
            self.current = self.boards.first().map(|b| b.id.clone());
        }
        self.bump();
        Some(removed)
    }

    /// Tears the view down: nothing is current and every outstanding ticket
    /// becomes stale.
    pub fn detach(&mut self) {
        self.current = None;
        self.bump();
    }

    /// Replaces the current board with the server's canonical copy.
    ///
    /// Returns `false` (and changes nothing) if the ticket is stale.
    pub fn commit_board(&mut self, ticket: &ViewTicket, board: Board) -> bool {
        if !self.is_current(ticket) || board.id != ticket.board_id {
            tracing::debug!(board_id = %ticket.board_id, "discarding stale board response");
            return false;
        }
        match self.current_mut() {
            Some(slot) => {
                *slot = board;
                true
            }
            None => false,
        }
    }

    /// Replaces one column of the current board with the server's copy.
    ///
    /// Returns `false` if the ticket is stale or the column is gone.
    pub fn commit_column(&mut self, ticket: &ViewTicket, column: Column) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(column_id = %column.id, "discarding stale column response");
            return false;
        }
        let Some(board) = self.current_mut() else {
            return false;
        };
        match board.columns.iter_mut().find(|c| c.id == column.id) {
            Some(slot) => {
                *slot = column;
                true
            }
            None => {
                tracing::debug!(column_id = %column.id, "column vanished before reorder response");
                false
            }
        }
    }

    /// Replaces one task of the current board in place with the server's
    /// copy.
    ///
    /// Returns `false` if the ticket is stale or the task is gone.
    pub fn commit_task(&mut self, ticket: &ViewTicket, task: Task) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(task_id = %task.id, "discarding stale task response");
            return false;
        }
        let Some(board) = self.current_mut() else {
            return false;
        };
        let Some(slot) = board
            .columns
            .iter_mut()
            .flat_map(|c| c.tasks.iter_mut())
            .find(|t| t.id == task.id)
        else {
            tracing::debug!(task_id = %task.id, "task vanished before response");
            return false;
        };
        *slot = task;
        true
    }

    /// Tasks of a column on the current board whose title contains `query`,
    /// ignoring case. An empty query matches nothing.
    #[must_use]
    pub fn search_tasks(&self, column_id: &ColumnId, query: &str) -> Vec<&Task> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.current()
            .and_then(|b| b.column(column_id))
            .map(|c| {
                c.tasks
                    .iter()
                    .filter(|t| t.title.to_lowercase().contains(&query))
                    .collect()
            })
            .unwrap_or_default()
    }
}
