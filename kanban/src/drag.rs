//! Drag-and-drop resolution for columns and tasks.
//!
//! A gesture starts with a typed [`DragIntent`] (what is being dragged),
//! tracks the task slot currently hovered, and on drop resolves to at most
//! one [`DropAction`] for the gateway. Everything here is pure: no request is
//! sent and the board is never mutated.
//!
//! Resolution rules:
//! - Column dropped on a column: move the dragged column to the destination
//!   column's *current* index. Dropping a column on itself is a no-op.
//! - Task dropped on another column: cross-column move, the server decides
//!   the final position.
//! - Task dropped on its own column: splice it out and reinsert at the
//!   hovered index. Dropping it back on its own slot is a no-op.
//!
//! Unknown payloads, missing ids and failed lookups all resolve to `None`.

use kanban_proto::board::{Board, ColumnId, EntityKind, Task, TaskId};

/// What the user picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragIntent {
    /// A whole column.
    Column {
        /// Column being dragged.
        column_id: ColumnId,
    },
    /// A single task card.
    Task {
        /// Task being dragged.
        task_id: TaskId,
        /// Column the task was picked up from.
        source_column_id: ColumnId,
    },
}

impl DragIntent {
    /// Builds an intent from a string-keyed drag payload, as produced by
    /// foreign or legacy drag sources.
    ///
    /// Returns `None` for an unknown kind or any missing/empty field.
    #[must_use]
    pub fn from_payload(
        kind: Option<&str>,
        entity_id: Option<&str>,
        source_column_id: Option<&str>,
    ) -> Option<Self> {
        let kind: EntityKind = kind?.parse().ok()?;
        let entity_id = entity_id.filter(|id| !id.is_empty())?;
        match kind {
            EntityKind::Column => Some(Self::Column {
                column_id: ColumnId::from(entity_id),
            }),
            EntityKind::Task => {
                let source = source_column_id.filter(|id| !id.is_empty())?;
                Some(Self::Task {
                    task_id: TaskId::from(entity_id),
                    source_column_id: ColumnId::from(source),
                })
            }
        }
    }

    /// Kind of entity being dragged.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Column { .. } => EntityKind::Column,
            Self::Task { .. } => EntityKind::Task,
        }
    }
}

/// The request a drop resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropAction {
    /// Move a column to `new_index` in the board's column order.
    MoveColumn {
        /// Column to move.
        column_id: ColumnId,
        /// Destination index.
        new_index: usize,
    },
    /// Move a task to another column.
    MoveTask {
        /// Task to move.
        task_id: TaskId,
        /// Column currently holding the task.
        source_column_id: ColumnId,
        /// Column receiving the task.
        destination_column_id: ColumnId,
    },
    /// Replace a column's task order.
    ReorderTasks {
        /// Column being reordered.
        column_id: ColumnId,
        /// Full task sequence in the requested order.
        new_order: Vec<Task>,
    },
}

/// State of one drag gesture, from pick-up to drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DragGesture {
    intent: Option<DragIntent>,
    hovered_task_index: Option<usize>,
}

impl DragGesture {
    /// Starts dragging a column.
    #[must_use]
    pub const fn begin_column(column_id: ColumnId) -> Self {
        Self::from_intent(Some(DragIntent::Column { column_id }))
    }

    /// Starts dragging a task out of `source_column_id`.
    #[must_use]
    pub const fn begin_task(task_id: TaskId, source_column_id: ColumnId) -> Self {
        Self::from_intent(Some(DragIntent::Task {
            task_id,
            source_column_id,
        }))
    }

    /// Wraps an intent that may be absent (a drag with no usable payload).
    #[must_use]
    pub const fn from_intent(intent: Option<DragIntent>) -> Self {
        Self {
            intent,
            hovered_task_index: None,
        }
    }

    /// Records the task slot under the pointer.
    pub const fn hover_task(&mut self, index: usize) {
        self.hovered_task_index = Some(index);
    }

    /// What is being dragged, if anything recognisable.
    #[must_use]
    pub const fn intent(&self) -> Option<&DragIntent> {
        self.intent.as_ref()
    }

    /// Slot the pointer last passed over.
    #[must_use]
    pub const fn hovered_task_index(&self) -> Option<usize> {
        self.hovered_task_index
    }

    /// Resolves a drop on `destination` to the request to send, if any.
    #[must_use]
    pub fn drop_on(&self, board: &Board, destination: &ColumnId) -> Option<DropAction> {
        let Some(intent) = &self.intent else {
            tracing::debug!(column_id = %destination, "ignoring drop without drag payload");
            return None;
        };
        match intent {
            DragIntent::Column { column_id } => drop_column(board, column_id, destination),
            DragIntent::Task {
                task_id,
                source_column_id,
            } if source_column_id != destination => {
                let column = board.column(source_column_id)?;
                column.task_index(task_id)?;
                board.column(destination)?;
                Some(DropAction::MoveTask {
                    task_id: task_id.clone(),
                    source_column_id: source_column_id.clone(),
                    destination_column_id: destination.clone(),
                })
            }
            DragIntent::Task { task_id, .. } => {
                let column = board.column(destination)?;
                let from = column.task_index(task_id)?;
                let last = column.tasks.len().checked_sub(1)?;
                let to = self.hovered_task_index?.min(last);
                if from == to {
                    return None;
                }
                Some(DropAction::ReorderTasks {
                    column_id: destination.clone(),
                    new_order: reorder(&column.tasks, from, to),
                })
            }
        }
    }
}

fn drop_column(board: &Board, dragged: &ColumnId, destination: &ColumnId) -> Option<DropAction> {
    if dragged == destination {
        return None;
    }
    board.column_index(dragged)?;
    let new_index = board.column_index(destination)?;
    Some(DropAction::MoveColumn {
        column_id: dragged.clone(),
        new_index,
    })
}

/// Moves the item at `from` so that it ends up at index `to`, shifting the
/// items in between. Out-of-range `from` returns the input unchanged; `to` is
/// clamped to the last slot.
#[must_use]
pub fn reorder<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out = items.to_vec();
    if from >= out.len() {
        return out;
    }
    let moved = out.remove(from);
    let to = to.min(out.len());
    out.insert(to, moved);
    out
}
