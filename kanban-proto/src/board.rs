//! Board data model as returned by the server.
//!
//! A [`Board`] exclusively owns its ordered [`Column`]s and each column owns
//! its ordered [`Task`]s. `Task::column_id` is a back-reference used when a
//! task is moved between columns, never an ownership pointer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Colour palette offered by the task editor.
pub const TASK_COLORS: [&str; 5] = ["#FFFFFF", "#F0EE96", "#9DF096", "#96B7F0", "#F0BA96"];

/// Colour assigned to tasks that never had one set.
pub const DEFAULT_TASK_COLOR: &str = "#FFFFFF";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a server-assigned identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a board.
    BoardId
);
string_id!(
    /// Identifier of a column within a board.
    ColumnId
);
string_id!(
    /// Identifier of a task.
    TaskId
);
string_id!(
    /// Identifier of a comment on a task.
    CommentId
);
string_id!(
    /// Identifier of a user account.
    UserId
);

/// Kind of board entity that can be dragged or locked for editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A task card.
    Task,
    /// A whole column.
    Column,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Column => write!(f, "column"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(Self::Task),
            "column" => Ok(Self::Column),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal priority.
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// A user's reaction to a task. Likes and dislikes are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reaction {
    /// Thumbs up.
    Like,
    /// Thumbs down.
    Dislike,
}

impl Reaction {
    /// The reaction that must be cleared before this one is set.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Like => Self::Dislike,
            Self::Dislike => Self::Like,
        }
    }
}

impl std::fmt::Display for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Like => write!(f, "like"),
            Self::Dislike => write!(f, "dislike"),
        }
    }
}

/// A comment on a task. Comments are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Server-assigned identifier.
    #[serde(rename = "_id")]
    pub id: CommentId,
    /// Author of the comment.
    pub commenter_id: UserId,
    /// Author's display name at the time of posting.
    pub commenter_username: String,
    /// Comment body.
    pub text: String,
    /// Number of likes on the comment.
    #[serde(rename = "likes", default)]
    pub like_count: u32,
    /// Number of dislikes on the comment.
    #[serde(rename = "dislikes", default)]
    pub dislike_count: u32,
    /// When the comment was posted.
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

/// A work item inside a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-assigned identifier.
    #[serde(rename = "_id")]
    pub id: TaskId,
    /// Column currently holding this task.
    pub column_id: ColumnId,
    /// Short title shown on the card.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Task priority.
    #[serde(default)]
    pub priority: Priority,
    /// Labels attached to the task.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Card background colour.
    #[serde(default = "default_color")]
    pub color: String,
    /// Comments in posting order.
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Users who liked the task.
    #[serde(rename = "likes", default)]
    pub liker_ids: BTreeSet<UserId>,
    /// Users who disliked the task.
    #[serde(rename = "dislikes", default)]
    pub disliker_ids: BTreeSet<UserId>,
    /// Creation time.
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

fn default_color() -> String {
    DEFAULT_TASK_COLOR.to_string()
}

impl Task {
    /// Returns the reaction `user` currently holds on this task, if any.
    ///
    /// A like takes precedence should a malformed document list the user in
    /// both sets.
    #[must_use]
    pub fn reaction_of(&self, user: &UserId) -> Option<Reaction> {
        if self.liker_ids.contains(user) {
            Some(Reaction::Like)
        } else if self.disliker_ids.contains(user) {
            Some(Reaction::Dislike)
        } else {
            None
        }
    }

    /// Number of users who liked the task.
    #[must_use]
    pub fn like_count(&self) -> usize {
        self.liker_ids.len()
    }

    /// Number of users who disliked the task.
    #[must_use]
    pub fn dislike_count(&self) -> usize {
        self.disliker_ids.len()
    }
}

/// An ordered list of tasks inside a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Server-assigned identifier.
    #[serde(rename = "_id")]
    pub id: ColumnId,
    /// Column heading.
    pub title: String,
    /// Tasks in display order.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Column {
    /// Position of `task_id` within this column.
    #[must_use]
    pub fn task_index(&self, task_id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == task_id)
    }
}

/// A board shared between its owner and collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Server-assigned identifier.
    #[serde(rename = "_id")]
    pub id: BoardId,
    /// Creator of the board.
    pub owner: UserId,
    /// Users the board has been shared with.
    #[serde(rename = "collaborators", default)]
    pub collaborator_ids: BTreeSet<UserId>,
    /// Board title.
    pub title: String,
    /// Columns in display order.
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Board {
    /// Looks up a column by id.
    #[must_use]
    pub fn column(&self, column_id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == column_id)
    }

    /// Position of a column in the board's column order.
    #[must_use]
    pub fn column_index(&self, column_id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| &c.id == column_id)
    }

    /// Locates a task, returning `(column index, task index)`.
    #[must_use]
    pub fn find_task(&self, task_id: &TaskId) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, column)| {
            column.task_index(task_id).map(|ti| (ci, ti))
        })
    }

    /// Looks up a task anywhere on the board.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        let (ci, ti) = self.find_task(task_id)?;
        self.columns.get(ci)?.tasks.get(ti)
    }

    /// Whether `user` may see this board.
    #[must_use]
    pub fn is_member(&self, user: &UserId) -> bool {
        &self.owner == user || self.collaborator_ids.contains(user)
    }
}
