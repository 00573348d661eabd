// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed wrappers for server-side indexing tasks.
//!
//! Write operations are applied asynchronously by the service. Their response
//! carries a task id which can be polled until the change is published.

use crate::client::{CallType, Command};
use http::Method;
use serde::{Deserialize, Serialize};

/// Reference to a server-side task.
///
/// # Example
///
/// ```
/// use search_api_rs::resources::TaskRef;
///
/// let task = TaskRef::new("products", 42);
/// assert_eq!(task.status_command().path, "/1/indexes/products/task/42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskRef {
    /// Index the task belongs to.
    pub index: String,
    /// Task identifier returned by the write.
    pub task_id: u64,
}

impl TaskRef {
    #[must_use]
    pub fn new(index: impl Into<String>, task_id: u64) -> Self {
        Self {
            index: index.into(),
            task_id,
        }
    }

    /// The read command returning this task's status.
    ///
    /// The index name is percent-encoded as a single path segment.
    #[must_use]
    pub fn status_command(&self) -> Command {
        Command::new(
            Method::GET,
            format!(
                "/1/indexes/{}/task/{}",
                urlencoding::encode(&self.index),
                self.task_id
            ),
            CallType::Read,
        )
    }
}

/// Publication state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Accepted but not yet visible to searches.
    #[serde(rename = "notPublished", alias = "pending")]
    Pending,
    /// Applied and visible.
    #[serde(rename = "published")]
    Published,
}

/// Wire shape of a task status response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaskStatusBody {
    pub status: TaskState,
}

/// A snapshot of a task's state, as returned by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStatus {
    pub task_id: u64,
    pub state: TaskState,
}

impl TaskStatus {
    pub(crate) fn from_body(task_id: u64, body: TaskStatusBody) -> Self {
        Self {
            task_id,
            state: body.status,
        }
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.state == TaskState::Published
    }
}

/// Response of a write that created a task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskCreated {
    #[serde(rename = "taskID")]
    pub task_id: u64,
    #[serde(rename = "updatedAt", alias = "createdAt", default)]
    pub updated_at: Option<String>,
}

impl TaskCreated {
    /// Reference the created task on `index`.
    #[must_use]
    pub fn task_ref(&self, index: impl Into<String>) -> TaskRef {
        TaskRef::new(index, self.task_id)
    }
}
