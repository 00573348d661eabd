// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strongly typed wrappers for the resources the dispatch core consumes.

mod task;

pub(crate) use task::TaskStatusBody;
pub use task::{TaskCreated, TaskRef, TaskState, TaskStatus};
