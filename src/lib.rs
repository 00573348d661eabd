// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod client;
pub mod config;
pub mod error;
pub mod resources;
pub mod runtime;
pub mod testkit;

pub use client::{
    CallType, ClientConfig, ClientConfigBuilder, Command, HostAffinity, HostConfig,
    RequestOptions, SearchClient, Transport,
};
pub use error::{Result, SearchError};
pub use resources::{TaskCreated, TaskRef, TaskState, TaskStatus};
pub use runtime::{OperationHandle, OperationState};
