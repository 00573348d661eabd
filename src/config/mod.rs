// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration management for search clients
//!
//! This module parses the search profile file, which holds credentials and
//! optional host lists for several applications.
//!
//! # Environment Variables
//!
//! The following environment variables are supported:
//!
//! - `SEARCHCONFIG` - Path to the profile file (default: `~/.search/config`)
//! - `SEARCH_CONTEXT` - Override the active context
//! - `SEARCH_APPLICATION_ID` - Override the application id
//! - `SEARCH_API_KEY` - Override the API key
//! - `SEARCH_HOSTS` - Override hosts (comma-separated, accepting any call type)
//!
//! # Example
//!
//! ```no_run
//! use search_api_rs::config::SearchConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SearchConfig::load_with_env()?;
//!
//! if let Some(ctx) = config.active_context() {
//!     let client_config = ctx.to_client_config()?;
//!     println!("Using {} hosts", client_config.hosts.len());
//! }
//! # Ok(())
//! # }
//! ```

mod searchconfig;

pub use searchconfig::{
    SearchConfig, SearchContext, ENV_SEARCHCONFIG, ENV_SEARCH_API_KEY,
    ENV_SEARCH_APPLICATION_ID, ENV_SEARCH_CONTEXT, ENV_SEARCH_HOSTS,
};
