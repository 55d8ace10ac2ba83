//! Integration test suite for appup
//!
//! These tests drive the library and the `appup` binary against local mock
//! HTTP servers. Nothing is installed: package manager invocations go through
//! a recording runner, and binary tests stop before the install stage.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! cargo test --test integration resume
//! ```
//!
//! # Test Organization
//!
//! - `common` - artifact server and fixture helpers
//! - `fetch` - ranged fetching, retry bounds and metadata resolution
//! - `update_flow` - end-to-end pipeline runs (fresh, resumed, cached, repaired)
//! - `lock` - single-instance guard across processes
//! - `cli` - the `appup` binary: exit codes, cleanup and signals

mod common;
mod fetch;
mod lock;
mod update_flow;
