//! Common test infrastructure
//!
//! This module provides everything the end-to-end tests need to drive a
//! `WorkerLifecycle` against in-memory collaborators. Tests should only
//! import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestWorker;
//!
//! #[tokio::test]
//! async fn test_reaches_ready() {
//!     let test = TestWorker::spawn_ready().await;
//!     assert_eq!(test.web.starts(), 1);
//!     test.worker.stop().await;
//! }
//! ```

#![allow(dead_code, unused_imports)]

mod client;
mod constants;
mod fakes;
mod worker;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
pub use fakes::{FakeFetcher, FakeGateway, StarterStats};
pub use worker::{wait_until, TestWorker, TestWorkerBuilder};
