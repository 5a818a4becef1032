//! Core types and trait definitions for the Portaria gatehouse.
//!
//! Everything that decides who is inside lives here: the event model, the
//! status deriver, the current-list projection, the re-entry state machine
//! and the [`gate::Gate`] service that applies them against any
//! [`store::AccessStore`]. This crate is free of HTTP and SQL dependencies.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod anomaly;
pub mod error;
pub mod event;
pub mod gate;
pub mod memory;
pub mod projection;
pub mod role;
pub mod selection;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod subject;
pub mod workflow;

pub use error::{Error, Result};
