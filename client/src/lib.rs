//! LinkUp forum client: session management for real-time forum chat.
//!
//! The crate centers on [`session::ForumSession`], which owns one forum
//! connection end to end — transport lifecycle and reconnects, message
//! ingest and dedup, typing signals, and the optimistic send pipeline.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;
