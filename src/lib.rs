//! linkguard — chat safety bot core.
//!
//! Intercepts links and files shared in conversations, queues them for
//! threat analysis, and reports verdicts back to the originating chat.

pub mod bot;
pub mod config;
pub mod danger;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod queue;
pub mod scanner;
pub mod store;
pub mod worker;
