//! Local multi-session chat backed by a generative-language API.
//!
//! - `sessions` - pure session mutation engine
//! - `storage` - key-value backends and the session store
//! - `ai` - completion client with cancellation
//! - `chat` - controller that runs user turns and persists every change

pub mod ai;
pub mod chat;
pub mod config;
pub mod format;
pub mod sessions;
pub mod storage;
pub mod types;
