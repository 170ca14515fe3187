//! PANDA Runtime
//!
//! Ties sources and the fusion registry together:
//! - Timer-driven scan loop with per-source budgets and graceful shutdown
//! - JSONL event log sink
//! - TOML configuration with defaults for every field

pub mod config;
pub mod eventlog;
pub mod scanner;

pub use config::*;
pub use eventlog::*;
pub use scanner::*;
