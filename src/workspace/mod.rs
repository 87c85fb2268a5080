//! Workspace Engine - the sandboxed checkout directory and everything that mutates it
//!
//! This module provides:
//! - The workspace root and its clone/non-clone readers-writer lock
//! - Repository sync (wipe + git clone)
//! - Shell command execution inside the root
//! - Bounded execution/sync history
//! - Scheduled daily refresh
//! - Server configuration

pub mod command;
pub mod config;
pub mod history;
pub mod root;
pub mod schedule;
pub mod sync;

pub use command::{CommandError, CommandOutput, CommandRunner};
pub use config::{ConfigError, LogFormat, ServerConfig};
pub use history::{LogEntry, LogKind, LogRingBuffer, SharedLogs, LOG_CAPACITY};
pub use root::WorkspaceRoot;
pub use schedule::{ScheduleCoordinator, ScheduleError};
pub use sync::{RepositorySync, SyncError};
