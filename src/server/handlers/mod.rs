// handlers module - HTTP route handlers
// Contains handlers for file, repository, command and history routes

pub mod file;
pub mod log;
pub mod repo;
pub mod terminal;

pub use file::save_file;
