pub mod app;
pub mod context;
pub mod file_api;
pub mod handlers;
pub mod hub;
pub mod protocol;
pub mod ws;

pub use app::{build_router, run_server};
pub use context::{AppContext, AppError};
pub use file_api::{
    create_dir, delete_path, list_files, read_file, resolve_safe_path, write_file, FileApiError,
    FileNode,
};
pub use hub::{BroadcastHub, ClientId, Subscription};
pub use protocol::{ClientMessage, ServerEvent, CLIENT_ID_HEADER, PROTOCOL_VERSION};
