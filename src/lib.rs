pub mod server;
pub mod util;
pub mod workspace;
