pub mod aggregate;
pub mod app;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod state;
pub mod storage;
pub mod timeline;

pub use app::router;
pub use state::AppState;
pub use storage::search_dirs;
