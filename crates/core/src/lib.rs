//! viewsync core library.
//!
//! Keeps a local working tree in step with a view of a versioned
//! repository: path resolution, file status, checkin/checkout transactions,
//! folder and file restructuring, revision history, configuration and the
//! local state database.

pub mod config;
pub mod db;
pub mod errors;
pub mod history;
pub mod models;
pub mod mutation;
pub mod property;
pub mod resolver;
pub mod session;
pub mod state;
pub mod status;
pub mod transaction;
pub mod tree;
pub mod workspace;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use session::{MemoryRepository, RemoteSession};
pub use state::PendingChanges;
pub use workspace::{Workspace, WorkspaceSettings};
