pub mod api;
pub mod comm;
pub mod error;
pub mod feed;
pub mod middleware;
pub mod store;
pub mod vote;
#[path = "bootstrap/app_bootstrap.rs"]
pub mod app_bootstrap;
#[path = "bootstrap/command_registry.rs"]
pub mod command_registry;

// Re-export bootstrap modules
pub use app_bootstrap::*;
pub use command_registry::*;
