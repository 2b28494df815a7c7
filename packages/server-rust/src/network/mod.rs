//! HTTP front end: configuration, middleware, handlers and the serving module.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;

pub use config::HttpConfig;
pub use handlers::AppState;
pub use module::NetworkModule;
