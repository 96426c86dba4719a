//! Infrastructure layer for configuration, logging, HTTP, persistence,
//! notification transports and the source adapters.

pub mod catalog_repository;
pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod notification;
pub mod parsing;
pub mod renderer;
pub mod sources;

pub use catalog_repository::SqliteCatalogStore;
pub use config::{AppConfig, LoggingConfig, RunConfig, SiteConfig};
pub use database_connection::DatabaseConnection;
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::{RunLogScope, init_logging_with_config};
pub use notification::{BarkNotifier, LogNotifier};
pub use sources::build_adapter;
