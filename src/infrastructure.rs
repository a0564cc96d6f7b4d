// Infrastructure layer modules
pub mod cdn_fetcher;
pub mod config;
pub mod database;
pub mod ghost;
pub mod http_client;
pub mod image_resizer;
pub mod logging;
pub mod object_store;
pub mod plausible;
pub mod sms;
pub mod sql_loader;

// Re-exports
pub use cdn_fetcher::{CdnFetcher, FetchError, ImageFetcher};
pub use config::{
    AppConfig, ConfigError, DatabaseConfig, GhostConfig, GithubConfig, PlausibleConfig,
    ServerConfig, SmsConfig, StorageConfig,
};
pub use database::{Database, DatabaseError, Frame, IfExists, InsertSummary, Record};
pub use ghost::{GhostClient, GhostError, GhostPage, GhostPost, PostCatalog};
pub use image_resizer::{ResizeError, create_mobile_image};
pub use logging::init_logging;
pub use object_store::{BlobRef, ObjectStore, ObjectStoreError, S3ObjectStore};
pub use plausible::{PlausibleClient, PlausibleError, VisitSource};
pub use sms::{SmsError, SmsReceipt, SmsSender, SnsSmsSender};
pub use sql_loader::{SqlLoaderError, collect_sql_queries};
