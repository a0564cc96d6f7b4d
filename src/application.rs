// アプリケーション層モジュール
pub mod github_notifier;
pub mod image_sync;
pub mod sql_batch;
pub mod top_pages;

// 再エクスポート
pub use github_notifier::{GithubNotifier, NotifyError};
pub use image_sync::{ImageSyncError, ImageSyncService, TransformReport};
pub use sql_batch::{SqlBatchError, run_sql_directory};
pub use top_pages::{TopPagesError, TopPagesService};
