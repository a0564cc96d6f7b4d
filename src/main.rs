//! ブログバックエンドのHTTP APIサーバー
//!
//! 本バイナリは以下の機能を提供する:
//! - 記事画像の派生生成 (POST /images/, GET /images/, GET /images/sort/)
//! - タグメタデータの更新 (POST /tags/)
//! - GitHub WebhookのSMS通知 (POST /github/pr, POST /github/issue)
//! - アクセス上位ページ (GET /analytics/top/)
//! - ヘルスチェック (GET /health)

use std::sync::Arc;

use blog_backend::api::{AppState, create_router};
use blog_backend::application::{GithubNotifier, ImageSyncService, TopPagesService};
use blog_backend::infrastructure::{
    AppConfig, CdnFetcher, Database, GhostClient, PlausibleClient, S3ObjectStore, SnsSmsSender,
    init_logging,
};
use tokio::signal;

/// シャットダウンシグナルを待機する
///
/// SIGTERMまたはCtrl+C (SIGINT) を待機し、いずれかを受信したらリターンする。
///
/// # Panics
/// シグナルハンドラーの登録に失敗した場合はパニックする。
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Ctrl+C シグナルハンドラーの登録に失敗しました");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM シグナルハンドラーの登録に失敗しました")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C (SIGINT) を受信しました。graceful shutdownを開始します");
        }
        _ = terminate => {
            tracing::info!("SIGTERM を受信しました。graceful shutdownを開始します");
        }
    }
}

/// メイン関数
///
/// 設定を環境変数から読み込み、各クライアントを構築してHTTPサーバーを起動する。
/// 起動時の設定・初期化エラーはプロセスを終了させる。
#[tokio::main]
async fn main() {
    init_logging();
    tracing::info!("API successfully started");

    let config = AppConfig::from_env().expect("設定の読み込みに失敗しました");

    let store = Arc::new(S3ObjectStore::from_config(&config.storage).await);
    let fetcher = Arc::new(CdnFetcher::new(&config.storage).expect("CDNクライアントの構築に失敗しました"));
    let sms = Arc::new(SnsSmsSender::from_config(&config.sms).await);
    let ghost = Arc::new(GhostClient::new(&config.ghost).expect("Ghostクライアントの構築に失敗しました"));
    let plausible = Arc::new(
        PlausibleClient::new(&config.plausible).expect("Plausibleクライアントの構築に失敗しました"),
    );

    let database = Database::new(config.database.db_path())
        .await
        .expect("データベースの初期化に失敗しました");
    tracing::info!(db_path = config.database.db_path(), "データベースを初期化しました");

    let state = AppState {
        images: Arc::new(ImageSyncService::new(store, fetcher, config.storage.clone())),
        notifier: Arc::new(GithubNotifier::new(sms, config.github.clone())),
        top_pages: Arc::new(TopPagesService::new(plausible, ghost)),
        database: Arc::new(database),
        database_config: config.database.clone(),
    };
    let app = create_router(state, config.server.cors_origins());

    let addr = config.server.listen_addr();
    tracing::info!("リッスン開始: {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("アドレスのバインドに失敗しました");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("サーバーの起動に失敗しました");

    tracing::info!("サーバーが正常に停止しました");
}
