//! HTTPエンドポイント層
//!
//! Webhookやクエリパラメータを受け取り、アプリケーション層の操作を1つ呼び出して
//! 結果をJSONで返す。
//! - 画像の派生生成 (POST/GET /images/, GET /images/sort/)
//! - タグメタデータの更新 (POST /tags/)
//! - GitHub通知 (POST /github/pr, POST /github/issue)
//! - アクセス上位ページ (GET /analytics/top/)
//! - ヘルスチェック (GET /health)

mod analytics;
mod error;
mod github;
mod images;
mod tags;

pub use error::{ApiError, ApiErrorBody};

use std::sync::Arc;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::{GithubNotifier, ImageSyncService, TopPagesService};
use crate::infrastructure::{Database, DatabaseConfig};

/// アプリケーション状態
///
/// ルーター全体で共有される状態を保持する。
#[derive(Clone)]
pub struct AppState {
    /// 画像同期サービス
    pub images: Arc<ImageSyncService>,
    /// GitHub通知サービス
    pub notifier: Arc<GithubNotifier>,
    /// アクセス上位ページサービス
    pub top_pages: Arc<TopPagesService>,
    /// 分析用データベース
    pub database: Arc<Database>,
    /// SQLファイルの配置
    pub database_config: DatabaseConfig,
}

/// ヘルスチェックエンドポイント
async fn health() -> &'static str {
    "OK"
}

/// 許可オリジンからCORSレイヤーを構築
///
/// オリジンが1つも指定されていない（または全て不正な）場合はNone。
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "不正なCORSオリジンを無視");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// ルーターを構築する
///
/// TraceLayerによりリクエスト/レスポンスの構造化ログを自動記録する。
///
/// # Arguments
/// * `state` - アプリケーション状態
/// * `cors_origins` - 許可するオリジン（空ならCORSレイヤーなし）
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route(
            "/images/",
            get(images::bulk_transform_images).post(images::optimize_post_image),
        )
        .route("/images/sort/", get(images::bulk_organize_images))
        .route("/tags/", post(tags::update_tags_metadata))
        .route("/github/pr", post(github::pull_request))
        .route("/github/issue", post(github::issue))
        .route("/analytics/top/", get(analytics::top_pages))
        // リクエストトレーシングレイヤー（method, path, status, latencyを自動記録）
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match cors_layer(cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::infrastructure::cdn_fetcher::testing::StaticImageFetcher;
    use crate::infrastructure::ghost::testing::StaticPostCatalog;
    use crate::infrastructure::image_resizer::sample_png;
    use crate::infrastructure::object_store::testing::InMemoryObjectStore;
    use crate::infrastructure::plausible::testing::StaticVisitSource;
    use crate::infrastructure::sms::testing::RecordingSmsSender;
    use crate::infrastructure::{GithubConfig, StorageConfig};

    const CDN: &str = "https://cdn.example.com/";

    /// テスト用のルーターと観測用モック
    struct TestApp {
        router: Router,
        store: Arc<InMemoryObjectStore>,
        sms: Arc<RecordingSmsSender>,
        _dir: tempfile::TempDir,
    }

    async fn test_app(objects: &[&str], fetcher: StaticImageFetcher) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::new(&dir.path().join("test.db").to_string_lossy())
            .await
            .unwrap();
        let store = Arc::new(InMemoryObjectStore::with_objects(objects.iter().copied()));
        let sms = Arc::new(RecordingSmsSender::default());
        let storage = StorageConfig::new("cdn-bucket", CDN)
            .unwrap()
            .with_bucket_folder("content/images/2021/05");

        let state = AppState {
            images: Arc::new(ImageSyncService::new(
                store.clone(),
                Arc::new(fetcher),
                storage,
            )),
            notifier: Arc::new(GithubNotifier::new(sms.clone(), GithubConfig::default())),
            top_pages: Arc::new(TopPagesService::new(
                Arc::new(StaticVisitSource::new(&[("/my-post/", 10), ("/tag/x/", 5)])),
                Arc::new(StaticPostCatalog::new(&[], &[("my-post", "My Post")])),
            )),
            database: Arc::new(database),
            database_config: DatabaseConfig::new("unused.db", dir.path().join("sql")),
        };

        TestApp {
            router: create_router(state, &[]),
            store,
            sms,
            _dir: dir,
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("GET")
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_update(feature_image: Value) -> Value {
        json!({
            "post": {
                "current": {"title": "My Post", "feature_image": feature_image},
                "previous": {}
            }
        })
    }

    // ========================================
    // /health
    // ========================================

    #[tokio::test]
    async fn test_health_endpoint_returns_ok_body() {
        let app = test_app(&[], StaticImageFetcher::default()).await;

        let response = app.router.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");
    }

    // ========================================
    // /images/
    // ========================================

    #[tokio::test]
    async fn test_post_image_without_feature_image_touches_no_storage() {
        let app = test_app(&[], StaticImageFetcher::default()).await;

        let response = app
            .router
            .oneshot(post_json("/images/", post_update(Value::Null)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"My Post": "No images exist for optimization"})
        );
        assert_eq!(app.store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_post_image_creates_derivatives() {
        let name = "content/images/2021/05/post.jpg";
        let fetcher = StaticImageFetcher::default()
            .with_image(name, sample_png(1200, 800))
            .with_image("content/images/2021/05/post@2x.jpg", sample_png(1200, 800));
        let app = test_app(&[name], fetcher).await;

        let response = app
            .router
            .oneshot(post_json("/images/", post_update(json!(format!("{CDN}{name}")))))
            .await
            .unwrap();

        assert_eq!(
            json_body(response).await,
            json!([
                "https://cdn.example.com/content/images/2021/05/post@2x.jpg",
                "https://cdn.example.com/content/images/2021/05/post_mobile@2x.jpg"
            ])
        );
    }

    #[tokio::test]
    async fn test_post_image_when_derivatives_exist() {
        let app = test_app(
            &[
                "content/images/2021/05/post.jpg",
                "content/images/2021/05/post@2x.jpg",
                "content/images/2021/05/post_mobile@2x.jpg",
            ],
            StaticImageFetcher::default(),
        )
        .await;

        let response = app
            .router
            .oneshot(post_json(
                "/images/",
                post_update(json!(format!("{CDN}content/images/2021/05/post.jpg"))),
            ))
            .await
            .unwrap();

        assert_eq!(
            json_body(response).await,
            json!({"My Post": "Retina & mobile images already exist"})
        );
    }

    #[tokio::test]
    async fn test_post_image_malformed_payload() {
        let app = test_app(&[], StaticImageFetcher::default()).await;

        let response = app
            .router
            .oneshot(post_json("/images/", json!({"post": {}})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"], "invalid_payload");
    }

    #[tokio::test]
    async fn test_bulk_transform_uses_default_folder() {
        let app = test_app(
            &["content/images/2021/05/foo_o.jpg", "content/images/2020/01/bar_o.jpg"],
            StaticImageFetcher::default(),
        )
        .await;

        let response = app.router.oneshot(get_request("/images/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"purged": ["content/images/2021/05/foo_o.jpg"], "retina": [], "mobile": []})
        );
    }

    #[tokio::test]
    async fn test_bulk_transform_rejects_long_directory() {
        let app = test_app(&[], StaticImageFetcher::default()).await;
        let uri = format!("/images/?directory={}", "a".repeat(51));

        let response = app.router.oneshot(get_request(&uri)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_sort_moves_retina_images() {
        let app = test_app(&["roundup/lynx@2x.jpg"], StaticImageFetcher::default()).await;

        let response = app
            .router
            .oneshot(get_request("/images/sort/?directory=roundup"))
            .await
            .unwrap();

        assert_eq!(
            json_body(response).await,
            json!({"retina": ["roundup/_retina/lynx@2x.jpg"]})
        );
    }

    // ========================================
    // /github/*
    // ========================================

    #[tokio::test]
    async fn test_github_pr_from_bot_is_ignored() {
        let app = test_app(&[], StaticImageFetcher::default()).await;
        let payload = json!({
            "action": "opened",
            "sender": {"login": "dependabot-preview[bot]"},
            "pull_request": {"title": "Bump", "body": null, "url": "https://github.com/x/1"},
            "repository": {"name": "blog"}
        });

        let response = app.router.oneshot(post_json("/github/pr", payload)).await.unwrap();

        assert_eq!(
            json_body(response).await,
            json!({"status": "ignored", "message": "Activity from dependabot-preview[bot] ignored."})
        );
        assert_eq!(app.sms.call_count(), 0);
    }

    #[tokio::test]
    async fn test_github_issue_sends_sms() {
        let app = test_app(&[], StaticImageFetcher::default()).await;
        let payload = json!({
            "action": "opened",
            "sender": {"login": "reader"},
            "issue": {"title": "Typo", "url": "https://github.com/x/2"},
            "repository": {"name": "blog"}
        });

        let response = app
            .router
            .oneshot(post_json("/github/issue", payload))
            .await
            .unwrap();

        assert_eq!(json_body(response).await["status"], "notified");
        assert_eq!(app.sms.call_count(), 1);
    }

    // ========================================
    // /tags/ and /analytics/top/
    // ========================================

    #[tokio::test]
    async fn test_tags_without_sql_directory_is_internal_error() {
        let app = test_app(&[], StaticImageFetcher::default()).await;

        let response = app
            .router
            .oneshot(post_json("/tags/", json!({"current": {"slug": "rust"}})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "internal_error");
    }

    #[tokio::test]
    async fn test_analytics_top_pages() {
        let app = test_app(&[], StaticImageFetcher::default()).await;

        let response = app
            .router
            .oneshot(get_request("/analytics/top/?period=7d&limit=5"))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["title"], "My Post");
    }

    #[tokio::test]
    async fn test_analytics_rejects_unknown_period() {
        let app = test_app(&[], StaticImageFetcher::default()).await;

        let response = app
            .router
            .oneshot(get_request("/analytics/top/?period=year"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_cors_layer_requires_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["https://example.com".to_string()]).is_some());
    }
}
