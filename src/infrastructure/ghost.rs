//! Ghost Content APIクライアント
//!
//! 固定ページ一覧とスラッグによる記事取得を提供する。

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, instrument};

use super::config::GhostConfig;
use super::http_client::build_http_client;

/// Ghost API呼び出しのエラー型
#[derive(Debug, Error)]
pub enum GhostError {
    /// HTTPエラー（ステータスコード付き）
    #[error("HTTPエラー: status={status}, message={message}")]
    HttpError {
        /// HTTPステータスコード
        status: u16,
        /// レスポンス本文
        message: String,
    },

    /// ネットワークエラー
    #[error("ネットワークエラー: {0}")]
    NetworkError(String),

    /// レスポンスのデシリアライズエラー
    #[error("デシリアライズエラー: {0}")]
    DeserializationError(String),

    /// クライアント構築エラー
    #[error("HTTPクライアントの構築に失敗: {0}")]
    Build(String),
}

/// 記事
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GhostPost {
    pub slug: String,
    pub title: String,
    /// 記事のURL（Ghostは絶対URLを返す）
    pub url: String,
}

/// 固定ページ
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GhostPage {
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    posts: Vec<GhostPost>,
}

#[derive(Debug, Deserialize)]
struct PagesResponse {
    pages: Vec<GhostPage>,
}

/// 記事メタデータの参照トレイト（テスト用の抽象化）
#[async_trait]
pub trait PostCatalog: Send + Sync {
    /// 固定ページを全件取得
    async fn pages(&self) -> Result<Vec<GhostPage>, GhostError>;

    /// スラッグで記事を取得（存在しなければNone）
    async fn post_by_slug(&self, slug: &str) -> Result<Option<GhostPost>, GhostError>;

    /// 公開サイトのURL
    fn site_url(&self) -> &str;
}

/// Ghost Content APIクライアント
#[derive(Clone)]
pub struct GhostClient {
    client: ClientWithMiddleware,
    config: GhostConfig,
}

impl std::fmt::Debug for GhostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhostClient")
            .field("site_url", &self.config.site_url())
            .finish_non_exhaustive()
    }
}

impl GhostClient {
    /// 設定からGhostClientを作成
    pub fn new(config: &GhostConfig) -> Result<Self, GhostError> {
        let client = build_http_client().map_err(|e| GhostError::Build(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Content APIにGETリクエストを送信
    ///
    /// 404は`Ok(None)`として返す。
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        resource: &str,
        extra_query: &[(&str, &str)],
    ) -> Result<Option<T>, GhostError> {
        let url = self.config.content_url(resource);
        debug!(url = %url, "Ghost APIリクエスト");

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.config.content_api_key())])
            .query(extra_query)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, url = %url, "Ghost APIリクエスト失敗");
                GhostError::NetworkError(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, url = %url, "Ghost APIエラー");
            return Err(GhostError::HttpError {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| GhostError::DeserializationError(e.to_string()))
    }
}

#[async_trait]
impl PostCatalog for GhostClient {
    #[instrument(skip(self))]
    async fn pages(&self) -> Result<Vec<GhostPage>, GhostError> {
        let response: Option<PagesResponse> = self
            .get_json("pages", &[("limit", "all"), ("fields", "slug,title")])
            .await?;
        Ok(response.map(|r| r.pages).unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn post_by_slug(&self, slug: &str) -> Result<Option<GhostPost>, GhostError> {
        let response: Option<PostsResponse> = self
            .get_json(
                &format!("posts/slug/{slug}"),
                &[("fields", "slug,title,url")],
            )
            .await?;
        Ok(response.and_then(|r| r.posts.into_iter().next()))
    }

    fn site_url(&self) -> &str {
        self.config.site_url()
    }
}

/// テスト用の固定カタログ
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct StaticPostCatalog {
        pub pages: Vec<GhostPage>,
        pub posts: Vec<GhostPost>,
        lookups: AtomicUsize,
    }

    impl StaticPostCatalog {
        pub fn new(pages: &[&str], posts: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|slug| GhostPage {
                        slug: slug.to_string(),
                        title: None,
                    })
                    .collect(),
                posts: posts
                    .iter()
                    .map(|(slug, title)| GhostPost {
                        slug: slug.to_string(),
                        title: title.to_string(),
                        url: format!("https://example.com/{slug}/"),
                    })
                    .collect(),
                lookups: AtomicUsize::new(0),
            }
        }

        pub fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PostCatalog for StaticPostCatalog {
        async fn pages(&self) -> Result<Vec<GhostPage>, GhostError> {
            Ok(self.pages.clone())
        }

        async fn post_by_slug(&self, slug: &str) -> Result<Option<GhostPost>, GhostError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.posts.iter().find(|p| p.slug == slug).cloned())
        }

        fn site_url(&self) -> &str {
            "https://example.com"
        }
    }
}
