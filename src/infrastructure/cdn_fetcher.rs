//! CDN画像取得モジュール
//!
//! バケットの公開URL経由で画像を取得する。
//! 到達できない・画像でないレスポンスはエラーではなく「画像なし」として扱う。

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::config::StorageConfig;
use super::http_client::build_http_client;

/// CDN取得のエラー型
#[derive(Debug, Error)]
pub enum FetchError {
    /// ネットワークエラー（再試行後）
    #[error("ネットワークエラー ({url}): {message}")]
    Network {
        /// リクエストURL
        url: String,
        /// 詳細
        message: String,
    },

    /// クライアント構築エラー
    #[error("HTTPクライアントの構築に失敗: {0}")]
    Build(String),
}

/// 画像として扱うContent-Typeか判定
fn is_image_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        Some(value) => {
            let mime = value.split(';').next().unwrap_or_default().trim();
            mime.starts_with("image/") || mime == "application/octet-stream"
        }
        None => false,
    }
}

/// 公開URL経由の画像取得トレイト（テスト用の抽象化）
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// 画像の内容を取得
    ///
    /// # 戻り値
    /// * `Ok(Some(bytes))` - 画像として取得できた
    /// * `Ok(None)` - 到達できない、または画像でない
    /// * `Err(FetchError)` - 通信エラー
    async fn fetch_image(&self, name: &str) -> Result<Option<Vec<u8>>, FetchError>;

    /// 画像として到達可能か確認
    async fn is_image(&self, name: &str) -> Result<bool, FetchError> {
        Ok(self.fetch_image(name).await?.is_some())
    }
}

/// reqwestを使用したCDN取得実装
#[derive(Clone)]
pub struct CdnFetcher {
    client: ClientWithMiddleware,
    storage: StorageConfig,
}

impl std::fmt::Debug for CdnFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnFetcher")
            .field("bucket_url", &self.storage.bucket_url())
            .finish_non_exhaustive()
    }
}

impl CdnFetcher {
    /// 設定からCdnFetcherを作成
    pub fn new(storage: &StorageConfig) -> Result<Self, FetchError> {
        let client = build_http_client().map_err(|e| FetchError::Build(e.to_string()))?;
        Ok(Self {
            client,
            storage: storage.clone(),
        })
    }

    fn network_error(url: &str, err: impl std::fmt::Display) -> FetchError {
        warn!(url = %url, error = %err, "CDNリクエスト失敗");
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl ImageFetcher for CdnFetcher {
    #[instrument(skip(self))]
    async fn fetch_image(&self, name: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let url = self.storage.object_url(name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::network_error(&url, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !status.is_success() || !is_image_content_type(content_type.as_deref()) {
            debug!(
                url = %url,
                status = %status,
                content_type = content_type.as_deref().unwrap_or("-"),
                "画像として取得できません"
            );
            return Ok(None);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::network_error(&url, e))?;
        Ok(Some(bytes.to_vec()))
    }

    #[instrument(skip(self))]
    async fn is_image(&self, name: &str) -> Result<bool, FetchError> {
        let url = self.storage.object_url(name);
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| Self::network_error(&url, e))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        Ok(response.status().is_success() && is_image_content_type(content_type))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticImageFetcher;
    use super::*;

    #[test]
    fn test_is_image_content_type() {
        assert!(is_image_content_type(Some("image/jpeg")));
        assert!(is_image_content_type(Some("image/webp; charset=binary")));
        assert!(is_image_content_type(Some("application/octet-stream")));
        assert!(!is_image_content_type(Some("text/html; charset=utf-8")));
        assert!(!is_image_content_type(None));
    }

    #[test]
    fn test_fetcher_debug_hides_client() {
        let storage = StorageConfig::new("bucket", "https://cdn.example.com").unwrap();
        let fetcher = CdnFetcher::new(&storage).unwrap();

        let debug = format!("{:?}", fetcher);

        assert!(debug.contains("https://cdn.example.com/"));
    }

    #[tokio::test]
    async fn test_default_is_image_uses_fetch() {
        let fetcher = StaticImageFetcher::default().with_image("foo.jpg", vec![1, 2, 3]);

        assert!(fetcher.is_image("foo.jpg").await.unwrap());
        assert!(!fetcher.is_image("bar.jpg").await.unwrap());
        assert_eq!(fetcher.call_count(), 2);
    }
}
