//! Plausible統計APIクライアント
//!
//! ページ別の訪問者数（breakdown）を取得する。

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::config::PlausibleConfig;
use super::http_client::build_http_client;
use crate::domain::{PageVisit, TimePeriod};

/// Plausible API呼び出しのエラー型
#[derive(Debug, Error)]
pub enum PlausibleError {
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

#[derive(Debug, Deserialize)]
struct BreakdownResponse {
    results: Vec<PageVisit>,
}

/// ページ別訪問者数の取得トレイト（テスト用の抽象化）
#[async_trait]
pub trait VisitSource: Send + Sync {
    /// 訪問者数の多い順にページを取得
    ///
    /// APIが200以外を返した場合は空のリストを返す。
    async fn fetch_top_visited_urls(
        &self,
        period: TimePeriod,
        limit: u32,
    ) -> Result<Vec<PageVisit>, PlausibleError>;
}

/// Plausible breakdown APIクライアント
#[derive(Clone)]
pub struct PlausibleClient {
    client: ClientWithMiddleware,
    config: PlausibleConfig,
}

impl std::fmt::Debug for PlausibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlausibleClient")
            .field("endpoint", &self.config.endpoint())
            .field("site_id", &self.config.site_id())
            .finish_non_exhaustive()
    }
}

impl PlausibleClient {
    /// 設定からPlausibleClientを作成
    pub fn new(config: &PlausibleConfig) -> Result<Self, PlausibleError> {
        let client = build_http_client().map_err(|e| PlausibleError::Build(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl VisitSource for PlausibleClient {
    #[instrument(skip(self))]
    async fn fetch_top_visited_urls(
        &self,
        period: TimePeriod,
        limit: u32,
    ) -> Result<Vec<PageVisit>, PlausibleError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.config.endpoint())
            .bearer_auth(self.config.api_token())
            .query(&[
                ("site_id", self.config.site_id()),
                ("period", period.as_str()),
                ("property", "event:page"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PlausibleError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Plausible APIが200以外を返しました");
            return Ok(Vec::new());
        }

        let breakdown: BreakdownResponse = response
            .json()
            .await
            .map_err(|e| PlausibleError::DeserializationError(e.to_string()))?;
        debug!(count = breakdown.results.len(), "breakdownを取得");
        info!(period = %period, "Fetched {} pages from analytics", breakdown.results.len());
        Ok(breakdown.results)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_response_deserialize() {
        let json = r#"{"results": [
            {"page": "/my-post/", "visitors": 120},
            {"page": "/tag/rust/", "visitors": 30}
        ]}"#;

        let response: BreakdownResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].visitors, 120);
        assert!(response.results[0].slug.is_none());
    }

    #[test]
    fn test_client_debug_hides_token() {
        let config = PlausibleConfig::new("secret-token", "example.com", "https://plausible.io/api");
        let client = PlausibleClient::new(&config).unwrap();

        let debug = format!("{:?}", client);

        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("example.com"));
    }
}
