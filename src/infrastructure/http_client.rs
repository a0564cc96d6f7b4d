//! 外部API共通のHTTPクライアント構築

use std::time::Duration;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

/// 最大再試行回数
const MAX_RETRIES: u32 = 3;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 指数バックオフ再試行付きのHTTPクライアントを構築
///
/// CDN・Ghost・Plausibleの各クライアントで共有する設定。
/// 一時的な失敗（5xx、接続エラー）は最大3回まで再試行する。
pub fn build_http_client() -> Result<ClientWithMiddleware, reqwest::Error> {
    let base_client = Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);

    Ok(ClientBuilder::new(base_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client().is_ok());
    }
}
