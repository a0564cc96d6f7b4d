//! SMS通知モジュール
//!
//! 設定された電話番号宛てにSNS経由でSMSを送信する。

use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;
use aws_sdk_sns::error::DisplayErrorContext;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::config::SmsConfig;

/// SMS送信のエラー型
#[derive(Debug, Error)]
pub enum SmsError {
    /// AWS SDK エラー
    #[error("AWS SNS APIエラー: {0}")]
    AwsSdkError(String),
}

/// SMS送信結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsReceipt {
    /// プロバイダーのメッセージID
    pub message_id: String,
}

/// SMS送信トレイト（テスト用の抽象化）
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// 設定された宛先にメッセージを送信する
    async fn send_message(&self, body: &str) -> Result<SmsReceipt, SmsError>;
}

/// SNSのSMS発行を使用した実装
pub struct SnsSmsSender {
    client: SnsClient,
    recipient: String,
}

impl SnsSmsSender {
    /// 新しいSnsSmsSenderを作成
    pub fn new(client: SnsClient, config: &SmsConfig) -> Self {
        Self {
            client,
            recipient: config.recipient().to_string(),
        }
    }

    /// AWS設定からデフォルトのクライアントを作成
    pub async fn from_config(config: &SmsConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(SnsClient::new(&sdk_config), config)
    }
}

#[async_trait]
impl SmsSender for SnsSmsSender {
    async fn send_message(&self, body: &str) -> Result<SmsReceipt, SmsError> {
        info!(message_length = body.len(), "SMS送信開始");

        let result = self
            .client
            .publish()
            .phone_number(&self.recipient)
            .message(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let message_id = response.message_id().unwrap_or("unknown").to_string();
                info!(message_id = %message_id, "SMS送信成功");
                Ok(SmsReceipt { message_id })
            }
            Err(err) => {
                warn!(error = %DisplayErrorContext(&err), "SMS送信エラー");
                Err(SmsError::AwsSdkError(DisplayErrorContext(&err).to_string()))
            }
        }
    }
}

/// テスト用のモック実装
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 送信内容を記録するモック
    #[derive(Default)]
    pub struct RecordingSmsSender {
        fail: bool,
        call_count: AtomicUsize,
        messages: Mutex<Vec<String>>,
    }

    impl RecordingSmsSender {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SmsSender for RecordingSmsSender {
        async fn send_message(&self, body: &str) -> Result<SmsReceipt, SmsError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
            self.messages.lock().unwrap().push(body.to_string());
            if self.fail {
                return Err(SmsError::AwsSdkError("mock error".to_string()));
            }
            Ok(SmsReceipt {
                message_id: format!("mock-message-id-{count}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSmsSender;
    use super::*;

    #[test]
    fn test_sms_error_display() {
        let error = SmsError::AwsSdkError("API呼び出し失敗".to_string());
        assert_eq!(error.to_string(), "AWS SNS APIエラー: API呼び出し失敗");
    }

    #[tokio::test]
    async fn test_recording_sender_records_messages() {
        let sender = RecordingSmsSender::default();

        let receipt = sender.send_message("PR opened").await.unwrap();

        assert_eq!(receipt.message_id, "mock-message-id-1");
        assert_eq!(sender.messages(), vec!["PR opened".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_sender_returns_error() {
        let sender = RecordingSmsSender::failing();

        assert!(sender.send_message("PR opened").await.is_err());
        assert_eq!(sender.call_count(), 1);
    }
}
