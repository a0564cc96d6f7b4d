/// GitHub Webhook通知ハンドラー
///
/// プルリクエスト・Issueイベントを SMS 本文に整形して送信する。
/// 操作したアカウントが無視リストにある場合は送信しない。
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::domain::{GithubIssueEvent, GithubPullRequestEvent, WebhookAck};
use crate::infrastructure::{GithubConfig, SmsError, SmsSender};

/// 通知処理のエラー型
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Sms(#[from] SmsError),
}

/// GitHubイベントのSMS通知
pub struct GithubNotifier {
    sms: Arc<dyn SmsSender>,
    config: GithubConfig,
}

impl GithubNotifier {
    pub fn new(sms: Arc<dyn SmsSender>, config: GithubConfig) -> Self {
        Self { sms, config }
    }

    fn is_ignored(&self, user: &str) -> bool {
        self.config.ignored_actors().iter().any(|actor| actor == user)
    }

    /// プルリクエストイベントを通知
    pub async fn pull_request(
        &self,
        event: &GithubPullRequestEvent,
    ) -> Result<WebhookAck, NotifyError> {
        self.notify(&event.sender.login, event.action.as_deref(), event.message())
            .await
    }

    /// Issueイベントを通知
    pub async fn issue(&self, event: &GithubIssueEvent) -> Result<WebhookAck, NotifyError> {
        self.notify(&event.sender.login, event.action.as_deref(), event.message())
            .await
    }

    async fn notify(
        &self,
        user: &str,
        action: Option<&str>,
        message: String,
    ) -> Result<WebhookAck, NotifyError> {
        if self.is_ignored(user) {
            info!(user = %user, "Activity from {} ignored.", user);
            return Ok(WebhookAck::ignored(user));
        }
        let receipt = self.sms.send_message(&message).await?;
        info!(user = %user, message_id = %receipt.message_id, "SMS notification sent");
        Ok(WebhookAck::notified(action, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::AckStatus;
    use crate::infrastructure::sms::testing::RecordingSmsSender;

    fn pr_event(login: &str) -> GithubPullRequestEvent {
        serde_json::from_value(serde_json::json!({
            "action": "opened",
            "sender": {"login": login},
            "pull_request": {
                "title": "Fix typo",
                "body": "Small fix",
                "url": "https://api.github.com/repos/me/blog/pulls/1"
            },
            "repository": {"name": "blog"}
        }))
        .unwrap()
    }

    fn issue_event(login: &str) -> GithubIssueEvent {
        serde_json::from_value(serde_json::json!({
            "action": "closed",
            "sender": {"login": login},
            "issue": {"title": "Broken link", "url": "https://api.github.com/repos/me/blog/issues/2"},
            "repository": {"name": "blog"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_ignored_actor_never_reaches_sms() {
        let sms = Arc::new(RecordingSmsSender::default());
        let notifier = GithubNotifier::new(sms.clone(), GithubConfig::default());

        let ack = notifier
            .pull_request(&pr_event("dependabot-preview[bot]"))
            .await
            .unwrap();

        assert_eq!(ack.status, AckStatus::Ignored);
        assert_eq!(ack.message, "Activity from dependabot-preview[bot] ignored.");
        assert_eq!(sms.call_count(), 0);
    }

    #[tokio::test]
    async fn test_pull_request_sends_formatted_message() {
        let sms = Arc::new(RecordingSmsSender::default());
        let notifier = GithubNotifier::new(sms.clone(), GithubConfig::default());

        let ack = notifier.pull_request(&pr_event("contributor")).await.unwrap();

        assert_eq!(ack.status, AckStatus::Notified);
        assert_eq!(ack.message, "SMS notification sent for opened for contributor.");
        assert_eq!(
            sms.messages(),
            vec![
                "PR opened for `blog`:\nFix typo\nSmall fix\nhttps://api.github.com/repos/me/blog/pulls/1"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_configured_maintainer_is_ignored() {
        let sms = Arc::new(RecordingSmsSender::default());
        let config = GithubConfig::default().with_ignored_actors(["maintainer"]);
        let notifier = GithubNotifier::new(sms.clone(), config);

        let ack = notifier.issue(&issue_event("maintainer")).await.unwrap();

        assert_eq!(ack.status, AckStatus::Ignored);
        assert_eq!(sms.call_count(), 0);
    }

    #[tokio::test]
    async fn test_issue_sends_message() {
        let sms = Arc::new(RecordingSmsSender::default());
        let notifier = GithubNotifier::new(sms.clone(), GithubConfig::default());

        notifier.issue(&issue_event("someone")).await.unwrap();

        assert!(sms.messages()[0].starts_with("Issue closed for repository blog: `Broken link`"));
    }

    #[tokio::test]
    async fn test_sms_failure_is_an_error() {
        let sms = Arc::new(RecordingSmsSender::failing());
        let notifier = GithubNotifier::new(sms, GithubConfig::default());

        assert!(matches!(
            notifier.issue(&issue_event("someone")).await,
            Err(NotifyError::Sms(_))
        ));
    }
}
