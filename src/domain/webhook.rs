/// Webhook payloads received from the CMS and from GitHub
///
/// Only the fields the endpoints actually read are modelled; everything
/// else in the payload is ignored during deserialisation.
use serde::{Deserialize, Serialize};

/// Accounts whose activity never triggers a notification
///
/// Maintainer logins are added through configuration.
pub const DEFAULT_IGNORED_ACTORS: [&str; 3] =
    ["dependabot-preview[bot]", "dependabot[bot]", "renovate[bot]"];

/// Post fields read from a CMS post webhook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Post title
    pub title: String,
    /// Absolute URL of the feature image, if any
    #[serde(default)]
    pub feature_image: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Current/previous snapshot pair of a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostSnapshot {
    pub current: Post,
    #[serde(default)]
    pub previous: Option<serde_json::Value>,
}

/// CMS `post.updated` webhook body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostUpdate {
    pub post: PostSnapshot,
}

/// Tag fields read from a CMS tag webhook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// CMS `tag.updated` webhook body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagUpdate {
    pub current: Tag,
    #[serde(default)]
    pub previous: Option<serde_json::Value>,
}

/// GitHub account that triggered the event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    pub login: String,
}

/// Repository the event belongs to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullRequest {
    pub title: String,
    /// PR description; GitHub sends `null` for an empty body
    #[serde(default)]
    pub body: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub title: String,
    pub url: String,
}

/// GitHub `pull_request` webhook body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubPullRequestEvent {
    #[serde(default)]
    pub action: Option<String>,
    pub sender: Sender,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

impl GithubPullRequestEvent {
    /// SMS text for this event
    pub fn message(&self) -> String {
        let mut message = format!(
            "PR {} for `{}`:\n{}",
            self.action.as_deref().unwrap_or("unknown"),
            self.repository.name,
            self.pull_request.title
        );
        if let Some(body) = self.pull_request.body.as_deref().filter(|b| !b.trim().is_empty()) {
            message.push('\n');
            message.push_str(body.trim());
        }
        message.push('\n');
        message.push_str(&self.pull_request.url);
        message
    }
}

/// GitHub `issues` webhook body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubIssueEvent {
    #[serde(default)]
    pub action: Option<String>,
    pub sender: Sender,
    pub issue: Issue,
    pub repository: Repository,
}

impl GithubIssueEvent {
    /// SMS text for this event
    pub fn message(&self) -> String {
        format!(
            "Issue {} for repository {}: `{}`\n\n{}",
            self.action.as_deref().unwrap_or("unknown"),
            self.repository.name,
            self.issue.title,
            self.issue.url
        )
    }
}

/// Outcome reported back to the webhook sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Actor is on the ignore list; nothing was sent
    Ignored,
    /// Notification was sent
    Notified,
}

/// JSON acknowledgement returned by the GitHub endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub status: AckStatus,
    pub message: String,
}

impl WebhookAck {
    pub fn ignored(user: &str) -> Self {
        Self {
            status: AckStatus::Ignored,
            message: format!("Activity from {user} ignored."),
        }
    }

    pub fn notified(action: Option<&str>, user: &str) -> Self {
        Self {
            status: AckStatus::Notified,
            message: format!(
                "SMS notification sent for {} for {user}.",
                action.unwrap_or("unknown")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr_event_json(login: &str, body: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "action": "opened",
            "sender": { "login": login, "id": 1 },
            "pull_request": {
                "title": "Bump serde",
                "body": body,
                "url": "https://api.github.com/repos/acme/blog/pulls/7",
                "number": 7
            },
            "repository": { "name": "blog", "full_name": "acme/blog" }
        })
    }

    #[test]
    fn test_post_update_with_null_feature_image() {
        let json = r#"{"post":{"current":{"title":"Hello","feature_image":null}}}"#;
        let update: PostUpdate = serde_json::from_str(json).unwrap();

        assert_eq!(update.post.current.title, "Hello");
        assert!(update.post.current.feature_image.is_none());
    }

    #[test]
    fn test_tag_update_reads_current_slug() {
        let json = r#"{"current":{"slug":"rust","name":"Rust"},"previous":{}}"#;
        let update: TagUpdate = serde_json::from_str(json).unwrap();

        assert_eq!(update.current.slug, "rust");
    }

    #[test]
    fn test_pull_request_message() {
        let event: GithubPullRequestEvent =
            serde_json::from_value(pr_event_json("octocat", "Updates serde".into())).unwrap();

        assert_eq!(
            event.message(),
            "PR opened for `blog`:\nBump serde\nUpdates serde\nhttps://api.github.com/repos/acme/blog/pulls/7"
        );
    }

    #[test]
    fn test_pull_request_message_without_body() {
        let event: GithubPullRequestEvent =
            serde_json::from_value(pr_event_json("octocat", serde_json::Value::Null)).unwrap();

        assert_eq!(
            event.message(),
            "PR opened for `blog`:\nBump serde\nhttps://api.github.com/repos/acme/blog/pulls/7"
        );
    }

    #[test]
    fn test_issue_message() {
        let event: GithubIssueEvent = serde_json::from_value(serde_json::json!({
            "action": "opened",
            "sender": { "login": "octocat" },
            "issue": { "title": "Broken link", "url": "https://github.com/acme/blog/issues/3" },
            "repository": { "name": "blog" }
        }))
        .unwrap();

        assert_eq!(
            event.message(),
            "Issue opened for repository blog: `Broken link`\n\nhttps://github.com/acme/blog/issues/3"
        );
    }

    #[test]
    fn test_missing_sender_fails_to_deserialize() {
        let result: Result<GithubIssueEvent, _> = serde_json::from_value(serde_json::json!({
            "action": "opened",
            "issue": { "title": "t", "url": "u" },
            "repository": { "name": "blog" }
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_ack_serialization() {
        let ack = WebhookAck::ignored("renovate[bot]");
        let json = serde_json::to_value(&ack).unwrap();

        assert_eq!(json["status"], "ignored");
        assert_eq!(json["message"], "Activity from renovate[bot] ignored.");
    }
}
