// Domain layer modules
pub mod analytics;
pub mod image_naming;
pub mod webhook;

// Re-exports
pub use analytics::{PageVisit, TimePeriod};
pub use image_naming::ImageVariant;
pub use webhook::{GithubIssueEvent, GithubPullRequestEvent, PostUpdate, TagUpdate, WebhookAck};
