//! GitHub Webhookエンドポイント
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use super::{ApiError, AppState};
use crate::domain::{GithubIssueEvent, GithubPullRequestEvent, WebhookAck};

/// POST /github/pr
///
/// プルリクエストイベントをSMSで通知
pub async fn pull_request(
    State(state): State<AppState>,
    payload: Result<Json<GithubPullRequestEvent>, JsonRejection>,
) -> Result<Json<WebhookAck>, ApiError> {
    let Json(event) = payload?;
    Ok(Json(state.notifier.pull_request(&event).await?))
}

/// POST /github/issue
///
/// IssueイベントをSMSで通知
pub async fn issue(
    State(state): State<AppState>,
    payload: Result<Json<GithubIssueEvent>, JsonRejection>,
) -> Result<Json<WebhookAck>, ApiError> {
    let Json(event) = payload?;
    Ok(Json(state.notifier.issue(&event).await?))
}
