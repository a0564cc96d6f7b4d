//! アクセス解析エンドポイント
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::domain::{PageVisit, TimePeriod};

/// `limit`省略時の件数
const DEFAULT_LIMIT: u32 = 10;

/// `limit`の上限
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct TopPagesQuery {
    #[serde(default)]
    pub period: TimePeriod,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// GET /analytics/top/?period=&limit=
///
/// 記事情報付きのアクセス上位ページ
pub async fn top_pages(
    State(state): State<AppState>,
    query: Result<Query<TopPagesQuery>, QueryRejection>,
) -> Result<Json<Vec<PageVisit>>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limitは1から{MAX_LIMIT}の範囲で指定してください"
        )));
    }
    Ok(Json(state.top_pages.top_pages(query.period, limit).await?))
}
