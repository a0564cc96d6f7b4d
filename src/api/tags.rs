//! タグメタデータ更新エンドポイント
use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::info;

use super::{ApiError, AppState};
use crate::application::run_sql_directory;
use crate::domain::TagUpdate;

/// タグ更新時に実行するSQLグループ
const TAG_QUERY_GROUP: &str = "tags";

/// POST /tags/
///
/// タグ更新Webhookを受けて`tags`グループのSQLを実行する。
pub async fn update_tags_metadata(
    State(state): State<AppState>,
    payload: Result<Json<TagUpdate>, JsonRejection>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let Json(update) = payload?;
    let results = run_sql_directory(
        &state.database,
        &state.database_config.sql_group_dir(TAG_QUERY_GROUP),
    )
    .await?;
    info!(
        slug = %update.current.slug,
        "Tag `{}` updated; updated tag page metadata: {:?}",
        update.current.slug,
        results
    );
    Ok(Json(results))
}
